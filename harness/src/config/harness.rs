//! Harness Configuration
//!
//! Launch specifications for the application under test and the timing
//! policy used between scenario phases.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::commands::CommandTemplates;
use crate::core::{LineClassifier, LineGrammar, DEFAULT_BANNER_MARKERS, DEFAULT_PROMPT_PREFIXES};
use crate::error::{HarnessError, HarnessResult};

/// Structured process invocation: program, arguments, working directory and
/// environment overrides. No shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// Parse `program arg arg ...`, split on whitespace
    pub fn from_command_line(command: &str) -> HarnessResult<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| HarnessError::config("command", "empty command line"))?;
        Ok(Self::new(program).args(parts))
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The default `iex -S mix run --no-halt` launch inside `dir`
    pub fn mix_project(dir: impl Into<PathBuf>) -> Self {
        Self::new("iex").args(["-S", "mix", "run", "--no-halt"]).working_dir(dir)
    }
}

/// Waits and bounds used while sequencing phases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTiming {
    /// Output must be quiet this long before a settle barrier is satisfied
    pub settle_grace: Duration,
    /// Upper bound for any barrier; the phase proceeds when it elapses
    pub barrier_timeout: Duration,
    /// Time a process gets to exit after SIGTERM before it is killed
    pub termination_grace: Duration,
    /// Time allowed for a drain task to finish after its process exited
    pub drain_grace: Duration,
    /// Upper bound for writing one command to a process
    pub write_timeout: Duration,
    /// Replace every barrier with this fixed delay
    pub fixed_delay: Option<Duration>,
    /// Pause between scenarios when several run back to back
    pub scenario_pause: Duration,
}

impl Default for PhaseTiming {
    fn default() -> Self {
        Self {
            settle_grace: Duration::from_secs(1),
            barrier_timeout: Duration::from_secs(30),
            termination_grace: Duration::from_secs(5),
            drain_grace: Duration::from_secs(2),
            write_timeout: Duration::from_secs(5),
            fixed_delay: None,
            scenario_pause: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Value of `PORT` for every spawned process
    pub port: u16,
    /// Number of clients in the fleet
    pub clients: usize,
    pub server: LaunchSpec,
    pub client: LaunchSpec,
    /// Extra environment for every process
    pub env: BTreeMap<String, String>,
    pub grammar: LineGrammar,
    /// Line prefixes dropped as startup banners
    pub banner_markers: Vec<String>,
    /// Prompt openers stripped from the front of every line
    pub prompt_prefixes: Vec<String>,
    pub commands: CommandTemplates,
    pub timing: PhaseTiming,
    /// Client that sends in the fan-out scenario
    pub fanout_origin: usize,
    /// Print classified records to stdout
    pub echo_records: bool,
    /// Write classified records as JSON lines
    pub records_out: Option<PathBuf>,
    pub log_level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            port: 4011,
            clients: 10,
            server: LaunchSpec::mix_project("./server"),
            client: LaunchSpec::mix_project("./client"),
            env: BTreeMap::new(),
            grammar: LineGrammar::default(),
            banner_markers: DEFAULT_BANNER_MARKERS.iter().map(|m| m.to_string()).collect(),
            prompt_prefixes: DEFAULT_PROMPT_PREFIXES.iter().map(|p| p.to_string()).collect(),
            commands: CommandTemplates::default(),
            timing: PhaseTiming::default(),
            fanout_origin: 0,
            echo_records: true,
            records_out: None,
            log_level: "info".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Create a new builder
    pub fn builder() -> crate::config::builder::HarnessConfigBuilder {
        crate::config::builder::HarnessConfigBuilder::new()
    }

    /// Environment passed to every spawned process, `PORT` included
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.insert("PORT".to_string(), self.port.to_string());
        env
    }

    pub fn classifier(&self) -> LineClassifier {
        LineClassifier::new(self.grammar.clone())
            .with_banner_markers(self.banner_markers.iter().cloned())
            .with_prompt_prefixes(self.prompt_prefixes.iter().cloned())
    }

    /// Check if this configuration is valid
    pub fn validate(&self) -> HarnessResult<()> {
        if self.port == 0 {
            return Err(HarnessError::config("port", "must be non-zero"));
        }

        if self.clients == 0 {
            return Err(HarnessError::config("clients", "at least one client is required"));
        }

        if self.fanout_origin >= self.clients {
            return Err(HarnessError::config(
                "fanout_origin",
                format!("client {} does not exist in a fleet of {}", self.fanout_origin, self.clients),
            ));
        }

        for (field, spec) in [("server", &self.server), ("client", &self.client)] {
            if spec.program.trim().is_empty() {
                return Err(HarnessError::config(field, "program is empty"));
            }
        }

        if self.grammar.min_tokens == 0 {
            return Err(HarnessError::config("grammar.min_tokens", "must be at least 1"));
        }

        if self.timing.barrier_timeout.is_zero() {
            return Err(HarnessError::config("timing.barrier_timeout", "must be non-zero"));
        }

        if self.timing.write_timeout.is_zero() {
            return Err(HarnessError::config("timing.write_timeout", "must be non-zero"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_matches_mix_projects() {
        let config = HarnessConfig::default();
        assert_eq!(config.server.program, "iex");
        assert_eq!(config.server.args, vec!["-S", "mix", "run", "--no-halt"]);
        assert_eq!(config.server.working_dir, Some(PathBuf::from("./server")));
        assert_eq!(config.client.working_dir, Some(PathBuf::from("./client")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_includes_port() {
        let mut config = HarnessConfig::default();
        config.port = 5050;
        config.env.insert("MIX_ENV".to_string(), "test".to_string());

        let env = config.environment();
        assert_eq!(env.get("PORT").map(String::as_str), Some("5050"));
        assert_eq!(env.get("MIX_ENV").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_port_override_wins_over_extra_env() {
        let mut config = HarnessConfig::default();
        config.env.insert("PORT".to_string(), "1".to_string());
        assert_eq!(config.environment()["PORT"], "4011");
    }

    #[test]
    fn test_classifier_uses_configured_filters() {
        let mut config = HarnessConfig::default();
        config.banner_markers = vec!["Booting".to_string()];
        config.prompt_prefixes = vec!["app(".to_string()];

        let classifier = config.classifier();
        assert!(classifier.classify("app(1)> Booting node").is_none());
        assert!(classifier.classify("Interactive Elixir (1.15.7)").is_some());
    }

    #[test]
    fn test_from_command_line() {
        let spec = LaunchSpec::from_command_line("  mix  run --no-halt ").unwrap();
        assert_eq!(spec.program, "mix");
        assert_eq!(spec.args, vec!["run", "--no-halt"]);

        assert_matches!(
            LaunchSpec::from_command_line("   "),
            Err(HarnessError::ConfigurationError { .. })
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HarnessConfig::default();
        config.fanout_origin = 10;
        assert_matches!(
            config.validate(),
            Err(HarnessError::ConfigurationError { field, .. }) if field == "fanout_origin"
        );

        let mut config = HarnessConfig::default();
        config.clients = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.timing.write_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
