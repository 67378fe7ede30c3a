//! Harness Configuration Builder
//!
//! Provides a flexible builder pattern for constructing harness configurations

use super::{AckPatterns, CommandTemplates, HarnessConfig, LaunchSpec};
use std::path::PathBuf;
use std::time::Duration;

pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: HarnessConfig::default(),
        }
    }

    /// Set the `PORT` value handed to every process
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set number of clients
    pub fn clients(mut self, count: usize) -> Self {
        self.config.clients = count;
        self
    }

    /// Set how the server is launched
    pub fn server(mut self, spec: LaunchSpec) -> Self {
        self.config.server = spec;
        self
    }

    /// Set how each client is launched
    pub fn client(mut self, spec: LaunchSpec) -> Self {
        self.config.client = spec;
        self
    }

    /// Set the server working directory
    pub fn server_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.server.working_dir = Some(dir.into());
        self
    }

    /// Set the client working directory
    pub fn client_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.client.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable for every process
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    /// Set the number of metadata tokens between timestamp and level
    pub fn metadata_width(mut self, width: usize) -> Self {
        self.config.grammar.metadata_width = width;
        self
    }

    /// Replace the banner filter
    pub fn banner_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.banner_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the prompt openers stripped from each line
    pub fn prompt_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.prompt_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Set command templates
    pub fn commands(mut self, commands: CommandTemplates) -> Self {
        self.config.commands = commands;
        self
    }

    /// Set acknowledgment patterns, keeping the command templates
    pub fn acks(mut self, acks: AckPatterns) -> Self {
        self.config.commands.acks = acks;
        self
    }

    /// Set the message body sent in the exchange phase
    pub fn message<S: Into<String>>(mut self, message: S) -> Self {
        self.config.commands.message = message.into();
        self
    }

    pub fn settle_grace(mut self, grace: Duration) -> Self {
        self.config.timing.settle_grace = grace;
        self
    }

    pub fn barrier_timeout(mut self, timeout: Duration) -> Self {
        self.config.timing.barrier_timeout = timeout;
        self
    }

    pub fn termination_grace(mut self, grace: Duration) -> Self {
        self.config.timing.termination_grace = grace;
        self
    }

    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.config.timing.drain_grace = grace;
        self
    }

    pub fn write_timeout(mut self, limit: Duration) -> Self {
        self.config.timing.write_timeout = limit;
        self
    }

    /// Use fixed delays instead of settle/acknowledgment barriers
    pub fn fixed_delay(mut self, delay: Option<Duration>) -> Self {
        self.config.timing.fixed_delay = delay;
        self
    }

    pub fn scenario_pause(mut self, pause: Duration) -> Self {
        self.config.timing.scenario_pause = pause;
        self
    }

    /// Set the sending client for the fan-out scenario
    pub fn fanout_origin(mut self, id: usize) -> Self {
        self.config.fanout_origin = id;
        self
    }

    pub fn echo_records(mut self, echo: bool) -> Self {
        self.config.echo_records = echo;
        self
    }

    pub fn records_out<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.records_out = Some(path.into());
        self
    }

    /// Set log level (trace, debug, info, warn, error)
    pub fn log_level<S: Into<String>>(mut self, level: S) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> HarnessConfig {
        self.config
    }
}

impl Default for HarnessConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
