//! Fleet Test Runner
//!
//! Runs the messaging scenarios against real server and client processes:
//! - Loads configuration from defaults, `.env` / `HARNESS_*` and flags
//! - Spawns the fleet and drives it through every phase
//! - Prints classified output and the final error tally

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::time::timeout;

use harness::config::env::pattern;
use harness::{ConsoleSink, HarnessConfig, JsonLinesSink, LaunchSpec, OutputSink, RunReport, TestScenarios};

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "End-to-end test harness for a server and a fleet of clients")]
struct Args {
    /// Scenario to run (mesh, fanout, all)
    #[arg(long, default_value = "all")]
    scenario: String,

    /// Number of clients
    #[arg(long)]
    clients: Option<usize>,

    /// PORT handed to every process
    #[arg(long)]
    port: Option<u16>,

    /// Server command line (program and arguments)
    #[arg(long)]
    server_cmd: Option<String>,

    /// Client command line (program and arguments)
    #[arg(long)]
    client_cmd: Option<String>,

    /// Server working directory
    #[arg(long)]
    server_dir: Option<PathBuf>,

    /// Client working directory
    #[arg(long)]
    client_dir: Option<PathBuf>,

    /// Metadata tokens between timestamp and level
    #[arg(long)]
    metadata_width: Option<usize>,

    /// Line prefix dropped as a startup banner (repeatable, replaces the defaults)
    #[arg(long = "banner-marker")]
    banner_markers: Vec<String>,

    /// Prompt opener stripped from each line (repeatable, replaces the defaults)
    #[arg(long = "prompt-prefix")]
    prompt_prefixes: Vec<String>,

    /// Server output that marks it ready
    #[arg(long)]
    ack_server_ready: Option<String>,

    /// Client output that marks it ready
    #[arg(long)]
    ack_client_ready: Option<String>,

    /// Client output acknowledging a signup
    #[arg(long)]
    ack_signup: Option<String>,

    /// Client output acknowledging an added contact
    #[arg(long)]
    ack_add_contact: Option<String>,

    /// Client output acknowledging a sent message
    #[arg(long)]
    ack_send_message: Option<String>,

    /// Client that sends in the fan-out scenario
    #[arg(long)]
    fanout_origin: Option<usize>,

    /// Quiet period that settles a barrier, in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Upper bound for each barrier, in seconds
    #[arg(long)]
    barrier_timeout_secs: Option<u64>,

    /// Use fixed delays of this many milliseconds instead of barriers
    #[arg(long)]
    fixed_delay_ms: Option<u64>,

    /// Pause between scenarios, in seconds
    #[arg(long)]
    scenario_pause_secs: Option<u64>,

    /// Overall timeout in seconds
    #[arg(long, default_value = "600")]
    timeout_secs: u64,

    /// Write the run reports as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write classified records as JSON lines
    #[arg(long)]
    records_out: Option<PathBuf>,

    /// Do not print classified records
    #[arg(long)]
    quiet: bool,

    /// Exit with failure when the error tally is non-zero
    #[arg(long)]
    fail_on_errors: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Enable verbose tracing output
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, mut config: HarnessConfig) -> anyhow::Result<HarnessConfig> {
        if let Some(clients) = self.clients {
            config.clients = clients;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(cmd) = &self.server_cmd {
            let working_dir = config.server.working_dir.take();
            config.server = LaunchSpec::from_command_line(cmd)?;
            config.server.working_dir = working_dir;
        }
        if let Some(cmd) = &self.client_cmd {
            let working_dir = config.client.working_dir.take();
            config.client = LaunchSpec::from_command_line(cmd)?;
            config.client.working_dir = working_dir;
        }
        if let Some(dir) = &self.server_dir {
            config.server.working_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.client_dir {
            config.client.working_dir = Some(dir.clone());
        }
        if let Some(width) = self.metadata_width {
            config.grammar.metadata_width = width;
        }
        if !self.banner_markers.is_empty() {
            config.banner_markers = self.banner_markers.clone();
        }
        if !self.prompt_prefixes.is_empty() {
            config.prompt_prefixes = self.prompt_prefixes.clone();
        }
        let acks = &mut config.commands.acks;
        for (flag, slot) in [
            (&self.ack_server_ready, &mut acks.server_ready),
            (&self.ack_client_ready, &mut acks.client_ready),
            (&self.ack_signup, &mut acks.signup),
            (&self.ack_add_contact, &mut acks.add_contact),
            (&self.ack_send_message, &mut acks.send_message),
        ] {
            if let Some(value) = flag {
                *slot = pattern(value);
            }
        }
        if let Some(origin) = self.fanout_origin {
            config.fanout_origin = origin;
        }
        if let Some(ms) = self.settle_ms {
            config.timing.settle_grace = Duration::from_millis(ms);
        }
        if let Some(secs) = self.barrier_timeout_secs {
            config.timing.barrier_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.fixed_delay_ms {
            config.timing.fixed_delay = Some(Duration::from_millis(ms));
        }
        if let Some(secs) = self.scenario_pause_secs {
            config.timing.scenario_pause = Duration::from_secs(secs);
        }
        if let Some(path) = &self.records_out {
            config.records_out = Some(path.clone());
        }
        if self.quiet {
            config.echo_records = false;
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = args.apply(HarnessConfig::default().with_env()?)?;
    shared::logging::init_tracing(Some(&config.log_level));
    config.validate()?;

    tracing::info!("🧪 Starting fleet harness");
    tracing::info!(
        "Scenario: {}, Clients: {}, Port: {}, Timeout: {}s",
        args.scenario,
        config.clients,
        config.port,
        args.timeout_secs
    );

    let mut sinks: Vec<Arc<dyn OutputSink>> = Vec::new();
    if config.echo_records {
        sinks.push(Arc::new(ConsoleSink));
    }
    let records_file = match &config.records_out {
        Some(path) => {
            let sink = Arc::new(
                JsonLinesSink::create(path).with_context(|| format!("creating records file {}", path.display()))?,
            );
            sinks.push(sink.clone());
            Some(sink)
        }
        None => None,
    };

    let scenarios = TestScenarios::new(config, sinks);

    let reports = match timeout(Duration::from_secs(args.timeout_secs), scenarios.run_scenario(&args.scenario)).await
    {
        Ok(result) => result?,
        Err(_) => {
            // Dropping the run kills every child still alive
            tracing::error!("⏰ Scenario '{}' timed out after {}s", args.scenario, args.timeout_secs);
            bail!("Scenario '{}' timed out", args.scenario);
        }
    };

    if let Some(sink) = records_file {
        sink.flush()?;
    }

    if let Some(path) = &args.report {
        RunReport::write_all_json(&reports, path).with_context(|| format!("writing report {}", path.display()))?;
        tracing::info!("📝 Report written to {}", path.display());
    }

    let total_errors: u64 = reports.iter().map(|r| r.error_tally).sum();
    for report in &reports {
        println!("[{}] {}", report.scenario, report.summary_line());
    }
    println!("Errors: {}", total_errors);

    if let Some(report) = reports.iter().find(|r| r.is_fatal()) {
        bail!(
            "Scenario '{}' failed: {}",
            report.scenario,
            report.fatal.as_deref().unwrap_or("server did not start")
        );
    }

    if args.fail_on_errors && total_errors > 0 {
        bail!("{} errors observed", total_errors);
    }

    tracing::info!("🏁 Harness run completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_set_acks_and_filters() {
        let args = Args::try_parse_from([
            "harness",
            "--ack-signup",
            "Signed up",
            "--ack-send-message",
            "",
            "--banner-marker",
            "Booting",
            "--banner-marker",
            "Erlang/OTP",
            "--prompt-prefix",
            "app(",
        ])
        .unwrap();

        let mut base = HarnessConfig::default();
        base.commands.acks.send_message = Some("delivered".to_string());
        let config = args.apply(base).unwrap();

        assert_eq!(config.commands.acks.signup.as_deref(), Some("Signed up"));
        assert_eq!(config.commands.acks.send_message, None);
        assert_eq!(config.banner_markers, vec!["Booting", "Erlang/OTP"]);
        assert_eq!(config.prompt_prefixes, vec!["app("]);
    }

    #[test]
    fn test_no_flags_keep_filters() {
        let args = Args::try_parse_from(["harness"]).unwrap();
        let config = args.apply(HarnessConfig::default()).unwrap();
        assert_eq!(config.banner_markers, HarnessConfig::default().banner_markers);
        assert_eq!(config.commands.acks, HarnessConfig::default().commands.acks);
    }
}
