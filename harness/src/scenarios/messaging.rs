//! Messaging scenarios
//!
//! The two end-to-end runs of the messaging application: full mesh and
//! fan-out from a single client.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::scenarios::orchestrator::{ScenarioOrchestrator, Topology};
use crate::testing::report::RunReport;
use crate::traits::OutputSink;

fn log_result(name: &str, report: &RunReport) {
    if report.is_clean() {
        info!("✅ {}: PASSED ({})", name, report.summary_line());
    } else {
        warn!(
            "❌ {}: {} ({} write failures, {} spawn failures, {} barrier timeouts)",
            name,
            report.summary_line(),
            report.write_failures.len(),
            report.spawn_failures.len(),
            report.barrier_timeouts()
        );
    }
}

/// Every client links with and messages every other client
pub async fn mesh(config: HarnessConfig, sinks: Vec<Arc<dyn OutputSink>>) -> RunReport {
    info!("🧪 Mesh: {} clients, everyone messages everyone", config.clients);

    let report = ScenarioOrchestrator::new("mesh", config, sinks)
        .run(Topology::FullMesh)
        .await;
    log_result("Mesh", &report);
    report
}

/// One client links with and messages every other client
pub async fn fanout(config: HarnessConfig, sinks: Vec<Arc<dyn OutputSink>>) -> RunReport {
    let origin = config.fanout_origin;
    info!("🧪 Fan-out: client {} messages {} peers", origin, config.clients.saturating_sub(1));

    let report = ScenarioOrchestrator::new("fanout", config, sinks)
        .run(Topology::FanOut { origin })
        .await;
    log_result("Fan-out", &report);
    report
}
