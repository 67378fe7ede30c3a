//! Test Scenarios
//!
//! Named end-to-end runs against the application under test

pub mod barrier;
pub mod messaging;
pub mod orchestrator;

use std::sync::Arc;

pub use barrier::{ready_signal, Barrier, BarrierKind, BarrierOutcome};
pub use orchestrator::{ScenarioOrchestrator, Topology};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::testing::report::RunReport;
use crate::traits::OutputSink;

pub struct TestScenarios {
    config: HarnessConfig,
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl TestScenarios {
    pub fn new(config: HarnessConfig, sinks: Vec<Arc<dyn OutputSink>>) -> Self {
        Self { config, sinks }
    }

    /// Run a specific scenario by name
    pub async fn run_scenario(&self, name: &str) -> HarnessResult<Vec<RunReport>> {
        match name {
            "mesh" => Ok(vec![messaging::mesh(self.config.clone(), self.sinks.clone()).await]),
            "fanout" => Ok(vec![messaging::fanout(self.config.clone(), self.sinks.clone()).await]),

            // Mesh, pause, fan-out
            "all" => {
                tracing::info!("🧪 Running full messaging suite");

                let mesh = messaging::mesh(self.config.clone(), self.sinks.clone()).await;
                if mesh.is_fatal() {
                    return Ok(vec![mesh]);
                }

                tokio::time::sleep(self.config.timing.scenario_pause).await;
                let fanout = messaging::fanout(self.config.clone(), self.sinks.clone()).await;

                tracing::info!("🏆 Messaging suite finished");
                Ok(vec![mesh, fanout])
            }

            _ => Err(HarnessError::UnknownScenario {
                name: name.to_string(),
                available: Self::available_scenarios().join(", "),
            }),
        }
    }

    /// Get list of available scenarios
    pub fn available_scenarios() -> Vec<&'static str> {
        vec!["mesh", "fanout", "all"]
    }
}
