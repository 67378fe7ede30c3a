//! Scenario Orchestrator
//!
//! Sequences the phases of a run across the fleet:
//!
//! 1. `provision` - server, barrier, clients, barrier, registrations, barrier
//! 2. `link_all` - contact registration per the topology
//! 3. `exchange` - message sends per the topology
//! 4. `teardown` - barrier, then every process is terminated
//!
//! A failed server spawn is fatal. A failed client spawn skips the client
//! phases. Everything else is recorded in the [`RunReport`] and the run goes on.

use std::sync::Arc;

use shared::{process_error, ProcessKey, Role};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::{
    BroadcastReport, ClientSelector, FanoutSink, Fleet, FleetPhase, RecordCollector, RecordMark, RecordQuery,
};
use crate::scenarios::barrier::{Barrier, BarrierOutcome};
use crate::testing::report::{RunReport, SpawnFailureRecord};
use crate::traits::OutputSink;

/// Who links with and messages whom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Every client with every other client
    FullMesh,
    /// One client with every other client
    FanOut { origin: usize },
}

impl Topology {
    pub fn senders(&self, ids: &[usize]) -> Vec<usize> {
        match self {
            Topology::FullMesh => ids.to_vec(),
            Topology::FanOut { origin } => ids.iter().copied().filter(|id| id == origin).collect(),
        }
    }

    fn selector(&self) -> ClientSelector {
        match self {
            Topology::FullMesh => ClientSelector::All,
            Topology::FanOut { origin } => ClientSelector::Only(vec![*origin]),
        }
    }
}

/// Which acknowledgment pattern a barrier point waits for
#[derive(Debug, Clone, Copy)]
enum AckPoint {
    ServerReady,
    ClientsReady,
    Signup,
    AddContact,
    SendMessage,
}

pub struct ScenarioOrchestrator {
    config: HarnessConfig,
    fleet: Fleet,
    collector: RecordCollector,
    ready: Option<watch::Receiver<bool>>,
    report: RunReport,
}

impl ScenarioOrchestrator {
    /// Records go to every sink in `sinks` plus an internal collector used by
    /// acknowledgment barriers.
    pub fn new(scenario: impl Into<String>, config: HarnessConfig, sinks: Vec<Arc<dyn OutputSink>>) -> Self {
        let collector = RecordCollector::new();
        let fanout = sinks
            .into_iter()
            .fold(FanoutSink::new(), FanoutSink::with)
            .with(Arc::new(collector.clone()));

        let fleet = Fleet::new(&config, Arc::new(fanout));
        let report = RunReport::new(scenario, config.clients);

        Self {
            config,
            fleet,
            collector,
            ready: None,
            report,
        }
    }

    /// Hold the client phases until `ready` turns true (bounded by the
    /// barrier timeout)
    pub fn with_ready_signal(mut self, ready: watch::Receiver<bool>) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn collector(&self) -> &RecordCollector {
        &self.collector
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Run all phases and return the final report.
    pub async fn run(mut self, topology: Topology) -> RunReport {
        info!("🧪 Scenario '{}' with {} clients ({:?})", self.report.scenario, self.config.clients, topology);

        match self.provision().await {
            Ok(()) => {
                self.link_all(topology).await;
                self.exchange(topology).await;
            }
            Err(e) if e.process() == Some(ProcessKey::Server) => {
                process_error!(ProcessKey::Server, "💥 {}", e);
                self.report.fatal = Some(e.to_string());
            }
            Err(e) => {
                warn!("⚠️ Skipping client phases: {}", e);
                self.report.aborted = Some(e.to_string());
            }
        }

        self.teardown().await;
        self.report
    }

    /// Spawn the server and every client, then register each client.
    pub async fn provision(&mut self) -> HarnessResult<()> {
        self.fleet.set_phase(FleetPhase::Provision);
        info!("🚀 Starting server...");

        let mark = self.collector.mark();
        let server = self.config.server.clone();
        if let Err(e) = self.fleet.spawn_server(&server) {
            self.record_spawn_failure(&e);
            return Err(e);
        }
        self.barrier("server ready", AckPoint::ServerReady, 1, mark).await;

        info!("👥 Adding {} clients...", self.config.clients);
        let mark = self.collector.mark();
        let client = self.config.client.clone();
        for id in 0..self.config.clients {
            if let Err(e) = self.fleet.spawn_client(id, &client) {
                self.record_spawn_failure(&e);
                return Err(e);
            }
        }
        self.barrier("clients ready", AckPoint::ClientsReady, self.config.clients, mark)
            .await;

        let mark = self.collector.mark();
        let commands = self.config.commands.clone();
        let signups = self
            .fleet
            .broadcast(&ClientSelector::All, |id| Some(commands.signup_for(id)))
            .await;
        let sent = self.record_broadcast(signups);
        self.barrier("signup", AckPoint::Signup, sent, mark).await;

        self.complete(FleetPhase::Provision);
        Ok(())
    }

    /// Register contacts between clients.
    pub async fn link_all(&mut self, topology: Topology) {
        self.fleet.set_phase(FleetPhase::LinkAll);
        self.wait_until_ready("link_all").await;
        info!("📇 Adding contacts...");

        let mark = self.collector.mark();
        let commands = self.config.commands.clone();
        let selector = topology.selector();
        let mut sent = 0;

        // One peer at a time so every sender sees its peers in id order
        for peer in self.fleet.client_ids() {
            let report = self
                .fleet
                .broadcast(&selector, |id| commands.add_contact_for(id, peer))
                .await;
            sent += self.record_broadcast(report);
        }

        self.barrier("contacts", AckPoint::AddContact, sent, mark).await;
        self.complete(FleetPhase::LinkAll);
    }

    /// Send messages from every sender to every other client.
    pub async fn exchange(&mut self, topology: Topology) {
        self.fleet.set_phase(FleetPhase::Exchange);
        self.wait_until_ready("exchange").await;
        info!("✉️ Sending messages...");

        let commands = self.config.commands.clone();
        let ids = self.fleet.client_ids();

        for sender in topology.senders(&ids) {
            let mark = self.collector.mark();
            let selector = ClientSelector::Only(vec![sender]);
            let mut sent = 0;

            for &peer in &ids {
                let report = self
                    .fleet
                    .broadcast(&selector, |id| commands.send_message_for(id, peer))
                    .await;
                sent += self.record_broadcast(report);
            }

            self.barrier(&format!("messages from client {}", sender), AckPoint::SendMessage, sent, mark)
                .await;
        }

        self.complete(FleetPhase::Exchange);
    }

    /// Let output settle, then terminate every client and the server.
    pub async fn teardown(&mut self) {
        self.fleet.set_phase(FleetPhase::Teardown);
        info!("🛑 Stopping...");

        if self.fleet.server().is_some() {
            let barrier = match self.config.timing.fixed_delay {
                Some(delay) => Barrier::Delay(delay),
                None => Barrier::Quiet {
                    grace: self.config.timing.settle_grace,
                    timeout: self.config.timing.barrier_timeout,
                },
            };
            self.run_barrier("before teardown", barrier).await;
        }

        let teardown = self.fleet.teardown_all().await;
        for key in &teardown.timeouts {
            warn!("⏰ {} had to be force-killed", key.display_name());
        }
        self.report.record_teardown(teardown);

        self.complete(FleetPhase::Teardown);
        self.report.finish(self.fleet.tally().get(), self.fleet.summaries());
        self.fleet.set_phase(FleetPhase::Finished);

        info!("🏁 Done!");
        info!("{}", self.report.summary_line());
    }

    fn complete(&mut self, phase: FleetPhase) {
        self.report.phases_completed.push(phase);
    }

    fn record_spawn_failure(&mut self, e: &HarnessError) {
        if let Some(process) = e.process() {
            self.report.spawn_failures.push(SpawnFailureRecord {
                process,
                error: e.to_string(),
            });
        }
    }

    fn record_broadcast(&mut self, report: BroadcastReport) -> usize {
        let sent = report.sent_count();
        self.report.write_failures.extend(report.failures);
        sent
    }

    async fn wait_until_ready(&mut self, label: &str) {
        let Some(ready) = self.ready.clone() else {
            return;
        };
        let barrier = Barrier::Signal {
            ready,
            timeout: self.config.timing.barrier_timeout,
        };
        self.run_barrier(&format!("ready for {}", label), barrier).await;
    }

    fn pattern(&self, point: AckPoint) -> Option<&str> {
        let acks = &self.config.commands.acks;
        match point {
            AckPoint::ServerReady => acks.server_ready.as_deref(),
            AckPoint::ClientsReady => acks.client_ready.as_deref(),
            AckPoint::Signup => acks.signup.as_deref(),
            AckPoint::AddContact => acks.add_contact.as_deref(),
            AckPoint::SendMessage => acks.send_message.as_deref(),
        }
    }

    /// Pick the barrier for a phase step: fixed delay when configured, an
    /// acknowledgment count when a pattern is known, output settle otherwise.
    fn barrier_for(&self, point: AckPoint, expected: usize, mark: RecordMark) -> Barrier {
        let timing = &self.config.timing;
        if let Some(delay) = timing.fixed_delay {
            return Barrier::Delay(delay);
        }

        match self.pattern(point) {
            Some(pattern) if expected > 0 => {
                let query = RecordQuery::new().containing(pattern).since(mark);
                let query = match point {
                    AckPoint::ServerReady => query.process(ProcessKey::Server),
                    AckPoint::ClientsReady => query.role(Role::Client),
                    _ => query,
                };
                Barrier::Acknowledged {
                    query,
                    count: expected,
                    timeout: timing.barrier_timeout,
                }
            }
            _ => Barrier::Quiet {
                grace: timing.settle_grace,
                timeout: timing.barrier_timeout,
            },
        }
    }

    async fn barrier(&mut self, label: &str, point: AckPoint, expected: usize, mark: RecordMark) {
        let barrier = self.barrier_for(point, expected, mark);
        self.run_barrier(label, barrier).await;
    }

    async fn run_barrier(&mut self, label: &str, barrier: Barrier) -> BarrierOutcome {
        let outcome = barrier.wait(label, self.fleet.activity(), &self.collector).await;
        for (key, status) in self.fleet.reap_exited() {
            warn!("⚠️ {} exited during '{}': {}", key.display_name(), label, status);
        }
        self.report.barriers.push(outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_senders() {
        let ids = vec![0, 1, 2, 3];
        assert_eq!(Topology::FullMesh.senders(&ids), ids);
        assert_eq!(Topology::FanOut { origin: 2 }.senders(&ids), vec![2]);
        assert!(Topology::FanOut { origin: 9 }.senders(&ids).is_empty());
    }

    #[test]
    fn test_barrier_selection() {
        let config = HarnessConfig::builder()
            .acks(crate::config::AckPatterns {
                signup: Some("Signed up".to_string()),
                ..Default::default()
            })
            .build();
        let orchestrator = ScenarioOrchestrator::new("unit", config, Vec::new());
        let mark = orchestrator.collector().mark();

        assert!(matches!(
            orchestrator.barrier_for(AckPoint::Signup, 3, mark),
            Barrier::Acknowledged { count: 3, .. }
        ));
        assert!(matches!(
            orchestrator.barrier_for(AckPoint::Signup, 0, mark),
            Barrier::Quiet { .. }
        ));
        assert!(matches!(
            orchestrator.barrier_for(AckPoint::AddContact, 3, mark),
            Barrier::Quiet { .. }
        ));
    }

    #[test]
    fn test_fixed_delay_overrides_acks() {
        let config = HarnessConfig::builder()
            .acks(crate::config::AckPatterns {
                signup: Some("Signed up".to_string()),
                ..Default::default()
            })
            .fixed_delay(Some(std::time::Duration::from_secs(1)))
            .build();
        let orchestrator = ScenarioOrchestrator::new("unit", config, Vec::new());
        let mark = orchestrator.collector().mark();

        assert!(matches!(
            orchestrator.barrier_for(AckPoint::Signup, 3, mark),
            Barrier::Delay(_)
        ));
    }
}
