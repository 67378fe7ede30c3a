//! Fleet Management
//!
//! Owns the server and client processes of one run. Enforces the spawn order
//! (server first, unique client ids) and the teardown order (all clients
//! concurrently, then the server).

use std::collections::BTreeMap;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use shared::{ProcessKey, ProcessState, Role};
use tracing::{debug, info, warn};

use crate::config::{HarnessConfig, LaunchSpec, PhaseTiming};
use crate::core::{ActivityMonitor, ErrorTally};
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::drain::OutputPipeline;
use crate::runtime::process::{ManagedProcess, Termination, TerminationOutcome};
use crate::traits::OutputSink;

/// Which clients a broadcast goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSelector {
    All,
    Only(Vec<usize>),
    Except(usize),
}

impl ClientSelector {
    pub fn includes(&self, id: usize) -> bool {
        match self {
            ClientSelector::All => true,
            ClientSelector::Only(ids) => ids.contains(&id),
            ClientSelector::Except(excluded) => *excluded != id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetPhase {
    Idle,
    Provision,
    LinkAll,
    Exchange,
    Teardown,
    Finished,
}

impl std::fmt::Display for FleetPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FleetPhase::Idle => "idle",
            FleetPhase::Provision => "provision",
            FleetPhase::LinkAll => "link_all",
            FleetPhase::Exchange => "exchange",
            FleetPhase::Teardown => "teardown",
            FleetPhase::Finished => "finished",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFailureRecord {
    pub process: ProcessKey,
    pub command: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BroadcastReport {
    /// Commands delivered, in send order
    pub sent: Vec<(usize, String)>,
    /// Clients the selector matched but the template skipped
    pub skipped: Vec<usize>,
    pub failures: Vec<WriteFailureRecord>,
}

impl BroadcastReport {
    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Processes in the order their termination completed
    pub order: Vec<ProcessKey>,
    /// Processes that had to be force-killed
    pub timeouts: Vec<ProcessKey>,
    pub failures: Vec<(ProcessKey, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub process: ProcessKey,
    pub name: String,
    pub role: Role,
    pub pid: Option<u32>,
    pub state: ProcessState,
    pub lines: u64,
    pub records: u64,
    pub errors: u64,
    pub commands: u64,
    pub exit_code: Option<i32>,
}

impl ProcessSummary {
    fn of(process: &ManagedProcess) -> Self {
        let counters = process.counters();
        Self {
            process: process.key(),
            name: process.display_name().to_string(),
            role: process.key().role(),
            pid: process.pid(),
            state: process.state(),
            lines: counters.lines(),
            records: counters.records(),
            errors: counters.errors(),
            commands: counters.commands(),
            exit_code: process.exit_status().and_then(|s| s.code()),
        }
    }
}

pub struct Fleet {
    server: Option<ManagedProcess>,
    clients: BTreeMap<usize, ManagedProcess>,
    pipeline: OutputPipeline,
    environment: BTreeMap<String, String>,
    termination_grace: Duration,
    drain_grace: Duration,
    write_timeout: Duration,
    phase: FleetPhase,
}

impl Fleet {
    pub fn new(config: &HarnessConfig, sink: Arc<dyn OutputSink>) -> Self {
        Self::with_pipeline(
            OutputPipeline::new(config.classifier(), sink),
            config.environment(),
            &config.timing,
        )
    }

    pub fn with_pipeline(pipeline: OutputPipeline, environment: BTreeMap<String, String>, timing: &PhaseTiming) -> Self {
        Self {
            server: None,
            clients: BTreeMap::new(),
            pipeline,
            environment,
            termination_grace: timing.termination_grace,
            drain_grace: timing.drain_grace,
            write_timeout: timing.write_timeout,
            phase: FleetPhase::Idle,
        }
    }

    pub fn phase(&self) -> FleetPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: FleetPhase) {
        if self.phase != phase {
            debug!("📍 Fleet phase {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    pub fn spawn_server(&mut self, spec: &LaunchSpec) -> HarnessResult<()> {
        if self.server.is_some() {
            return Err(HarnessError::ServerAlreadySpawned);
        }

        let process = ManagedProcess::spawn(ProcessKey::Server, spec, &self.environment, self.pipeline.clone())?
            .with_write_timeout(self.write_timeout);
        self.server = Some(process);
        Ok(())
    }

    pub fn spawn_client(&mut self, id: usize, spec: &LaunchSpec) -> HarnessResult<()> {
        let key = ProcessKey::Client(id);
        if self.server.is_none() {
            return Err(HarnessError::ServerNotSpawned { process: key });
        }
        if self.clients.contains_key(&id) {
            return Err(HarnessError::DuplicateClient { id });
        }

        let process = ManagedProcess::spawn(key, spec, &self.environment, self.pipeline.clone())?
            .with_write_timeout(self.write_timeout);
        self.clients.insert(id, process);
        Ok(())
    }

    pub fn get(&self, key: &ProcessKey) -> Option<&ManagedProcess> {
        match key {
            ProcessKey::Server => self.server.as_ref(),
            ProcessKey::Client(id) => self.clients.get(id),
        }
    }

    pub fn server(&self) -> Option<&ManagedProcess> {
        self.server.as_ref()
    }

    /// Spawned client ids, ascending
    pub fn client_ids(&self) -> Vec<usize> {
        self.clients.keys().copied().collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub async fn send(&self, key: &ProcessKey, command: &str) -> HarnessResult<()> {
        let process = self.get(key).ok_or(HarnessError::UnknownProcess { process: *key })?;
        process.send(command).await
    }

    /// Send a rendered command to every selected client in ascending id order.
    ///
    /// `render` returns `None` to skip a client. Write failures are collected
    /// and never stop the remaining clients.
    pub async fn broadcast<F>(&self, selector: &ClientSelector, render: F) -> BroadcastReport
    where
        F: Fn(usize) -> Option<String>,
    {
        let mut report = BroadcastReport::default();

        for (&id, process) in self.clients.iter().filter(|(id, _)| selector.includes(**id)) {
            let Some(command) = render(id) else {
                report.skipped.push(id);
                continue;
            };

            match process.send(&command).await {
                Ok(()) => report.sent.push((id, command)),
                Err(e) => {
                    warn!("❌ {}", e);
                    report.failures.push(WriteFailureRecord {
                        process: process.key(),
                        command,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Terminate every client concurrently, then the server.
    pub async fn teardown_all(&self) -> TeardownReport {
        info!("🧹 Tearing down {} clients and server", self.clients.len());
        let mut report = TeardownReport::default();

        let mut pending: FuturesUnordered<_> = self
            .clients
            .values()
            .map(|process| async move {
                (
                    process.key(),
                    process.terminate(self.termination_grace, self.drain_grace).await,
                )
            })
            .collect();

        while let Some((key, result)) = pending.next().await {
            Self::record_termination(&mut report, key, result);
        }

        if let Some(server) = &self.server {
            let result = server.terminate(self.termination_grace, self.drain_grace).await;
            Self::record_termination(&mut report, ProcessKey::Server, result);
        }

        info!(
            "✅ Teardown complete: {} terminated, {} force-killed",
            report.order.len(),
            report.timeouts.len()
        );
        report
    }

    fn record_termination(report: &mut TeardownReport, key: ProcessKey, result: HarnessResult<Termination>) {
        match result {
            Ok(termination) => {
                if termination.outcome == TerminationOutcome::ForceKilled {
                    report.timeouts.push(key);
                }
                report.order.push(key);
            }
            Err(e) => {
                warn!("❌ Failed to terminate {}: {}", key, e);
                report.failures.push((key, e.to_string()));
            }
        }
    }

    /// Reap processes that exited on their own
    pub fn reap_exited(&self) -> Vec<(ProcessKey, ExitStatus)> {
        self.processes()
            .filter(|process| process.state() != ProcessState::Terminated)
            .filter_map(|process| process.try_reap().map(|status| (process.key(), status)))
            .collect()
    }

    pub fn summaries(&self) -> Vec<ProcessSummary> {
        self.processes().map(ProcessSummary::of).collect()
    }

    /// Server first, then clients by id
    pub fn processes(&self) -> impl Iterator<Item = &ManagedProcess> {
        self.server.iter().chain(self.clients.values())
    }

    pub fn tally(&self) -> &ErrorTally {
        &self.pipeline.tally
    }

    pub fn activity(&self) -> &ActivityMonitor {
        &self.pipeline.activity
    }

    pub fn pipeline(&self) -> &OutputPipeline {
        &self.pipeline
    }
}
