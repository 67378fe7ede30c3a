//! End-to-end scenario runs against fake applications

#![cfg(unix)]

use std::time::Duration;

use harness::runtime::FleetPhase;
use harness::scenarios::ready_signal;
use harness::{RecordQuery, RunAssertions, ScenarioOrchestrator, TestScenarios, Topology};
use shared::{ProcessKey, ProcessState};

mod common;
use common::{TestFixtures, TestHelpers};

/// Full mesh with a well-behaved application ends with no errors
#[tokio::test]
async fn test_mesh_with_well_behaved_app() {
    let (collector, sinks) = TestHelpers::collecting_sinks();
    let config = TestHelpers::well_behaved_config(3);

    let report = ScenarioOrchestrator::new("mesh", config, sinks)
        .run(Topology::FullMesh)
        .await;

    assert_eq!(report.error_tally, 0);
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(
        report.phases_completed,
        vec![FleetPhase::Provision, FleetPhase::LinkAll, FleetPhase::Exchange, FleetPhase::Teardown]
    );
    assert_eq!(report.teardown_order.last(), Some(&ProcessKey::Server));
    assert!(report.termination_timeouts.is_empty());

    // signup + 2 contacts + 2 messages per client
    let assertions = RunAssertions::new(collector);
    assert!(assertions.assert_command_counts(&report, &[], 5).success);
    assert!(assertions.assert_all_terminated(&report).success);
    assert!(assertions.assert_no_errors().success);

    let everyone = [ProcessKey::Server, ProcessKey::Client(0), ProcessKey::Client(1), ProcessKey::Client(2)];
    let active = assertions
        .assert_all_processes_active(&everyone, Duration::from_millis(100))
        .await;
    assert!(active.success, "{:?}", active.details);
    let missing = assertions
        .assert_all_processes_active(&[ProcessKey::Client(3)], Duration::from_millis(100))
        .await;
    assert!(!missing.success);

    assert_eq!(
        assertions
            .get_collector()
            .count(&RecordQuery::new().containing("ack: Client.Message.send")),
        6
    );
}

/// Fan-out: only the origin links and sends, once per peer
#[tokio::test]
async fn test_fanout_only_origin_sends() {
    let (collector, sinks) = TestHelpers::collecting_sinks();
    let config = TestHelpers::well_behaved_config(3);

    let report = ScenarioOrchestrator::new("fanout", config, sinks)
        .run(Topology::FanOut { origin: 0 })
        .await;

    assert!(report.is_clean(), "{:?}", report);

    let assertions = RunAssertions::new(collector.clone());
    let counts = assertions.assert_command_counts(&report, &[(ProcessKey::Client(0), 1 + 2 + 2)], 1);
    assert!(counts.success, "{:?}", counts.details);

    let from = |id| RecordQuery::new().process(ProcessKey::Client(id));
    assert_eq!(collector.count(&from(0).containing("ack: contact_uuid")), 2);
    assert_eq!(collector.count(&from(0).containing("ack: Client.Message.send")), 2);
    for id in [1, 2] {
        assert_eq!(collector.count(&from(id).containing("ack: contact_uuid")), 0);
        assert_eq!(collector.count(&from(id).containing("ack: Client.Message.send")), 0);
    }
}

/// Acknowledgment barriers release as soon as every ack is seen
#[tokio::test]
async fn test_ack_barriers_are_satisfied() {
    let (_, sinks) = TestHelpers::collecting_sinks();
    let mut config = TestHelpers::well_behaved_config(3);
    config.commands.acks = TestHelpers::fixture_acks();
    config.timing.settle_grace = Duration::from_secs(30);

    let report = ScenarioOrchestrator::new("mesh", config, sinks)
        .run(Topology::FullMesh)
        .await;

    // server ready, clients ready, signup, contacts, three senders, teardown
    assert_eq!(report.barriers.len(), 8);
    assert_eq!(report.barriers.iter().filter(|b| b.timed_out()).count(), 1);
    assert_eq!(report.barriers.last().map(|b| b.label.as_str()), Some("before teardown"));
}

/// Every failure line is counted exactly once
#[tokio::test]
async fn test_failures_are_tallied() {
    let (collector, sinks) = TestHelpers::collecting_sinks();
    let config = TestHelpers::config(
        3,
        TestFixtures::well_behaved(),
        TestFixtures::script(TestFixtures::FAILING_SENDS),
    );

    let report = ScenarioOrchestrator::new("mesh", config, sinks)
        .run(Topology::FullMesh)
        .await;

    assert_eq!(report.error_tally, 6);
    assert_eq!(report.summary_line(), "Errors: 6");
    let per_client: Vec<u64> = report
        .processes
        .iter()
        .filter(|p| p.process != ProcessKey::Server)
        .map(|p| p.errors)
        .collect();
    assert_eq!(per_client, vec![2, 2, 2]);

    let assertions = RunAssertions::new(collector);
    assert!(assertions.assert_tally_consistent(&report).success);
    assert!(!assertions.assert_no_errors().success);
}

#[tokio::test]
async fn test_server_spawn_failure_is_fatal() {
    let (_, sinks) = TestHelpers::collecting_sinks();
    let config = TestHelpers::config(2, TestFixtures::missing_binary(), TestFixtures::well_behaved());

    let report = ScenarioOrchestrator::new("mesh", config, sinks)
        .run(Topology::FullMesh)
        .await;

    assert!(report.is_fatal());
    assert_eq!(report.spawn_failures.len(), 1);
    assert_eq!(report.spawn_failures[0].process, ProcessKey::Server);
    assert!(report.processes.is_empty());
    assert_eq!(report.phases_completed, vec![FleetPhase::Teardown]);
}

#[tokio::test]
async fn test_client_spawn_failure_skips_client_phases() {
    let (_, sinks) = TestHelpers::collecting_sinks();
    let dir = tempfile::tempdir().unwrap();
    let config = TestHelpers::config(
        2,
        TestFixtures::well_behaved(),
        TestFixtures::well_behaved().working_dir(dir.path().join("missing")),
    );

    let report = ScenarioOrchestrator::new("mesh", config, sinks)
        .run(Topology::FullMesh)
        .await;

    assert!(!report.is_fatal());
    assert!(report.aborted.is_some());
    assert_eq!(report.spawn_failures[0].process, ProcessKey::Client(0));
    assert_eq!(report.phases_completed, vec![FleetPhase::Teardown]);
    assert_eq!(report.teardown_order, vec![ProcessKey::Server]);
    assert_eq!(report.processes[0].state, ProcessState::Terminated);
}

/// A client that exits early produces write failures but the run completes
#[tokio::test]
async fn test_exited_client_does_not_block_fleet() {
    let (_, sinks) = TestHelpers::collecting_sinks();
    let config = TestHelpers::config(
        3,
        TestFixtures::well_behaved(),
        TestFixtures::script(TestFixtures::ONE_SHOT),
    );

    let report = ScenarioOrchestrator::new("fanout", config, sinks)
        .run(Topology::FanOut { origin: 0 })
        .await;

    assert!(!report.write_failures.is_empty());
    assert!(report.write_failures.iter().all(|f| f.process == ProcessKey::Client(0)));
    assert!(report.phases_completed.contains(&FleetPhase::Exchange));
    assert_eq!(report.error_tally, 0);
}

/// Client phases wait for the external ready signal
#[tokio::test]
async fn test_ready_signal_gates_client_phases() {
    let (_, sinks) = TestHelpers::collecting_sinks();
    let (ready_tx, ready_rx) = ready_signal();
    let config = TestHelpers::well_behaved_config(2);

    let release = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        ready_tx.send_replace(true);
    };
    let run = ScenarioOrchestrator::new("mesh", config, sinks)
        .with_ready_signal(ready_rx)
        .run(Topology::FullMesh);

    let (report, ()) = tokio::join!(run, release);
    let gates: Vec<_> = report
        .barriers
        .iter()
        .filter(|b| b.label.starts_with("ready for"))
        .collect();
    assert_eq!(gates.len(), 2);
    assert!(gates.iter().all(|b| b.satisfied));
}

#[tokio::test]
async fn test_named_suite_runs_both_scenarios() {
    let (_, sinks) = TestHelpers::collecting_sinks();
    let scenarios = TestScenarios::new(TestHelpers::well_behaved_config(2), sinks);

    let reports = scenarios.run_scenario("all").await.unwrap();
    let names: Vec<&str> = reports.iter().map(|r| r.scenario.as_str()).collect();
    assert_eq!(names, vec!["mesh", "fanout"]);
    assert!(reports.iter().all(|r| r.error_tally == 0));
}
