//! Helpers for building harness configurations in tests

use std::sync::Arc;
use std::time::Duration;

use harness::{AckPatterns, HarnessConfig, LaunchSpec, OutputSink, RecordCollector};

use super::fixtures::TestFixtures;

pub struct TestHelpers;

impl TestHelpers {
    /// Configuration with short timings around the given fake apps
    pub fn config(clients: usize, server: LaunchSpec, client: LaunchSpec) -> HarnessConfig {
        HarnessConfig::builder()
            .port(TestFixtures::PORT)
            .clients(clients)
            .server(server)
            .client(client)
            .settle_grace(Duration::from_millis(100))
            .barrier_timeout(Duration::from_secs(5))
            .termination_grace(Duration::from_secs(2))
            .drain_grace(Duration::from_secs(2))
            .scenario_pause(Duration::from_millis(50))
            .echo_records(false)
            .build()
    }

    pub fn well_behaved_config(clients: usize) -> HarnessConfig {
        Self::config(clients, TestFixtures::well_behaved(), TestFixtures::well_behaved())
    }

    /// Acknowledgment patterns matching the `WELL_BEHAVED` fixture
    pub fn fixture_acks() -> AckPatterns {
        AckPatterns {
            server_ready: Some("listening on port".to_string()),
            client_ready: Some("listening on port".to_string()),
            signup: Some("ack: token".to_string()),
            add_contact: Some("ack: contact_uuid".to_string()),
            send_message: Some("ack: Client.Message.send".to_string()),
        }
    }

    /// A collector plus the sink list that feeds it
    pub fn collecting_sinks() -> (RecordCollector, Vec<Arc<dyn OutputSink>>) {
        let collector = RecordCollector::new();
        let sinks: Vec<Arc<dyn OutputSink>> = vec![Arc::new(collector.clone())];
        (collector, sinks)
    }
}
