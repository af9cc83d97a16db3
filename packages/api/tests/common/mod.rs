#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use actors::testing::ScriptedProducer;
use actors::{JobQueue, QueueStats};
use api::{BridgeStream, Settings, System, init_system_with_producer};
use futures_util::StreamExt;
use stream_core::StreamRecord;

pub const WAIT: Duration = Duration::from_secs(5);

/// Settings for a small in-process system with short clocks.
pub fn settings(worker_deadline: Duration, bridge_max: Duration) -> Settings {
    let mut settings = Settings::new(worker_deadline);
    settings.bridge_max_duration = bridge_max;
    settings.worker_slots = 2;
    settings.region = "test".to_string();
    settings
}

pub async fn start_system(settings: &Settings, producer: ScriptedProducer) -> System {
    init_system_with_producer(settings, Arc::new(producer))
        .await
        .expect("system should start")
}

/// Drain a bridge stream, failing the test instead of hanging.
pub async fn collect_records(records: BridgeStream) -> Vec<StreamRecord> {
    tokio::time::timeout(WAIT, records.collect::<Vec<_>>())
        .await
        .expect("bridge stream did not finish")
}

/// Poll queue stats until `done` holds.
pub async fn wait_for_stats(queue: &JobQueue, done: impl Fn(&QueueStats) -> bool) -> QueueStats {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let stats = queue.stats().await.expect("queue should answer");
        if done(&stats) {
            return stats;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "queue never reached the expected state: {:?}",
            stats
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
