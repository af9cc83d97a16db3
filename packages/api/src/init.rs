//! System wiring.

use std::sync::Arc;

use actors::{
    JobQueue, Pipeline, Producer, QueueConfig, SimulatedProducer, start_pipeline,
};
use axum::Router;
use relay::MemoryRelay;

use crate::config::Settings;
use crate::gateway::Gateway;
use crate::routes::{AppState, router};

/// A running relay, queue, worker pipeline and gateway.
pub struct System {
    relay: MemoryRelay,
    pipeline: Pipeline,
    gateway: Gateway,
}

impl System {
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn relay(&self) -> &MemoryRelay {
        &self.relay
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn router(&self) -> Router {
        router(AppState {
            gateway: self.gateway.clone(),
        })
    }

    /// Stop the workers, then the queue, then the relay.
    pub async fn shutdown(self) {
        self.pipeline.shutdown().await;
        self.relay.close();
        tracing::info!("Prompt relay stopped");
    }
}

/// Start the system with the simulated producer.
pub async fn init_system(settings: &Settings) -> Result<System, Box<dyn std::error::Error>> {
    let producer = SimulatedProducer::new(settings.producer_interval);
    init_system_with_producer(settings, Arc::new(producer)).await
}

/// Start the system around the given producer.
pub async fn init_system_with_producer(
    settings: &Settings,
    producer: Arc<dyn Producer>,
) -> Result<System, Box<dyn std::error::Error>> {
    tracing::info!("Initializing prompt relay...");
    settings.validate()?;

    let relay = MemoryRelay::connect(settings.relay_config())?;
    let (queue, _handle) = JobQueue::start(QueueConfig::default()).await?;

    let pipeline = start_pipeline(
        settings.pipeline_config(),
        queue.clone(),
        Arc::new(relay.clone()),
        producer,
    )
    .await?;

    let gateway = Gateway::new(
        queue,
        Arc::new(relay.clone()),
        settings.bridge_max_duration,
    )
    .with_job_ttl(settings.job_ttl);

    tracing::info!("Prompt relay initialized");
    Ok(System {
        relay,
        pipeline,
        gateway,
    })
}
