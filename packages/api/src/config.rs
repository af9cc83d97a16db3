//! Environment configuration for the prompt relay.

use std::time::Duration;

use actors::{PipelineConfig, SimulatedProducer, WorkerSettings};
use relay::RelayConfig;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("TIMEOUT_SECONDS must be greater than zero")]
    ZeroDeadline,
    #[error("WORKER_SLOTS must be greater than zero")]
    NoWorkers,
    #[error("JOB_TTL_SECONDS must be greater than zero when set")]
    ZeroTtl,
    #[error("Bridge max duration {bridge:?} is shorter than the worker deadline {worker:?}")]
    BridgeShorterThanWorker { bridge: Duration, worker: Duration },
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub relay_host: String,
    pub relay_port: u16,
    /// Per-topic relay buffer for slow subscribers.
    pub relay_capacity: usize,
    /// Total processing deadline per job on the worker side.
    pub processing_timeout: Duration,
    /// Max duration of one client stream on the bridge side.
    pub bridge_max_duration: Duration,
    /// Expiry assigned to submitted jobs. `None` disables expiry.
    pub job_ttl: Option<Duration>,
    pub worker_slots: usize,
    pub producer_interval: Duration,
    /// Deployment label.
    pub region: String,
    pub bind_addr: String,
    pub publish_error_on_fault: bool,
}

impl Settings {
    pub const DEFAULT_BRIDGE_MAX: Duration = Duration::from_secs(60);

    /// Settings for a worker deadline, everything else at its default.
    pub fn new(processing_timeout: Duration) -> Self {
        Self {
            relay_host: "localhost".to_string(),
            relay_port: 6379,
            relay_capacity: 256,
            processing_timeout,
            bridge_max_duration: Self::DEFAULT_BRIDGE_MAX,
            job_ttl: None,
            worker_slots: 4,
            producer_interval: SimulatedProducer::DEFAULT_INTERVAL,
            region: "unknown".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            publish_error_on_fault: true,
        }
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which returns the raw value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout = get("TIMEOUT_SECONDS").ok_or(ConfigError::Missing("TIMEOUT_SECONDS"))?;
        let mut settings = Self::new(Duration::from_secs(parse("TIMEOUT_SECONDS", &timeout)?));

        if let Some(host) = get("RELAY_HOST") {
            settings.relay_host = host;
        }
        if let Some(port) = get("RELAY_PORT") {
            settings.relay_port = parse("RELAY_PORT", &port)?;
        }
        if let Some(capacity) = get("RELAY_CAPACITY") {
            settings.relay_capacity = parse("RELAY_CAPACITY", &capacity)?;
        }
        if let Some(seconds) = get("BRIDGE_MAX_SECONDS") {
            settings.bridge_max_duration =
                Duration::from_secs(parse("BRIDGE_MAX_SECONDS", &seconds)?);
        }
        if let Some(seconds) = get("JOB_TTL_SECONDS") {
            settings.job_ttl = Some(Duration::from_secs(parse("JOB_TTL_SECONDS", &seconds)?));
        }
        if let Some(slots) = get("WORKER_SLOTS") {
            settings.worker_slots = parse("WORKER_SLOTS", &slots)?;
        }
        if let Some(millis) = get("PRODUCER_INTERVAL_MS") {
            settings.producer_interval =
                Duration::from_millis(parse("PRODUCER_INTERVAL_MS", &millis)?);
        }
        if let Some(region) = get("REGION") {
            settings.region = region;
        }
        if let Some(addr) = get("BIND_ADDR") {
            settings.bind_addr = addr;
        }
        if let Some(flag) = get("PUBLISH_ERROR_ON_FAULT") {
            settings.publish_error_on_fault = parse_flag("PUBLISH_ERROR_ON_FAULT", &flag)?;
        }

        Ok(settings)
    }

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing_timeout.is_zero() {
            return Err(ConfigError::ZeroDeadline);
        }
        if self.worker_slots == 0 {
            return Err(ConfigError::NoWorkers);
        }
        // Every job would already be expired on receipt.
        if self.job_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ConfigError::ZeroTtl);
        }
        if self.relay_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "RELAY_CAPACITY",
                value: "0".to_string(),
            });
        }
        // A shorter bridge would cut off streams the worker still completes.
        if self.bridge_max_duration < self.processing_timeout {
            return Err(ConfigError::BridgeShorterThanWorker {
                bridge: self.bridge_max_duration,
                worker: self.processing_timeout,
            });
        }
        Ok(())
    }

    /// Log both timeout clocks together.
    pub fn log_summary(&self) {
        tracing::info!(
            "Region {}: worker deadline {:?}, bridge max duration {:?}, job ttl {:?}",
            self.region,
            self.processing_timeout,
            self.bridge_max_duration,
            self.job_ttl
        );
        tracing::info!(
            "Relay {} (capacity {}), {} worker slots, producer interval {:?}",
            self.relay_endpoint(),
            self.relay_capacity,
            self.worker_slots,
            self.producer_interval
        );
    }

    pub fn relay_endpoint(&self) -> String {
        format!("memory://{}:{}", self.relay_host, self.relay_port)
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::memory()
            .with_endpoint(self.relay_endpoint())
            .with_capacity(self.relay_capacity)
            .with_label(self.region.clone())
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            processing_timeout: self.processing_timeout,
            publish_error_on_fault: self.publish_error_on_fault,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            slots: self.worker_slots,
            worker: self.worker_settings(),
            label: self.region.clone(),
        }
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_deadline_is_required() {
        assert_eq!(
            settings_from(&[]),
            Err(ConfigError::Missing("TIMEOUT_SECONDS"))
        );
    }

    #[test]
    fn test_defaults() {
        let settings = settings_from(&[("TIMEOUT_SECONDS", "30")]).unwrap();
        assert_eq!(settings.processing_timeout, Duration::from_secs(30));
        assert_eq!(settings.bridge_max_duration, Duration::from_secs(60));
        assert_eq!(settings.job_ttl, None);
        assert_eq!(settings.worker_slots, 4);
        assert_eq!(settings.region, "unknown");
        assert!(settings.publish_error_on_fault);
        assert_eq!(settings.relay_endpoint(), "memory://localhost:6379");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let settings = settings_from(&[
            ("TIMEOUT_SECONDS", "5"),
            ("BRIDGE_MAX_SECONDS", "10"),
            ("JOB_TTL_SECONDS", "120"),
            ("RELAY_HOST", "relay.internal"),
            ("RELAY_PORT", "7000"),
            ("WORKER_SLOTS", "2"),
            ("PRODUCER_INTERVAL_MS", "10"),
            ("REGION", "eu-west"),
            ("PUBLISH_ERROR_ON_FAULT", "off"),
        ])
        .unwrap();

        assert_eq!(settings.job_ttl, Some(Duration::from_secs(120)));
        assert_eq!(settings.relay_endpoint(), "memory://relay.internal:7000");
        assert_eq!(settings.producer_interval, Duration::from_millis(10));
        assert!(!settings.publish_error_on_fault);

        let pipeline = settings.pipeline_config();
        assert_eq!(pipeline.slots, 2);
        assert_eq!(pipeline.label, "eu-west");
        assert_eq!(pipeline.worker.processing_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_numbers_are_reported() {
        assert_eq!(
            settings_from(&[("TIMEOUT_SECONDS", "soon")]),
            Err(ConfigError::Invalid {
                name: "TIMEOUT_SECONDS",
                value: "soon".to_string(),
            })
        );
    }

    #[test]
    fn test_bridge_must_outlast_worker() {
        let settings =
            settings_from(&[("TIMEOUT_SECONDS", "90"), ("BRIDGE_MAX_SECONDS", "60")]).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::BridgeShorterThanWorker { .. })
        ));
    }

    #[test]
    fn test_zero_deadline_is_rejected() {
        let settings = settings_from(&[("TIMEOUT_SECONDS", "0")]).unwrap();
        assert_eq!(settings.validate(), Err(ConfigError::ZeroDeadline));
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let settings =
            settings_from(&[("TIMEOUT_SECONDS", "30"), ("JOB_TTL_SECONDS", "0")]).unwrap();
        assert_eq!(settings.job_ttl, Some(Duration::ZERO));
        assert_eq!(settings.validate(), Err(ConfigError::ZeroTtl));
    }
}
