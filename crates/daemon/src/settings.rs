// Daemon Settings
//
// Layered configuration: compiled defaults, then an optional `gantry`
// file (toml/yaml/json), then `GANTRY_`-prefixed environment variables.
// Only the knobs the daemon's runtime consumes live here; service-level
// configs such as backups keep their defaults in the core crate.

use std::collections::BTreeMap;
use std::time::Duration;

use gantry_core::application::{DeployConfig, NotifyConfig};
use gantry_core::port::ResourceManagerConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    /// "pretty" for development, "json" for production log shipping.
    pub log_format: String,
    pub num_workers: usize,
    pub worker_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub namespace_parallelism: usize,
    pub event_batch_interval_secs: u64,
    pub max_sla_events_per_message: usize,
    #[serde(default)]
    pub resource_managers: Vec<ResourceManagerSettings>,
}

/// One sibling control plane reachable over HTTP.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceManagerSettings {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Settings {
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .set_default("database_url", "sqlite://gantry.db")?
            .set_default("log_format", "pretty")?
            .set_default("num_workers", 2)?
            .set_default("worker_timeout_secs", 600)?
            .set_default("run_timeout_secs", 180)?
            .set_default("poll_interval_ms", 500)?
            .set_default("namespace_parallelism", 4)?
            .set_default("event_batch_interval_secs", 5)?
            .set_default("max_sla_events_per_message", 6)?
            .set_default("resource_managers", Vec::<String>::new())?
            .add_source(config::File::with_name("gantry").required(false))
            .add_source(config::Environment::with_prefix("GANTRY"))
            .build()?;
        settings.try_deserialize()
    }

    pub fn deploy_config(&self) -> DeployConfig {
        DeployConfig {
            num_workers: self.num_workers.max(1),
            worker_timeout: Duration::from_secs(self.worker_timeout_secs),
            run_timeout: Duration::from_secs(self.run_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            namespace_parallelism: self.namespace_parallelism.max(1),
        }
    }

    pub fn notify_config(&self) -> NotifyConfig {
        NotifyConfig {
            event_batch_interval: Duration::from_secs(self.event_batch_interval_secs),
            max_sla_events_per_message: self.max_sla_events_per_message,
            ..NotifyConfig::default()
        }
    }

    pub fn resource_manager_configs(&self) -> Vec<ResourceManagerConfig> {
        self.resource_managers
            .iter()
            .map(|manager| ResourceManagerConfig {
                name: manager.name.clone(),
                host: manager.host.clone(),
                headers: manager.headers.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_runtime_knobs() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings.num_workers, 2);
        assert_eq!(settings.log_format, "pretty");
        assert!(settings.resource_managers.is_empty());
        assert_eq!(settings.deploy_config().worker_timeout, Duration::from_secs(600));
        assert_eq!(settings.notify_config().event_batch_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_worker_counts_are_floored_at_one() {
        let mut settings = Settings::load().unwrap();
        settings.num_workers = 0;
        settings.namespace_parallelism = 0;
        let deploy = settings.deploy_config();
        assert_eq!(deploy.num_workers, 1);
        assert_eq!(deploy.namespace_parallelism, 1);
    }
}
