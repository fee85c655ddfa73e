//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Instance identifier, used as the `site` label on metrics
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "parcel-tracker".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_http_port() }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Capacity of the event bus channel; publishes beyond it are dropped
    #[serde(default = "default_event_buffer")]
    pub buffer_size: usize,
    /// Handlers allowed to run concurrently
    #[serde(default = "default_event_workers")]
    pub workers: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { buffer_size: default_event_buffer(), workers: default_event_workers() }
    }
}

fn default_event_buffer() -> usize {
    1000
}

fn default_event_workers() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Exclusive upper bound
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Chance that OUT_FOR_DELIVERY ends in DELIVERED rather than RETURNED
    #[serde(default = "default_delivery_probability")]
    pub delivery_probability: f64,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            delivery_probability: default_delivery_probability(),
            seed: None,
        }
    }
}

fn default_min_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    15_000
}

fn default_delivery_probability() -> f64 {
    0.9
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_stream_max_updates")]
    pub max_updates: u32,
    #[serde(default = "default_stream_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_stream_interval_ms(),
            max_updates: default_stream_max_updates(),
            timeout_secs: default_stream_timeout_secs(),
        }
    }
}

fn default_stream_interval_ms() -> u64 {
    3_000
}

fn default_stream_max_updates() -> u32 {
    20
}

fn default_stream_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

/// Seed entry for the employee directory
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmployeeConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default = "default_employee_active")]
    pub active: bool,
}

fn default_employee_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_employees")]
    pub employees: Vec<EmployeeConfig>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { employees: default_employees() }
    }
}

fn default_employees() -> Vec<EmployeeConfig> {
    vec![EmployeeConfig {
        id: "EMP001".to_string(),
        name: "Default operator".to_string(),
        role: "OPERATOR".to_string(),
        active: true,
    }]
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    http_bind_address: String,
    http_port: u16,
    event_buffer_size: usize,
    event_workers: usize,
    sim_min_delay_ms: u64,
    sim_max_delay_ms: u64,
    delivery_probability: f64,
    rng_seed: Option<u64>,
    stream_interval_ms: u64,
    stream_max_updates: u32,
    stream_timeout_secs: u64,
    metrics_interval_secs: u64,
    employees: Vec<EmployeeConfig>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load from an explicit path, falling back to defaults on any error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let sim = toml_config.simulation;
        // An empty or inverted range collapses to a fixed delay
        let sim_max_delay_ms = sim.max_delay_ms.max(sim.min_delay_ms);

        Self {
            site_id: toml_config.site.id,
            http_bind_address: toml_config.http.bind_address,
            http_port: toml_config.http.port,
            event_buffer_size: toml_config.events.buffer_size.max(1),
            event_workers: toml_config.events.workers.max(1),
            sim_min_delay_ms: sim.min_delay_ms,
            sim_max_delay_ms,
            delivery_probability: sim.delivery_probability.clamp(0.0, 1.0),
            rng_seed: sim.seed,
            stream_interval_ms: toml_config.stream.interval_ms,
            stream_max_updates: toml_config.stream.max_updates,
            stream_timeout_secs: toml_config.stream.timeout_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            employees: toml_config.directory.employees,
            config_file,
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn http_bind_address(&self) -> &str {
        &self.http_bind_address
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn event_buffer_size(&self) -> usize {
        self.event_buffer_size
    }

    pub fn event_workers(&self) -> usize {
        self.event_workers
    }

    pub fn sim_min_delay(&self) -> Duration {
        Duration::from_millis(self.sim_min_delay_ms)
    }

    pub fn sim_max_delay(&self) -> Duration {
        Duration::from_millis(self.sim_max_delay_ms)
    }

    pub fn delivery_probability(&self) -> f64 {
        self.delivery_probability
    }

    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }

    pub fn stream_max_updates(&self) -> u32 {
        self.stream_max_updates
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn employees(&self) -> &[EmployeeConfig] {
        &self.employees
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to shrink simulator delays
    pub fn with_sim_delays_ms(mut self, min: u64, max: u64) -> Self {
        self.sim_min_delay_ms = min;
        self.sim_max_delay_ms = max.max(min);
        self
    }

    /// Builder method for tests to shrink stream timing
    pub fn with_stream_timing(mut self, interval_ms: u64, max_updates: u32, timeout_secs: u64) -> Self {
        self.stream_interval_ms = interval_ms;
        self.stream_max_updates = max_updates;
        self.stream_timeout_secs = timeout_secs;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "parcel-tracker");
        assert_eq!(config.http_port(), 8080);
        assert_eq!(config.event_buffer_size(), 1000);
        assert_eq!(config.event_workers(), 4);
        assert_eq!(config.sim_min_delay(), Duration::from_secs(5));
        assert_eq!(config.sim_max_delay(), Duration::from_secs(15));
        assert_eq!(config.delivery_probability(), 0.9);
        assert_eq!(config.stream_interval(), Duration::from_secs(3));
        assert_eq!(config.stream_max_updates(), 20);
        assert_eq!(config.stream_timeout(), Duration::from_secs(300));
        assert_eq!(config.employees().len(), 1);
        assert_eq!(config.employees()[0].id, "EMP001");
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["parcel-tracker".to_string()];
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "parcel-tracker".to_string(),
            "--config".to_string(),
            "config/prod.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/prod.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["parcel-tracker".to_string(), "--config=config/staging.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/staging.toml");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[simulation]
min_delay_ms = 20
max_delay_ms = 10
delivery_probability = 1.5
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.sim_min_delay(), Duration::from_millis(20));
        assert_eq!(config.sim_max_delay(), Duration::from_millis(20));
        assert_eq!(config.delivery_probability(), 1.0);
        assert_eq!(config.http_port(), 8080);
        assert_eq!(config.stream_max_updates(), 20);
    }
}
