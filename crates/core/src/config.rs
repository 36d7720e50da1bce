use serde::Deserialize;
use std::path::PathBuf;

/// Root application configuration. Loaded from an optional `qgjob.toml`
/// next to the working directory and from environment variables with the
/// prefix `QGJOB__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub devices: DevicePoolConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Number of batch workers consuming the priority queues.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// Validate the test file and sleep for the target's typical run time.
    Simulated,
    /// Invoke `npx appwright test` against a real device or cloud provider.
    Appwright,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_runner_kind")]
    pub kind: RunnerKind,
    /// Multiplier applied to simulated install and run delays. `0` disables
    /// sleeping entirely.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Directory the external runner is started in.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    #[serde(default = "default_runner_config_path")]
    pub config_path: String,
    #[serde(default = "default_project")]
    pub project: String,
    /// Build artifact uploaded to BrowserStack.
    #[serde(default = "default_build_path")]
    pub build_path: String,
    /// Directory searched for `<app_version_id>.apk` on local targets.
    #[serde(default = "default_apps_dir")]
    pub apps_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicePoolConfig {
    /// Replace the pool with the built-in lab layout on startup.
    #[serde(default)]
    pub seed_default_pool: bool,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot of jobs and devices. In-memory only when unset.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

// Default functions
fn default_node_id() -> String {
    "qgjob-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8002
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_workers() -> usize {
    4
}
fn default_runner_kind() -> RunnerKind {
    RunnerKind::Simulated
}
fn default_time_scale() -> f64 {
    1.0
}
fn default_command_timeout_secs() -> u64 {
    60
}
fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_runner_config_path() -> String {
    "appwright.config.ts".to_string()
}
fn default_project() -> String {
    "android".to_string()
}
fn default_build_path() -> String {
    "builds/wikipedia.apk".to_string()
}
fn default_apps_dir() -> String {
    "apps".to_string()
}
fn default_health_check_interval_secs() -> u64 {
    300
}
fn default_flush_interval_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            kind: default_runner_kind(),
            time_scale: default_time_scale(),
            command_timeout_secs: default_command_timeout_secs(),
            workspace_dir: default_workspace_dir(),
            config_path: default_runner_config_path(),
            project: default_project(),
            build_path: default_build_path(),
            apps_dir: default_apps_dir(),
        }
    }
}

impl Default for DevicePoolConfig {
    fn default() -> Self {
        Self {
            seed_default_pool: false,
            health_check_interval_secs: default_health_check_interval_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            queue: QueueConfig::default(),
            runner: RunnerConfig::default(),
            devices: DevicePoolConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Scale a nominal delay in seconds by `time_scale`.
    pub fn scaled(&self, secs: u64) -> std::time::Duration {
        let scale = if self.time_scale.is_finite() && self.time_scale > 0.0 {
            self.time_scale
        } else {
            0.0
        };
        std::time::Duration::from_secs_f64(secs as f64 * scale)
    }
}

impl AppConfig {
    /// Load configuration from `qgjob.toml` (optional) and environment
    /// variables such as `QGJOB__API__HTTP_PORT=8002`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("qgjob").required(false))
            .add_source(
                config::Environment::with_prefix("QGJOB")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_server_layout() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.api.http_port, 8002);
        assert_eq!(cfg.queue.workers, 4);
        assert_eq!(cfg.runner.kind, RunnerKind::Simulated);
        assert_eq!(cfg.runner.project, "android");
        assert!(cfg.store.snapshot_path.is_none());
    }

    #[test]
    fn test_time_scale() {
        let mut runner = RunnerConfig::default();
        assert_eq!(runner.scaled(3).as_secs(), 3);
        runner.time_scale = 0.0;
        assert!(runner.scaled(15).is_zero());
        runner.time_scale = -2.0;
        assert!(runner.scaled(15).is_zero());
        runner.time_scale = 0.5;
        assert_eq!(runner.scaled(10).as_secs(), 5);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"runner": {"kind": "appwright"}, "queue": {"workers": 2}}"#)
                .unwrap();
        assert_eq!(cfg.runner.kind, RunnerKind::Appwright);
        assert_eq!(cfg.runner.command_timeout_secs, 60);
        assert_eq!(cfg.queue.workers, 2);
        assert_eq!(cfg.api.http_port, 8002);
    }
}
