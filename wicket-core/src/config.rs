use crate::error::WicketError;
use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WicketConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub handler: HandlerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Listener and process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Emit logs as JSON lines instead of the human-readable format.
    #[serde(default)]
    pub json_logs: bool,
}

/// Which instrumentation the request wrapper carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Skip access log lines for 200 and 304 responses.
    #[serde(default)]
    pub quiet_logging_if_successful: bool,
    /// Count responses per status family ("2xx", "4xx", ...).
    #[serde(default = "default_true")]
    pub status_code_counters: bool,
    /// Count responses per full status code ("200", "404", ...).
    #[serde(default = "default_true")]
    pub status_code_counters_full: bool,
    /// Count started/finished requests per normalized path bucket.
    #[serde(default = "default_true")]
    pub bucketed_stats: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// When false, no prometheus counters are registered or updated.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Who may reach debug endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Extra client IPs or CIDRs allowed besides loopback.
    #[serde(default)]
    pub allow_ips: Vec<String>,
    /// File holding a key accepted via the `debugkey` query parameter.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_addr() -> String { "0.0.0.0:8080".into() }
fn default_true() -> bool { true }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            json_logs: false,
        }
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            quiet_logging_if_successful: false,
            status_code_counters: true,
            status_code_counters_full: true,
            bucketed_stats: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

impl WicketConfig {
    /// Load configuration from a YAML file plus `WICKET_` env overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `WICKET_HANDLER__QUIET_LOGGING_IF_SUCCESSFUL=true`.
    pub fn load(path: &Path) -> Result<Self, WicketError> {
        let config: WicketConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("WICKET_").split("__"))
            .extract()?;
        Ok(config)
    }
}
