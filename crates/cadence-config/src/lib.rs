//! Shared configuration for the cadence experiment driver.
//!
//! Configuration is layered with `ortho_config`: built-in defaults are
//! overridden by a configuration file, then by `CADENCE_*` environment
//! variables, and finally by command-line flags. The resolved [`Config`] is
//! constructed once at process start and handed to every component.

use std::path::{Path, PathBuf};

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod daemon;
mod defaults;
mod logging;

pub use daemon::{DaemonApi, DaemonApiError, STREAM_PATH};
pub use defaults::{
    DEFAULT_ANNOUNCE_INTERVAL, DEFAULT_BUNDLE_LIFETIME_MS, DEFAULT_CONVERGENCE_LAYER,
    DEFAULT_DAEMON_BINARY, DEFAULT_DAEMON_HOST, DEFAULT_DAEMON_PORT, DEFAULT_DELIVERY_CAPACITY,
    DEFAULT_ENDPOINT, DEFAULT_LOG_FILTER, DEFAULT_RESULTS_DIR, DEFAULT_ROUTING,
    default_log_filter, default_log_format, host_node_id,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for one scheduled node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "CADENCE")]
pub struct Config {
    /// Host serving the daemon control API.
    #[ortho_config(default = defaults::default_daemon_host())]
    pub daemon_host: String,
    /// Port serving the daemon control API.
    #[ortho_config(default = defaults::DEFAULT_DAEMON_PORT)]
    pub daemon_port: u16,
    /// Daemon executable launched on CONNECT.
    #[ortho_config(default = defaults::default_daemon_binary())]
    pub daemon_binary: String,
    /// Routing algorithm selected on the daemon.
    #[ortho_config(default = defaults::default_routing())]
    pub routing: String,
    /// Convergence layer selected on the daemon.
    #[ortho_config(default = defaults::default_convergence_layer())]
    pub convergence_layer: String,
    /// Peer announcement interval passed to the daemon.
    #[ortho_config(default = defaults::default_announce_interval())]
    pub announce_interval: String,
    /// Node identity; the host name is used when unset.
    pub node_id: Option<String>,
    /// Endpoint registered by the scheduler.
    #[ortho_config(default = defaults::default_endpoint())]
    pub endpoint: String,
    /// Lifetime attached to outgoing bundles, in milliseconds.
    #[ortho_config(default = defaults::DEFAULT_BUNDLE_LIFETIME_MS)]
    pub bundle_lifetime_ms: u64,
    /// Capacity of the channel between the receive line and the handler.
    #[ortho_config(default = defaults::DEFAULT_DELIVERY_CAPACITY)]
    pub delivery_capacity: usize,
    /// Directory receiving the per-host log file.
    #[ortho_config(default = defaults::default_results_dir())]
    pub results_dir: PathBuf,
    /// Console log filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Console log format.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_host: defaults::default_daemon_host(),
            daemon_port: DEFAULT_DAEMON_PORT,
            daemon_binary: defaults::default_daemon_binary(),
            routing: defaults::default_routing(),
            convergence_layer: defaults::default_convergence_layer(),
            announce_interval: defaults::default_announce_interval(),
            node_id: None,
            endpoint: defaults::default_endpoint(),
            bundle_lifetime_ms: DEFAULT_BUNDLE_LIFETIME_MS,
            delivery_capacity: DEFAULT_DELIVERY_CAPACITY,
            results_dir: defaults::default_results_dir(),
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
        }
    }
}

impl Config {
    /// Address of the daemon control API.
    #[must_use]
    pub fn daemon_api(&self) -> DaemonApi {
        DaemonApi::new(self.daemon_host.clone(), self.daemon_port)
    }

    /// Node identity, falling back to the host name.
    #[must_use]
    pub fn node_id(&self) -> String {
        self.node_id.clone().unwrap_or_else(host_node_id)
    }

    /// Endpoint name used by the scheduler.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Directory receiving the per-host log file.
    #[must_use]
    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Console log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Console log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
