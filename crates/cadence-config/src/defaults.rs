use std::path::PathBuf;

use nix::unistd::gethostname;

/// Host serving the daemon's HTTP and WebSocket control API.
pub const DEFAULT_DAEMON_HOST: &str = "127.0.0.1";

/// Port serving the daemon's HTTP and WebSocket control API.
pub const DEFAULT_DAEMON_PORT: u16 = 3000;

/// Executable launched by the lifecycle manager.
pub const DEFAULT_DAEMON_BINARY: &str = "dtnd";

/// Routing algorithm passed to the daemon.
pub const DEFAULT_ROUTING: &str = "epidemic";

/// Convergence layer passed to the daemon.
pub const DEFAULT_CONVERGENCE_LAYER: &str = "mtcp";

/// Peer announcement interval passed to the daemon.
pub const DEFAULT_ANNOUNCE_INTERVAL: &str = "1s";

/// Endpoint the scheduler registers and addresses messages to.
pub const DEFAULT_ENDPOINT: &str = "scheduled";

/// Lifetime attached to outgoing bundles, in milliseconds.
pub const DEFAULT_BUNDLE_LIFETIME_MS: u64 = 1000;

/// Number of decoded bundles that may wait for the delivery handler.
pub const DEFAULT_DELIVERY_CAPACITY: usize = 16;

/// Directory collecting per-host log files for an experiment run.
pub const DEFAULT_RESULTS_DIR: &str = "/root/results";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Identity used when the host name cannot be determined.
pub const FALLBACK_NODE_ID: &str = "localhost";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required.
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default console logging format.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}

/// Owned daemon host.
pub fn default_daemon_host() -> String {
    DEFAULT_DAEMON_HOST.to_owned()
}

/// Owned daemon binary name.
pub fn default_daemon_binary() -> String {
    DEFAULT_DAEMON_BINARY.to_owned()
}

/// Owned routing algorithm name.
pub fn default_routing() -> String {
    DEFAULT_ROUTING.to_owned()
}

/// Owned convergence layer name.
pub fn default_convergence_layer() -> String {
    DEFAULT_CONVERGENCE_LAYER.to_owned()
}

/// Owned announce interval.
pub fn default_announce_interval() -> String {
    DEFAULT_ANNOUNCE_INTERVAL.to_owned()
}

/// Owned endpoint name.
pub fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_owned()
}

/// Results directory as a path.
pub fn default_results_dir() -> PathBuf {
    PathBuf::from(DEFAULT_RESULTS_DIR)
}

/// Resolves the host name used as node identity and log file stem.
///
/// Experiment hosts are named after their emulated node, so the host name
/// doubles as the DTN node identity.
pub fn host_node_id() -> String {
    gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_NODE_ID.to_owned())
}
