//! Daemon process spawning.

use std::ffi::{OsStr, OsString};
use std::process::{Child, Command, Stdio};

use super::error::LifecycleError;

/// Arguments describing one daemon launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonLaunch {
    /// Node identity passed with `-n`.
    pub node_id: String,
    /// Peer announcement interval passed with `-i`.
    pub announce_interval: String,
    /// Routing algorithm passed with `-r`.
    pub routing: String,
    /// Convergence layer passed with `-C`.
    pub convergence_layer: String,
}

impl DaemonLaunch {
    /// Builds a launch for `node_id` using the default daemon settings.
    #[must_use]
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            announce_interval: String::from(cadence_config::DEFAULT_ANNOUNCE_INTERVAL),
            routing: String::from(cadence_config::DEFAULT_ROUTING),
            convergence_layer: String::from(cadence_config::DEFAULT_CONVERGENCE_LAYER),
        }
    }

    /// Builds a launch from resolved configuration.
    #[must_use]
    pub fn from_config(config: &cadence_config::Config) -> Self {
        Self {
            node_id: config.node_id(),
            announce_interval: config.announce_interval.clone(),
            routing: config.routing.clone(),
            convergence_layer: config.convergence_layer.clone(),
        }
    }

    /// Command-line arguments passed to the daemon binary.
    ///
    /// `-b` runs the daemon in bundle-relay mode so it forwards bundles for
    /// other nodes.
    #[must_use]
    pub fn arguments(&self) -> Vec<OsString> {
        vec![
            OsString::from("-n"),
            OsString::from(&self.node_id),
            OsString::from("-i"),
            OsString::from(&self.announce_interval),
            OsString::from("-b"),
            OsString::from("-r"),
            OsString::from(&self.routing),
            OsString::from("-C"),
            OsString::from(&self.convergence_layer),
        ]
    }
}

/// Spawns `binary` with the launch arguments and captured output streams.
pub(super) fn spawn_daemon(binary: &OsStr, launch: &DaemonLaunch) -> Result<Child, LifecycleError> {
    Command::new(binary)
        .args(launch.arguments())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| LifecycleError::LaunchDaemon {
            binary: binary.to_os_string(),
            source,
        })
}
