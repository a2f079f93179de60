//! The local DTN node: one daemon process plus one registered endpoint.

use std::collections::BTreeSet;
use std::time::Duration;

use cadence_client::{
    ConvergenceClient, DEFAULT_STOP_TIMEOUT, DEFAULT_UNREGISTER_TIMEOUT, DaemonLaunch,
    DaemonManager, ReceivedBundle,
};
use cadence_config::Config;
use tracing::info;

use crate::errors::AppError;
use crate::schedule::NodeControl;

const NODE_TARGET: &str = "cadence::node";

/// [`NodeControl`] backed by a real daemon and convergence client.
#[derive(Debug)]
pub struct DtnNode {
    client: ConvergenceClient,
    daemon: DaemonManager,
    launch: DaemonLaunch,
    node_id: String,
    endpoint: String,
    bundle_lifetime_ms: u64,
    unregister_timeout: Duration,
    stop_timeout: Duration,
}

impl DtnNode {
    pub(crate) fn from_config(config: &Config) -> Result<Self, AppError> {
        let node_id = config.node_id();
        let client =
            ConvergenceClient::new(config.daemon_api(), node_id.clone(), config.delivery_capacity)?;
        Ok(Self {
            client,
            daemon: DaemonManager::new(&config.daemon_binary),
            launch: DaemonLaunch::from_config(config),
            node_id,
            endpoint: config.endpoint().to_owned(),
            bundle_lifetime_ms: config.bundle_lifetime_ms,
            unregister_timeout: DEFAULT_UNREGISTER_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        })
    }
}

impl NodeControl for DtnNode {
    fn start_daemon(&mut self) -> bool {
        self.daemon.start(&self.launch).is_ok()
    }

    fn stop_daemon(&mut self) -> bool {
        self.daemon.stop(self.stop_timeout).is_ok()
    }

    fn register_endpoint(&mut self) -> bool {
        self.client
            .register(&self.endpoint, |bundle: ReceivedBundle| {
                log_received_bundle(&bundle);
            })
            .is_ok()
    }

    fn unregister_endpoint(&mut self) -> bool {
        self.client
            .unregister(&self.endpoint, self.unregister_timeout)
            .is_ok()
    }

    fn peers(&self) -> BTreeSet<String> {
        self.client.get_peers()
    }

    fn send_message(&self, peer: &str, payload: &[u8]) -> bool {
        let src = format!("dtn://{}", self.node_id);
        let dst = format!("dtn://{peer}/{}", self.endpoint);
        self.client
            .send_bundle(&src, &dst, payload, self.bundle_lifetime_ms)
            .is_ok()
    }
}

fn log_received_bundle(bundle: &ReceivedBundle) {
    info!(
        target: NODE_TARGET,
        bid = %bundle.bid,
        "Received message from {}: {}",
        bundle.src,
        bundle.text()
    );
}
