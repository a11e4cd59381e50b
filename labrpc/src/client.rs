use std::time::Duration;

use tokio::sync::mpsc::Sender;

use crate::network::NetworkPackage;

/// How long a client waits for a reply before treating the call as failed.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(1);

pub trait Client {
    fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self;
}
