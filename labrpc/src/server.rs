use crate::network::NetworkPackage;
use anyhow::Result;
use log::warn;
use tokio::sync::mpsc::Sender;

#[async_trait::async_trait]
pub trait Server: Send {
    type Service;
    fn from_service(svc: Self::Service) -> Self;
    fn client_chan(&self) -> Sender<NetworkPackage>;
    async fn recv(&mut self) -> Option<NetworkPackage>;
    async fn handle(&mut self, package: NetworkPackage) -> Result<()>;

    /// Serve requests until the request channel is closed.
    ///
    /// A failed request drops its reply channel, which the caller observes as
    /// a failed call; the server keeps going. `handle` only errs on requests
    /// or replies that do not encode.
    async fn run(&mut self) {
        while let Some(package) = self.recv().await {
            if let Err(e) = self.handle(package).await {
                warn!("malformed request: {}", e);
            }
        }
    }
}
