use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use futures::Future;
use log::{trace, warn};
use rand::Rng;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{client::Client, server::Server};

#[derive(Debug, Clone)]
pub struct NetworkPackage {
    pub to: String,
    pub reply: Sender<String>,
    pub data: String,
}

#[derive(Debug)]
struct Switches {
    reliable: bool,
    disconnected: HashSet<String>,
    counts: HashMap<String, usize>,
}

impl Default for Switches {
    fn default() -> Self {
        Self {
            reliable: true,
            disconnected: HashSet::new(),
            counts: HashMap::new(),
        }
    }
}

/// Fault injection and statistics for a running [`Network`].
#[derive(Debug, Clone, Default)]
pub struct NetworkHandle {
    switches: Arc<Mutex<Switches>>,
}

impl NetworkHandle {
    /// In unreliable mode 10% of requests are dropped, and another 10% are
    /// served but lose their reply.
    pub fn set_reliable(&self, reliable: bool) {
        self.switches.lock().unwrap().reliable = reliable;
    }

    pub fn is_reliable(&self) -> bool {
        self.switches.lock().unwrap().reliable
    }

    /// Drop every request addressed to `id` until [`connect`](Self::connect).
    pub fn disconnect(&self, id: &str) {
        self.switches
            .lock()
            .unwrap()
            .disconnected
            .insert(id.to_owned());
    }

    pub fn connect(&self, id: &str) {
        self.switches.lock().unwrap().disconnected.remove(id);
    }

    /// Number of requests delivered to `id`.
    pub fn rpc_count(&self, id: &str) -> usize {
        self.switches
            .lock()
            .unwrap()
            .counts
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_rpc_count(&self) -> usize {
        self.switches.lock().unwrap().counts.values().sum()
    }
}

enum Delivery {
    Deliver,
    DropRequest,
    DropReply,
}

pub struct Network {
    tx: Sender<NetworkPackage>,
    rx: Receiver<NetworkPackage>,
    nodes: Arc<Mutex<HashMap<String, Sender<NetworkPackage>>>>,
    handle: NetworkHandle,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            tx,
            rx,
            nodes: Arc::new(Mutex::new(HashMap::default())),
            handle: NetworkHandle::default(),
        }
    }

    pub fn handle(&self) -> NetworkHandle {
        self.handle.clone()
    }

    /// A client for the server registered (now or later) under `id`.
    pub fn client<C: Client>(&self, id: impl Into<String>) -> C {
        C::from_server(id.into(), self.tx.clone())
    }

    /// Register `svc` under `id` and return the routine serving it.
    ///
    /// Requests routed to `id` queue up until the routine is spawned.
    pub fn register_service<S>(
        &self,
        id: impl Into<String>,
        svc: S::Service,
    ) -> impl Future<Output = ()>
    where
        S: Server + Send + 'static,
    {
        let id = id.into();
        let mut server = S::from_service(svc);
        self.nodes
            .lock()
            .unwrap()
            .insert(id.clone(), server.client_chan());
        async move {
            server.run().await;
            trace!("server {} stopped", id);
        }
    }

    fn delivery(&self, to: &str) -> Delivery {
        let mut switches = self.handle.switches.lock().unwrap();
        if switches.disconnected.contains(to) {
            return Delivery::DropRequest;
        }
        let delivery = if switches.reliable {
            Delivery::Deliver
        } else {
            let x: u32 = rand::thread_rng().gen_range(0..1000);
            if x < 100 {
                Delivery::DropRequest
            } else if x < 200 {
                Delivery::DropReply
            } else {
                Delivery::Deliver
            }
        };
        if !matches!(delivery, Delivery::DropRequest) {
            *switches.counts.entry(to.to_owned()).or_default() += 1;
        }
        delivery
    }

    pub async fn run(&mut self) {
        while let Some(mut p) = self.rx.recv().await {
            match self.delivery(&p.to) {
                Delivery::Deliver => {}
                Delivery::DropRequest => {
                    trace!("request to {} dropped", p.to);
                    continue;
                }
                Delivery::DropReply => {
                    trace!("reply from {} will be dropped", p.to);
                    let (reply, _) = mpsc::channel(1);
                    p.reply = reply;
                }
            }

            let node = {
                let x = self.nodes.lock().unwrap();
                x.get(&p.to).cloned()
            };

            if let Some(x) = node {
                let to = p.to.clone();
                if x.send(p).await.is_err() {
                    warn!("send to node {} failed, dropped", to);
                }
            } else {
                warn!("node {} not found", p.to);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switches() {
        let net = Network::new();
        let handle = net.handle();
        assert!(handle.is_reliable());

        handle.set_reliable(false);
        assert!(!handle.is_reliable());

        handle.disconnect("a");
        assert!(matches!(net.delivery("a"), Delivery::DropRequest));
        assert_eq!(handle.rpc_count("a"), 0);

        handle.connect("a");
        handle.set_reliable(true);
        assert!(matches!(net.delivery("a"), Delivery::Deliver));
        assert!(matches!(net.delivery("b"), Delivery::Deliver));
        assert_eq!(handle.rpc_count("a"), 1);
        assert_eq!(handle.total_rpc_count(), 2);
    }

    #[test]
    fn test_unreliable_drops_some() {
        let net = Network::new();
        net.handle().set_reliable(false);
        let dropped = (0..1000)
            .filter(|_| !matches!(net.delivery("a"), Delivery::Deliver))
            .count();
        assert!(dropped > 50 && dropped < 500, "dropped {}", dropped);
    }
}
