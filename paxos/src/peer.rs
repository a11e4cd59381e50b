use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use futures::Future;
use labrpc::anyhow::{anyhow, Result};
use log::{info, trace};

use crate::proposer::Proposer;
use crate::state::PeerState;
use crate::{AcceptReply, Config, DecidedReply, PaxosClient, PaxosService, PrepareReply, Value};

/// State shared by a peer, its RPC handlers and its proposers.
pub(crate) struct Shared {
    pub(crate) me: usize,
    pub(crate) peers: Vec<PaxosClient>,
    pub(crate) config: Config,
    state: Mutex<PeerState>,
    dead: AtomicBool,
}

impl Shared {
    pub(crate) fn state(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().expect("paxos state lock poisoned")
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub(crate) fn done_seq(&self) -> i64 {
        self.state().done_seq
    }

    /// Call a peer, retrying a bounded number of times.
    ///
    /// `None` means the peer is skipped for this round.
    pub(crate) async fn call<T, F, Fut>(&self, peer: &PaxosClient, mut f: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=self.config.call_retries {
            if self.is_dead() {
                return None;
            }
            match f().await {
                Ok(reply) => return Some(reply),
                Err(e) => {
                    trace!(
                        "peer {} call {} failed (attempt {}): {}",
                        self.me,
                        peer.server_id(),
                        attempt,
                        e
                    );
                    if attempt < self.config.call_retries {
                        tokio::time::sleep(self.config.retry_interval).await;
                    }
                }
            }
        }
        None
    }
}

/// A paxos peer.
///
/// Cloning yields another handle to the same peer; the handle is also the
/// [`PaxosService`] to register on the network.
#[derive(Clone)]
pub struct Paxos {
    shared: Arc<Shared>,
}

impl Paxos {
    /// Create the peer `peers[me]` with the default [`Config`].
    pub fn new(me: usize, peers: Vec<PaxosClient>) -> Self {
        Self::with_config(me, peers, Config::default())
    }

    /// Create the peer `peers[me]`.
    ///
    /// # Panics
    ///
    /// If `me` is not an index into `peers`, if there are more peers than
    /// `config.stride`, or if `config` would leave proposers unable to make
    /// progress: no call attempts, a backoff multiplier or rival penalty that
    /// is not a finite number of at least 1, or an initial backoff above the
    /// maximum.
    pub fn with_config(me: usize, peers: Vec<PaxosClient>, config: Config) -> Self {
        assert!(me < peers.len(), "peer {} not among {} peers", me, peers.len());
        assert!(
            (peers.len() as i64) <= config.stride,
            "{} peers exceed ballot stride {}",
            peers.len(),
            config.stride
        );
        assert!(config.call_retries >= 1, "call_retries must be at least 1");
        let multiplier = config.backoff.multiplier;
        assert!(
            multiplier.is_finite() && multiplier >= 1.0,
            "backoff multiplier {} must be finite and at least 1",
            multiplier
        );
        assert!(
            config.rival_penalty.is_finite() && config.rival_penalty >= 1.0,
            "rival penalty {} must be finite and at least 1",
            config.rival_penalty
        );
        assert!(
            config.backoff.initial <= config.backoff.max,
            "initial backoff {:?} exceeds max {:?}",
            config.backoff.initial,
            config.backoff.max
        );
        let npeers = peers.len();
        Self {
            shared: Arc::new(Shared {
                me,
                peers,
                config,
                state: Mutex::new(PeerState::new(me, npeers)),
                dead: AtomicBool::new(false),
            }),
        }
    }

    /// Index of this peer.
    pub fn me(&self) -> usize {
        self.shared.me
    }

    /// Start agreement on instance `seq` with proposed `value`.
    ///
    /// Returns right away; use [`status`](Self::status) to learn the outcome.
    /// Does nothing if the instance is already decided, forgotten or being
    /// driven by this peer. Must be called within a tokio runtime.
    pub fn start(&self, seq: i64, value: impl Into<Value>) {
        if self.is_dead() {
            return;
        }
        if !self.shared.state().admit(seq) {
            trace!("peer {} ignores start of seq {}", self.shared.me, seq);
            return;
        }
        let proposer = Proposer::new(self.shared.clone(), seq, value.into());
        tokio::spawn(proposer.run());
    }

    /// Whether this peer knows `seq` is decided, and the value if retained.
    ///
    /// `(true, None)` means the instance is below [`min`](Self::min) and its
    /// value has been forgotten. Never contacts other peers.
    pub fn status(&self, seq: i64) -> (bool, Option<Value>) {
        self.shared.state().status(seq)
    }

    /// The application is done with all instances `<= seq`.
    pub fn done(&self, seq: i64) {
        self.shared.state().done(seq);
    }

    /// Highest instance seen by this peer, or -1.
    pub fn max(&self) -> i64 {
        self.shared.state().max_seq
    }

    /// One more than the smallest done mark over all peers. Instances below
    /// have been forgotten.
    pub fn min(&self) -> i64 {
        self.shared.state().min_seq
    }

    /// Number of instances held in memory.
    pub fn retained(&self) -> usize {
        self.shared.state().instances.len()
    }

    /// Shut the peer down. Proposers stop at their next round and every RPC
    /// to this peer fails from now on.
    pub fn kill(&self) {
        if !self.shared.dead.swap(true, Ordering::SeqCst) {
            info!("peer {} killed", self.shared.me);
        }
    }

    /// Whether [`kill`](Self::kill) was called.
    pub fn is_dead(&self) -> bool {
        self.shared.is_dead()
    }

    fn check_alive(&self) -> Result<()> {
        if self.is_dead() {
            trace!("request to dead peer {}", self.shared.me);
            Err(anyhow!("peer {} is dead", self.shared.me))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
impl Paxos {
    pub(crate) fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }
}

#[labrpc::async_trait]
impl PaxosService for Paxos {
    async fn prepare(&mut self, seq: i64, n: i64, from: usize, done: i64) -> Result<PrepareReply> {
        self.check_alive()?;
        Ok(self.shared.state().handle_prepare(seq, n, from, done))
    }

    async fn accept(
        &mut self,
        seq: i64,
        n: i64,
        value: Value,
        from: usize,
        done: i64,
    ) -> Result<AcceptReply> {
        self.check_alive()?;
        Ok(self.shared.state().handle_accept(seq, n, value, from, done))
    }

    async fn decided(
        &mut self,
        seq: i64,
        n: i64,
        value: Value,
        from: usize,
        done: i64,
    ) -> Result<DecidedReply> {
        self.check_alive()?;
        Ok(self.shared.state().handle_decided(seq, n, value, from, done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::server_id;
    use labrpc::Network;
    use std::time::Duration;

    fn peer_with(config: Config) -> Paxos {
        let net = Network::new();
        let peers: Vec<PaxosClient> = (0..3).map(|i| net.client(server_id(i))).collect();
        Paxos::with_config(0, peers, config)
    }

    #[test]
    fn test_default_config_is_accepted() {
        let px = peer_with(Config::default());
        assert_eq!(px.me(), 0);
        assert_eq!(px.max(), -1);
    }

    #[test]
    #[should_panic(expected = "exceed ballot stride")]
    fn test_stride_below_cluster_size() {
        peer_with(Config {
            stride: 2,
            ..Config::default()
        });
    }

    #[test]
    #[should_panic(expected = "call_retries")]
    fn test_zero_call_retries() {
        peer_with(Config {
            call_retries: 0,
            ..Config::default()
        });
    }

    #[test]
    #[should_panic(expected = "backoff multiplier")]
    fn test_negative_multiplier() {
        let mut config = Config::default();
        config.backoff.multiplier = -2.0;
        peer_with(config);
    }

    #[test]
    #[should_panic(expected = "backoff multiplier")]
    fn test_nan_multiplier() {
        let mut config = Config::default();
        config.backoff.multiplier = f64::NAN;
        peer_with(config);
    }

    #[test]
    #[should_panic(expected = "rival penalty")]
    fn test_shrinking_rival_penalty() {
        peer_with(Config {
            rival_penalty: 0.5,
            ..Config::default()
        });
    }

    #[test]
    #[should_panic(expected = "rival penalty")]
    fn test_infinite_rival_penalty() {
        peer_with(Config {
            rival_penalty: f64::INFINITY,
            ..Config::default()
        });
    }

    #[test]
    #[should_panic(expected = "initial backoff")]
    fn test_initial_backoff_above_max() {
        let mut config = Config::default();
        config.backoff.initial = Duration::from_secs(2);
        config.backoff.max = Duration::from_secs(1);
        peer_with(config);
    }
}
