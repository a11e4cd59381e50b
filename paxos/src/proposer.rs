//! Drives one instance to a decision: prepare, accept, then tell everyone.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, trace};

use crate::ballot::next_ballot;
use crate::peer::Shared;
use crate::quorum::Tally;
use crate::{AcceptReply, DecidedReply, PrepareReply, Proposal, Rejection, Value};

enum Prepared {
    /// A majority promised; carries the value to propose.
    Won(Value),
    Lost,
    Forgotten,
}

enum Accepted {
    Chosen,
    Lost,
    Forgotten,
}

pub(crate) struct Proposer {
    shared: Arc<Shared>,
    seq: i64,
    value: Value,
    ballot: i64,
    /// Highest ballot heard of from any acceptor.
    highest_seen: i64,
    /// Highest rejecting ballot of the current round and its owner.
    rival: Option<(i64, usize)>,
    failures: u32,
}

impl Proposer {
    pub(crate) fn new(shared: Arc<Shared>, seq: i64, value: Value) -> Self {
        let (hint, owner) = {
            let state = shared.state();
            (state.max_prepare_seen, state.max_prepare_owner)
        };
        let ballot = next_ballot(shared.me, shared.config.stride, hint);
        trace!(
            "peer {} seq {} starts with ballot {} above {} of {:?}",
            shared.me,
            seq,
            ballot,
            hint,
            owner
        );
        Self {
            shared,
            seq,
            value,
            ballot,
            highest_seen: hint,
            rival: None,
            failures: 0,
        }
    }

    /// Whether another round is worth running.
    fn pending(&self) -> bool {
        !self.shared.is_dead() && self.shared.state().is_pending(self.seq)
    }

    pub(crate) async fn run(mut self) {
        while self.pending() {
            let value = match self.prepare().await {
                Prepared::Won(value) => value,
                Prepared::Lost => {
                    self.retreat().await;
                    continue;
                }
                Prepared::Forgotten => break,
            };
            if !self.pending() {
                break;
            }
            match self.accept(&value).await {
                Accepted::Chosen => {
                    info!(
                        "peer {} decided seq {} = {} with ballot {}",
                        self.shared.me, self.seq, value, self.ballot
                    );
                    self.shared
                        .state()
                        .learn(self.seq, self.ballot, value.clone(), self.shared.me);
                    self.decide(value).await;
                    break;
                }
                Accepted::Lost => self.retreat().await,
                Accepted::Forgotten => break,
            }
        }
        debug!("peer {} proposer for seq {} exits", self.shared.me, self.seq);
    }

    fn rejected(&mut self, r: Rejection) {
        self.highest_seen = self.highest_seen.max(r.np);
        match r.owner {
            Some(owner) if owner != self.shared.me => {
                if self.rival.map_or(true, |(np, _)| r.np > np) {
                    self.rival = Some((r.np, owner));
                }
            }
            _ => {}
        }
    }

    /// Back off, then pick a ballot above everything seen so far.
    async fn retreat(&mut self) {
        let config = &self.shared.config;
        let mut delay = config.backoff.duration(self.failures, &mut rand::thread_rng());
        if matches!(self.rival, Some((_, owner)) if owner > self.shared.me) {
            delay = delay.mul_f64(config.rival_penalty);
        }
        self.failures += 1;
        self.ballot = next_ballot(
            self.shared.me,
            config.stride,
            self.highest_seen.max(self.ballot),
        );
        debug!(
            "peer {} seq {} retries with ballot {} after {:?}",
            self.shared.me, self.seq, self.ballot, delay
        );
        tokio::time::sleep(delay).await;
    }

    async fn prepare(&mut self) -> Prepared {
        let shared = self.shared.clone();
        self.rival = None;
        let (seq, n, me, done) = (self.seq, self.ballot, shared.me, shared.done_seq());

        let mut calls: FuturesUnordered<_> = shared
            .peers
            .iter()
            .enumerate()
            .map(|(i, peer)| {
                let shared = &shared;
                async move {
                    let reply = shared
                        .call(peer, move || peer.prepare(seq, n, me, done))
                        .await;
                    (i, reply)
                }
            })
            .collect();

        let mut tally = Tally::new(shared.peers.len());
        let mut adopted: Option<Proposal> = None;
        while let Some((i, reply)) = calls.next().await {
            match reply {
                Some(PrepareReply::Promise { accepted }) => {
                    tally.record(i, true);
                    if let Some(p) = accepted {
                        self.highest_seen = self.highest_seen.max(p.id);
                        if adopted.as_ref().map_or(true, |a| p.id > a.id) {
                            adopted = Some(p);
                        }
                    }
                }
                Some(PrepareReply::Reject(r)) => {
                    tally.record(i, false);
                    self.rejected(r);
                }
                Some(PrepareReply::Forgotten) => return Prepared::Forgotten,
                None => {}
            }
            if tally.won() || tally.lost() {
                break;
            }
        }

        debug!(
            "peer {} prepare seq {} n {}: {} ok {} reject",
            me,
            seq,
            n,
            tally.oks(),
            tally.rejects()
        );
        if tally.won() {
            Prepared::Won(adopted.map_or_else(|| self.value.clone(), |p| p.value))
        } else {
            Prepared::Lost
        }
    }

    async fn accept(&mut self, value: &Value) -> Accepted {
        let shared = self.shared.clone();
        self.rival = None;
        let (seq, n, me, done) = (self.seq, self.ballot, shared.me, shared.done_seq());

        let mut calls: FuturesUnordered<_> = shared
            .peers
            .iter()
            .enumerate()
            .map(|(i, peer)| {
                let shared = &shared;
                let value = value.clone();
                async move {
                    let reply = shared
                        .call(peer, move || peer.accept(seq, n, value.clone(), me, done))
                        .await;
                    (i, reply)
                }
            })
            .collect();

        let mut tally = Tally::new(shared.peers.len());
        while let Some((i, reply)) = calls.next().await {
            match reply {
                Some(AcceptReply::Accepted { .. }) => tally.record(i, true),
                Some(AcceptReply::Reject(r)) => {
                    tally.record(i, false);
                    self.rejected(r);
                }
                Some(AcceptReply::Forgotten) => return Accepted::Forgotten,
                None => {}
            }
            if tally.won() || tally.lost() {
                break;
            }
        }

        debug!(
            "peer {} accept seq {} n {}: {} ok {} reject",
            me,
            seq,
            n,
            tally.oks(),
            tally.rejects()
        );
        if tally.won() {
            Accepted::Chosen
        } else {
            Accepted::Lost
        }
    }

    /// Tell every peer about the decision until all of them have heard it.
    async fn decide(&self, value: Value) {
        let shared = self.shared.clone();
        let (seq, n, me) = (self.seq, self.ballot, shared.me);
        let mut acked = HashSet::new();

        loop {
            if shared.is_dead() || shared.state().is_forgotten(seq) {
                return;
            }
            let done = shared.done_seq();
            let mut calls: FuturesUnordered<_> = shared
                .peers
                .iter()
                .enumerate()
                .filter(|(i, _)| !acked.contains(i))
                .map(|(i, peer)| {
                    let shared = &shared;
                    let value = value.clone();
                    async move {
                        let reply = shared
                            .call(peer, move || peer.decided(seq, n, value.clone(), me, done))
                            .await;
                        (i, reply)
                    }
                })
                .collect();

            while let Some((i, reply)) = calls.next().await {
                match reply {
                    Some(DecidedReply::Ok) | Some(DecidedReply::Forgotten) => {
                        acked.insert(i);
                    }
                    None => {}
                }
            }

            if acked.len() == shared.peers.len() {
                debug!("peer {} seq {} decision delivered to all", me, seq);
                return;
            }
            tokio::time::sleep(shared.config.decide_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::server_id;
    use crate::{Config, Paxos, PaxosClient};
    use labrpc::Network;
    use serde_json::json;

    fn lone_peer(me: usize) -> Paxos {
        let net = Network::new();
        let peers: Vec<PaxosClient> = (0..3).map(|i| net.client(server_id(i))).collect();
        Paxos::with_config(me, peers, Config::default())
    }

    #[test]
    fn test_starts_above_hint_without_rival() {
        let px = lone_peer(0);
        let shared = px.shared();
        // Peer 2 prepared another instance with a high ballot.
        shared.state().handle_prepare(5, 20002, 2, -1);

        let proposer = Proposer::new(shared, 0, json!("x"));
        assert_eq!(proposer.ballot, 30000);
        assert_eq!(proposer.highest_seen, 20002);
        assert_eq!(proposer.rival, None);
    }

    #[test]
    fn test_rival_is_highest_rejection() {
        let px = lone_peer(1);
        let mut proposer = Proposer::new(px.shared(), 0, json!("x"));

        proposer.rejected(Rejection {
            owner: Some(2),
            np: 10002,
        });
        assert_eq!(proposer.rival, Some((10002, 2)));

        // A lower ballot in the same round does not replace the rival.
        proposer.rejected(Rejection {
            owner: Some(0),
            np: 10000,
        });
        assert_eq!(proposer.rival, Some((10002, 2)));

        // Neither does a rejection naming ourselves or nobody.
        proposer.rejected(Rejection {
            owner: Some(1),
            np: 20001,
        });
        proposer.rejected(Rejection {
            owner: None,
            np: 30000,
        });
        assert_eq!(proposer.rival, Some((10002, 2)));
        assert_eq!(proposer.highest_seen, 30000);

        proposer.rejected(Rejection {
            owner: Some(0),
            np: 40000,
        });
        assert_eq!(proposer.rival, Some((40000, 0)));
    }
}
