//! Done/Min garbage collection.
//!
//! Each peer piggybacks its done mark on every request. Once every peer has
//! reported, instances below the smallest mark are forgotten.

use crate::state::PeerState;
use log::{debug, warn};

impl PeerState {
    /// Raise our own done mark. Lower values are ignored.
    pub(crate) fn done(&mut self, seq: i64) {
        if seq > self.done_seq {
            self.done_seq = seq;
        }
        self.record_done(self.me, self.done_seq);
    }

    /// Record the done mark piggybacked by `peer`.
    pub(crate) fn record_done(&mut self, peer: usize, done: i64) {
        if peer >= self.npeers {
            warn!("peer {} got done mark from unknown peer {}", self.me, peer);
            return;
        }
        let mark = self.peer_done.entry(peer).or_insert(done);
        if done > *mark {
            *mark = done;
        }
        self.collect();
    }

    fn collect(&mut self) {
        if self.peer_done.len() < self.npeers {
            return;
        }
        let min = match self.peer_done.values().min() {
            Some(done) => done + 1,
            None => return,
        };
        if min > self.min_seq {
            self.min_seq = min;
            self.instances = self.instances.split_off(&min);
            debug!(
                "peer {} forgets instances below {}, {} retained",
                self.me,
                min,
                self.instances.len()
            );
        }
    }
}
