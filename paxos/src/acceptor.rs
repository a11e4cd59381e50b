//! Acceptor rules. Every handler runs under the peer's state lock and never
//! touches the network.

use crate::state::PeerState;
use crate::{AcceptReply, DecidedReply, PrepareReply, Proposal, Rejection, Value};
use log::trace;

impl PeerState {
    /// Bookkeeping shared by all handlers. Returns whether `seq` is forgotten.
    fn preamble(&mut self, seq: i64, from: usize, done: i64) -> bool {
        self.observe(seq);
        self.record_done(from, done);
        self.is_forgotten(seq)
    }

    pub(crate) fn handle_prepare(
        &mut self,
        seq: i64,
        n: i64,
        from: usize,
        done: i64,
    ) -> PrepareReply {
        if self.preamble(seq, from, done) {
            return PrepareReply::Forgotten;
        }
        self.note_ballot(n, from);

        let me = self.me;
        let ins = self.instance(seq);
        trace!(
            "peer {} prepare seq {} n {} from {}: np {} na {}",
            me,
            ins.seq,
            n,
            from,
            ins.np,
            ins.na()
        );
        // A retry of the ballot already promised gets the same promise again.
        if n > ins.np || (n == ins.np && ins.owner == Some(from)) {
            ins.np = n;
            ins.owner = Some(from);
            PrepareReply::Promise {
                accepted: ins.accepted.clone(),
            }
        } else {
            PrepareReply::Reject(Rejection {
                owner: ins.owner,
                np: ins.np,
            })
        }
    }

    pub(crate) fn handle_accept(
        &mut self,
        seq: i64,
        n: i64,
        value: Value,
        from: usize,
        done: i64,
    ) -> AcceptReply {
        if self.preamble(seq, from, done) {
            return AcceptReply::Forgotten;
        }
        self.note_ballot(n, from);

        let me = self.me;
        let ins = self.instance(seq);
        trace!(
            "peer {} accept seq {} n {} from {}: np {} na {}",
            me,
            ins.seq,
            n,
            from,
            ins.np,
            ins.na()
        );
        if n >= ins.np {
            ins.np = n;
            ins.owner = Some(from);
            if !ins.is_decided() {
                ins.accepted = Some(Proposal { id: n, value });
            }
            AcceptReply::Accepted { n }
        } else {
            AcceptReply::Reject(Rejection {
                owner: ins.owner,
                np: ins.np,
            })
        }
    }

    /// Decisions bypass the ballot check: only one value can ever be accepted
    /// by a majority, so a lower ballot here still carries that value.
    pub(crate) fn handle_decided(
        &mut self,
        seq: i64,
        n: i64,
        value: Value,
        from: usize,
        done: i64,
    ) -> DecidedReply {
        if self.preamble(seq, from, done) {
            return DecidedReply::Forgotten;
        }
        trace!("peer {} decided seq {} n {} from {}", self.me, seq, n, from);
        self.learn(seq, n, value, from);
        DecidedReply::Ok
    }
}
