//! Majority arithmetic shared by every phase.

use std::collections::HashMap;

/// Whether `count` replies form a majority of `npeers`.
pub fn is_majority(count: usize, npeers: usize) -> bool {
    count > npeers / 2
}

/// Smallest number of replies that forms a majority of `npeers`.
pub fn majority(npeers: usize) -> usize {
    npeers / 2 + 1
}

/// Outcome of one round, by peer.
///
/// Rebuilt for every round; a peer that never answered has no entry.
#[derive(Debug)]
pub(crate) struct Tally {
    npeers: usize,
    replies: HashMap<usize, bool>,
}

impl Tally {
    pub(crate) fn new(npeers: usize) -> Self {
        Self {
            npeers,
            replies: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, peer: usize, ok: bool) {
        self.replies.insert(peer, ok);
    }

    pub(crate) fn oks(&self) -> usize {
        self.replies.values().filter(|ok| **ok).count()
    }

    pub(crate) fn rejects(&self) -> usize {
        self.replies.len() - self.oks()
    }

    pub(crate) fn won(&self) -> bool {
        is_majority(self.oks(), self.npeers)
    }

    pub(crate) fn lost(&self) -> bool {
        is_majority(self.rejects(), self.npeers)
    }
}
