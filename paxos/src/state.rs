use std::collections::{BTreeMap, HashMap};

use crate::{Proposal, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InstanceStatus {
    /// Only referenced by a message so far.
    Unknown,
    /// A local proposer is driving the instance.
    Working,
    /// Terminal; the value never changes again.
    Decided,
}

#[derive(Clone, Debug)]
pub(crate) struct LogInstance {
    pub(crate) seq: i64,
    /// Highest prepare promised.
    pub(crate) np: i64,
    /// Highest accept seen.
    pub(crate) accepted: Option<Proposal>,
    /// Sender of `np`. Only steers backoff.
    pub(crate) owner: Option<usize>,
    pub(crate) status: InstanceStatus,
}

impl LogInstance {
    pub(crate) fn new(seq: i64) -> Self {
        Self {
            seq,
            np: -1,
            accepted: None,
            owner: None,
            status: InstanceStatus::Unknown,
        }
    }

    pub(crate) fn na(&self) -> i64 {
        self.accepted.as_ref().map_or(-1, |p| p.id)
    }

    pub(crate) fn is_decided(&self) -> bool {
        self.status == InstanceStatus::Decided
    }
}

/// Everything a peer knows, guarded by a single lock.
#[derive(Debug)]
pub(crate) struct PeerState {
    pub(crate) me: usize,
    pub(crate) npeers: usize,
    /// Live instances, ordered by sequence number.
    pub(crate) instances: BTreeMap<i64, LogInstance>,
    /// Highest done mark reported by each peer, ourselves included.
    pub(crate) peer_done: HashMap<usize, i64>,
    pub(crate) max_seq: i64,
    /// Instances below are forgotten.
    pub(crate) min_seq: i64,
    pub(crate) done_seq: i64,
    pub(crate) max_prepare_seen: i64,
    pub(crate) max_prepare_owner: Option<usize>,
}

impl PeerState {
    pub(crate) fn new(me: usize, npeers: usize) -> Self {
        Self {
            me,
            npeers,
            instances: BTreeMap::new(),
            peer_done: HashMap::new(),
            max_seq: -1,
            min_seq: 0,
            done_seq: -1,
            max_prepare_seen: -1,
            max_prepare_owner: None,
        }
    }

    pub(crate) fn observe(&mut self, seq: i64) {
        if seq > self.max_seq {
            self.max_seq = seq;
        }
    }

    pub(crate) fn is_forgotten(&self, seq: i64) -> bool {
        seq < self.min_seq
    }

    /// The instance for `seq`, created on first reference.
    pub(crate) fn instance(&mut self, seq: i64) -> &mut LogInstance {
        self.instances
            .entry(seq)
            .or_insert_with(|| LogInstance::new(seq))
    }

    pub(crate) fn note_ballot(&mut self, n: i64, owner: usize) {
        if n > self.max_prepare_seen {
            self.max_prepare_seen = n;
            self.max_prepare_owner = Some(owner);
        }
    }

    /// Mark `seq` as driven by a local proposer.
    ///
    /// Returns false if the instance is forgotten, decided or already being
    /// driven, in which case no proposer must be spawned.
    pub(crate) fn admit(&mut self, seq: i64) -> bool {
        self.observe(seq);
        if self.is_forgotten(seq) {
            return false;
        }
        let ins = self.instance(seq);
        match ins.status {
            InstanceStatus::Unknown => {
                ins.status = InstanceStatus::Working;
                true
            }
            InstanceStatus::Working | InstanceStatus::Decided => false,
        }
    }

    /// Whether a proposer for `seq` still has work to do.
    pub(crate) fn is_pending(&self, seq: i64) -> bool {
        !self.is_forgotten(seq)
            && self
                .instances
                .get(&seq)
                .map_or(false, |ins| !ins.is_decided())
    }

    /// Record that `value` was chosen for `seq` under ballot `n`.
    pub(crate) fn learn(&mut self, seq: i64, n: i64, value: Value, from: usize) {
        if self.is_forgotten(seq) {
            return;
        }
        let ins = self.instance(seq);
        if ins.is_decided() {
            debug_assert_eq!(ins.accepted.as_ref().map(|p| &p.value), Some(&value));
            return;
        }
        ins.np = n;
        ins.accepted = Some(Proposal { id: n, value });
        ins.owner = Some(from);
        ins.status = InstanceStatus::Decided;
    }

    pub(crate) fn status(&self, seq: i64) -> (bool, Option<Value>) {
        if self.is_forgotten(seq) {
            return (true, None);
        }
        match self.instances.get(&seq) {
            Some(ins) if ins.is_decided() => {
                (true, ins.accepted.as_ref().map(|p| p.value.clone()))
            }
            _ => (false, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_admit_once() {
        let mut s = PeerState::new(0, 3);
        assert!(s.admit(4));
        assert!(!s.admit(4));
        assert_eq!(s.instances[&4].status, InstanceStatus::Working);
        assert_eq!(s.max_seq, 4);

        s.learn(4, 10, json!("x"), 0);
        assert!(!s.admit(4));
        assert!(!s.is_pending(4));
    }

    #[test]
    fn test_admit_unknown_instance() {
        let mut s = PeerState::new(1, 3);
        s.instance(2);
        assert_eq!(s.instances[&2].status, InstanceStatus::Unknown);
        assert!(s.admit(2));
        assert!(s.is_pending(2));
    }

    #[test]
    fn test_status() {
        let mut s = PeerState::new(0, 3);
        assert_eq!(s.status(0), (false, None));
        s.instance(0);
        assert_eq!(s.status(0), (false, None));
        s.learn(0, 3, json!("v"), 1);
        assert_eq!(s.status(0), (true, Some(json!("v"))));
        assert_eq!(s.instances[&0].na(), 3);

        s.min_seq = 1;
        assert_eq!(s.status(0), (true, None));
        assert!(!s.admit(0));
    }

    #[test]
    fn test_learn_keeps_decided_value() {
        let mut s = PeerState::new(0, 3);
        s.learn(0, 13, json!("a"), 1);
        s.learn(0, 13, json!("a"), 2);
        let ins = &s.instances[&0];
        assert_eq!(ins.owner, Some(1));
        assert_eq!(ins.accepted.as_ref().unwrap().value, json!("a"));
    }
}
