#![deny(missing_docs)]
#![deny(clippy::all)]
//! A multi-instance paxos library.
//!
//! Every [`Paxos`] peer agrees with a fixed set of other peers on a value for
//! each instance (sequence number) of a sparse log. Peers talk to each other
//! through [`labrpc`], tolerate message loss, reordering and crashed peers, and
//! keep nothing on disk.
//!
//! ```no_run
//! # async fn demo(px: paxos::Paxos) {
//! px.start(0, "x");
//! if let (true, Some(v)) = px.status(0) {
//!     println!("agreed on {}", v);
//! }
//! px.done(0);
//! # }
//! ```

use serde::{Deserialize, Serialize};

/// Value agreed on by an instance.
pub type Value = serde_json::Value;

/// Proposal with id and value.
///
/// id is the ballot number the value was accepted under.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Ballot number.
    pub id: i64,
    /// Accepted value.
    pub value: Value,
}

/// The promise that made an acceptor turn a ballot down.
///
/// Lets the rejected proposer jump straight past the competing ballot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Peer that sent the highest ballot promised.
    pub owner: Option<usize>,
    /// Highest ballot promised.
    pub np: i64,
}

/// Reply to a phase 1 request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PrepareReply {
    /// The ballot is promised.
    Promise {
        /// Highest proposal accepted so far, if any.
        accepted: Option<Proposal>,
    },
    /// A higher or equal ballot was already promised.
    Reject(Rejection),
    /// The instance is below the acceptor's `min()` and has been forgotten.
    Forgotten,
}

/// Reply to a phase 2 request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AcceptReply {
    /// The proposal was accepted.
    Accepted {
        /// Ballot accepted.
        n: i64,
    },
    /// A higher ballot was already promised.
    Reject(Rejection),
    /// The instance is below the acceptor's `min()` and has been forgotten.
    Forgotten,
}

/// Reply to a decide notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecidedReply {
    /// The decision is recorded.
    Ok,
    /// The instance is below the acceptor's `min()` and has been forgotten.
    Forgotten,
}

labrpc::service! {
    service paxos_svc {
        /// Phase 1: ask for a promise to ignore ballots below `n`.
        fn prepare(seq: i64, n: i64, from: usize, done: i64) -> PrepareReply;
        /// Phase 2: ask to accept `value` under ballot `n`.
        fn accept(seq: i64, n: i64, value: Value, from: usize, done: i64) -> AcceptReply;
        /// Phase 3: `value` has been chosen for `seq`.
        fn decided(seq: i64, n: i64, value: Value, from: usize, done: i64) -> DecidedReply;
    }
}

pub use paxos_svc::{Client as PaxosClient, Server as PaxosServer, Service as PaxosService};

mod acceptor;
mod ballot;
mod config;
mod gc;
mod peer;
mod proposer;
pub mod quorum;
mod state;


pub use config::{BackoffConfig, Config};
pub use peer::Paxos;
