//! An in-process RPC network for testing distributed protocols.
//!
//! Services are declared with [`service!`], registered on a [`Network`] and
//! called through generated clients. The network can be made unreliable or
//! partitioned through a [`NetworkHandle`].

pub mod client;
mod macros;
pub mod network;
pub mod server;

pub use anyhow;
pub use async_trait::async_trait;
pub use futures;
pub use log;
pub use serde;
pub use serde_json;
pub use tokio;

pub use network::{Network, NetworkHandle};
