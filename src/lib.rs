//! Tether
//!
//! Client runtime for driving a long-running agent process over duplex
//! JSON-RPC. This crate re-exports [`tether_sdk`] for applications and the
//! lower-level [`tether_core`] modules for embedders that manage the
//! connection themselves.

pub use tether_sdk::*;

pub use tether_core::{
    callbacks, config, connection, dispatch, protocol, rpc, session, transport,
};
