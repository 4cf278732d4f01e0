//! JSON-RPC client for the forkd daemon.
//!
//! The daemon is a black box to the rest of the workspace: everything goes
//! through its HTTP JSON-RPC endpoint. This crate provides the wire model
//! ([`RpcRequest`]/[`RpcResponse`]), a typed error ([`RpcError`]) that keeps
//! the daemon's reject reasons intact, the HTTP client ([`RpcClient`]) and
//! typed wrappers for the daemon methods the harness drives.

mod client;
mod error;
mod types;

pub mod daemon;

pub use client::RpcClient;
pub use error::RpcError;
pub use types::{ErrorBody, RpcRequest, RpcResponse, JSON_RPC_VERSION};
