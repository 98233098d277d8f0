//! simbridge - socket bridge between numeric hosts and simulation processes.
//!
//! A host environment (a numerical workbench, a scripting runtime) drives a
//! simulation that runs as its own process, possibly on another machine. The
//! two sides exchange newline-delimited command tokens and raw big-endian
//! numeric arrays.
//!
//! # Modules
//!
//! - [`config`] - Bind target from `SIMBRIDGE_SOCKNAME` / `SIMBRIDGE_PORT`
//! - [`wire`] - Line and numeric-array codec over any byte stream
//! - [`server`] - Listener, accept loop, per-connection worker processes
//! - [`client`] - Host-side connector with fatal-error escalation
//! - [`echo`] - Demo session protocol served by the `simbridge` binary
//!
//! # Embedding
//!
//! ```rust,ignore
//! let worker = simbridge::serve_or_exit(&simbridge::ServerConfig::resolve());
//! // From here on this process is one connection's worker: fds 0/1 are
//! // the socket, and the simulation can read commands from stdin.
//! ```

pub mod client;
pub mod config;
pub mod echo;
pub mod server;
pub mod wire;

pub(crate) mod sys;

pub use client::{Client, ClientError, Escalate, LogEscalation};
pub use config::{Bind, ServerConfig};
pub use server::{serve, serve_or_exit, Worker};
pub use wire::{Wire, WireError};
