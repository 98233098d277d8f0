//! Listener/dispatcher side of the bridge.
//!
//! Accepts client connections and hands each one to its own forked worker
//! process whose standard input and output are the connection.
//!
//! # Architecture
//!
//! ```text
//! Server process                                   Worker process (one per client)
//! ┌─────────────────────────┐                      ┌──────────────────────────┐
//! │ Listener (backlog 5)    │  accept + fork       │ fds 0/1 = connection     │
//! │ accept_and_dispatch ────┼─────────────────────►│ fd 2 = server's stderr   │
//! │ Reaper thread (SIGCHLD) │◄──── exit ───────────│ simulation session       │
//! └─────────────────────────┘                      └──────────────────────────┘
//! ```
//!
//! The listener belongs to the acceptor for the server's lifetime; each
//! accepted connection belongs to exactly one worker from the moment of
//! dispatch.

pub mod acceptor;
pub mod listener;
pub mod reaper;
pub mod worker;

pub use acceptor::accept_and_dispatch;
pub use listener::{listen, listen_path, listen_tcp, Connection, Listener, Peer};
pub use reaper::Reaper;
pub use worker::{StdStreams, Worker};

use anyhow::Result;

use crate::config::ServerConfig;

/// Run the server described by `config`.
///
/// Binds the listener, installs the reaper, and enters the accept loop. In
/// the server process this only returns on a setup error. In each worker it
/// returns `Ok(Worker)`, and the caller continues as that connection's
/// simulation session.
pub fn serve(config: &ServerConfig) -> Result<Worker> {
    log::info!("Starting server on {config}");
    let listener = listen(config)?;
    let reaper = Reaper::install()?;
    // Only a worker gets past this call, success or not.
    let worker = accept_and_dispatch(listener);
    reaper.release_in_worker();
    worker
}

/// [`serve`], treating setup errors as fatal.
///
/// Logs the error and exits the process with status 1.
pub fn serve_or_exit(config: &ServerConfig) -> Worker {
    match serve(config) {
        Ok(worker) => worker,
        Err(e) => {
            log::error!("Server setup failed: {e:#}");
            std::process::exit(1);
        }
    }
}
