//! Accept loop: one forked worker per connection.
//!
//! ```text
//!            accept()
//! LISTENING ─────────► fork ──parent──► close conn, back to LISTENING
//!                        │
//!                        └─child──► close listener, conn → fds 0/1,
//!                                   return Worker (DISPATCHED)
//! ```
//!
//! The loop only ever returns inside a worker. Accept and fork failures are
//! logged and retried; they never end the loop.
//!
//! Rust guideline compliant 2025-01

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};

use super::listener::{Connection, Listener, Peer};
use super::worker::Worker;
use crate::sys::{self, Forked};

/// Pause after a failed accept so a persistent error (e.g. `EMFILE`) does
/// not spin the acceptor.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accept connections forever, forking a worker for each.
///
/// Returns `Ok(Worker)` only in a forked worker, with that worker's standard
/// input and output already rewired onto its connection. In the dispatching
/// process this function never returns.
///
/// A [`super::Reaper`] should be installed first; otherwise finished workers
/// remain zombies.
pub fn accept_and_dispatch(listener: Listener) -> Result<Worker> {
    let mut sequence: u64 = 0;

    loop {
        let (conn, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::error!("[acceptor] Accept error: {e}");
                std::thread::sleep(ACCEPT_RETRY_DELAY);
                continue;
            }
        };

        sequence += 1;
        log::info!("[acceptor] Connection #{sequence} from {peer}");

        // Anything still buffered would otherwise be written twice, once by
        // each process.
        let _ = io::stdout().flush();

        // SAFETY: the only other thread in the server is the reaper, which
        // neither allocates nor logs, so the child cannot inherit a held
        // allocator or logger lock.
        match unsafe { sys::fork() } {
            Ok(Forked::Child) => return enter_worker(listener, conn, peer, sequence),
            Ok(Forked::Parent(pid)) => {
                log::debug!("[acceptor] Worker {pid} owns connection #{sequence}");
                drop(conn);
            }
            Err(e) => {
                log::error!("[acceptor] Fork failed, dropping connection #{sequence}: {e}");
                drop(conn);
            }
        }
    }
}

/// Child-side half of dispatch.
fn enter_worker(listener: Listener, conn: Connection, peer: Peer, sequence: u64) -> Result<Worker> {
    drop(listener);
    sys::restore_default_sigchld();
    sys::redirect_stdio(conn.into()).context("Failed to rewire worker stdio onto connection")?;
    Ok(Worker::new(peer, sequence))
}
