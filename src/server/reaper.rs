//! Reclamation of finished workers.
//!
//! The acceptor never waits on a worker; it cannot know when a session ends.
//! Without a reaper every finished worker would stay in the process table as
//! a zombie. A dedicated thread sleeps on `SIGCHLD` notifications
//! (signal-hook's self-pipe) and, on each wakeup, collects every child that
//! has already exited.
//!
//! ```text
//! worker exits ──SIGCHLD──► signal-hook pipe ──► reaper thread
//!                                                 waitpid(-1, WNOHANG) until ≤ 0
//! ```
//!
//! Several exits may coalesce into one notification, so each pass drains
//! until nothing is left rather than collecting one child per signal.
//!
//! The reaper must be the only code in the server process that waits on
//! children; `std::process::Child::wait` and friends would race with it.
//!
//! A worker forgets its copy of the reaper but still holds signal-hook's
//! self-pipe descriptors until it execs or exits; nothing in the worker
//! reads or writes them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use signal_hook::consts::signal::SIGCHLD;
use signal_hook::iterator::{Handle, Signals};

use crate::sys;

/// Background collector of terminated child processes.
#[derive(Debug)]
pub struct Reaper {
    reclaimed: Arc<AtomicUsize>,
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Register for `SIGCHLD` and start the reaper thread.
    ///
    /// Children that exited before installation are collected immediately.
    pub fn install() -> Result<Self> {
        let mut signals = Signals::new([SIGCHLD]).context("Failed to register SIGCHLD handler")?;
        let handle = signals.handle();

        let reclaimed = Arc::new(AtomicUsize::new(sys::reap_exited()));
        let counter = Arc::clone(&reclaimed);

        // No logging in here: the acceptor forks while this thread runs, and
        // a child must never inherit a logger or allocator lock held by it.
        let thread = thread::Builder::new()
            .name("simbridge-reaper".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    counter.fetch_add(sys::reap_exited(), Ordering::Relaxed);
                }
            })
            .context("Failed to spawn reaper thread")?;

        log::debug!("[reaper] installed");
        Ok(Self {
            reclaimed,
            handle,
            thread: Some(thread),
        })
    }

    /// Number of workers collected so far.
    pub fn reclaimed(&self) -> usize {
        self.reclaimed.load(Ordering::Relaxed)
    }

    /// Run one collection pass on the calling thread.
    pub fn reap_now(&self) -> usize {
        let n = sys::reap_exited();
        self.reclaimed.fetch_add(n, Ordering::Relaxed);
        n
    }

    /// Stop the reaper thread and wait for it.
    pub fn shutdown(mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Abandon the reaper inside a freshly forked worker.
    ///
    /// The reaper thread does not exist in the child, so neither closing the
    /// signal handle nor joining may run there.
    pub(crate) fn release_in_worker(self) {
        std::mem::forget(self);
    }
}
