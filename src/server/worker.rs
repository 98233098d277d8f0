//! The worker side of a dispatched connection.
//!
//! After dispatch the worker's fds 0 and 1 *are* the connection. Simulation
//! code can keep using plain standard input/output, or speak the codec
//! through [`Worker::wire`].

use std::fs::File;
use std::io::{self, Read, Write};
use std::mem::ManuallyDrop;
use std::os::fd::FromRawFd;

use super::listener::Peer;
use crate::wire::Wire;

/// A forked process bound to exactly one accepted connection.
#[derive(Debug)]
pub struct Worker {
    peer: Peer,
    sequence: u64,
}

impl Worker {
    pub(crate) fn new(peer: Peer, sequence: u64) -> Self {
        Self { peer, sequence }
    }

    /// Remote end of this worker's connection.
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Position of this connection in the server's accept order (from 1).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Codec endpoint over the rewired standard streams.
    pub fn wire(&self) -> Wire<StdStreams> {
        Wire::new(StdStreams::new())
    }
}

/// Unbuffered duplex stream over fds 0 (read) and 1 (write).
///
/// Unlike `std::io::stdin()`, nothing is read ahead, so foreign code reading
/// fd 0 directly sees exactly the bytes this side has not consumed.
#[derive(Debug)]
pub struct StdStreams {
    stdin: ManuallyDrop<File>,
    stdout: ManuallyDrop<File>,
}

impl StdStreams {
    /// Borrow the process's standard input and output.
    pub fn new() -> Self {
        // SAFETY: fds 0 and 1 stay open for the life of the process, and
        // `ManuallyDrop` keeps these borrow-only `File`s from closing them.
        unsafe {
            Self {
                stdin: ManuallyDrop::new(File::from_raw_fd(libc::STDIN_FILENO)),
                stdout: ManuallyDrop::new(File::from_raw_fd(libc::STDOUT_FILENO)),
            }
        }
    }
}

impl Default for StdStreams {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for StdStreams {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdin.read(buf)
    }
}

impl Write for StdStreams {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}
