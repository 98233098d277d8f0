//! Echo session used by the demo server.
//!
//! A minimal line-command protocol over [`Wire`] that exercises every codec
//! operation end to end:
//!
//! | Request                        | Reply                          |
//! |--------------------------------|--------------------------------|
//! | `PING`                         | `PONG`                         |
//! | `DARRAY n` + n float64 values  | the same n float64 values      |
//! | `IARRAY n` + n int32 values    | the same n int32 values        |
//! | `QUIT`                         | `BYE`, then the session ends   |
//! | anything else                  | `ERR <request>`                |
//!
//! The session also ends cleanly when the peer closes its side.

use std::io::{Read, Write};

use crate::wire::{Wire, WireError};

/// Receive buffer size for request lines, terminator included.
pub const LINE_CAPACITY: usize = 256;

/// Largest array a single request may carry.
pub const MAX_ELEMENTS: usize = 1 << 20;

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe.
    Ping,
    /// Float array of the given length follows.
    DArray(usize),
    /// Integer array of the given length follows.
    IArray(usize),
    /// End of session.
    Quit,
    /// Unrecognized or malformed request.
    Unknown(String),
}

impl Command {
    /// Parse one request line.
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let verb = parts.next().unwrap_or_default();
        let count = parts
            .next()
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|&n| n <= MAX_ELEMENTS);
        let trailing = parts.next().is_some();

        match (verb, count, trailing) {
            ("PING", None, false) if line.split_whitespace().count() == 1 => Command::Ping,
            ("QUIT", None, false) if line.split_whitespace().count() == 1 => Command::Quit,
            ("DARRAY", Some(n), false) => Command::DArray(n),
            ("IARRAY", Some(n), false) => Command::IArray(n),
            _ => Command::Unknown(line.to_string()),
        }
    }
}

/// Serve requests on `wire` until `QUIT` or peer close.
///
/// Returns the number of requests handled. A peer close is a normal end of
/// session, not an error.
pub fn run<S: Read + Write>(wire: &mut Wire<S>) -> Result<usize, WireError> {
    let mut handled = 0;
    loop {
        let line = match wire.recv_line_string(LINE_CAPACITY) {
            Ok(line) => line,
            Err(WireError::Closed) => {
                log::debug!("[echo] Peer closed after {handled} requests");
                return Ok(handled);
            }
            Err(e) => return Err(e),
        };
        handled += 1;

        match Command::parse(&line) {
            Command::Ping => wire.send_line("PONG")?,
            Command::DArray(n) => {
                let values = wire.recv_f64_vec(n)?;
                wire.send_f64s(&values)?;
            }
            Command::IArray(n) => {
                let values = wire.recv_i32_vec(n)?;
                wire.send_i32s(&values)?;
            }
            Command::Quit => {
                wire.send_line("BYE")?;
                return Ok(handled);
            }
            Command::Unknown(request) => {
                log::warn!("[echo] Unknown request: {request:?}");
                wire.send_line(format!("ERR {request}"))?;
            }
        }
    }
}
