//! Wire codec shared by clients and workers.
//!
//! Two kinds of value travel over a connection, with no framing between them:
//!
//! ```text
//! line   [bytes without 0x0A] 0x0A
//! array  [elem 0][elem 1] ... [elem n-1]      i32: 4 bytes BE, f64: 8 bytes BE
//! ```
//!
//! Neither value is self-describing. Both ends know from the protocol step
//! whether a line or an array comes next, and for arrays how many elements of
//! which width. Lines are read one byte at a time so the reader stops exactly
//! at the delimiter and never swallows the start of an array that follows it.
//!
//! Rust guideline compliant 2025-01

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// Byte that terminates a line on the wire.
pub const LINE_DELIMITER: u8 = b'\n';

/// Width of one integer array element on the wire.
pub const I32_WIDTH: usize = 4;

/// Width of one floating-point array element on the wire.
pub const F64_WIDTH: usize = 8;

/// Errors observed while moving values over an established connection.
///
/// All of them end the session for the party that sees them.
#[derive(Debug, Error)]
pub enum WireError {
    /// The peer closed its end before the expected bytes arrived.
    #[error("peer closed the connection")]
    Closed,
    /// A line token contained the delimiter byte.
    #[error("line token contains a newline")]
    EmbeddedNewline,
    /// `recv_line` was handed a buffer with no room for the terminator.
    #[error("line buffer has zero capacity")]
    EmptyBuffer,
    /// Any other I/O failure on the underlying stream.
    #[error("wire I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for codec operations.
pub type WireResult<T> = Result<T, WireError>;

/// Convert a float from host order to network (big-endian) order.
///
/// On a little-endian host this mirrors all eight bytes; on a big-endian
/// host it is the identity. Applying it twice returns the original bits.
pub fn host_to_net_f64(x: f64) -> f64 {
    f64::from_bits(x.to_bits().to_be())
}

/// Convert a float from network (big-endian) order to host order.
pub fn net_to_host_f64(x: f64) -> f64 {
    f64::from_bits(u64::from_be(x.to_bits()))
}

/// One end of a bridge connection speaking the line/array protocol.
///
/// Owns the stream plus a scratch buffer reused by every array transfer.
#[derive(Debug)]
pub struct Wire<S> {
    stream: S,
    scratch: BytesMut,
}

impl<S: Read + Write> Wire<S> {
    /// Wrap a duplex stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            scratch: BytesMut::new(),
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    // ── Lines ───────────────────────────────────────────────────────────────

    /// Send `token` followed by one delimiter.
    ///
    /// An empty token sends only the delimiter.
    pub fn send_line(&mut self, token: impl AsRef<[u8]>) -> WireResult<()> {
        let token = token.as_ref();
        if token.contains(&LINE_DELIMITER) {
            return Err(WireError::EmbeddedNewline);
        }
        self.scratch.clear();
        self.scratch.reserve(token.len() + 1);
        self.scratch.put_slice(token);
        self.scratch.put_u8(LINE_DELIMITER);
        self.write_scratch()
    }

    /// Receive one line into `buf` and return its length.
    ///
    /// Reads a byte at a time until the delimiter, which is replaced by a `0`
    /// terminator. If `buf.len()` bytes arrive without a delimiter the line
    /// is cut at `buf.len() - 1` and terminated there: the byte read into
    /// that last slot is dropped, and whatever follows it stays on the
    /// stream.
    pub fn recv_line(&mut self, buf: &mut [u8]) -> WireResult<usize> {
        if buf.is_empty() {
            return Err(WireError::EmptyBuffer);
        }
        for i in 0..buf.len() {
            let byte = self.read_byte()?;
            if byte == LINE_DELIMITER {
                buf[i] = 0;
                return Ok(i);
            }
            buf[i] = byte;
        }
        let last = buf.len() - 1;
        buf[last] = 0;
        Ok(last)
    }

    /// Receive one line into a fresh buffer of `capacity` bytes.
    ///
    /// Same truncation rule as [`Wire::recv_line`]; invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn recv_line_string(&mut self, capacity: usize) -> WireResult<String> {
        let mut buf = vec![0u8; capacity];
        let len = self.recv_line(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
    }

    // ── Arrays ──────────────────────────────────────────────────────────────

    /// Send every value as an 8-byte big-endian float in one write.
    pub fn send_f64s(&mut self, values: &[f64]) -> WireResult<()> {
        self.scratch.clear();
        self.scratch.reserve(values.len() * F64_WIDTH);
        for &value in values {
            self.scratch.put_f64(value);
        }
        self.write_scratch()
    }

    /// Send every value as a 4-byte big-endian integer in one write.
    pub fn send_i32s(&mut self, values: &[i32]) -> WireResult<()> {
        self.scratch.clear();
        self.scratch.reserve(values.len() * I32_WIDTH);
        for &value in values {
            self.scratch.put_i32(value);
        }
        self.write_scratch()
    }

    /// Send floats as integers, truncating toward zero (saturating, NaN → 0).
    pub fn send_i32s_from_f64s(&mut self, values: &[f64]) -> WireResult<()> {
        self.scratch.clear();
        self.scratch.reserve(values.len() * I32_WIDTH);
        for &value in values {
            self.scratch.put_i32(value as i32);
        }
        self.write_scratch()
    }

    /// Fill `out` with exactly `out.len()` floats from the stream.
    pub fn recv_f64s(&mut self, out: &mut [f64]) -> WireResult<()> {
        self.fill_scratch(out.len() * F64_WIDTH)?;
        let mut bytes = &self.scratch[..];
        for slot in out.iter_mut() {
            *slot = bytes.get_f64();
        }
        Ok(())
    }

    /// Fill `out` with exactly `out.len()` integers from the stream.
    pub fn recv_i32s(&mut self, out: &mut [i32]) -> WireResult<()> {
        self.fill_scratch(out.len() * I32_WIDTH)?;
        let mut bytes = &self.scratch[..];
        for slot in out.iter_mut() {
            *slot = bytes.get_i32();
        }
        Ok(())
    }

    /// Receive `len` floats into a new vector.
    pub fn recv_f64_vec(&mut self, len: usize) -> WireResult<Vec<f64>> {
        let mut out = vec![0.0; len];
        self.recv_f64s(&mut out)?;
        Ok(out)
    }

    /// Receive `len` integers into a new vector.
    pub fn recv_i32_vec(&mut self, len: usize) -> WireResult<Vec<i32>> {
        let mut out = vec![0; len];
        self.recv_i32s(&mut out)?;
        Ok(out)
    }

    // ── Stream plumbing ─────────────────────────────────────────────────────

    fn write_scratch(&mut self) -> WireResult<()> {
        self.stream.write_all(&self.scratch)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> WireResult<u8> {
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(WireError::Closed),
                Ok(_) => return Ok(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read until exactly `len` bytes sit in the scratch buffer.
    ///
    /// Each read may return fewer bytes than asked for.
    fn fill_scratch(&mut self, len: usize) -> WireResult<()> {
        self.scratch.clear();
        self.scratch.resize(len, 0);
        let mut filled = 0;
        while filled < len {
            match self.stream.read(&mut self.scratch[filled..]) {
                Ok(0) => return Err(WireError::Closed),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory stream: writes land in a queue that later reads drain,
    /// at most `chunk` bytes per read.
    struct Loopback {
        queue: VecDeque<u8>,
        chunk: usize,
    }

    impl Loopback {
        fn new() -> Self {
            Self::chunked(usize::MAX)
        }

        fn chunked(chunk: usize) -> Self {
            Self {
                queue: VecDeque::new(),
                chunk,
            }
        }

        fn pending(&self) -> Vec<u8> {
            self.queue.iter().copied().collect()
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk).min(self.queue.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.queue.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.queue.extend(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_round_trip() {
        let mut wire = Wire::new(Loopback::new());
        wire.send_line("PING").unwrap();
        assert_eq!(wire.get_ref().pending(), b"PING\n");

        let mut buf = [0xAAu8; 16];
        let len = wire.recv_line(&mut buf).unwrap();
        assert_eq!(len, 4);
        assert_eq!(&buf[..5], b"PING\0");
        assert!(wire.get_ref().pending().is_empty());
    }

    #[test]
    fn test_empty_line_sends_only_delimiter() {
        let mut wire = Wire::new(Loopback::new());
        wire.send_line("").unwrap();
        assert_eq!(wire.get_ref().pending(), b"\n");
        assert_eq!(wire.recv_line_string(8).unwrap(), "");
    }

    #[test]
    fn test_long_line_truncated_at_capacity_minus_one() {
        let mut wire = Wire::new(Loopback::new());
        wire.send_line("abcdefghij").unwrap();

        let mut buf = [0xAAu8; 5];
        let len = wire.recv_line(&mut buf).unwrap();
        assert_eq!(len, 4);
        assert_eq!(&buf, b"abcd\0");
        // `e` landed in the terminator slot and is gone; the rest stays.
        assert_eq!(wire.get_ref().pending(), b"fghij\n");
    }

    #[test]
    fn test_line_exactly_filling_buffer_consumes_delimiter() {
        let mut wire = Wire::new(Loopback::new());
        wire.send_line("abcd").unwrap();
        wire.send_line("next").unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(wire.recv_line(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd\0");
        assert_eq!(wire.recv_line_string(5).unwrap(), "next");
    }

    #[test]
    fn test_every_non_delimiter_byte_survives_a_line() {
        const CAP: usize = 16;
        for byte in (0..=u8::MAX).filter(|&b| b != LINE_DELIMITER) {
            for len in [0, CAP - 2, CAP - 1] {
                let line = vec![byte; len];
                let mut wire = Wire::new(Loopback::chunked(3));
                wire.send_line(&line).unwrap();

                let mut buf = [0xEEu8; CAP];
                let got = wire.recv_line(&mut buf).unwrap();
                assert_eq!(got, len, "byte {byte:#04x}, len {len}");
                assert_eq!(&buf[..len], &line[..], "byte {byte:#04x}, len {len}");
                assert_eq!(buf[len], 0, "byte {byte:#04x}, len {len}");
                assert!(wire.get_ref().pending().is_empty());
            }
        }
    }

    #[test]
    fn test_mixed_binary_line_round_trip() {
        let line: Vec<u8> = (0..=u8::MAX).filter(|&b| b != LINE_DELIMITER).collect();
        let mut wire = Wire::new(Loopback::new());
        wire.send_line(&line).unwrap();

        let mut buf = vec![0u8; line.len() + 1];
        assert_eq!(wire.recv_line(&mut buf).unwrap(), line.len());
        assert_eq!(&buf[..line.len()], &line[..]);
        assert_eq!(buf[line.len()], 0);
    }

    #[test]
    fn test_embedded_newline_rejected() {
        let mut wire = Wire::new(Loopback::new());
        let err = wire.send_line("two\nlines").unwrap_err();
        assert!(matches!(err, WireError::EmbeddedNewline));
        assert!(wire.get_ref().pending().is_empty());
    }

    #[test]
    fn test_zero_capacity_buffer_rejected() {
        let mut wire = Wire::new(Loopback::new());
        wire.send_line("x").unwrap();
        let err = wire.recv_line(&mut []).unwrap_err();
        assert!(matches!(err, WireError::EmptyBuffer));
    }

    #[test]
    fn test_recv_on_closed_stream_reports_closed() {
        let mut wire = Wire::new(Loopback::new());
        assert!(matches!(wire.recv_line_string(8), Err(WireError::Closed)));

        wire.get_mut().queue.extend([0u8; 5]);
        let mut out = [0.0f64; 1];
        assert!(matches!(wire.recv_f64s(&mut out), Err(WireError::Closed)));
    }

    #[test]
    fn test_f64_array_is_big_endian_on_the_wire() {
        let mut wire = Wire::new(Loopback::new());
        wire.send_f64s(&[1.0, -3.25]).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&[0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&(-3.25f64).to_be_bytes());
        assert_eq!(wire.get_ref().pending(), expected);
    }

    #[test]
    fn test_i32_array_is_big_endian_on_the_wire() {
        let mut wire = Wire::new(Loopback::new());
        wire.send_i32s(&[1, -2]).unwrap();
        assert_eq!(
            wire.get_ref().pending(),
            vec![0, 0, 0, 1, 0xFF, 0xFF, 0xFF, 0xFE]
        );
        assert_eq!(wire.recv_i32_vec(2).unwrap(), vec![1, -2]);
    }

    #[test]
    fn test_short_reads_still_deliver_whole_arrays() {
        let values = [1.0, 2.5, -3.25, f64::MAX, -0.0, f64::from_bits(0x7FF8_0000_0000_0001)];
        let mut wire = Wire::new(Loopback::chunked(3));
        wire.send_f64s(&values).unwrap();

        let got = wire.recv_f64_vec(values.len()).unwrap();
        let got_bits: Vec<u64> = got.iter().map(|v| v.to_bits()).collect();
        let want_bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
        assert_eq!(got_bits, want_bits);
    }

    #[test]
    fn test_line_then_array_split_exactly_at_delimiter() {
        let mut wire = Wire::new(Loopback::chunked(64));
        wire.send_line("DARRAY 3").unwrap();
        wire.send_f64s(&[1.0, 2.5, -3.25]).unwrap();
        wire.send_i32s(&[7]).unwrap();

        assert_eq!(wire.recv_line_string(32).unwrap(), "DARRAY 3");
        assert_eq!(wire.recv_f64_vec(3).unwrap(), vec![1.0, 2.5, -3.25]);
        assert_eq!(wire.recv_i32_vec(1).unwrap(), vec![7]);
    }

    #[test]
    fn test_floats_truncated_to_integers() {
        let mut wire = Wire::new(Loopback::new());
        wire.send_i32s_from_f64s(&[1.9, -2.7, 1e12, f64::NAN]).unwrap();
        assert_eq!(wire.recv_i32_vec(4).unwrap(), vec![1, -2, i32::MAX, 0]);
    }

    #[test]
    fn test_empty_array_writes_nothing() {
        let mut wire = Wire::new(Loopback::new());
        wire.send_f64s(&[]).unwrap();
        assert!(wire.get_ref().pending().is_empty());
        assert!(wire.recv_f64_vec(0).unwrap().is_empty());
    }

    #[test]
    fn test_f64_byte_order_conversion_is_an_involution() {
        let patterns = [
            0u64,
            1,
            u64::MAX,
            0x0123_4567_89AB_CDEF,
            0x7FF8_0000_0000_0000,
            (-0.0f64).to_bits(),
            2.5f64.to_bits(),
        ];
        for bits in patterns {
            let x = f64::from_bits(bits);
            assert_eq!(host_to_net_f64(host_to_net_f64(x)).to_bits(), bits);
            assert_eq!(net_to_host_f64(host_to_net_f64(x)).to_bits(), bits);
        }
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn test_f64_conversion_mirrors_bytes_on_little_endian() {
        let x = f64::from_bits(0x0102_0304_0506_0708);
        assert_eq!(host_to_net_f64(x).to_bits(), 0x0807_0605_0403_0201);
    }
}
