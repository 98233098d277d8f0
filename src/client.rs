//! Client-side connector for numeric hosts.
//!
//! Opens a connection to a bridge server (TCP or filesystem socket), or
//! spawns a simulation locally and talks to its stdin/stdout pipes, then
//! exposes the codec surface of [`Wire`].
//!
//! # Failure model
//!
//! There is no retry and no partially connected state. Every failure, at
//! connect time or on the wire, is first handed to the client's
//! [`Escalate`] implementation (the host runtime's fatal-error channel) and
//! then returned. The connector never terminates the host process itself.
//!
//! ```rust,ignore
//! let mut client = Client::connect_path("/tmp/sim.sock")?;
//! client.send_line("DARRAY 3")?;
//! client.send_f64s(&[1.0, 2.5, -3.25])?;
//! let echoed = client.recv_f64_vec(3)?;
//! client.close()?;
//! ```

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use thiserror::Error;

use crate::wire::{Wire, WireError};

/// Fatal client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Host name did not resolve to any address.
    #[error("unknown host {host}")]
    Resolve {
        /// Host name as given.
        host: String,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// The connection attempt failed.
    #[error("connect to {target} failed")]
    Connect {
        /// Address or path that was dialled.
        target: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The local simulation process could not be started.
    #[error("spawn {command} failed")]
    Spawn {
        /// Program that was launched.
        command: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Releasing the connection or reaping the local process failed.
    #[error("close failed")]
    Close(#[source] io::Error),
    /// A codec operation failed on the established connection.
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// The host runtime's channel for fatal conditions.
pub trait Escalate {
    /// Report a fatal condition. The failing call still returns the error.
    fn escalate(&self, err: &ClientError);
}

/// Default escalation: log at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEscalation;

impl Escalate for LogEscalation {
    fn escalate(&self, err: &ClientError) {
        match std::error::Error::source(err) {
            Some(cause) => log::error!("[client] {err}: {cause}"),
            None => log::error!("[client] {err}"),
        }
    }
}

/// Transport under a [`Client`].
#[derive(Debug)]
pub enum Endpoint {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix domain socket connection.
    Unix(UnixStream),
    /// Pipes to a locally spawned simulation.
    Process {
        /// The simulation process.
        child: Child,
        /// Its standard input.
        stdin: ChildStdin,
        /// Its standard output.
        stdout: ChildStdout,
    },
}

impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Endpoint::Tcp(s) => s.read(buf),
            Endpoint::Unix(s) => s.read(buf),
            Endpoint::Process { stdout, .. } => stdout.read(buf),
        }
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Endpoint::Tcp(s) => s.write(buf),
            Endpoint::Unix(s) => s.write(buf),
            Endpoint::Process { stdin, .. } => stdin.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Endpoint::Tcp(s) => s.flush(),
            Endpoint::Unix(s) => s.flush(),
            Endpoint::Process { stdin, .. } => stdin.flush(),
        }
    }
}

impl Endpoint {
    /// Release the transport.
    ///
    /// For a spawned process the pipes are closed first, then the process is
    /// killed and waited for.
    fn close(self) -> io::Result<()> {
        match self {
            Endpoint::Tcp(_) | Endpoint::Unix(_) => Ok(()),
            Endpoint::Process {
                mut child,
                stdin,
                stdout,
            } => {
                drop(stdin);
                drop(stdout);
                match child.kill() {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                    Err(e) => return Err(e),
                }
                child.wait().map(|_| ())
            }
        }
    }
}

/// Hand `err` to the escalation channel and give it back.
fn escalated<E: Escalate>(escalation: &E, err: impl Into<ClientError>) -> ClientError {
    let err = err.into();
    escalation.escalate(&err);
    err
}

/// Connection from a numeric host to one simulation session.
#[derive(Debug)]
pub struct Client<E: Escalate = LogEscalation> {
    wire: Wire<Endpoint>,
    escalation: E,
}

impl Client {
    /// Connect over TCP, escalating failures to the log.
    pub fn connect_tcp(host: &str, port: u16) -> Result<Self, ClientError> {
        Self::connect_tcp_with(host, port, LogEscalation)
    }

    /// Connect to a filesystem socket, escalating failures to the log.
    pub fn connect_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        Self::connect_path_with(path, LogEscalation)
    }

    /// Spawn a local simulation and talk to it over pipes.
    pub fn spawn(command: &mut Command) -> Result<Self, ClientError> {
        Self::spawn_with(command, LogEscalation)
    }
}

impl<E: Escalate> Client<E> {
    /// Resolve `host`, then connect to the first of its addresses that
    /// accepts at `port`.
    pub fn connect_tcp_with(host: &str, port: u16, escalation: E) -> Result<Self, ClientError> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .and_then(|addrs| {
                let addrs: Vec<SocketAddr> = addrs.collect();
                if addrs.is_empty() {
                    Err(io::Error::new(io::ErrorKind::NotFound, "no addresses"))
                } else {
                    Ok(addrs)
                }
            })
            .map_err(|source| {
                escalated(
                    &escalation,
                    ClientError::Resolve {
                        host: host.to_string(),
                        source,
                    },
                )
            })?;

        Self::connect_addrs_with(&addrs, &format!("{host}:{port}"), escalation)
    }

    /// Try `addrs` in order; the last failure is reported if none accepts.
    fn connect_addrs_with(
        addrs: &[SocketAddr],
        target: &str,
        escalation: E,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addrs).map_err(|source| {
            escalated(
                &escalation,
                ClientError::Connect {
                    target: target.to_string(),
                    source,
                },
            )
        })?;
        match stream.peer_addr() {
            Ok(addr) => log::debug!("[client] Connected to {addr}"),
            Err(_) => log::debug!("[client] Connected to {target}"),
        }
        Ok(Self::from_endpoint(Endpoint::Tcp(stream), escalation))
    }

    /// Connect to the Unix domain socket at `path`.
    pub fn connect_path_with(path: impl AsRef<Path>, escalation: E) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| {
            escalated(
                &escalation,
                ClientError::Connect {
                    target: path.display().to_string(),
                    source,
                },
            )
        })?;
        log::debug!("[client] Connected to {}", path.display());
        Ok(Self::from_endpoint(Endpoint::Unix(stream), escalation))
    }

    /// Spawn `command` with piped stdin/stdout; stderr is inherited.
    pub fn spawn_with(command: &mut Command, escalation: E) -> Result<Self, ClientError> {
        let program = command.get_program().to_string_lossy().into_owned();
        let spawn_error = |source| ClientError::Spawn {
            command: program.clone(),
            source,
        };

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| escalated(&escalation, spawn_error(e)))?;

        let pipes = child.stdin.take().zip(child.stdout.take());
        let Some((stdin, stdout)) = pipes else {
            let _ = child.kill();
            let _ = child.wait();
            let missing = io::Error::new(io::ErrorKind::BrokenPipe, "child pipes unavailable");
            return Err(escalated(&escalation, spawn_error(missing)));
        };

        log::debug!("[client] Spawned {program} (pid {})", child.id());
        Ok(Self::from_endpoint(
            Endpoint::Process {
                child,
                stdin,
                stdout,
            },
            escalation,
        ))
    }

    fn from_endpoint(endpoint: Endpoint, escalation: E) -> Self {
        Self {
            wire: Wire::new(endpoint),
            escalation,
        }
    }

    /// Swap the escalation channel.
    pub fn with_escalation<F: Escalate>(self, escalation: F) -> Client<F> {
        Client {
            wire: self.wire,
            escalation,
        }
    }

    /// The transport under this client.
    pub fn endpoint(&self) -> &Endpoint {
        self.wire.get_ref()
    }

    /// Release the connection.
    pub fn close(self) -> Result<(), ClientError> {
        let Self { wire, escalation } = self;
        wire.into_inner()
            .close()
            .map_err(|e| escalated(&escalation, ClientError::Close(e)))
    }

    fn check<T>(&self, result: Result<T, WireError>) -> Result<T, ClientError> {
        result.map_err(|e| escalated(&self.escalation, e))
    }

    // ── Codec surface ───────────────────────────────────────────────────────

    /// Send one line. See [`Wire::send_line`].
    pub fn send_line(&mut self, token: impl AsRef<[u8]>) -> Result<(), ClientError> {
        let result = self.wire.send_line(token);
        self.check(result)
    }

    /// Receive one line into `buf`. See [`Wire::recv_line`].
    pub fn recv_line(&mut self, buf: &mut [u8]) -> Result<usize, ClientError> {
        let result = self.wire.recv_line(buf);
        self.check(result)
    }

    /// Receive one line of at most `capacity - 1` bytes as a string.
    pub fn recv_line_string(&mut self, capacity: usize) -> Result<String, ClientError> {
        let result = self.wire.recv_line_string(capacity);
        self.check(result)
    }

    /// Send a float array.
    pub fn send_f64s(&mut self, values: &[f64]) -> Result<(), ClientError> {
        let result = self.wire.send_f64s(values);
        self.check(result)
    }

    /// Send an integer array.
    pub fn send_i32s(&mut self, values: &[i32]) -> Result<(), ClientError> {
        let result = self.wire.send_i32s(values);
        self.check(result)
    }

    /// Send floats as a truncated integer array.
    pub fn send_i32s_from_f64s(&mut self, values: &[f64]) -> Result<(), ClientError> {
        let result = self.wire.send_i32s_from_f64s(values);
        self.check(result)
    }

    /// Fill `out` from a float array on the wire.
    pub fn recv_f64s(&mut self, out: &mut [f64]) -> Result<(), ClientError> {
        let result = self.wire.recv_f64s(out);
        self.check(result)
    }

    /// Fill `out` from an integer array on the wire.
    pub fn recv_i32s(&mut self, out: &mut [i32]) -> Result<(), ClientError> {
        let result = self.wire.recv_i32s(out);
        self.check(result)
    }

    /// Receive `len` floats.
    pub fn recv_f64_vec(&mut self, len: usize) -> Result<Vec<f64>, ClientError> {
        let result = self.wire.recv_f64_vec(len);
        self.check(result)
    }

    /// Receive `len` integers.
    pub fn recv_i32_vec(&mut self, len: usize) -> Result<Vec<i32>, ClientError> {
        let result = self.wire.recv_i32_vec(len);
        self.check(result)
    }
}
