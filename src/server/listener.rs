//! Listening endpoint creation and connection acceptance.
//!
//! Both listener kinds are created through [`crate::sys`] so they share the
//! fixed backlog of 5; TCP additionally sets `SO_REUSEADDR`.

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::OwnedFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{Bind, ServerConfig};
use crate::sys;

/// Conservative `sun_path` limit (104 on macOS, 108 on Linux).
const MAX_SOCKET_PATH: usize = 104;

/// Address-bound endpoint accepting successive connections.
///
/// Owned by the acceptor for the whole server lifetime. Dropping it closes
/// the descriptor but never unlinks the socket file: workers drop their copy
/// right after fork and must not remove the server's filesystem entry.
#[derive(Debug)]
pub enum Listener {
    /// TCP listener on the IPv4 wildcard address.
    Tcp(TcpListener),
    /// Unix domain socket listener.
    Path {
        /// The bound listener.
        listener: UnixListener,
        /// Filesystem path of the socket.
        path: PathBuf,
    },
}

/// One accepted peer conversation.
#[derive(Debug)]
pub enum Connection {
    /// Accepted TCP stream.
    Tcp(TcpStream),
    /// Accepted Unix stream.
    Unix(UnixStream),
}

impl From<Connection> for OwnedFd {
    fn from(conn: Connection) -> Self {
        match conn {
            Connection::Tcp(stream) => stream.into(),
            Connection::Unix(stream) => stream.into(),
        }
    }
}

/// Who is on the other end of an accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    /// Remote TCP address.
    Tcp(SocketAddr),
    /// Local Unix-socket client (unnamed).
    Local,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Tcp(addr) => write!(f, "{addr}"),
            Peer::Local => f.write_str("local socket"),
        }
    }
}

/// Create the listener selected by `config`.
pub fn listen(config: &ServerConfig) -> Result<Listener> {
    match &config.bind {
        Bind::Tcp { port } => listen_tcp(*port),
        Bind::Path(path) => listen_path(path),
    }
}

/// Listen on TCP `port` on every IPv4 interface.
pub fn listen_tcp(port: u16) -> Result<Listener> {
    let listener = sys::tcp_listener(port)
        .with_context(|| format!("Failed to listen on TCP port {port}"))?;
    let bound = listener.local_addr().map(|a| a.port()).unwrap_or(port);
    log::info!("Server listening on port {bound}");
    Ok(Listener::Tcp(listener))
}

/// Listen on a Unix domain socket at `path`, replacing any stale entry.
pub fn listen_path(path: &Path) -> Result<Listener> {
    let path_len = path.as_os_str().len();
    if path_len >= MAX_SOCKET_PATH {
        anyhow::bail!(
            "Socket path too long ({path_len} bytes, max {}): {}",
            MAX_SOCKET_PATH - 1,
            path.display()
        );
    }

    // Remove stale socket file if it exists
    if path.symlink_metadata().is_ok() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket: {}", path.display()))?;
    }

    let listener = sys::unix_listener(path)
        .with_context(|| format!("Failed to bind socket: {}", path.display()))?;
    log::info!("Server listening on local socket {}", path.display());

    Ok(Listener::Path {
        listener,
        path: path.to_path_buf(),
    })
}

impl Listener {
    /// Block until the next connection arrives.
    pub fn accept(&self) -> io::Result<(Connection, Peer)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept()?;
                Ok((Connection::Tcp(stream), Peer::Tcp(addr)))
            }
            Listener::Path { listener, .. } => {
                let (stream, _addr) = listener.accept()?;
                Ok((Connection::Unix(stream), Peer::Local))
            }
        }
    }

    /// Bound TCP port, for TCP listeners.
    pub fn local_port(&self) -> Option<u16> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok().map(|a| a.port()),
            Listener::Path { .. } => None,
        }
    }

    /// Socket path, for path listeners.
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Listener::Tcp(_) => None,
            Listener::Path { path, .. } => Some(path),
        }
    }
}
