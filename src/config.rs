//! Server configuration.
//!
//! The bind address is resolved once at startup and then passed explicitly
//! to the listener; nothing downstream reads the environment again.
//!
//! Environment variables:
//! - `SIMBRIDGE_SOCKNAME` - when set (and non-empty), listen on this
//!   filesystem socket path
//! - `SIMBRIDGE_PORT` - TCP port used when no socket path is given
//!   (default `3490`)

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable selecting a filesystem socket path.
pub const SOCKNAME_ENV_VAR: &str = "SIMBRIDGE_SOCKNAME";

/// Environment variable selecting the TCP port.
pub const PORT_ENV_VAR: &str = "SIMBRIDGE_PORT";

/// Port used when neither a path nor a port is configured.
pub const DEFAULT_PORT: u16 = 3490;

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    /// TCP on the IPv4 wildcard address.
    Tcp {
        /// Port to bind.
        port: u16,
    },
    /// Unix domain socket at a filesystem path.
    Path(PathBuf),
}

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind mode and address.
    pub bind: Bind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::tcp(DEFAULT_PORT)
    }
}

impl ServerConfig {
    /// Listen on a TCP port.
    pub fn tcp(port: u16) -> Self {
        Self {
            bind: Bind::Tcp { port },
        }
    }

    /// Listen on a filesystem socket.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            bind: Bind::Path(path.into()),
        }
    }

    /// Resolve from the process environment.
    pub fn resolve() -> Self {
        Self::resolve_with(|key| std::env::var_os(key))
    }

    /// Resolve from an arbitrary variable lookup.
    ///
    /// A socket path wins over any port and is taken byte for byte, valid
    /// UTF-8 or not. A port that does not parse falls back to
    /// [`DEFAULT_PORT`] with a warning. Never fails.
    pub fn resolve_with(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        if let Some(path) = lookup(SOCKNAME_ENV_VAR).filter(|p| !p.is_empty()) {
            return Self::path(PathBuf::from(path));
        }

        let port = match lookup(PORT_ENV_VAR) {
            Some(raw) => raw
                .to_str()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or_else(|| {
                    log::warn!("Ignoring invalid {PORT_ENV_VAR}={raw:?}, using {DEFAULT_PORT}");
                    DEFAULT_PORT
                }),
            None => DEFAULT_PORT,
        };
        Self::tcp(port)
    }

    /// Socket path, when in path mode.
    pub fn socket_path(&self) -> Option<&Path> {
        match &self.bind {
            Bind::Path(path) => Some(path),
            Bind::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bind {
            Bind::Tcp { port } => write!(f, "tcp port {port}"),
            Bind::Path(path) => write!(f, "path {}", path.display()),
        }
    }
}
