//! simbridge demo server.
//!
//! Listens on a filesystem socket or TCP port and serves the echo protocol
//! (see [`simbridge::echo`]) in one forked worker per connection.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use simbridge::{echo, ServerConfig};

// CLI
#[derive(Parser)]
#[command(name = "simbridge")]
#[command(version)]
#[command(about = "Socket bridge serving one forked simulation worker per connection")]
struct Cli {
    /// TCP port to listen on (overrides SIMBRIDGE_PORT)
    #[arg(long, conflicts_with = "socket")]
    port: Option<u16>,
    /// Filesystem socket path to listen on (overrides SIMBRIDGE_SOCKNAME)
    #[arg(long)]
    socket: Option<PathBuf>,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        match (&self.socket, self.port) {
            (Some(path), _) => ServerConfig::path(path),
            (None, Some(port)) => ServerConfig::tcp(port),
            (None, None) => ServerConfig::resolve(),
        }
    }
}

fn main() -> Result<()> {
    // Workers' stdout is the client socket, so logs must stay on stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = cli.server_config();

    let worker = simbridge::serve_or_exit(&config);
    log::info!(
        "[worker {}] Session #{} with {}",
        std::process::id(),
        worker.sequence(),
        worker.peer()
    );

    let handled = echo::run(&mut worker.wire())?;
    log::info!(
        "[worker {}] Session #{} ended after {handled} requests",
        std::process::id(),
        worker.sequence()
    );
    Ok(())
}
