use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use adbd::{Daemon, DaemonConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "adbd";

#[derive(Parser)]
#[command(name = APP_NAME, version, about = "Packet-multiplexing debug bridge daemon")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:5037")]
    listen: SocketAddr,

    /// Require the CNXN/AUTH handshake to complete before a transport is
    /// promoted out of `Connecting`.
    #[arg(long)]
    require_auth: bool,

    /// Override the trusted-host-key store path (only consulted with
    /// `--require-auth`).
    #[arg(long)]
    keys_path: Option<PathBuf>,

    #[arg(long, default_value = "adbd")]
    product: String,

    #[arg(long, default_value = "generic")]
    model: String,

    #[arg(long, default_value = "generic")]
    device: String,

    /// Refuse `sink:`/`source:` service requests with a policy error instead
    /// of running them.
    #[arg(long)]
    locked: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let keys_path = args.keys_path.unwrap_or_else(|| DaemonConfig::default_keys_path(APP_NAME));

    if args.require_auth {
        tracing::warn!(
            "--require-auth is set, but this build has no signature verifier wired in; \
             presented host keys will be recorded but can never complete the handshake"
        );
    }

    let config = DaemonConfig {
        listen_addr: args.listen,
        require_auth: args.require_auth,
        keys_path,
        product: args.product,
        model: args.model,
        device: args.device,
        locked: args.locked,
    };

    let daemon = Daemon::new(config);
    match daemon.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "daemon exited with an error");
            ExitCode::FAILURE
        }
    }
}
