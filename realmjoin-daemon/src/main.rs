//! Daemon entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use realmjoin_daemon::authz::PeerUidPolicy;
use realmjoin_daemon::config::Config;
use realmjoin_daemon::ipc::handle_connection;
use realmjoin_daemon::provider::DiscoveryEngine;
use realmjoin_daemon::providers::ad::ActiveDirectoryProvider;
use realmjoin_daemon::service::{Deps, ServiceState};
use realmjoin_daemon::store::RealmStore;

#[derive(Parser)]
#[command(
    name = "realmjoin-daemon",
    about = "Discovers, joins and leaves network identity realms",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Serve {
        /// Unix socket to listen on.
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { socket } => serve(socket).await,
    }
}

async fn serve(socket: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = Config::from_env();
    if let Some(socket) = socket {
        config.socket_path = socket;
    }
    let config = Arc::new(config);

    let deps = Deps::system(config.clone());
    let store = Arc::new(RealmStore::load(
        config.state_dir.join("active-directory.conf"),
    ));

    let mut engine = DiscoveryEngine::new();
    engine.register(Arc::new(ActiveDirectoryProvider::new(deps.clone(), store)));

    let state = Arc::new(ServiceState {
        deps,
        engine,
        policy: Arc::new(PeerUidPolicy::root_only()),
    });

    let listener = bind_socket(&config.socket_path)?;
    tracing::info!(socket = %config.socket_path.display(), "Listening");

    let mut sigterm = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sigterm.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, state).await {
                            tracing::warn!(error = %err, "Connection failed");
                        }
                    });
                }
                Err(err) => tracing::warn!(error = %err, "Accept failed"),
            },
        }
    }

    tracing::info!("Shutting down");
    let _ = std::fs::remove_file(&config.socket_path);
    Ok(())
}

fn bind_socket(path: &std::path::Path) -> anyhow::Result<UnixListener> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    // A stale socket from an unclean shutdown blocks the bind.
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(socket = %path.display(), "Removed stale socket"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("removing stale {}", path.display()))
        }
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("binding {}", path.display()))?;

    // Discovery is open to all local users; privileged methods are gated
    // by peer credentials, not socket permissions.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))
        .with_context(|| format!("setting permissions on {}", path.display()))?;

    Ok(listener)
}
