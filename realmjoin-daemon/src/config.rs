//! Daemon configuration.

use std::path::PathBuf;

/// Paths and tool locations the daemon operates with.
///
/// Everything can be overridden from the environment (`REALMJOIN_*`) or
/// the command line; the defaults suit a system installation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unix socket the IPC surface listens on.
    pub socket_path: PathBuf,

    /// Directory for transient credential cache files.
    pub runtime_dir: PathBuf,

    /// Directory holding per-provider state files.
    pub state_dir: PathBuf,

    /// The external domain-join tool.
    pub tool_path: PathBuf,

    /// Private client configuration passed to the join tool with `-s`.
    pub tool_conf: PathBuf,

    /// The Kerberos initial-credential tool used for password enrollment.
    pub kinit_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = PathBuf::from("/var/lib/realmjoin");

        Self {
            socket_path: PathBuf::from("/run/realmjoin/realmjoin.sock"),
            runtime_dir: std::env::temp_dir(),
            tool_path: PathBuf::from("net"),
            tool_conf: state_dir.join("net-ads-smb.conf"),
            kinit_path: PathBuf::from("kinit"),
            state_dir,
        }
    }
}

impl Config {
    /// Build a config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let state_dir = env_path("REALMJOIN_STATE_DIR")
            .unwrap_or_else(|| PathBuf::from("/var/lib/realmjoin"));

        Self {
            socket_path: env_path("REALMJOIN_SOCKET")
                .unwrap_or_else(|| PathBuf::from("/run/realmjoin/realmjoin.sock")),
            runtime_dir: env_path("REALMJOIN_RUNTIME_DIR").unwrap_or_else(std::env::temp_dir),
            tool_path: env_path("REALMJOIN_TOOL").unwrap_or_else(|| PathBuf::from("net")),
            tool_conf: env_path("REALMJOIN_TOOL_CONF")
                .unwrap_or_else(|| state_dir.join("net-ads-smb.conf")),
            kinit_path: env_path("REALMJOIN_KINIT").unwrap_or_else(|| PathBuf::from("kinit")),
            state_dir,
        }
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name).map(PathBuf::from)
}
