//! Shared dependencies and top-level service state.

use std::sync::Arc;

use crate::authz::AuthorizationPolicy;
use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::Config;
use crate::credentials::{CredentialAuthority, KinitAuthority};
use crate::lock::ActionLock;
use crate::provider::DiscoveryEngine;

/// Dependencies every privileged operation runs against.
pub struct Deps {
    pub config: Arc<Config>,
    pub lock: ActionLock,
    pub runner: Arc<dyn CommandRunner>,
    pub authority: Arc<dyn CredentialAuthority>,
}

impl Deps {
    /// Production wiring: real subprocesses, real kinit.
    pub fn system(config: Arc<Config>) -> Arc<Self> {
        let authority = KinitAuthority::new(
            config.kinit_path.clone(),
            config.runtime_dir.clone(),
        );

        Arc::new(Self {
            config,
            lock: ActionLock::new(),
            runner: Arc::new(SystemCommandRunner),
            authority: Arc::new(authority),
        })
    }
}

/// Everything a connection handler needs.
pub struct ServiceState {
    pub deps: Arc<Deps>,
    pub engine: DiscoveryEngine,
    pub policy: Arc<dyn AuthorizationPolicy>,
}
