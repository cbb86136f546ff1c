//! Test harness for realm workflow E2E tests.
//!
//! Everything privileged is replaced at the trait seams: a scripted
//! command runner instead of real subprocesses, a static credential
//! authority instead of kinit, and an allow-all policy where the test is
//! not about authorization.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use realmjoin_core::{descriptor, domain_has_suffix, normalize_domain_name, DiscoverOptions};

use realmjoin_daemon::authz::{AuthorizationPolicy, Peer};
use realmjoin_daemon::caller::CallerHandle;
use realmjoin_daemon::command::{CommandOutput, CommandRunner};
use realmjoin_daemon::config::Config;
use realmjoin_daemon::credentials::{AdminCredentials, CredentialAuthority};
use realmjoin_daemon::ipc::handle_connection;
use realmjoin_daemon::lock::ActionLock;
use realmjoin_daemon::provider::{Discovered, Provider};
use realmjoin_daemon::realm::{RealmBackend, RealmCache, RealmObject};
use realmjoin_daemon::service::{Deps, ServiceState};
use realmjoin_daemon::store::RealmStore;

// ============================================================================
// Command runners
// ============================================================================

/// One recorded tool invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl RecordedCall {
    /// Stage arguments after the `<tool> -s <conf>` prefix.
    pub fn stage(&self) -> Vec<&str> {
        self.argv.iter().skip(3).map(String::as_str).collect()
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

type Script = dyn Fn(&[&str]) -> anyhow::Result<CommandOutput> + Send + Sync;

/// Runner driven by a script keyed on the stage arguments, recording
/// every invocation it sees.
pub struct ScriptedRunner {
    script: Box<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    pub fn new(
        script: impl Fn(&[&str]) -> anyhow::Result<CommandOutput> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// A runner where every stage succeeds with empty output.
    pub fn all_ok() -> Arc<Self> {
        Self::new(|_stage| Ok(ok_output("")))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        argv: &[String],
        env: &[(String, String)],
        _caller: &CallerHandle,
    ) -> anyhow::Result<CommandOutput> {
        self.calls.lock().unwrap().push(RecordedCall {
            argv: argv.to_vec(),
            env: env.to_vec(),
        });

        let stage: Vec<&str> = argv.iter().skip(3).map(String::as_str).collect();
        (self.script)(&stage)
    }
}

pub fn ok_output(output: &str) -> CommandOutput {
    CommandOutput {
        status: 0,
        output: output.to_string(),
    }
}

pub fn failed_output(output: &str) -> CommandOutput {
    CommandOutput {
        status: 1,
        output: output.to_string(),
    }
}

/// Runner that parks on each invocation until released, so tests can
/// observe in-flight operations.
pub struct StalledRunner {
    pub entered: Arc<tokio::sync::Notify>,
    pub release: Arc<tokio::sync::Notify>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl StalledRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Arc::new(tokio::sync::Notify::new()),
            release: Arc::new(tokio::sync::Notify::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for StalledRunner {
    async fn run(
        &self,
        argv: &[String],
        env: &[(String, String)],
        _caller: &CallerHandle,
    ) -> anyhow::Result<CommandOutput> {
        self.calls.lock().unwrap().push(RecordedCall {
            argv: argv.to_vec(),
            env: env.to_vec(),
        });
        self.entered.notify_one();
        self.release.notified().await;
        // Re-arm the release permit so that, once released, later
        // invocations in the same pipeline pass straight through.
        self.release.notify_one();
        Ok(ok_output(""))
    }
}

// ============================================================================
// Credential authority and policies
// ============================================================================

/// Authority that hands back fixed cache bytes for any password.
pub struct StaticAuthority(pub Vec<u8>);

#[async_trait]
impl CredentialAuthority for StaticAuthority {
    async fn acquire(&self, _principal: &str, _password: &str) -> Result<Vec<u8>, String> {
        Ok(self.0.clone())
    }
}

pub struct AllowAllPolicy;

impl AuthorizationPolicy for AllowAllPolicy {
    fn check(&self, _peer: &Peer, _action_id: &str) -> bool {
        true
    }
}

pub struct DenyAllPolicy;

impl AuthorizationPolicy for DenyAllPolicy {
    fn check(&self, _peer: &Peer, _action_id: &str) -> bool {
        false
    }
}

// ============================================================================
// The daemon harness
// ============================================================================

/// A daemon's realm machinery wired against test doubles.
pub struct TestDaemon {
    pub deps: Arc<Deps>,
    pub store: Arc<RealmStore>,
    pub cache: RealmCache,
    pub dir: PathBuf,
}

impl TestDaemon {
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "realmjoin-e2e-{:x}",
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).expect("Failed to create scratch dir");

        let config = Config {
            socket_path: dir.join("realmjoin.sock"),
            runtime_dir: dir.clone(),
            state_dir: dir.clone(),
            tool_path: PathBuf::from("net"),
            tool_conf: dir.join("net-ads-smb.conf"),
            kinit_path: PathBuf::from("kinit"),
        };

        let deps = Arc::new(Deps {
            config: Arc::new(config),
            lock: ActionLock::new(),
            runner,
            authority: Arc::new(StaticAuthority(b"test ticket".to_vec())),
        });

        let store = Arc::new(RealmStore::load(dir.join("active-directory.conf")));
        let cache = RealmCache::new(RealmBackend::DomainJoin, deps.clone(), store.clone());

        Self {
            deps,
            store,
            cache,
            dir,
        }
    }

    pub fn realm(&self, name: &str) -> Arc<RealmObject> {
        self.cache.lookup_or_register(name)
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Credentials that skip the password exchange entirely.
pub fn cache_credentials() -> AdminCredentials {
    AdminCredentials::CredentialCache(b"test ticket".to_vec())
}

/// The `conf list` output a successful join produces.
pub fn sample_conf_list() -> CommandOutput {
    ok_output(
        "[global]\n\trealm = CORP.EXAMPLE.COM\n\tworkgroup = CORP\n\tsecurity = ads\n",
    )
}

// ============================================================================
// Discovery provider double
// ============================================================================

/// Provider that answers for exactly one domain, after an optional delay.
pub struct StaticProvider {
    software: String,
    domain: String,
    relevance: i32,
    delay: Duration,
    cache: RealmCache,
}

impl StaticProvider {
    pub fn new(
        daemon: &TestDaemon,
        software: &str,
        domain: &str,
        relevance: i32,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            software: software.to_string(),
            domain: domain.to_string(),
            relevance,
            delay,
            cache: RealmCache::new(
                RealmBackend::DomainJoin,
                daemon.deps.clone(),
                daemon.store.clone(),
            ),
        })
    }

    /// Register the provider's realm up front, as a provider restoring
    /// persisted state at startup would.
    pub fn register_realm(&self) -> Arc<RealmObject> {
        self.cache.lookup_or_register(&self.domain)
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        "StaticTestProvider"
    }

    fn software_identifier(&self) -> &str {
        &self.software
    }

    fn lookup_realm(&self, name: &str) -> Option<Arc<RealmObject>> {
        self.cache.lookup(name)
    }

    async fn discover(&self, input: &str, options: &DiscoverOptions) -> Option<Discovered> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if !options.matches_software(&self.software) {
            return None;
        }

        // Answers for its domain and any subdomain of it, but always
        // registers the realm at its own apex.
        let domain = normalize_domain_name(input)?;
        if !domain_has_suffix(&domain, &self.domain) {
            return None;
        }

        let realm = self.cache.lookup_or_register(&self.domain);
        let mut details = BTreeMap::new();
        details.insert(descriptor::DISCOVERY_TYPE.to_string(), "kerberos".to_string());
        details.insert(descriptor::DISCOVERY_DOMAIN.to_string(), domain.clone());
        details.insert(
            descriptor::DISCOVERY_REALM.to_string(),
            domain.to_uppercase(),
        );
        details.insert(
            descriptor::DISCOVERY_SERVERS.to_string(),
            "10.0.0.1:88".to_string(),
        );
        realm.set_discovery(details);

        Some(Discovered {
            realm,
            relevance: self.relevance,
        })
    }
}

// ============================================================================
// IPC helpers
// ============================================================================

/// Bind a socket in the daemon's scratch dir and serve exactly one
/// connection with the given state.
pub async fn spawn_one_shot_server(daemon: &TestDaemon, state: Arc<ServiceState>) -> PathBuf {
    let path = daemon.dir.join("realmjoin.sock");
    let listener = tokio::net::UnixListener::bind(&path).expect("Failed to bind test socket");

    tokio::spawn(async move {
        if let Ok((stream, _addr)) = listener.accept().await {
            let _ = handle_connection(stream, state).await;
        }
    });

    path
}
