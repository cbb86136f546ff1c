//! Realm objects and the per-name realm cache.
//!
//! One `RealmObject` exists per realm name for the life of the daemon.
//! Providers register realms in a `RealmCache`, so repeated discovery of
//! the same name always hands back the identical object.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use realmjoin_core::{RealmDescriptor, RealmError};

use crate::caller::CallerHandle;
use crate::credentials::{materialize, resolve, AdminCredentials};
use crate::join::JoinOperation;
use crate::service::Deps;
use crate::store::RealmStore;

/// Which workflow backend a realm dispatches to.
///
/// Tagged dispatch next to trait-based provider polymorphism: providers
/// vary independently, but realm workflows are a small closed set and a
/// match at the call site keeps the stage sequencing in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealmBackend {
    /// Full domain membership through the external domain tool.
    DomainJoin,
}

/// A single network identity realm known to this daemon.
pub struct RealmObject {
    name: String,
    backend: RealmBackend,
    descriptor: RwLock<RealmDescriptor>,
    deps: Arc<Deps>,
    store: Arc<RealmStore>,
}

impl RealmObject {
    pub fn new(
        name: &str,
        backend: RealmBackend,
        deps: Arc<Deps>,
        store: Arc<RealmStore>,
    ) -> Arc<Self> {
        let configured = store.has_section(name);
        let mut descriptor = RealmDescriptor::new(name);
        descriptor.configured = configured;

        Arc::new(Self {
            name: name.to_string(),
            backend,
            descriptor: RwLock::new(descriptor),
            deps,
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current descriptor.
    pub fn descriptor(&self) -> RealmDescriptor {
        self.descriptor.read().unwrap().clone()
    }

    /// Replace the discovery details wholesale with fresh results.
    pub fn set_discovery(
        &self,
        details: std::collections::BTreeMap<String, String>,
    ) {
        self.descriptor.write().unwrap().set_discovery(details);
    }

    pub fn is_configured(&self) -> bool {
        self.descriptor.read().unwrap().configured
    }

    /// Enroll this host in the realm.
    ///
    /// Credentials are resolved before the action lock is taken, so
    /// invalid input and failed authentication never contend with a
    /// running action; a busy rejection happens before the daemon does
    /// any file I/O of its own.
    pub async fn enroll(
        &self,
        credentials: AdminCredentials,
        caller: CallerHandle,
    ) -> Result<(), RealmError> {
        let bytes = resolve(self.deps.authority.as_ref(), credentials, &caller).await?;

        let Some(_permit) = self.deps.lock.try_lock() else {
            return Err(RealmError::busy());
        };

        let ccache = materialize(&self.deps.config.runtime_dir, &bytes, &caller)?;

        tracing::info!(realm = %self.name, "Enrolling machine in realm");
        let op = JoinOperation::new(&self.name, ccache, caller.clone());
        let result = match self.backend {
            RealmBackend::DomainJoin => op.join(&self.deps).await,
        };

        match result {
            Ok(result_settings) => {
                if let Err(err) = self.store.set_section(&self.name, &result_settings) {
                    caller.error(format!("Couldn't save realm configuration: {:#}", err));
                    return Err(RealmError::EnrollFailed(
                        "Failed to enroll machine in realm. See diagnostics.".into(),
                    ));
                }
                self.descriptor.write().unwrap().configured = true;
                caller.info("Successfully enrolled machine in realm");
                Ok(())
            }
            Err(err) => Err(terminal_error(err, &caller, || {
                RealmError::EnrollFailed(
                    "Failed to enroll machine in realm. See diagnostics.".into(),
                )
            })),
        }
    }

    /// Remove this host from the realm.
    pub async fn unenroll(
        &self,
        credentials: AdminCredentials,
        caller: CallerHandle,
    ) -> Result<(), RealmError> {
        let bytes = resolve(self.deps.authority.as_ref(), credentials, &caller).await?;

        let Some(_permit) = self.deps.lock.try_lock() else {
            return Err(RealmError::busy());
        };

        let ccache = materialize(&self.deps.config.runtime_dir, &bytes, &caller)?;

        tracing::info!(realm = %self.name, "Unenrolling machine from realm");
        let op = JoinOperation::new(&self.name, ccache, caller.clone());
        let result = match self.backend {
            RealmBackend::DomainJoin => op.leave(&self.deps).await,
        };

        match result {
            Ok(()) => {
                if let Err(err) = self.store.remove_section(&self.name) {
                    caller.error(format!("Couldn't save realm configuration: {:#}", err));
                    return Err(RealmError::UnenrollFailed(
                        "Failed to unenroll machine from domain. See diagnostics.".into(),
                    ));
                }
                self.descriptor.write().unwrap().configured = false;
                caller.info("Successfully unenrolled machine from realm");
                Ok(())
            }
            Err(err) => Err(terminal_error(err, &caller, || {
                RealmError::UnenrollFailed(
                    "Failed to unenroll machine from domain. See diagnostics.".into(),
                )
            })),
        }
    }
}

/// Apply the terminal error protocol: realm-domain errors travel to the
/// caller as-is, anything else is recorded in full on the diagnostics
/// stream and replaced with a generic classified error.
fn terminal_error(
    err: anyhow::Error,
    caller: &CallerHandle,
    generic: impl FnOnce() -> RealmError,
) -> RealmError {
    match err.downcast::<RealmError>() {
        Ok(realm_err) => realm_err,
        Err(other) => {
            caller.error(format!("{:#}", other));
            generic()
        }
    }
}

/// Maps realm names to their unique realm objects.
pub struct RealmCache {
    backend: RealmBackend,
    deps: Arc<Deps>,
    store: Arc<RealmStore>,
    realms: Mutex<HashMap<String, Arc<RealmObject>>>,
}

impl RealmCache {
    pub fn new(backend: RealmBackend, deps: Arc<Deps>, store: Arc<RealmStore>) -> Self {
        Self {
            backend,
            deps,
            store,
            realms: Mutex::new(HashMap::new()),
        }
    }

    /// Return the realm object for `name`, creating it on first sight.
    /// Registration is idempotent.
    pub fn lookup_or_register(&self, name: &str) -> Arc<RealmObject> {
        let mut realms = self.realms.lock().unwrap();
        if let Some(realm) = realms.get(name) {
            return realm.clone();
        }

        tracing::debug!(realm = %name, "Registering realm");
        let realm = RealmObject::new(name, self.backend, self.deps.clone(), self.store.clone());
        realms.insert(name.to_string(), realm.clone());
        realm
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<RealmObject>> {
        self.realms.lock().unwrap().get(name).cloned()
    }
}
