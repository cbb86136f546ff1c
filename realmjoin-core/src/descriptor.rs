//! Realm descriptors and discovery result maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Discovery result map keys exposed to callers.
pub const DISCOVERY_TYPE: &str = "type";
pub const DISCOVERY_DOMAIN: &str = "domain";
pub const DISCOVERY_SERVERS: &str = "kerberos-servers";
pub const DISCOVERY_REALM: &str = "kerberos-realm";

/// Identity of a discoverable, enrollable realm.
///
/// The discovery map is replaced wholesale whenever discovery re-runs,
/// never merged field by field. Enrollment state is derived from external
/// truth (presence of a persisted config section), not stored lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmDescriptor {
    /// Canonical lowercase validated domain name.
    pub name: String,

    /// Key/value discovery results (`type`, `domain`, `kerberos-servers`,
    /// `kerberos-realm`).
    pub discovery: BTreeMap<String, String>,

    /// Whether a persisted config section existed for this realm when the
    /// provider started.
    pub configured: bool,
}

impl RealmDescriptor {
    /// Create a descriptor with no discovery data yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            discovery: BTreeMap::new(),
            configured: false,
        }
    }

    /// Replace the discovery map wholesale.
    pub fn set_discovery(&mut self, discovery: BTreeMap<String, String>) {
        self.discovery = discovery;
    }
}

/// Disambiguating options passed to discovery.
///
/// Providers use the software filter to decide whether they are a
/// candidate responder at all; a non-matching provider completes
/// immediately with no candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverOptions {
    /// Identifier of the client/server software the caller wants, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
}

impl DiscoverOptions {
    /// Whether a provider with the given software identifier should
    /// attempt discovery under these options.
    pub fn matches_software(&self, identifier: &str) -> bool {
        match &self.software {
            Some(wanted) => wanted == identifier,
            None => true,
        }
    }
}
