//! The Active Directory provider.
//!
//! Discovery normalizes the input to a domain name, then checks for KDCs
//! by resolving the domain against the Kerberos port. Any realm section
//! already persisted in the provider's state file is registered at
//! startup so previously joined realms exist before any discovery runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use realmjoin_core::{
    descriptor, normalize_domain_name, DiscoverOptions,
};

use crate::provider::{Discovered, Provider};
use crate::realm::{RealmBackend, RealmCache, RealmObject};
use crate::service::Deps;
use crate::store::RealmStore;

pub const SOFTWARE_IDENTIFIER: &str = "active-directory";

/// Ranking weight for a domain with reachable KDCs.
const RELEVANCE_KDC_FOUND: i32 = 30;

pub struct ActiveDirectoryProvider {
    cache: RealmCache,
}

impl ActiveDirectoryProvider {
    pub fn new(deps: Arc<Deps>, store: Arc<RealmStore>) -> Self {
        let cache = RealmCache::new(RealmBackend::DomainJoin, deps, store.clone());
        for name in store.section_names() {
            tracing::info!(realm = %name, "Restoring previously joined realm");
            cache.lookup_or_register(&name);
        }

        Self { cache }
    }
}

#[async_trait]
impl Provider for ActiveDirectoryProvider {
    fn name(&self) -> &str {
        "ActiveDirectory"
    }

    fn software_identifier(&self) -> &str {
        SOFTWARE_IDENTIFIER
    }

    fn lookup_realm(&self, name: &str) -> Option<Arc<RealmObject>> {
        self.cache.lookup(name)
    }

    async fn discover(&self, input: &str, options: &DiscoverOptions) -> Option<Discovered> {
        if !options.matches_software(SOFTWARE_IDENTIFIER) {
            return None;
        }

        let domain = normalize_domain_name(input)?;
        let servers = resolve_kdcs(&domain).await?;

        let realm = self.cache.lookup_or_register(&domain);

        let mut details = BTreeMap::new();
        details.insert(descriptor::DISCOVERY_TYPE.to_string(), "kerberos".to_string());
        details.insert(descriptor::DISCOVERY_DOMAIN.to_string(), domain.clone());
        details.insert(
            descriptor::DISCOVERY_REALM.to_string(),
            domain.to_uppercase(),
        );
        details.insert(descriptor::DISCOVERY_SERVERS.to_string(), servers.join(", "));
        realm.set_discovery(details);

        Some(Discovered {
            realm,
            relevance: RELEVANCE_KDC_FOUND,
        })
    }
}

/// Resolve the domain against the Kerberos port. `None` when nothing
/// answers; resolution failure just means no candidate.
async fn resolve_kdcs(domain: &str) -> Option<Vec<String>> {
    let addrs: Vec<String> = tokio::net::lookup_host((domain, 88))
        .await
        .ok()?
        .map(|addr| addr.to_string())
        .collect();

    if addrs.is_empty() {
        None
    } else {
        Some(addrs)
    }
}
