//! Provider abstraction and the discovery engine.
//!
//! Discovery fans out to every registered provider concurrently and waits
//! for all of them, even after the first candidate appears. A slow
//! provider can still contribute a higher-relevance candidate, so nothing
//! short-circuits.

use std::sync::Arc;

use async_trait::async_trait;
use realmjoin_core::DiscoverOptions;
use tokio::task::JoinSet;

use crate::realm::RealmObject;

/// A realm a provider claims it can enroll, with a ranking weight.
#[derive(Clone)]
pub struct Discovered {
    pub realm: Arc<RealmObject>,
    /// Higher values sort first in discovery results.
    pub relevance: i32,
}

/// A realm technology backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name, for logs.
    fn name(&self) -> &str;

    /// Identifier matched against `DiscoverOptions::software`.
    fn software_identifier(&self) -> &str;

    /// The provider's realm object for `name`, if it has registered one.
    fn lookup_realm(&self, name: &str) -> Option<Arc<RealmObject>>;

    /// Probe whether `input` names a realm this provider can enroll.
    /// `None` means no candidate; infrastructure failures during probing
    /// are not errors, just an absent candidate.
    async fn discover(&self, input: &str, options: &DiscoverOptions) -> Option<Discovered>;
}

/// Fans discovery out across all registered providers.
pub struct DiscoveryEngine {
    providers: Vec<Arc<dyn Provider>>,
}

impl DiscoveryEngine {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        tracing::info!(provider = %provider.name(), "Registered realm provider");
        self.providers.push(provider);
    }

    /// Run discovery on every provider concurrently, wait for all of
    /// them, and return candidates sorted by descending relevance.
    pub async fn discover(&self, input: &str, options: &DiscoverOptions) -> Vec<Discovered> {
        let mut probes = JoinSet::new();
        for provider in &self.providers {
            let provider = provider.clone();
            let input = input.to_string();
            let options = options.clone();
            probes.spawn(async move {
                let found = provider.discover(&input, &options).await;
                (provider.name().to_string(), found)
            });
        }

        let mut candidates = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((provider, Some(found))) => {
                    tracing::debug!(
                        provider = %provider,
                        realm = %found.realm.name(),
                        relevance = found.relevance,
                        "Provider produced a candidate"
                    );
                    candidates.push(found);
                }
                Ok((_, None)) => {}
                Err(err) => tracing::warn!(error = %err, "Discovery probe panicked"),
            }
        }

        candidates.sort_by(|a, b| b.relevance.cmp(&a.relevance));
        candidates
    }

    /// Find a registered realm object by exact name across providers.
    pub fn lookup_realm(&self, name: &str) -> Option<Arc<RealmObject>> {
        self.providers
            .iter()
            .find_map(|provider| provider.lookup_realm(name))
    }
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::new()
    }
}
