//! Fixed service map

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use super::error::{DiscoveryError, DiscoveryResult};
use super::{DiscoveryResolver, DiscoverySnapshot};

/// Resolves service names from a map fixed at construction
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `service -> addresses` pairs
    pub fn from_map<I, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, A)>,
        A: IntoIterator<Item = String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(service, addrs)| (service, addrs.into_iter().collect()))
                .collect(),
        }
    }

    /// Add one address for `service`
    pub fn with_instance(mut self, service: impl Into<String>, address: impl Into<String>) -> Self {
        self.entries
            .entry(service.into())
            .or_default()
            .insert(address.into());
        self
    }
}

#[async_trait]
impl DiscoveryResolver for StaticResolver {
    async fn resolve(&self, services: &[String]) -> DiscoveryResult<DiscoverySnapshot> {
        if services.is_empty() {
            return Err(DiscoveryError::NoServices);
        }
        Ok(services
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| (s.clone(), self.entries.get(s).cloned().unwrap_or_default()))
            .collect())
    }
}
