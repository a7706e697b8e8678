//! Service discovery
//!
//! A [`DiscoveryResolver`] turns logical service names into the set of
//! endpoint addresses currently serving them. The aggregated router consumes
//! one snapshot per refresh cycle.
//!
//! - `StaticResolver`: fixed map from configuration
//! - `ConsulResolver`: healthy instances from a Consul agent

mod consul;
mod error;
mod static_resolver;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

pub use consul::{parse_health_response, ConsulResolver, ADDR_META_KEY};
pub use error::{DiscoveryError, DiscoveryResult};
pub use static_resolver::StaticResolver;

/// `service name -> endpoint addresses`
pub type DiscoverySnapshot = BTreeMap<String, BTreeSet<String>>;

/// Resolves logical service names to reachable endpoint addresses
#[async_trait]
pub trait DiscoveryResolver: Send + Sync {
    /// Resolve every name in `services`.
    ///
    /// Fails only when the discovery backend itself cannot be queried; a
    /// name with no healthy instances maps to an empty set.
    async fn resolve(&self, services: &[String]) -> DiscoveryResult<DiscoverySnapshot>;
}
