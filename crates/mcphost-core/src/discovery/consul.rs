//! Consul health-API resolver
//!
//! Each watched name is looked up with
//! `GET {scheme}://{address}/v1/health/service/{name}?passing=true`, optionally
//! filtered by tag and datacenter. The reachable address of an instance is read
//! from its service metadata key `addr`, which registrars write as `host:port`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::logging::Logger;

use super::error::{DiscoveryError, DiscoveryResult};
use super::{DiscoveryResolver, DiscoverySnapshot};

/// Service metadata key holding the externally reachable address
pub const ADDR_META_KEY: &str = "addr";

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    service: Option<ServiceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    #[serde(default, rename = "ID")]
    id: String,
    #[serde(default)]
    service: String,
    #[serde(default)]
    meta: Option<HashMap<String, String>>,
}

/// Resolver backed by a Consul agent
pub struct ConsulResolver {
    base_url: String,
    datacenter: Option<String>,
    token: Option<String>,
    tag: Option<String>,
    http: reqwest::Client,
    logger: Arc<dyn Logger>,
}

impl ConsulResolver {
    /// Resolver for the agent at `address` (`host:port`), over plain HTTP
    pub fn new(address: impl Into<String>, logger: Arc<dyn Logger>) -> DiscoveryResult<Self> {
        let http = reqwest::Client::builder().timeout(QUERY_TIMEOUT).build()?;
        Ok(Self {
            base_url: format!("http://{}", address.into()),
            datacenter: None,
            token: None,
            tag: None,
            http,
            logger,
        })
    }

    /// Use `scheme` (`http` or `https`) to reach the agent
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        if let Some((_, rest)) = self.base_url.split_once("://") {
            self.base_url = format!("{}://{}", scheme, rest);
        }
        self
    }

    pub fn with_datacenter(mut self, dc: impl Into<String>) -> Self {
        self.datacenter = Some(dc.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// ACL token sent as `X-Consul-Token`
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// Query URL for one service, with the name and filters percent-encoded
    pub fn query_url(&self, service: &str) -> DiscoveryResult<reqwest::Url> {
        let invalid = |message: String| DiscoveryError::InvalidAddress {
            address: self.base_url.clone(),
            message,
        };

        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("address cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["v1", "health", "service", service]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("passing", "true");
            if let Some(tag) = &self.tag {
                query.append_pair("tag", tag);
            }
            if let Some(dc) = &self.datacenter {
                query.append_pair("dc", dc);
            }
        }
        Ok(url)
    }

    async fn lookup(&self, service: &str) -> DiscoveryResult<BTreeSet<String>> {
        let mut request = self.http.get(self.query_url(service)?);
        if let Some(token) = &self.token {
            request = request.header("X-Consul-Token", token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status {
                service: service.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        parse_health_response(service, &body, self.logger.as_ref())
    }
}

/// Extract instance addresses from a `/v1/health/service` body
///
/// Instances whose metadata lacks `addr` are logged and skipped.
pub fn parse_health_response(
    service: &str,
    body: &str,
    logger: &dyn Logger,
) -> DiscoveryResult<BTreeSet<String>> {
    let entries: Vec<HealthEntry> =
        serde_json::from_str(body).map_err(|e| DiscoveryError::InvalidResponse {
            service: service.to_string(),
            message: e.to_string(),
        })?;

    let mut addrs = BTreeSet::new();
    for inst in entries.into_iter().filter_map(|e| e.service) {
        let addr = inst
            .meta
            .as_ref()
            .and_then(|m| m.get(ADDR_META_KEY))
            .map(|a| a.trim())
            .filter(|a| !a.is_empty());
        match addr {
            Some(addr) => {
                addrs.insert(addr.to_string());
            }
            None => logger.error(&format!(
                "consul: service {} instance {} has no {} metadata",
                inst.service, inst.id, ADDR_META_KEY
            )),
        }
    }
    Ok(addrs)
}

#[async_trait]
impl DiscoveryResolver for ConsulResolver {
    async fn resolve(&self, services: &[String]) -> DiscoveryResult<DiscoverySnapshot> {
        if services.is_empty() {
            return Err(DiscoveryError::NoServices);
        }

        let mut snapshot = DiscoverySnapshot::new();
        for service in services.iter().filter(|s| !s.is_empty()) {
            let addrs = self.lookup(service).await?;
            if addrs.is_empty() {
                self.logger
                    .warn(&format!("consul: no healthy instances for {}", service));
            }
            snapshot.insert(service.clone(), addrs);
        }
        Ok(snapshot)
    }
}
