//! Tenant resolution, authorization, and per-tenant routing.
//!
//! The tenant identifier comes from the transport header only; anything
//! tenant-shaped in the request body is discarded. Authorization rewrites
//! the request so that every downstream engine call carries the tenant
//! filter, plus any ACL filters derived from bearer claims. Routing picks
//! the index layout for the tenant and is memoized for the process
//! lifetime.

use crate::error::{GatewayError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use dashmap::DashMap;
use searchgate_protocol::{FilterValue, SearchRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Longest accepted tenant identifier.
const TENANT_ID_MAX_LEN: usize = 128;

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Document field the mandatory tenant filter targets.
    pub tenant_field: String,
    /// Document field group claims are matched against, when present.
    pub acl_groups_field: Option<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tenant_field: "tenant_id".to_string(),
            acl_groups_field: Some("acl.groups".to_string()),
        }
    }
}

/// Validate the tenant header value.
///
/// The daemon passes the raw `X-Tenant-ID` value; absence on a search path
/// is `MissingTenant`.
pub fn resolve_tenant(header: Option<&str>) -> Result<String> {
    let value = header.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(GatewayError::MissingTenant);
    }
    if value.len() > TENANT_ID_MAX_LEN {
        return Err(GatewayError::bad_request("tenant identifier too long"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(GatewayError::bad_request(
            "tenant identifier contains invalid characters",
        ));
    }
    Ok(value.to_string())
}

/// Role and group claims from a pre-validated bearer token.
///
/// Token *verification* happens upstream; the gateway only decodes the
/// JWT payload segment to read the claims it routes on. A token that does
/// not decode is still rejected, since acting on half-read claims would be
/// worse than rejecting.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Claims {
    /// Subject, for logging only.
    #[serde(default)]
    pub sub: Option<String>,
    /// Role claims.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Group claims; drive ACL filter injection.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Tenants this token may act for. Empty means any.
    #[serde(default)]
    pub tenants: Vec<String>,
}

impl Claims {
    /// Decode claims from a bearer token (`header.payload.signature`).
    pub fn from_bearer(token: &str) -> Result<Self> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| GatewayError::Unauthorized {
                message: "token is not a JWT".to_string(),
            })?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim())
            .map_err(|_| GatewayError::Unauthorized {
                message: "token payload is not base64".to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|_| GatewayError::Unauthorized {
            message: "token payload is not valid claims JSON".to_string(),
        })
    }

    /// Check the token covers `tenant`. An empty `tenants` claim means the
    /// token is not tenant-restricted.
    pub fn permits_tenant(&self, tenant: &str) -> bool {
        self.tenants.is_empty() || self.tenants.iter().any(|t| t == tenant)
    }
}

/// Produce the effective, tenant-scoped request.
///
/// - Discards any caller-supplied filter on the tenant field.
/// - Injects the mandatory tenant filter.
/// - Injects a groups ACL filter when the claims carry groups.
///
/// Fails `Forbidden` when the claims are tenant-restricted and do not
/// cover this tenant.
pub fn apply_authorization(
    request: &SearchRequest,
    tenant: &str,
    claims: &Claims,
    config: &ResolverConfig,
) -> Result<SearchRequest> {
    if !claims.permits_tenant(tenant) {
        return Err(GatewayError::Forbidden {
            message: format!("token does not grant access to tenant '{tenant}'"),
        });
    }

    let mut effective = request.clone();
    effective.filters.remove(&config.tenant_field);
    effective.filters.insert(
        config.tenant_field.clone(),
        FilterValue::scalar(tenant.to_string()),
    );

    if let Some(acl_field) = &config.acl_groups_field {
        if !claims.groups.is_empty() {
            effective
                .filters
                .insert(acl_field.clone(), FilterValue::terms(claims.groups.clone()));
        }
    }

    Ok(effective)
}

/// Index layout selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStrategy {
    /// Tenant lives in the shared index, isolated by filter.
    Shared,
    /// Tenant has its own index.
    Dedicated,
}

impl IndexStrategy {
    /// Stable label for debug output.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStrategy::Shared => "shared",
            IndexStrategy::Dedicated => "dedicated",
        }
    }
}

/// Per-tenant routing record. Opaque to the handler beyond the index name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingStrategy {
    pub index_name: String,
    pub shard_count: u32,
    pub replica_count: u32,
    pub strategy: IndexStrategy,
}

/// Pluggable routing lookup.
///
/// `lookup` returning `None` is not an error: the table falls back to the
/// shared default, so routing resolution never fails a request.
pub trait RoutingSource: Send + Sync + std::fmt::Debug {
    fn lookup(&self, tenant: &str) -> Option<RoutingStrategy>;
}

/// Routing source backed by static configuration: a set of tenants marked
/// dedicated, everyone else on the shared index.
#[derive(Debug, Clone)]
pub struct StaticRoutingSource {
    shared_index: String,
    dedicated_tenants: HashSet<String>,
    dedicated_shards: u32,
}

impl StaticRoutingSource {
    pub fn new<I, S>(shared_index: impl Into<String>, dedicated_tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shared_index: shared_index.into(),
            dedicated_tenants: dedicated_tenants.into_iter().map(Into::into).collect(),
            dedicated_shards: 3,
        }
    }
}

impl Default for StaticRoutingSource {
    fn default() -> Self {
        Self::new("search-shared", Vec::<String>::new())
    }
}

impl RoutingSource for StaticRoutingSource {
    fn lookup(&self, tenant: &str) -> Option<RoutingStrategy> {
        if self.dedicated_tenants.contains(tenant) {
            Some(RoutingStrategy {
                index_name: format!("search-{tenant}"),
                shard_count: self.dedicated_shards,
                replica_count: 1,
                strategy: IndexStrategy::Dedicated,
            })
        } else {
            None
        }
    }
}

/// Process-lifetime memo over a [`RoutingSource`].
#[derive(Debug)]
pub struct RoutingTable {
    source: Arc<dyn RoutingSource>,
    shared_default: RoutingStrategy,
    memo: DashMap<String, Arc<RoutingStrategy>>,
}

impl RoutingTable {
    pub fn new(source: Arc<dyn RoutingSource>, shared_index: impl Into<String>) -> Self {
        Self {
            source,
            shared_default: RoutingStrategy {
                index_name: shared_index.into(),
                shard_count: 6,
                replica_count: 1,
                strategy: IndexStrategy::Shared,
            },
            memo: DashMap::new(),
        }
    }

    /// Routing strategy for a tenant. Resolved on first use, memoized,
    /// and infallible: a source miss yields the shared default.
    pub fn routing(&self, tenant: &str) -> Arc<RoutingStrategy> {
        if let Some(found) = self.memo.get(tenant) {
            return found.clone();
        }
        let strategy = Arc::new(
            self.source
                .lookup(tenant)
                .unwrap_or_else(|| self.shared_default.clone()),
        );
        self.memo
            .entry(tenant.to_string())
            .or_insert(strategy)
            .clone()
    }

    /// Drop the memoized strategy for a tenant.
    pub fn invalidate(&self, tenant: &str) {
        self.memo.remove(tenant);
    }
}
