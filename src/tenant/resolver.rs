use tracing::debug;

use crate::database::is_valid_tenant_key;
use crate::database::models::Organization;
use crate::tenant::TenantDirectory;

/// Leading host labels that never identify a tenant.
const RESERVED_SUBDOMAINS: [&str; 3] = ["www", "api", "admin"];

/// Path prefixes under which the second segment names a tenant.
const PATH_PREFIXES: [&str; 4] = ["org", "orgs", "organization", "organizations"];

/// The pieces of an inbound request the resolver is allowed to see.
#[derive(Debug, Default)]
pub struct RequestFacts<'a> {
    pub host: Option<&'a str>,
    pub path: &'a str,
    /// Explicit tenant header (X-Organization).
    pub header: Option<&'a str>,
    /// Tenant key carried in the caller's session (JWT claims).
    pub session: Option<&'a str>,
}

/// Decides which tenant (if any) an inbound request belongs to.
///
/// Extraction is a prioritized, first-match-wins chain: host subdomain, path
/// prefix, explicit header, session. The first syntactically valid candidate
/// is looked up once in the directory; an unknown key yields "no tenant" and
/// the request proceeds against the shared context. Resolution never fails
/// the request.
#[derive(Clone)]
pub struct TenantResolver {
    directory: TenantDirectory,
}

impl TenantResolver {
    pub fn new(directory: TenantDirectory) -> Self {
        Self { directory }
    }

    pub async fn resolve_request(&self, facts: &RequestFacts<'_>) -> Option<Organization> {
        let candidate = extract_candidate(facts)?;
        match self.directory.resolve(&candidate).await {
            Ok(Some(org)) => {
                debug!(tenant = %org.subdomain, "resolved tenant for request");
                Some(org)
            }
            Ok(None) => {
                debug!(key = %candidate, "no organization for candidate key");
                None
            }
            // Directory errors are swallowed into "no tenant": resolution
            // must never abort the request.
            Err(e) => {
                tracing::warn!(key = %candidate, error = %e, "tenant lookup failed");
                None
            }
        }
    }
}

/// First syntactically valid candidate key from the strategy chain.
pub fn extract_candidate(facts: &RequestFacts<'_>) -> Option<String> {
    if let Some(key) = facts.host.and_then(from_host) {
        return Some(key);
    }
    if let Some(key) = from_path(facts.path) {
        return Some(key);
    }
    if let Some(key) = facts.header.filter(|k| is_valid_tenant_key(k)) {
        return Some(key.to_string());
    }
    if let Some(key) = facts.session.filter(|k| is_valid_tenant_key(k)) {
        return Some(key.to_string());
    }
    None
}

/// Subdomain strategy: the host needs at least three dot-separated labels
/// (so bare domains and IPs never match) and the leading label must not be
/// reserved.
fn from_host(host: &str) -> Option<String> {
    let host = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host);
    if host == "localhost" || is_ipv4(host) {
        return None;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 {
        return None;
    }

    let subdomain = labels[0];
    if RESERVED_SUBDOMAINS.contains(&subdomain) || !is_valid_tenant_key(subdomain) {
        return None;
    }
    Some(subdomain.to_string())
}

/// Path strategy: `/org(s)/<key>/...` or `/organization(s)/<key>/...`.
fn from_path(path: &str) -> Option<String> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let prefix = segments.next()?;
    if !PATH_PREFIXES.contains(&prefix) {
        return None;
    }
    let key = segments.next()?;
    if !is_valid_tenant_key(key) {
        return None;
    }
    Some(key.to_string())
}

fn is_ipv4(host: &str) -> bool {
    let mut octets = 0;
    for part in host.split('.') {
        if part.parse::<u8>().is_err() {
            return false;
        }
        octets += 1;
    }
    octets == 4
}
