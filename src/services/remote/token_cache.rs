use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::models::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    Global,
    Tenant(TenantId),
}

impl From<Option<TenantId>> for TokenScope {
    fn from(tenant_id: Option<TenantId>) -> Self {
        tenant_id.map_or(TokenScope::Global, TokenScope::Tenant)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Bearer tokens shared by every client of the process, one slot per
/// tenant plus a global slot for clients without a tenant.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: DashMap<TokenScope, CachedToken>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scope: TokenScope) -> Option<String> {
        let now = Utc::now();
        if let Some(entry) = self.entries.get(&scope) {
            if !entry.is_expired(now) {
                return Some(entry.access_token.clone());
            }
        }

        // Only evict what is still expired; a fresh token stored by another
        // client in the meantime stays.
        self.entries.remove_if(&scope, |_, entry| entry.is_expired(now));
        None
    }

    pub fn put(&self, scope: TokenScope, access_token: String, ttl: std::time::Duration) {
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(0));
        self.entries.insert(
            scope,
            CachedToken {
                access_token,
                expires_at: Utc::now() + ttl,
            },
        );
    }

    pub fn invalidate(&self, scope: TokenScope) {
        self.entries.remove(&scope);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
