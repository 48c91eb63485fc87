//! Token cache
//!
//! The cache is a host-supplied collaborator; [`InMemoryTokenCache`] is the
//! default. Entries are keyed by home account id and client id. Application
//! tokens from the client credentials grant use an empty home account id.
//! Access tokens are additionally scoped to the authority that issued them:
//! a lookup only matches tokens with the same environment (host) and realm
//! (tenant).
//!
//! The cache does not judge expiry: the silent flow decides whether a cached
//! access token is still usable given the configured renewal offset.

use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::SecretString;
use thiserror::Error;

use crate::account::AccountInfo;
use crate::request::ScopeSet;

/// Cache backend failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Backend could not complete the operation
    #[error("cache backend failure: {0}")]
    Backend(String),
}

/// Cached access token
#[derive(Debug, Clone)]
pub struct AccessTokenEntity {
    /// Owning account (empty for application tokens)
    pub home_account_id: String,
    /// Authority host
    pub environment: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Tenant segment of the issuing authority (empty when it has none)
    pub realm: String,
    /// Scopes granted
    pub scopes: ScopeSet,
    /// The token
    pub secret: SecretString,
    /// `Bearer` unless the server said otherwise
    pub token_type: String,
    /// Expiry, seconds since the epoch
    pub expires_on: i64,
}

impl AccessTokenEntity {
    /// Whether the token expires within `offset_seconds` of `now`
    pub fn is_expiring(&self, now: i64, offset_seconds: u64) -> bool {
        let offset = i64::try_from(offset_seconds).unwrap_or(i64::MAX);
        self.expires_on <= now.saturating_add(offset)
    }

    /// Whether the token came from the authority at `environment`/`realm`
    pub fn issued_by(&self, environment: &str, realm: &str) -> bool {
        self.environment.eq_ignore_ascii_case(environment) && self.realm.eq_ignore_ascii_case(realm)
    }
}

/// Cached refresh token
#[derive(Debug, Clone)]
pub struct RefreshTokenEntity {
    /// Owning account
    pub home_account_id: String,
    /// Authority host
    pub environment: String,
    /// Client the token was issued to
    pub client_id: String,
    /// The token
    pub secret: SecretString,
}

/// Cached id token
#[derive(Debug, Clone)]
pub struct IdTokenEntity {
    /// Owning account
    pub home_account_id: String,
    /// Authority host
    pub environment: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Tenant
    pub realm: String,
    /// Compact id token
    pub secret: String,
}

/// Everything produced by one token response
#[derive(Debug, Clone, Default)]
pub struct CacheRecord {
    /// Account, absent for application tokens
    pub account: Option<AccountInfo>,
    /// Access token
    pub access_token: Option<AccessTokenEntity>,
    /// Refresh token
    pub refresh_token: Option<RefreshTokenEntity>,
    /// Id token
    pub id_token: Option<IdTokenEntity>,
}

/// Pluggable async token cache
#[async_trait]
pub trait TokenCache: Send + Sync + std::fmt::Debug {
    /// Store a response's tokens, replacing access tokens with overlapping scopes
    async fn save_record(&self, record: CacheRecord) -> Result<(), CacheError>;

    /// Look up an account
    async fn get_account(&self, home_account_id: &str) -> Result<Option<AccountInfo>, CacheError>;

    /// All cached accounts
    async fn get_all_accounts(&self) -> Result<Vec<AccountInfo>, CacheError>;

    /// Access token issued by `environment`/`realm` whose scopes cover
    /// `scopes`; the longest-lived one wins
    async fn get_access_token(
        &self,
        home_account_id: &str,
        client_id: &str,
        environment: &str,
        realm: &str,
        scopes: &ScopeSet,
    ) -> Result<Option<AccessTokenEntity>, CacheError>;

    /// Refresh token for an account
    async fn get_refresh_token(
        &self,
        home_account_id: &str,
        client_id: &str,
    ) -> Result<Option<RefreshTokenEntity>, CacheError>;

    /// Id token for an account
    async fn get_id_token(
        &self,
        home_account_id: &str,
        client_id: &str,
    ) -> Result<Option<IdTokenEntity>, CacheError>;

    /// Remove an account and all of its tokens; returns whether it existed
    async fn remove_account(&self, home_account_id: &str) -> Result<bool, CacheError>;
}

fn credential_key(home_account_id: &str, client_id: &str) -> String {
    format!("{home_account_id}|{client_id}")
}

/// Default in-process cache
#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    accounts: DashMap<String, AccountInfo>,
    access_tokens: DashMap<String, Vec<AccessTokenEntity>>,
    refresh_tokens: DashMap<String, RefreshTokenEntity>,
    id_tokens: DashMap<String, IdTokenEntity>,
}

impl InMemoryTokenCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn save_record(&self, record: CacheRecord) -> Result<(), CacheError> {
        if let Some(account) = record.account {
            self.accounts
                .insert(account.home_account_id.clone(), account);
        }

        if let Some(token) = record.access_token {
            let key = credential_key(&token.home_account_id, &token.client_id);
            let mut entry = self.access_tokens.entry(key).or_default();
            entry.retain(|existing| {
                !existing.issued_by(&token.environment, &token.realm)
                    || !token.scopes.iter().any(|s| existing.scopes.contains(s))
            });
            entry.push(token);
        }

        if let Some(token) = record.refresh_token {
            let key = credential_key(&token.home_account_id, &token.client_id);
            self.refresh_tokens.insert(key, token);
        }

        if let Some(token) = record.id_token {
            let key = credential_key(&token.home_account_id, &token.client_id);
            self.id_tokens.insert(key, token);
        }

        Ok(())
    }

    async fn get_account(&self, home_account_id: &str) -> Result<Option<AccountInfo>, CacheError> {
        Ok(self.accounts.get(home_account_id).map(|a| a.clone()))
    }

    async fn get_all_accounts(&self) -> Result<Vec<AccountInfo>, CacheError> {
        let mut accounts: Vec<_> = self.accounts.iter().map(|a| a.value().clone()).collect();
        accounts.sort_by(|a, b| a.home_account_id.cmp(&b.home_account_id));
        Ok(accounts)
    }

    async fn get_access_token(
        &self,
        home_account_id: &str,
        client_id: &str,
        environment: &str,
        realm: &str,
        scopes: &ScopeSet,
    ) -> Result<Option<AccessTokenEntity>, CacheError> {
        let key = credential_key(home_account_id, client_id);
        Ok(self.access_tokens.get(&key).and_then(|tokens| {
            tokens
                .iter()
                .filter(|t| t.issued_by(environment, realm) && t.scopes.contains_all(scopes))
                .max_by_key(|t| t.expires_on)
                .cloned()
        }))
    }

    async fn get_refresh_token(
        &self,
        home_account_id: &str,
        client_id: &str,
    ) -> Result<Option<RefreshTokenEntity>, CacheError> {
        let key = credential_key(home_account_id, client_id);
        Ok(self.refresh_tokens.get(&key).map(|t| t.clone()))
    }

    async fn get_id_token(
        &self,
        home_account_id: &str,
        client_id: &str,
    ) -> Result<Option<IdTokenEntity>, CacheError> {
        let key = credential_key(home_account_id, client_id);
        Ok(self.id_tokens.get(&key).map(|t| t.clone()))
    }

    async fn remove_account(&self, home_account_id: &str) -> Result<bool, CacheError> {
        let existed = self.accounts.remove(home_account_id).is_some();
        let prefix = format!("{home_account_id}|");
        self.access_tokens.retain(|k, _| !k.starts_with(&prefix));
        self.refresh_tokens.retain(|k, _| !k.starts_with(&prefix));
        self.id_tokens.retain(|k, _| !k.starts_with(&prefix));
        Ok(existed)
    }
}
