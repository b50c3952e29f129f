//! API key entity
//!
//! Only the SHA-256 hash of a key's secret is ever stored. Scopes come from
//! a closed set of `resource:action` permissions.

use crate::error::{CoreError, Result};
use crate::events::ChangeKind;
use crate::repository::{Entity, MemoryRepository, Repository};
use crate::types::{now, prefixed_id, OrgId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Environment discriminator carried at the front of every secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPrefix {
    #[serde(rename = "sk_live")]
    Live,
    #[serde(rename = "sk_test")]
    Test,
}

impl KeyPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "sk_live",
            Self::Test => "sk_test",
        }
    }

    /// Prefix a raw secret starts with, if any
    pub fn of_secret(secret: &str) -> Option<Self> {
        [Self::Live, Self::Test]
            .into_iter()
            .find(|p| secret.starts_with(p.as_str()) && secret[p.as_str().len()..].starts_with('_'))
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! api_key_scopes {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Permission granting access to one resource-action pair
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum ApiKeyScope {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl ApiKeyScope {
            /// Every scope, in declaration order
            pub const ALL: &'static [ApiKeyScope] = &[$(ApiKeyScope::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

api_key_scopes! {
    ProjectsRead => "projects:read",
    ProjectsWrite => "projects:write",
    FinanceRead => "finance:read",
    FinanceWrite => "finance:write",
    PeopleRead => "people:read",
    PeopleWrite => "people:write",
    PipelineRead => "pipeline:read",
    PipelineWrite => "pipeline:write",
    ProgrammingRead => "programming:read",
    ProgrammingWrite => "programming:write",
    ProcurementRead => "procurement:read",
    ProcurementWrite => "procurement:write",
    ReportsRead => "reports:read",
    ReportsWrite => "reports:write",
    SettingsRead => "settings:read",
    SettingsWrite => "settings:write",
}

impl fmt::Display for ApiKeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiKeyScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| CoreError::validation(format!("Unknown API key scope '{}'", s)))
    }
}

/// Hex-encoded SHA-256 of a raw secret
pub fn hash_secret(secret: &str) -> String {
    use std::fmt::Write;
    let digest = Sha256::digest(secret.as_bytes());
    let mut hex = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

/// Stored API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    /// key-<uuid>
    pub id: String,
    pub org_id: OrgId,
    pub name: String,
    pub secret_hash: String,
    pub prefix: KeyPrefix,
    pub scopes: BTreeSet<ApiKeyScope>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub org_id: OrgId,
    pub name: String,
    pub prefix: KeyPrefix,
    pub scopes: BTreeSet<ApiKeyScope>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeyPatch {
    pub name: Option<String>,
    pub scopes: Option<BTreeSet<ApiKeyScope>>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// API key without its hash, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySummary {
    pub id: String,
    pub name: String,
    pub prefix: KeyPrefix,
    pub scopes: BTreeSet<ApiKeyScope>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl ApiKey {
    /// Build an active key around an already-hashed secret
    pub fn new(input: NewApiKey, secret_hash: String) -> Self {
        let created_at = now();
        Self {
            id: prefixed_id("key"),
            org_id: input.org_id,
            name: input.name,
            secret_hash,
            prefix: input.prefix,
            scopes: input.scopes,
            created_at,
            updated_at: created_at,
            last_used_at: None,
            expires_at: input.expires_at,
            active: true,
        }
    }

    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= at)
    }

    pub fn has_scope(&self, scope: ApiKeyScope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn summary(&self) -> ApiKeySummary {
        ApiKeySummary {
            id: self.id.clone(),
            name: self.name.clone(),
            prefix: self.prefix,
            scopes: self.scopes.clone(),
            created_at: self.created_at,
            last_used_at: self.last_used_at,
            expires_at: self.expires_at,
            active: self.active,
        }
    }
}

impl Entity for ApiKey {
    type Patch = ApiKeyPatch;
    const KIND: &'static str = "api_key";

    fn id(&self) -> &str {
        &self.id
    }

    fn org_id(&self) -> &OrgId {
        &self.org_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply(&mut self, patch: ApiKeyPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(scopes) = patch.scopes {
            self.scopes = scopes;
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = expires_at;
        }
        self.updated_at = now;
    }

    fn validate(&self) -> Result<()> {
        if self.org_id.is_empty() {
            return Err(CoreError::validation("API key requires an organization"));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::validation("API key name cannot be empty"));
        }
        if self.scopes.is_empty() {
            return Err(CoreError::validation("API key needs at least one scope"));
        }
        let is_sha256_hex = self.secret_hash.len() == 64
            && self
                .secret_hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !is_sha256_hex {
            return Err(CoreError::validation(
                "API key secret hash must be a SHA-256 hex digest",
            ));
        }
        Ok(())
    }
}

/// API key storage operations beyond plain CRUD
#[async_trait]
pub trait ApiKeyRepository: Repository<ApiKey> {
    /// Mark a key inactive, leaving every other field untouched
    async fn deactivate(&self, id: &str, org_id: &OrgId) -> Result<ApiKey>;

    /// Look a key up by secret hash across all tenants
    async fn find_by_secret_hash(&self, secret_hash: &str) -> Result<Option<ApiKey>>;

    /// Record a successful authentication; `Unauthorized` once the key is inactive
    async fn mark_used(&self, id: &str, at: DateTime<Utc>) -> Result<ApiKey>;
}

#[async_trait]
impl ApiKeyRepository for MemoryRepository<ApiKey> {
    async fn deactivate(&self, id: &str, org_id: &OrgId) -> Result<ApiKey> {
        let key = self.modify(id, Some(org_id), |key| key.active = false).await?;
        self.announce(org_id, id, ChangeKind::Updated).await;
        Ok(key)
    }

    async fn find_by_secret_hash(&self, secret_hash: &str) -> Result<Option<ApiKey>> {
        let wanted = secret_hash.as_bytes();
        Ok(self
            .find_where(|key| bool::from(key.secret_hash.as_bytes().ct_eq(wanted)))
            .await)
    }

    async fn mark_used(&self, id: &str, at: DateTime<Utc>) -> Result<ApiKey> {
        let key = self
            .modify(id, None, |key| {
                if key.active {
                    key.last_used_at = Some(at);
                }
            })
            .await?;
        if !key.active {
            return Err(CoreError::Unauthorized("API key has been revoked".to_string()));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ci_key() -> ApiKey {
        ApiKey::new(
            NewApiKey {
                org_id: "org_1".into(),
                name: "CI Key".into(),
                prefix: KeyPrefix::Test,
                scopes: [ApiKeyScope::ProjectsRead].into_iter().collect(),
                expires_at: None,
            },
            hash_secret("sk_test_abc"),
        )
    }

    #[test]
    fn test_hash_secret_is_sha256_hex() {
        let hash = hash_secret("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_secret("sk_test_a"), hash_secret("sk_test_b"));
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!(
            "finance:write".parse::<ApiKeyScope>().unwrap(),
            ApiKeyScope::FinanceWrite
        );
        assert!("finance:delete".parse::<ApiKeyScope>().is_err());
        assert_eq!(ApiKeyScope::ALL.len(), 16);
        for scope in ApiKeyScope::ALL {
            assert_eq!(scope.as_str().parse::<ApiKeyScope>().unwrap(), *scope);
        }
    }

    #[test]
    fn test_scope_wire_format() {
        let json = serde_json::to_string(&ApiKeyScope::ProjectsRead).unwrap();
        assert_eq!(json, "\"projects:read\"");
        assert!(serde_json::from_str::<ApiKeyScope>("\"projects:admin\"").is_err());
    }

    #[test]
    fn test_prefix_of_secret() {
        assert_eq!(KeyPrefix::of_secret("sk_live_xyz"), Some(KeyPrefix::Live));
        assert_eq!(KeyPrefix::of_secret("sk_test_xyz"), Some(KeyPrefix::Test));
        assert_eq!(KeyPrefix::of_secret("sk_testxyz"), None);
        assert_eq!(KeyPrefix::of_secret("pk_live_xyz"), None);
        assert_eq!(serde_json::to_string(&KeyPrefix::Live).unwrap(), "\"sk_live\"");
    }

    #[test]
    fn test_new_key_is_active_and_valid() {
        let key = ci_key();
        assert!(key.id.starts_with("key-"));
        assert!(key.active);
        assert!(key.has_scope(ApiKeyScope::ProjectsRead));
        assert!(!key.has_scope(ApiKeyScope::ProjectsWrite));
        assert!(key.validate().is_ok());
    }

    #[test]
    fn test_invalid_keys() {
        let mut no_scopes = ci_key();
        no_scopes.scopes.clear();
        assert!(no_scopes.validate().is_err());

        let mut raw_secret = ci_key();
        raw_secret.secret_hash = "sk_test_abc".into();
        assert!(raw_secret.validate().is_err());
    }

    #[test]
    fn test_expiry() {
        let mut key = ci_key();
        let t = now();
        assert!(!key.is_expired(t));
        key.expires_at = Some(t);
        assert!(key.is_expired(t));
        assert!(!key.is_expired(t - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_summary_omits_hash() {
        let json = serde_json::to_string(&ci_key().summary()).unwrap();
        assert!(!json.contains("secretHash"));
        assert!(json.contains("\"name\":\"CI Key\""));
        assert!(json.contains("\"scopes\":[\"projects:read\"]"));
    }

    #[tokio::test]
    async fn test_deactivate_changes_only_active() {
        let repo = MemoryRepository::<ApiKey>::new();
        let key = repo.create(ci_key()).await.unwrap();

        let deactivated = repo.deactivate(&key.id, &"org_1".into()).await.unwrap();
        assert!(!deactivated.active);
        assert_eq!(ApiKey { active: true, ..deactivated.clone() }, key);

        let foreign = repo.deactivate(&key.id, &"org_2".into()).await;
        assert!(matches!(foreign, Err(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_find_by_secret_hash_and_mark_used() {
        let repo = MemoryRepository::<ApiKey>::new();
        let key = repo.create(ci_key()).await.unwrap();

        let found = repo
            .find_by_secret_hash(&hash_secret("sk_test_abc"))
            .await
            .unwrap();
        assert_eq!(found.as_ref().map(|k| k.id.as_str()), Some(key.id.as_str()));
        assert!(repo
            .find_by_secret_hash(&hash_secret("sk_test_other"))
            .await
            .unwrap()
            .is_none());

        let at = now();
        let used = repo.mark_used(&key.id, at).await.unwrap();
        assert_eq!(used.last_used_at, Some(at));
        assert_eq!(used.updated_at, key.updated_at);
    }

    #[tokio::test]
    async fn test_mark_used_rejects_revoked_key() {
        let repo = MemoryRepository::<ApiKey>::new();
        let key = repo.create(ci_key()).await.unwrap();
        repo.deactivate(&key.id, &"org_1".into()).await.unwrap();

        let err = repo.mark_used(&key.id, now()).await.unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
        let stored = repo.find_by_id(&key.id, &"org_1".into()).await.unwrap().unwrap();
        assert!(stored.last_used_at.is_none());
    }
}
