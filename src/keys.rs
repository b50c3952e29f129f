//! API key issuance and authentication
//!
//! Secrets have the form `sk_live_<base64url>` / `sk_test_<base64url>` over
//! 32 random bytes. The raw secret is returned exactly once from `issue`;
//! only its SHA-256 hash is stored.

use crate::audit::{AuditAction, AuditDetail, AuditLogger, AuditRecord};
use crate::bus::EventBus;
use crate::entities::{hash_secret, ApiKey, ApiKeyRepository, ApiKeySummary, KeyPrefix, NewApiKey};
use crate::error::{CoreError, Result};
use crate::events::DomainEvent;
use crate::repository::{Entity, Repository};
use crate::types::{now, Page, Pagination, TenantContext};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use std::sync::Arc;

const SECRET_BYTES: usize = 32;

/// A freshly issued key together with its one-time raw secret
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub key: ApiKey,
    pub secret: String,
}

/// Issues, authenticates and revokes API keys
pub struct ApiKeyService {
    repo: Arc<dyn ApiKeyRepository>,
    audit: Arc<dyn AuditLogger>,
    bus: Arc<EventBus>,
}

impl ApiKeyService {
    pub fn new(
        repo: Arc<dyn ApiKeyRepository>,
        audit: Arc<dyn AuditLogger>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { repo, audit, bus }
    }

    pub fn repository(&self) -> &Arc<dyn ApiKeyRepository> {
        &self.repo
    }

    /// Create a key for the caller's organization
    pub async fn issue(&self, ctx: &TenantContext, input: NewApiKey) -> Result<IssuedApiKey> {
        if input.org_id != ctx.org_id {
            return Err(CoreError::Unauthorized(format!(
                "Cannot issue keys for organization {}",
                input.org_id
            )));
        }

        let secret = generate_secret(input.prefix);
        let key = self.repo.create(ApiKey::new(input, hash_secret(&secret))).await?;

        let audited = self
            .audit
            .record(
                AuditRecord::new(ctx, AuditAction::Create)
                    .with_entity(ApiKey::KIND, key.id.clone())
                    .with_detail(AuditDetail::FieldsChanged {
                        fields: vec!["name".into(), "prefix".into(), "scopes".into()],
                    }),
            )
            .await;
        if let Err(e) = audited {
            // An unaudited key must not stay usable
            if let Err(cleanup) = self.repo.delete(&key.id, &key.org_id).await {
                tracing::warn!(key_id = %key.id, error = %cleanup, "Failed to remove unaudited API key");
            }
            return Err(e);
        }

        tracing::info!(
            key_id = %key.id,
            org = %key.org_id,
            prefix = %key.prefix,
            scopes = key.scopes.len(),
            "API key issued"
        );

        self.announce(DomainEvent::ApiKeyCreated {
            org_id: key.org_id.clone(),
            key_id: key.id.clone(),
            prefix: key.prefix.to_string(),
        })
        .await;

        Ok(IssuedApiKey { key, secret })
    }

    /// Resolve a raw secret to an active, unexpired key
    pub async fn authenticate(&self, secret: &str) -> Result<ApiKey> {
        let prefix = KeyPrefix::of_secret(secret)
            .ok_or_else(|| CoreError::Unauthorized("Malformed API key".to_string()))?;
        if secret.len() <= prefix.as_str().len() + 1 {
            return Err(CoreError::Unauthorized("Malformed API key".to_string()));
        }

        let key = self
            .repo
            .find_by_secret_hash(&hash_secret(secret))
            .await?
            .ok_or_else(|| CoreError::Unauthorized("Unknown API key".to_string()))?;

        let at = now();
        if !key.active {
            tracing::warn!(key_id = %key.id, org = %key.org_id, "Rejected revoked API key");
            return Err(CoreError::Unauthorized("API key has been revoked".to_string()));
        }
        if key.is_expired(at) {
            tracing::warn!(key_id = %key.id, org = %key.org_id, "Rejected expired API key");
            return Err(CoreError::Unauthorized("API key has expired".to_string()));
        }

        let key = self.repo.mark_used(&key.id, at).await?;
        self.announce(DomainEvent::ApiKeyUsed {
            org_id: key.org_id.clone(),
            key_id: key.id.clone(),
        })
        .await;
        Ok(key)
    }

    /// Deactivate a key in the caller's organization
    ///
    /// The key is deactivated before the audit write. If auditing fails the
    /// error is returned but the key stays revoked.
    pub async fn revoke(&self, ctx: &TenantContext, id: &str) -> Result<ApiKey> {
        let key = self.repo.deactivate(id, &ctx.org_id).await?;

        self.audit
            .record(
                AuditRecord::new(ctx, AuditAction::Update)
                    .with_entity(ApiKey::KIND, key.id.clone())
                    .with_detail(AuditDetail::FieldsChanged {
                        fields: vec!["active".into()],
                    }),
            )
            .await?;

        tracing::info!(key_id = %key.id, org = %key.org_id, "API key revoked");

        self.announce(DomainEvent::ApiKeyRevoked {
            org_id: key.org_id.clone(),
            key_id: key.id.clone(),
        })
        .await;

        Ok(key)
    }

    /// The caller's keys without their hashes
    pub async fn list(
        &self,
        ctx: &TenantContext,
        pagination: Pagination,
    ) -> Result<Page<ApiKeySummary>> {
        let page = self.repo.list_by_org(&ctx.org_id, pagination).await?;
        Ok(Page {
            items: page.items.iter().map(ApiKey::summary).collect(),
            total: page.total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    async fn announce(&self, event: DomainEvent) {
        let name = event.name();
        if let Err(e) = self.bus.publish(event).await {
            tracing::warn!(event = name, error = %e, "Failed to publish API key event");
        }
    }
}

fn generate_secret(prefix: KeyPrefix) -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(bytes))
}
