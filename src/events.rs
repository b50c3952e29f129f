//! Domain events carried by the `EventBus`
//!
//! Payloads are a closed set of variants, one per event name, and are
//! validated before they reach any handler.

use crate::audit::{AuditAction, EntityRef};
use crate::error::{CoreError, Result};
use crate::types::{now, prefixed_id, OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscribe to this name to receive every event
pub const ALL_EVENTS: &str = "*";

/// How a repository entity changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A named domain event and its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    #[serde(rename = "auth.login", rename_all = "camelCase")]
    AuthLogin { user_id: UserId, org_id: OrgId },

    #[serde(rename = "auth.logout", rename_all = "camelCase")]
    AuthLogout { user_id: UserId, org_id: OrgId },

    #[serde(rename = "api_key.created", rename_all = "camelCase")]
    ApiKeyCreated {
        org_id: OrgId,
        key_id: String,
        prefix: String,
    },

    #[serde(rename = "api_key.used", rename_all = "camelCase")]
    ApiKeyUsed { org_id: OrgId, key_id: String },

    #[serde(rename = "api_key.revoked", rename_all = "camelCase")]
    ApiKeyRevoked { org_id: OrgId, key_id: String },

    #[serde(rename = "entity.changed", rename_all = "camelCase")]
    EntityChanged {
        org_id: OrgId,
        entity: EntityRef,
        change: ChangeKind,
    },

    #[serde(rename = "audit.recorded", rename_all = "camelCase")]
    AuditRecorded {
        org_id: OrgId,
        record_id: String,
        action: AuditAction,
    },
}

impl DomainEvent {
    /// Stable event name used for subscriptions
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthLogin { .. } => "auth.login",
            Self::AuthLogout { .. } => "auth.logout",
            Self::ApiKeyCreated { .. } => "api_key.created",
            Self::ApiKeyUsed { .. } => "api_key.used",
            Self::ApiKeyRevoked { .. } => "api_key.revoked",
            Self::EntityChanged { .. } => "entity.changed",
            Self::AuditRecorded { .. } => "audit.recorded",
        }
    }

    /// Tenant the event belongs to
    pub fn org_id(&self) -> &OrgId {
        match self {
            Self::AuthLogin { org_id, .. }
            | Self::AuthLogout { org_id, .. }
            | Self::ApiKeyCreated { org_id, .. }
            | Self::ApiKeyUsed { org_id, .. }
            | Self::ApiKeyRevoked { org_id, .. }
            | Self::EntityChanged { org_id, .. }
            | Self::AuditRecorded { org_id, .. } => org_id,
        }
    }

    /// Reject events with blank identifiers
    pub fn validate(&self) -> Result<()> {
        if self.org_id().is_empty() {
            return Err(CoreError::validation(format!(
                "Event '{}' requires an organization",
                self.name()
            )));
        }

        let blank = |field: &str| {
            CoreError::validation(format!("Event '{}' has a blank {}", self.name(), field))
        };

        match self {
            Self::AuthLogin { user_id, .. } | Self::AuthLogout { user_id, .. } => {
                if user_id.is_empty() {
                    return Err(blank("userId"));
                }
            }
            Self::ApiKeyCreated { key_id, prefix, .. } => {
                if key_id.trim().is_empty() {
                    return Err(blank("keyId"));
                }
                if prefix.trim().is_empty() {
                    return Err(blank("prefix"));
                }
            }
            Self::ApiKeyUsed { key_id, .. } | Self::ApiKeyRevoked { key_id, .. } => {
                if key_id.trim().is_empty() {
                    return Err(blank("keyId"));
                }
            }
            Self::EntityChanged { entity, .. } => entity.validate()?,
            Self::AuditRecorded { record_id, .. } => {
                if record_id.trim().is_empty() {
                    return Err(blank("recordId"));
                }
            }
        }
        Ok(())
    }
}

/// A published event as delivered to handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique event identifier (evt-<uuid>)
    pub id: String,

    /// Event name, same as `payload.name()`
    pub name: String,

    pub payload: DomainEvent,

    pub published_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Wrap an event with a fresh id and timestamp
    pub fn new(payload: DomainEvent) -> Self {
        Self {
            id: prefixed_id("evt"),
            name: payload.name().to_string(),
            payload,
            published_at: now(),
        }
    }
}
