//! Audit record model
//!
//! An `AuditRecord` describes who did what, when, to which tenant and
//! entity. It is built by the collaborator performing the tracked action,
//! handed to an `AuditLogger`, and never mutated afterwards.

use crate::error::{CoreError, Result};
use crate::types::{now, OrgId, ProjectId, TenantContext, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of tracked action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Read,
    WorkflowExecute,
    Login,
    Logout,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Read => "read",
            Self::WorkflowExecute => "workflow_execute",
            Self::Login => "login",
            Self::Logout => "logout",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the entity an action touched
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    /// Entity kind (e.g., "api_key", "report")
    pub kind: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.kind.trim().is_empty() || self.id.trim().is_empty() {
            return Err(CoreError::validation(
                "Entity reference requires both kind and id",
            ));
        }
        Ok(())
    }
}

/// Outcome of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// Action-specific detail attached to an audit record
///
/// Each variant is only valid with the actions listed on it, except
/// `Annotations`, which may accompany any action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditDetail {
    /// Create, update, delete
    FieldsChanged { fields: Vec<String> },
    /// Workflow execute
    Workflow {
        workflow: String,
        #[serde(rename = "runId")]
        run_id: String,
        outcome: WorkflowOutcome,
    },
    /// Login, logout
    Session {
        #[serde(default, rename = "ipAddress", skip_serializing_if = "Option::is_none")]
        ip_address: Option<String>,
        #[serde(default, rename = "userAgent", skip_serializing_if = "Option::is_none")]
        user_agent: Option<String>,
    },
    /// Read
    Access {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Free-form string annotations
    Annotations { entries: BTreeMap<String, String> },
}

impl AuditDetail {
    fn permits(&self, action: AuditAction) -> bool {
        use AuditAction::*;
        match self {
            Self::FieldsChanged { .. } => matches!(action, Create | Update | Delete),
            Self::Workflow { .. } => action == WorkflowExecute,
            Self::Session { .. } => matches!(action, Login | Logout),
            Self::Access { .. } => action == Read,
            Self::Annotations { .. } => true,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::FieldsChanged { .. } => "fields_changed",
            Self::Workflow { .. } => "workflow",
            Self::Session { .. } => "session",
            Self::Access { .. } => "access",
            Self::Annotations { .. } => "annotations",
        }
    }
}

/// A single audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Assigned by the audit store on append (aud-<uuid>)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// When the tracked action happened (ISO-8601)
    pub occurred_at: DateTime<Utc>,

    pub actor: UserId,

    pub org_id: OrgId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,

    pub action: AuditAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<AuditDetail>,
}

impl AuditRecord {
    /// Start a record for the given tenant context, stamped with the current time
    pub fn new(ctx: &TenantContext, action: AuditAction) -> Self {
        Self {
            id: None,
            occurred_at: now(),
            actor: ctx.user_id.clone(),
            org_id: ctx.org_id.clone(),
            project_id: ctx.project_id.clone(),
            action,
            entity: None,
            detail: None,
        }
    }

    pub fn with_entity(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.entity = Some(EntityRef::new(kind, id));
        self
    }

    pub fn with_detail(mut self, detail: AuditDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Check required fields and detail/action agreement
    pub fn validate(&self) -> Result<()> {
        if self.actor.is_empty() {
            return Err(CoreError::validation("Audit record requires an actor"));
        }
        if self.org_id.is_empty() {
            return Err(CoreError::validation("Audit record requires an organization"));
        }
        if let Some(project) = &self.project_id {
            if project.is_empty() {
                return Err(CoreError::validation("Audit project id cannot be blank"));
            }
        }
        if let Some(entity) = &self.entity {
            entity.validate()?;
        }
        if let Some(detail) = &self.detail {
            if !detail.permits(self.action) {
                return Err(CoreError::validation(format!(
                    "Detail '{}' is not valid for action '{}'",
                    detail.label(),
                    self.action
                )));
            }
        }
        Ok(())
    }
}
