//! Report entity

use crate::error::{CoreError, Result};
use crate::repository::Entity;
use crate::types::{now, prefixed_id, OrgId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Finance,
    Attendance,
    Procurement,
    People,
    Pipeline,
    Custom,
}

/// A saved report definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// rpt-<uuid>
    pub id: String,
    pub org_id: OrgId,
    pub name: String,
    pub kind: ReportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Saved filter values, e.g. `{"currency": "EUR"}`
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub org_id: OrgId,
    pub name: String,
    pub kind: ReportKind,
    pub description: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

/// Fields that can be updated on an existing report
#[derive(Debug, Clone, Default)]
pub struct ReportPatch {
    pub name: Option<String>,
    pub kind: Option<ReportKind>,
    pub description: Option<Option<String>>,
    pub parameters: Option<BTreeMap<String, String>>,
    pub last_generated_at: Option<DateTime<Utc>>,
}

impl Report {
    pub fn new(input: NewReport) -> Self {
        let created_at = now();
        Self {
            id: prefixed_id("rpt"),
            org_id: input.org_id,
            name: input.name,
            kind: input.kind,
            description: input.description,
            parameters: input.parameters,
            created_at,
            updated_at: created_at,
            last_generated_at: None,
        }
    }
}

impl Entity for Report {
    type Patch = ReportPatch;
    const KIND: &'static str = "report";

    fn id(&self) -> &str {
        &self.id
    }

    fn org_id(&self) -> &OrgId {
        &self.org_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply(&mut self, patch: ReportPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(parameters) = patch.parameters {
            self.parameters = parameters;
        }
        if let Some(at) = patch.last_generated_at {
            self.last_generated_at = Some(at);
        }
        self.updated_at = now;
    }

    fn validate(&self) -> Result<()> {
        if self.org_id.is_empty() {
            return Err(CoreError::validation("Report requires an organization"));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::validation("Report name cannot be empty"));
        }
        if self.parameters.keys().any(|k| k.trim().is_empty()) {
            return Err(CoreError::validation("Report parameter names cannot be empty"));
        }
        Ok(())
    }
}
