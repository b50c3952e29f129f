//! Program entity: a run of scheduled content within a project

use crate::error::{CoreError, Result};
use crate::repository::Entity;
use crate::types::{now, prefixed_id, OrgId, ProjectId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Draft,
    Scheduled,
    Live,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    /// prg-<uuid>
    pub id: String,
    pub org_id: OrgId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ProgramStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProgram {
    pub org_id: OrgId,
    pub project_id: Option<ProjectId>,
    pub name: String,
    pub description: Option<String>,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct ProgramPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<ProgramStatus>,
    pub project_id: Option<Option<ProjectId>>,
    pub starts_on: Option<Option<NaiveDate>>,
    pub ends_on: Option<Option<NaiveDate>>,
}

impl Program {
    /// New programs start as drafts
    pub fn new(input: NewProgram) -> Self {
        let created_at = now();
        Self {
            id: prefixed_id("prg"),
            org_id: input.org_id,
            project_id: input.project_id,
            name: input.name,
            description: input.description,
            status: ProgramStatus::Draft,
            starts_on: input.starts_on,
            ends_on: input.ends_on,
            created_at,
            updated_at: created_at,
        }
    }
}

impl Entity for Program {
    type Patch = ProgramPatch;
    const KIND: &'static str = "program";

    fn id(&self) -> &str {
        &self.id
    }

    fn org_id(&self) -> &OrgId {
        &self.org_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply(&mut self, patch: ProgramPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(project_id) = patch.project_id {
            self.project_id = project_id;
        }
        if let Some(starts_on) = patch.starts_on {
            self.starts_on = starts_on;
        }
        if let Some(ends_on) = patch.ends_on {
            self.ends_on = ends_on;
        }
        self.updated_at = now;
    }

    fn validate(&self) -> Result<()> {
        if self.org_id.is_empty() {
            return Err(CoreError::validation("Program requires an organization"));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::validation("Program name cannot be empty"));
        }
        if let (Some(start), Some(end)) = (self.starts_on, self.ends_on) {
            if start > end {
                return Err(CoreError::validation(format!(
                    "Program starts on {} after it ends on {}",
                    start, end
                )));
            }
        }
        Ok(())
    }
}
