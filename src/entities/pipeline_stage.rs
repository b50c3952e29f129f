//! Sales pipeline stage entity

use crate::error::{CoreError, Result};
use crate::repository::Entity;
use crate::types::{now, prefixed_id, OrgId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    /// stg-<uuid>
    pub id: String,
    pub org_id: OrgId,
    pub name: String,
    /// Display order, lowest first
    pub position: u32,
    /// Win probability in percent (0..=100)
    pub probability: u8,
    /// Deals in a closed stage are won or lost
    pub closed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPipelineStage {
    pub org_id: OrgId,
    pub name: String,
    pub position: u32,
    pub probability: u8,
    pub closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineStagePatch {
    pub name: Option<String>,
    pub position: Option<u32>,
    pub probability: Option<u8>,
    pub closed: Option<bool>,
}

impl PipelineStage {
    pub fn new(input: NewPipelineStage) -> Self {
        let created_at = now();
        Self {
            id: prefixed_id("stg"),
            org_id: input.org_id,
            name: input.name,
            position: input.position,
            probability: input.probability,
            closed: input.closed,
            created_at,
            updated_at: created_at,
        }
    }
}

impl Entity for PipelineStage {
    type Patch = PipelineStagePatch;
    const KIND: &'static str = "pipeline_stage";

    fn id(&self) -> &str {
        &self.id
    }

    fn org_id(&self) -> &OrgId {
        &self.org_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply(&mut self, patch: PipelineStagePatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(probability) = patch.probability {
            self.probability = probability;
        }
        if let Some(closed) = patch.closed {
            self.closed = closed;
        }
        self.updated_at = now;
    }

    fn validate(&self) -> Result<()> {
        if self.org_id.is_empty() {
            return Err(CoreError::validation("Pipeline stage requires an organization"));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::validation("Pipeline stage name cannot be empty"));
        }
        if self.probability > 100 {
            return Err(CoreError::validation(format!(
                "Pipeline stage probability {} exceeds 100",
                self.probability
            )));
        }
        Ok(())
    }
}
