//! Tenant-owned domain entities and their DTO shapes

pub mod api_key;
pub mod pipeline_stage;
pub mod program;
pub mod report;

pub use api_key::{
    hash_secret, ApiKey, ApiKeyPatch, ApiKeyRepository, ApiKeyScope, ApiKeySummary, KeyPrefix,
    NewApiKey,
};
pub use pipeline_stage::{NewPipelineStage, PipelineStage, PipelineStagePatch};
pub use program::{NewProgram, Program, ProgramPatch, ProgramStatus};
pub use report::{NewReport, Report, ReportKind, ReportPatch};
