//! Audit recording: the record model, durable stores, and the logger.

pub mod logger;
pub mod record;
pub mod store;

pub use logger::{AuditLogger, StoreAuditLogger};
pub use record::{AuditAction, AuditDetail, AuditRecord, EntityRef, WorkflowOutcome};
pub use store::{AuditQuery, AuditStore, FileAuditStore, MemoryAuditStore};
