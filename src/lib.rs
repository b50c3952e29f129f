//! # backstage-core
//!
//! Audit logging, domain events, and tenant-scoped repositories for a
//! multi-tenant production management backend.
//!
//! ## Quick Start
//!
//! ```rust
//! use backstage_core::{CoreConfig, DomainEvent, Platform};
//!
//! # async fn example() -> backstage_core::Result<()> {
//! let platform = Platform::init(CoreConfig::default()).await?;
//!
//! let subscription = platform
//!     .bus()
//!     .subscribe_fn("auth.login", |event| {
//!         println!("login: {}", event.id);
//!         Ok(())
//!     })
//!     .await;
//!
//! platform
//!     .bus()
//!     .publish(DomainEvent::AuthLogin {
//!         user_id: "u1".into(),
//!         org_id: "org_1".into(),
//!     })
//!     .await?;
//!
//! subscription.unsubscribe().await;
//! platform.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **AuditLogger** / **AuditStore**: validated, append-only audit records
//!   retrievable by tenant and time range (memory or rotating JSONL files)
//! - **EventBus**: in-process fan-out of typed `DomainEvent`s with failure
//!   isolation, bounded history, and a broadcast stream
//! - **Repository**: organization-scoped CRUD over `Entity` types, with
//!   optional snapshot persistence
//! - **ApiKeyService**: key issuance, authentication, and revocation
//! - **Platform**: builds all of the above from one `CoreConfig`

pub mod audit;
pub mod bus;
pub mod config;
pub mod dead_letter;
pub mod entities;
pub mod error;
pub mod events;
pub mod keys;
pub mod platform;
pub mod repository;
pub mod telemetry;
pub mod types;

// Re-export core types
pub use audit::{
    AuditAction, AuditDetail, AuditLogger, AuditQuery, AuditRecord, AuditStore, EntityRef,
    FileAuditStore, MemoryAuditStore, StoreAuditLogger, WorkflowOutcome,
};
pub use bus::{EventBus, EventCounts, EventHandler, FnHandler, PublishReceipt, Subscription};
pub use config::{AuditConfig, BusConfig, CoreConfig, StoreConfig, TelemetryConfig};
pub use dead_letter::{FailedDelivery, FailureSink, MemoryFailureSink};
pub use error::{CoreError, Result};
pub use events::{ChangeKind, DomainEvent, EventEnvelope, ALL_EVENTS};
pub use keys::{ApiKeyService, IssuedApiKey};
pub use platform::Platform;
pub use repository::{
    Entity, FileSnapshotStore, MemoryRepository, MemorySnapshotStore, Repository, SnapshotStore,
};
pub use types::{OrgId, Page, Pagination, ProjectId, TenantContext, UserId};
