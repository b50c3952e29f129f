//! Tenant-scoped repository contracts
//!
//! Every entity is owned by exactly one organization. Lookups, listings,
//! updates and deletes all take the caller's `OrgId`; an entity owned by a
//! different tenant behaves exactly as if it did not exist.

use crate::error::Result;
use crate::types::{OrgId, Page, Pagination};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod memory;
pub mod snapshot;

pub use memory::MemoryRepository;
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};

/// A tenant-owned entity that can live in a repository
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Partial update applied by `Repository::update`
    type Patch: Send + 'static;

    /// Entity kind, used in errors, audit references, and snapshot file names
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn org_id(&self) -> &OrgId;

    fn created_at(&self) -> DateTime<Utc>;

    /// Apply the fields set in `patch` and refresh `updated_at`
    fn apply(&mut self, patch: Self::Patch, now: DateTime<Utc>);

    /// Check entity invariants; called on create and after every update
    fn validate(&self) -> Result<()>;
}

/// CRUD operations over one entity kind
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Insert a new entity and return it as stored
    async fn create(&self, entity: E) -> Result<E>;

    /// Look up an entity within a tenant; `None` when absent or owned elsewhere
    async fn find_by_id(&self, id: &str, org_id: &OrgId) -> Result<Option<E>>;

    /// List a tenant's entities ordered by creation time
    async fn list_by_org(&self, org_id: &OrgId, pagination: Pagination) -> Result<Page<E>>;

    /// Apply a partial update; `NotFound` if the entity is not in the tenant
    async fn update(&self, id: &str, org_id: &OrgId, patch: E::Patch) -> Result<E>;

    /// Remove an entity; `NotFound` if the entity is not in the tenant
    async fn delete(&self, id: &str, org_id: &OrgId) -> Result<()>;
}
