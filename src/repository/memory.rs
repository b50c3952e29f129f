//! In-memory repository with optional snapshot persistence

use super::snapshot::SnapshotStore;
use super::{Entity, Repository};
use crate::audit::EntityRef;
use crate::bus::EventBus;
use crate::error::{CoreError, Result};
use crate::events::{ChangeKind, DomainEvent};
use crate::types::{now, OrgId, Page, Pagination};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Repository keeping entities in a `HashMap`
///
/// Writes are last-write-wins. When a `SnapshotStore` is attached the full
/// map is saved after every mutation; a failed save rolls the mutation back.
/// With a bus attached, each committed create, update and delete is
/// published as `entity.changed`.
pub struct MemoryRepository<E: Entity> {
    entities: RwLock<HashMap<String, E>>,
    snapshot: Option<Arc<dyn SnapshotStore<E>>>,
    bus: Option<Arc<EventBus>>,
}

impl<E: Entity> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemoryRepository<E> {
    /// Empty, non-persistent repository
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            snapshot: None,
            bus: None,
        }
    }

    /// Repository backed by a snapshot, loading its current contents
    pub fn with_snapshot(snapshot: Arc<dyn SnapshotStore<E>>) -> Result<Self> {
        let entities = snapshot.load()?;
        tracing::info!(kind = E::KIND, count = entities.len(), "Repository loaded");
        Ok(Self {
            entities: RwLock::new(entities),
            snapshot: Some(snapshot),
            bus: None,
        })
    }

    /// Publish committed changes on the bus
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Best effort; the write has already been committed
    pub(crate) async fn announce(&self, org_id: &OrgId, id: &str, change: ChangeKind) {
        let Some(bus) = &self.bus else {
            return;
        };
        let event = DomainEvent::EntityChanged {
            org_id: org_id.clone(),
            entity: EntityRef::new(E::KIND, id),
            change,
        };
        if let Err(e) = bus.publish(event).await {
            tracing::warn!(kind = E::KIND, id = %id, error = %e, "Failed to announce entity change");
        }
    }

    fn persist(&self, entities: &HashMap<String, E>) -> Result<()> {
        match &self.snapshot {
            Some(snapshot) => snapshot.save(entities),
            None => Ok(()),
        }
    }

    /// Save the current contents to the snapshot store, if any
    pub async fn flush(&self) -> Result<()> {
        let entities = self.entities.read().await;
        self.persist(&entities)
    }

    /// Total entities across all tenants
    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// First entity (in any tenant) matching a predicate
    pub(crate) async fn find_where<P>(&self, predicate: P) -> Option<E>
    where
        P: Fn(&E) -> bool,
    {
        let entities = self.entities.read().await;
        entities.values().find(|e| predicate(e)).cloned()
    }

    /// Mutate one entity in place under the same rules as `update`
    pub(crate) async fn modify<F>(&self, id: &str, org_id: Option<&OrgId>, f: F) -> Result<E>
    where
        F: FnOnce(&mut E),
    {
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(id)
            .filter(|e| org_id.map_or(true, |org| e.org_id() == org))
            .ok_or_else(|| CoreError::not_found(E::KIND, id))?;

        let previous = entity.clone();
        f(entity);
        if let Err(e) = entity.validate() {
            *entity = previous;
            return Err(e);
        }
        let updated = entity.clone();

        if let Err(e) = self.persist(&entities) {
            entities.insert(id.to_string(), previous);
            return Err(e);
        }
        Ok(updated)
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    async fn create(&self, entity: E) -> Result<E> {
        entity.validate()?;
        let id = entity.id().to_string();

        let mut entities = self.entities.write().await;
        if entities.contains_key(&id) {
            return Err(CoreError::AlreadyExists {
                entity: E::KIND.to_string(),
                id,
            });
        }
        entities.insert(id.clone(), entity.clone());

        if let Err(e) = self.persist(&entities) {
            entities.remove(&id);
            return Err(e);
        }

        drop(entities);

        tracing::debug!(kind = E::KIND, id = %id, org = %entity.org_id(), "Entity created");
        self.announce(entity.org_id(), &id, ChangeKind::Created).await;
        Ok(entity)
    }

    async fn find_by_id(&self, id: &str, org_id: &OrgId) -> Result<Option<E>> {
        let entities = self.entities.read().await;
        Ok(entities
            .get(id)
            .filter(|e| e.org_id() == org_id)
            .cloned())
    }

    async fn list_by_org(&self, org_id: &OrgId, pagination: Pagination) -> Result<Page<E>> {
        let entities = self.entities.read().await;
        let mut owned: Vec<E> = entities
            .values()
            .filter(|e| e.org_id() == org_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(Page::from_sorted(owned, pagination))
    }

    async fn update(&self, id: &str, org_id: &OrgId, patch: E::Patch) -> Result<E> {
        let updated = self
            .modify(id, Some(org_id), |entity| entity.apply(patch, now()))
            .await?;
        tracing::debug!(kind = E::KIND, id = %id, org = %org_id, "Entity updated");
        self.announce(org_id, id, ChangeKind::Updated).await;
        Ok(updated)
    }

    async fn delete(&self, id: &str, org_id: &OrgId) -> Result<()> {
        let mut entities = self.entities.write().await;
        let owned = entities.get(id).is_some_and(|e| e.org_id() == org_id);
        if !owned {
            return Err(CoreError::not_found(E::KIND, id));
        }

        let removed = entities.remove(id);
        if let Err(e) = self.persist(&entities) {
            if let Some(entity) = removed {
                entities.insert(id.to_string(), entity);
            }
            return Err(e);
        }

        drop(entities);

        tracing::debug!(kind = E::KIND, id = %id, org = %org_id, "Entity deleted");
        self.announce(org_id, id, ChangeKind::Deleted).await;
        Ok(())
    }
}
