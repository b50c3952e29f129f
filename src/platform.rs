//! Platform lifecycle
//!
//! `Platform` wires every collaborator from one `CoreConfig`: the event bus,
//! the audit store and logger, the entity repositories, and the API key
//! service. The hosting application creates it once at startup and calls
//! `shutdown` on the way out. There is no process-wide state.

use crate::audit::{AuditStore, FileAuditStore, MemoryAuditStore, StoreAuditLogger};
use crate::bus::EventBus;
use crate::config::{AuditConfig, CoreConfig};
use crate::dead_letter::{FailureSink, MemoryFailureSink};
use crate::entities::{ApiKey, PipelineStage, Program, Report};
use crate::error::Result;
use crate::keys::ApiKeyService;
use crate::repository::{Entity, FileSnapshotStore, MemoryRepository};
use std::path::Path;
use std::sync::Arc;

/// Owned set of audit, event, and repository collaborators
pub struct Platform {
    config: CoreConfig,
    bus: Arc<EventBus>,
    audit: Arc<StoreAuditLogger>,
    api_keys: Arc<MemoryRepository<ApiKey>>,
    reports: Arc<MemoryRepository<Report>>,
    programs: Arc<MemoryRepository<Program>>,
    pipeline_stages: Arc<MemoryRepository<PipelineStage>>,
    keys: ApiKeyService,
}

impl Platform {
    /// Validate `config` and build every collaborator
    pub async fn init(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let failures = Arc::new(MemoryFailureSink::new(config.bus.failure_capacity));
        let bus = Arc::new(EventBus::with_failure_sink(&config.bus, failures));

        let store: Arc<dyn AuditStore> = match &config.audit {
            AuditConfig::Memory => Arc::new(MemoryAuditStore::new()),
            AuditConfig::File {
                dir,
                max_file_bytes,
                max_rotated_files,
            } => Arc::new(FileAuditStore::open(dir.clone(), *max_file_bytes, *max_rotated_files).await?),
        };
        let audit = Arc::new(StoreAuditLogger::new(store).with_bus(bus.clone()));

        let snapshot_dir = config.store.snapshot_dir.as_deref();
        let api_keys = open_repository::<ApiKey>(snapshot_dir, &bus)?;
        let reports = open_repository::<Report>(snapshot_dir, &bus)?;
        let programs = open_repository::<Program>(snapshot_dir, &bus)?;
        let pipeline_stages = open_repository::<PipelineStage>(snapshot_dir, &bus)?;

        let keys = ApiKeyService::new(api_keys.clone(), audit.clone(), bus.clone());

        tracing::info!(
            audit_store = audit.store().name(),
            snapshots = ?snapshot_dir,
            history_capacity = config.bus.history_capacity,
            "Platform initialized"
        );

        Ok(Self {
            config,
            bus,
            audit,
            api_keys,
            reports,
            programs,
            pipeline_stages,
            keys,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn audit(&self) -> &Arc<StoreAuditLogger> {
        &self.audit
    }

    pub fn api_keys(&self) -> &Arc<MemoryRepository<ApiKey>> {
        &self.api_keys
    }

    pub fn reports(&self) -> &Arc<MemoryRepository<Report>> {
        &self.reports
    }

    pub fn programs(&self) -> &Arc<MemoryRepository<Program>> {
        &self.programs
    }

    pub fn pipeline_stages(&self) -> &Arc<MemoryRepository<PipelineStage>> {
        &self.pipeline_stages
    }

    pub fn keys(&self) -> &ApiKeyService {
        &self.keys
    }

    /// Flush repository snapshots and release the platform
    pub async fn shutdown(self) -> Result<()> {
        self.api_keys.flush().await?;
        self.reports.flush().await?;
        self.programs.flush().await?;
        self.pipeline_stages.flush().await?;

        let counts = self.bus.counts().await;
        let failed = self.bus.failures().count().await.unwrap_or(0);
        tracing::info!(
            events = counts.total,
            failed_deliveries = failed,
            "Platform shut down"
        );
        Ok(())
    }
}

fn open_repository<E: Entity>(
    snapshot_dir: Option<&Path>,
    bus: &Arc<EventBus>,
) -> Result<Arc<MemoryRepository<E>>> {
    let repo = match snapshot_dir {
        Some(dir) => MemoryRepository::with_snapshot(Arc::new(FileSnapshotStore::<E>::in_dir(dir)))?,
        None => MemoryRepository::new(),
    };
    Ok(Arc::new(repo.with_bus(bus.clone())))
}
