//! Append-only audit stores
//!
//! `AuditStore` is the durable contract behind the audit logger: records
//! are appended once and read back by tenant and time range. Two backends
//! ship with the crate:
//!
//! - `MemoryAuditStore`: unbounded in-process log for tests and single-process use
//! - `FileAuditStore`: JSONL file with size-based rotation

use super::record::{AuditAction, AuditRecord};
use crate::error::{CoreError, Result};
use crate::types::{prefixed_id, OrgId, ProjectId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Filter for reading audit records back out of a store
///
/// `from` is inclusive and `to` is exclusive.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub org_id: OrgId,
    pub project_id: Option<ProjectId>,
    pub actor: Option<UserId>,
    pub action: Option<AuditAction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    /// Everything recorded for a tenant
    pub fn for_org(org_id: impl Into<OrgId>) -> Self {
        Self {
            org_id: org_id.into(),
            project_id: None,
            actor: None,
            action: None,
            from: None,
            to: None,
            limit: None,
        }
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn project(mut self, project_id: impl Into<ProjectId>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<UserId>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record falls inside this query
    pub fn matches(&self, record: &AuditRecord) -> bool {
        record.org_id == self.org_id
            && self
                .project_id
                .as_ref()
                .map_or(true, |p| record.project_id.as_ref() == Some(p))
            && self.actor.as_ref().map_or(true, |a| &record.actor == a)
            && self.action.map_or(true, |a| record.action == a)
            && self.from.map_or(true, |from| record.occurred_at >= from)
            && self.to.map_or(true, |to| record.occurred_at < to)
    }

    /// Filter, order by occurrence, and truncate
    fn select<'a>(&self, records: impl Iterator<Item = &'a AuditRecord>) -> Vec<AuditRecord> {
        let mut selected: Vec<AuditRecord> =
            records.filter(|r| self.matches(r)).cloned().collect();
        // Stable sort keeps append order for identical timestamps
        selected.sort_by_key(|r| r.occurred_at);
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Durable, append-only audit storage
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a record, assigning an id if it has none; returns the stored record
    async fn append(&self, record: AuditRecord) -> Result<AuditRecord>;

    /// Read records matching a query, ordered by `occurred_at` ascending
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>>;

    /// Number of records stored for a tenant
    async fn count(&self, org_id: &OrgId) -> Result<u64>;

    /// Backend name (e.g., "memory", "file")
    fn name(&self) -> &str;
}

fn assign_id(mut record: AuditRecord) -> AuditRecord {
    if record.id.is_none() {
        record.id = Some(prefixed_id("aud"));
    }
    record
}

/// In-memory audit store
///
/// Keeps every record for the life of the process. Nothing is evicted.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: AuditRecord) -> Result<AuditRecord> {
        let record = assign_id(record);
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let records = self.records.read().await;
        Ok(query.select(records.iter()))
    }

    async fn count(&self, org_id: &OrgId) -> Result<u64> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| &r.org_id == org_id).count() as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

const ACTIVE_FILE: &str = "audit.jsonl";
const ROTATED_PREFIX: &str = "audit-";

/// JSONL file audit store with size-based rotation
///
/// Appends one JSON record per line to `audit.jsonl`. Once the active file
/// reaches `max_file_bytes` it is renamed to `audit-<timestamp>.jsonl` and a
/// fresh file is started. Queries read rotated files oldest first, then the
/// active file, so the full history stays retrievable. With
/// `max_rotated_files == 0` rotated files are kept forever.
pub struct FileAuditStore {
    dir: PathBuf,
    active_path: PathBuf,
    max_file_bytes: u64,
    max_rotated_files: usize,
    /// Held shared by reads, exclusively by appends and rotation
    file_lock: RwLock<()>,
}

impl FileAuditStore {
    /// Open (creating if needed) an audit directory
    pub async fn open(
        dir: impl Into<PathBuf>,
        max_file_bytes: u64,
        max_rotated_files: usize,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            CoreError::Storage(format!(
                "Failed to create audit directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        let active_path = dir.join(ACTIVE_FILE);
        Ok(Self {
            dir,
            active_path,
            max_file_bytes,
            max_rotated_files,
            file_lock: RwLock::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rotated files, oldest first
    async fn rotated_files(&self) -> Result<Vec<PathBuf>> {
        let mut rotated = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            CoreError::Storage(format!(
                "Failed to read audit directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoreError::Storage(format!("Failed to read directory entry: {}", e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(ROTATED_PREFIX) && name.ends_with(".jsonl") {
                rotated.push(entry.path());
            }
        }
        // Timestamp suffixes sort lexicographically in time order
        rotated.sort();
        Ok(rotated)
    }

    async fn maybe_rotate(&self) -> Result<()> {
        let meta = match fs::metadata(&self.active_path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(CoreError::Storage(format!(
                    "Failed to stat audit file {}: {}",
                    self.active_path.display(),
                    e
                )))
            }
        };
        if self.max_file_bytes == 0 || meta.len() < self.max_file_bytes {
            return Ok(());
        }

        let ts = Utc::now().format("%Y%m%dT%H%M%S%.6f").to_string();
        let mut rotated = self.dir.join(rotated_name(&ts, 0));
        let mut counter = 1u32;
        while fs::try_exists(&rotated).await.unwrap_or(false) {
            rotated = self.dir.join(rotated_name(&ts, counter));
            counter += 1;
        }
        fs::rename(&self.active_path, &rotated).await.map_err(|e| {
            CoreError::Storage(format!("Failed to rotate audit file: {}", e))
        })?;
        tracing::info!(rotated = %rotated.display(), "Audit file rotated");

        self.prune_rotated().await
    }

    async fn prune_rotated(&self) -> Result<()> {
        if self.max_rotated_files == 0 {
            return Ok(());
        }
        let rotated = self.rotated_files().await?;
        if rotated.len() <= self.max_rotated_files {
            return Ok(());
        }
        let excess = rotated.len() - self.max_rotated_files;
        for path in rotated.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to prune audit file");
            }
        }
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<AuditRecord>> {
        let content = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CoreError::Storage(format!(
                    "Failed to read audit file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping unreadable audit line"
                ),
            }
        }
        Ok(records)
    }

    async fn read_all(&self) -> Result<Vec<AuditRecord>> {
        // Rotation must not move the active file between listing and reading
        let _guard = self.file_lock.read().await;
        let mut all = Vec::new();
        for path in self.rotated_files().await? {
            all.extend(self.read_file(&path).await?);
        }
        all.extend(self.read_file(&self.active_path).await?);
        Ok(all)
    }
}

/// `audit-<ts>.jsonl`, or `audit-<ts>_<nnnn>.jsonl` for same-instant collisions
fn rotated_name(ts: &str, collision: u32) -> String {
    if collision == 0 {
        format!("{}{}.jsonl", ROTATED_PREFIX, ts)
    } else {
        format!("{}{}_{:04}.jsonl", ROTATED_PREFIX, ts, collision)
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn append(&self, record: AuditRecord) -> Result<AuditRecord> {
        let record = assign_id(record);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.file_lock.write().await;
        self.maybe_rotate().await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.active_path)
            .await
            .map_err(|e| {
                CoreError::Storage(format!(
                    "Failed to open audit file {}: {}",
                    self.active_path.display(),
                    e
                ))
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CoreError::Storage(format!("Failed to write audit record: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| CoreError::Storage(format!("Failed to flush audit file: {}", e)))?;

        Ok(record)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let all = self.read_all().await?;
        Ok(query.select(all.iter()))
    }

    async fn count(&self, org_id: &OrgId) -> Result<u64> {
        let all = self.read_all().await?;
        Ok(all.iter().filter(|r| &r.org_id == org_id).count() as u64)
    }

    fn name(&self) -> &str {
        "file"
    }
}
