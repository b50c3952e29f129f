//! Platform integration tests
//!
//! End-to-end tests driving the audit log, event bus, repositories and API
//! key service through a `Platform` built from configuration. Covers the
//! file-backed audit store, snapshot persistence, and tenant isolation.

use backstage_core::entities::{
    ApiKeyRepository, ApiKeyScope, KeyPrefix, NewApiKey, NewProgram, NewReport, Program,
    ProgramPatch, ProgramStatus, Report, ReportKind,
};
use backstage_core::{
    AuditAction, AuditConfig, AuditDetail, AuditLogger, AuditQuery, AuditRecord, AuditStore, CoreConfig,
    ChangeKind, CoreError, DomainEvent, EntityRef, Pagination, Platform, Repository, StoreConfig,
    TenantContext,
};
use chrono::{Duration, TimeZone, Utc};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("backstage-{}-{}", label, uuid::Uuid::new_v4()))
}

async fn memory_platform() -> Platform {
    Platform::init(CoreConfig::default()).await.unwrap()
}

fn ctx() -> TenantContext {
    TenantContext::new("u1", "org_1")
}

// ─── API keys ────────────────────────────────────────────────────

#[tokio::test]
async fn test_ci_key_listed_then_deactivated() {
    let platform = memory_platform().await;

    let issued = platform
        .keys()
        .issue(
            &ctx(),
            NewApiKey {
                org_id: "org_1".into(),
                name: "CI Key".into(),
                prefix: KeyPrefix::Test,
                scopes: [ApiKeyScope::ProjectsRead].into_iter().collect(),
                expires_at: None,
            },
        )
        .await
        .unwrap();

    let page = platform
        .api_keys()
        .list_by_org(&"org_1".into(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].name, "CI Key");
    assert!(page.items[0].active);

    let before = page.items[0].clone();
    let after = platform
        .api_keys()
        .deactivate(&issued.key.id, &"org_1".into())
        .await
        .unwrap();
    assert!(!after.active);
    assert_eq!(after.id, before.id);
    assert_eq!(after.org_id, before.org_id);
    assert_eq!(after.name, before.name);
    assert_eq!(after.secret_hash, before.secret_hash);
    assert_eq!(after.prefix, before.prefix);
    assert_eq!(after.scopes, before.scopes);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(after.last_used_at, before.last_used_at);
    assert_eq!(after.expires_at, before.expires_at);

    let err = platform.keys().authenticate(&issued.secret).await.unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));
}

#[tokio::test]
async fn test_key_lifecycle_is_audited_and_announced() {
    let platform = memory_platform().await;
    let issued = platform
        .keys()
        .issue(
            &ctx(),
            NewApiKey {
                org_id: "org_1".into(),
                name: "Deploy".into(),
                prefix: KeyPrefix::Live,
                scopes: [ApiKeyScope::FinanceRead, ApiKeyScope::ReportsRead]
                    .into_iter()
                    .collect(),
                expires_at: None,
            },
        )
        .await
        .unwrap();

    platform.keys().authenticate(&issued.secret).await.unwrap();
    platform.keys().revoke(&ctx(), &issued.key.id).await.unwrap();

    let records = platform
        .audit()
        .query(&AuditQuery::for_org("org_1"))
        .await
        .unwrap();
    let actions: Vec<_> = records.iter().map(|r| r.action).collect();
    assert_eq!(actions, vec![AuditAction::Create, AuditAction::Update]);

    let counts = platform.bus().counts().await;
    assert_eq!(counts.names.get("api_key.created"), Some(&1));
    assert_eq!(counts.names.get("api_key.used"), Some(&1));
    assert_eq!(counts.names.get("api_key.revoked"), Some(&1));
    // Every stored audit record is announced
    assert_eq!(counts.names.get("audit.recorded"), Some(&2));
}

// ─── Event bus ───────────────────────────────────────────────────

#[tokio::test]
async fn test_login_fan_out_then_unsubscribe() {
    let platform = memory_platform().await;
    let bus = platform.bus();

    let first: Arc<Mutex<Vec<DomainEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(AtomicUsize::new(0));

    let seen = first.clone();
    let sub_a = bus
        .subscribe_fn("auth.login", move |event| {
            seen.lock().unwrap().push(event.payload.clone());
            Ok(())
        })
        .await;
    let hits = second.clone();
    let _sub_b = bus
        .subscribe_fn("auth.login", move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

    let login = DomainEvent::AuthLogin {
        user_id: "u1".into(),
        org_id: "org_1".into(),
    };
    let receipt = bus.publish(login.clone()).await.unwrap();
    assert_eq!(receipt.delivered, 2);
    assert_eq!(first.lock().unwrap().as_slice(), &[login.clone()]);
    assert_eq!(second.load(Ordering::SeqCst), 1);

    assert!(sub_a.unsubscribe().await);
    let receipt = bus.publish(login).await.unwrap();
    assert_eq!(receipt.delivered, 1);
    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(second.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stream_observes_audit_announcements() {
    let platform = memory_platform().await;
    let mut stream = Box::pin(platform.bus().stream());

    let report = platform
        .reports()
        .create(Report::new(NewReport {
            org_id: "org_1".into(),
            name: "Ticket sales".into(),
            kind: ReportKind::Finance,
            description: None,
            parameters: Default::default(),
        }))
        .await
        .unwrap();

    platform
        .audit()
        .record(AuditRecord::new(&ctx(), AuditAction::Create).with_entity("report", report.id.clone()))
        .await
        .unwrap();

    let changed = stream.next().await.unwrap();
    assert_eq!(changed.name, "entity.changed");
    assert_eq!(
        changed.payload,
        DomainEvent::EntityChanged {
            org_id: "org_1".into(),
            entity: EntityRef::new("report", report.id.clone()),
            change: ChangeKind::Created,
        }
    );

    let recorded = stream.next().await.unwrap();
    assert_eq!(recorded.name, "audit.recorded");
    assert_eq!(recorded.payload.org_id().as_str(), "org_1");
}

#[tokio::test]
async fn test_repository_writes_publish_entity_changes() {
    let platform = memory_platform().await;
    let org = "org_1".into();
    let seen: Arc<Mutex<Vec<ChangeKind>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let _sub = platform
        .bus()
        .subscribe_fn("entity.changed", move |event| {
            if let DomainEvent::EntityChanged { change, .. } = &event.payload {
                sink.lock().unwrap().push(*change);
            }
            Ok(())
        })
        .await;

    let program = platform
        .programs()
        .create(Program::new(NewProgram {
            org_id: "org_1".into(),
            project_id: None,
            name: "Matinee".into(),
            description: None,
            starts_on: None,
            ends_on: None,
        }))
        .await
        .unwrap();
    platform
        .programs()
        .update(
            &program.id,
            &org,
            ProgramPatch {
                status: Some(ProgramStatus::Live),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    platform.programs().delete(&program.id, &org).await.unwrap();

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted]
    );
}

// ─── Repositories ────────────────────────────────────────────────

#[tokio::test]
async fn test_tenant_isolation_across_entities() {
    let platform = memory_platform().await;

    let report = platform
        .reports()
        .create(Report::new(NewReport {
            org_id: "org_1".into(),
            name: "Headcount".into(),
            kind: ReportKind::People,
            description: None,
            parameters: Default::default(),
        }))
        .await
        .unwrap();

    let found = platform
        .reports()
        .find_by_id(&report.id, &"org_1".into())
        .await
        .unwrap();
    assert_eq!(found, Some(report.clone()));

    let foreign = platform
        .reports()
        .find_by_id(&report.id, &"org_2".into())
        .await
        .unwrap();
    assert!(foreign.is_none());

    let other_page = platform
        .reports()
        .list_by_org(&"org_2".into(), Pagination::default())
        .await
        .unwrap();
    assert!(other_page.is_empty());

    let err = platform
        .reports()
        .delete(&report.id, &"org_2".into())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn test_partial_update_then_delete() {
    let platform = memory_platform().await;
    let org = "org_1".into();

    let program = platform
        .programs()
        .create(Program::new(NewProgram {
            org_id: "org_1".into(),
            project_id: Some("prj_1".into()),
            name: "Opening night".into(),
            description: Some("Doors at 7".into()),
            starts_on: None,
            ends_on: None,
        }))
        .await
        .unwrap();

    let updated = platform
        .programs()
        .update(
            &program.id,
            &org,
            ProgramPatch {
                status: Some(ProgramStatus::Scheduled),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, ProgramStatus::Scheduled);
    assert_eq!(updated.name, program.name);
    assert_eq!(updated.description, program.description);
    assert_eq!(updated.project_id, program.project_id);
    assert_eq!(updated.created_at, program.created_at);

    platform.programs().delete(&program.id, &org).await.unwrap();
    assert!(platform
        .programs()
        .find_by_id(&program.id, &org)
        .await
        .unwrap()
        .is_none());

    let err = platform
        .programs()
        .update(&program.id, &org, ProgramPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn test_snapshots_survive_restart() {
    let dir = temp_dir("snapshots");
    let config = CoreConfig {
        store: StoreConfig {
            snapshot_dir: Some(dir.clone()),
        },
        ..Default::default()
    };

    let platform = Platform::init(config.clone()).await.unwrap();
    let report = platform
        .reports()
        .create(Report::new(NewReport {
            org_id: "org_1".into(),
            name: "Supplier spend".into(),
            kind: ReportKind::Procurement,
            description: None,
            parameters: Default::default(),
        }))
        .await
        .unwrap();
    platform.shutdown().await.unwrap();
    assert!(dir.join("report.json").exists());

    let restarted = Platform::init(config).await.unwrap();
    let found = restarted
        .reports()
        .find_by_id(&report.id, &"org_1".into())
        .await
        .unwrap();
    assert_eq!(found, Some(report));
    assert!(restarted.programs().is_empty().await);

    let _ = std::fs::remove_dir_all(&dir);
}

// ─── Audit ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_file_audit_round_trip_by_time_range() {
    let dir = temp_dir("audit");
    let config = CoreConfig {
        audit: AuditConfig::File {
            dir: dir.clone(),
            max_file_bytes: 512,
            max_rotated_files: 0,
        },
        ..Default::default()
    };

    let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let platform = Platform::init(config.clone()).await.unwrap();
    let mut stored = Vec::new();
    for i in 0..6 {
        let entry = AuditRecord::new(&ctx(), AuditAction::Update)
            .with_entity("program", format!("prg-{}", i))
            .with_detail(AuditDetail::FieldsChanged {
                fields: vec!["status".into()],
            })
            .at(base + Duration::minutes(i));
        stored.push(platform.audit().record(entry).await.unwrap());
    }
    platform
        .audit()
        .record(AuditRecord::new(&TenantContext::new("u9", "org_2"), AuditAction::Read).at(base))
        .await
        .unwrap();
    platform.shutdown().await.unwrap();

    // A fresh platform over the same directory sees the full history
    let reopened = Platform::init(config).await.unwrap();
    let window = reopened
        .audit()
        .query(&AuditQuery::for_org("org_1").between(base + Duration::minutes(1), base + Duration::minutes(4)))
        .await
        .unwrap();
    assert_eq!(window, stored[1..4].to_vec());

    let all = reopened
        .audit()
        .query(&AuditQuery::for_org("org_1"))
        .await
        .unwrap();
    assert_eq!(all, stored);
    assert_eq!(reopened.audit().store().count(&"org_2".into()).await.unwrap(), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_mismatched_audit_detail_rejected() {
    let platform = memory_platform().await;
    let entry = AuditRecord::new(&ctx(), AuditAction::Login).with_detail(AuditDetail::FieldsChanged {
        fields: vec!["name".into()],
    });

    let err = platform.audit().record(entry).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(platform
        .audit()
        .query(&AuditQuery::for_org("org_1"))
        .await
        .unwrap()
        .is_empty());
}
