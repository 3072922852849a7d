use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use cloakk::config::AppConfig;
use cloakk::submissions::{
    AdminDirectory, AdminRoster, AuditLog, LocalUploadStore, RouterSettings,
    SubmissionRepository, SubmissionService,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Interval between background retries of queued audit entries.
pub(crate) const AUDIT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn admin_roster(config: &AppConfig) -> Arc<AdminRoster> {
    let roster = AdminRoster::new(&config.admins);
    if roster.is_empty() {
        warn!("CLOAKK_ADMINS is empty; every admin request will be rejected");
    } else {
        info!(admins = roster.len(), "admin roster loaded");
    }
    Arc::new(roster)
}

pub(crate) fn upload_store(config: &AppConfig) -> LocalUploadStore {
    LocalUploadStore::new(config.storage.upload_dir.clone())
}

pub(crate) fn router_settings(config: &AppConfig) -> RouterSettings {
    RouterSettings {
        max_upload_bytes: config.storage.max_upload_bytes,
    }
}

/// Periodically flush the audit outbox so pending entries land even when no further
/// moderation happens.
pub(crate) fn spawn_audit_retry<R, A, D>(
    service: Arc<SubmissionService<R, A, D>>,
    every: Duration,
) -> JoinHandle<()>
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if service.pending_audit_count() == 0 {
                continue;
            }
            let written = service.retry_pending_audits().await;
            if written > 0 {
                info!(written, "flushed queued audit entries");
            }
            if service.audit_backlog_exceeded() {
                warn!(
                    pending = service.pending_audit_count(),
                    "audit outbox still backed up after retry"
                );
            }
        }
    })
}
