use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use serde_json::Value;

use crate::config::AdminAccount;
use crate::submissions::domain::{AdminId, AuditEntry, DeletionStamp, Submission, SubmissionId};
use crate::submissions::filters::ListFilters;
use crate::submissions::receipt::{RandomReceiptCodes, ReceiptCode, ReceiptCodeGenerator};
use crate::submissions::repository::{
    AdminDirectory, AdminProfile, AuditError, AuditLog, DeletionResult, RepositoryError,
    ReviewUpdate, SubmissionRepository,
};
use crate::submissions::{
    submission_router, AdminRoster, LocalUploadStore, MemoryAuditLog, MemorySubmissionStore,
    RouterSettings, SubmissionService,
};

pub(super) const AYO_TOKEN: &str = "token-ayo";
pub(super) const MIKA_TOKEN: &str = "token-mika";

pub(super) type MemoryService =
    SubmissionService<MemorySubmissionStore, MemoryAuditLog, AdminRoster>;

pub(super) fn ayo() -> AdminId {
    AdminId::new("admin-1")
}

pub(super) fn mika() -> AdminId {
    AdminId::new("admin-2")
}

pub(super) fn roster() -> AdminRoster {
    AdminRoster::new(&[
        AdminAccount {
            id: "admin-1".to_string(),
            username: "ayo".to_string(),
            token: AYO_TOKEN.to_string(),
        },
        AdminAccount {
            id: "admin-2".to_string(),
            username: "mika".to_string(),
            token: MIKA_TOKEN.to_string(),
        },
    ])
}

pub(super) fn build_service() -> (MemoryService, MemorySubmissionStore, MemoryAuditLog) {
    let store = MemorySubmissionStore::default();
    let audit = MemoryAuditLog::default();
    let service = SubmissionService::new(
        Arc::new(store.clone()),
        Arc::new(audit.clone()),
        Arc::new(roster()),
    );
    (service, store, audit)
}

pub(super) fn code(raw: &str) -> ReceiptCode {
    ReceiptCode::parse(raw).expect("valid receipt code")
}

/// Hands out a scripted sequence of codes, then falls back to random ones.
#[derive(Default)]
pub(super) struct ScriptedReceiptCodes {
    codes: Mutex<VecDeque<ReceiptCode>>,
}

impl ScriptedReceiptCodes {
    pub(super) fn new(codes: impl IntoIterator<Item = ReceiptCode>) -> Self {
        Self {
            codes: Mutex::new(codes.into_iter().collect()),
        }
    }
}

impl ReceiptCodeGenerator for ScriptedReceiptCodes {
    fn generate(&self) -> ReceiptCode {
        self.codes
            .lock()
            .expect("code script mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| RandomReceiptCodes.generate())
    }
}

/// Audit log that can be switched offline to exercise the outbox.
#[derive(Default, Clone)]
pub(super) struct FlakyAuditLog {
    pub(super) inner: MemoryAuditLog,
    offline: Arc<AtomicBool>,
}

impl FlakyAuditLog {
    pub(super) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditLog for FlakyAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("audit database offline".to_string()));
        }
        self.inner.append(entry).await
    }

    async fn entries_for(
        &self,
        submission_id: SubmissionId,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        self.inner.entries_for(submission_id).await
    }
}

pub(super) struct UnavailableRepository;

#[async_trait]
impl SubmissionRepository for UnavailableRepository {
    async fn insert(&self, _submission: Submission) -> Result<Submission, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn fetch(&self, _id: SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn list_active(
        &self,
        _filters: &ListFilters,
    ) -> Result<Vec<Submission>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn list_deleted(&self) -> Result<Vec<Submission>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn mark_deleted(
        &self,
        _id: SubmissionId,
        _stamp: DeletionStamp,
    ) -> Result<DeletionResult, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn update_review(
        &self,
        _id: SubmissionId,
        _is_viewed: Option<bool>,
        _is_flagged: Option<bool>,
    ) -> Result<ReviewUpdate, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Memory store whose reads yield to the scheduler after loading, so concurrent requests
/// interleave between reading a record and acting on it.
#[derive(Default, Clone)]
pub(super) struct InterleavingStore {
    pub(super) inner: MemorySubmissionStore,
}

#[async_trait]
impl SubmissionRepository for InterleavingStore {
    async fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError> {
        self.inner.insert(submission).await
    }

    async fn fetch(&self, id: SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        let found = self.inner.fetch(id).await;
        tokio::task::yield_now().await;
        found
    }

    async fn list_active(
        &self,
        filters: &ListFilters,
    ) -> Result<Vec<Submission>, RepositoryError> {
        self.inner.list_active(filters).await
    }

    async fn list_deleted(&self) -> Result<Vec<Submission>, RepositoryError> {
        self.inner.list_deleted().await
    }

    async fn mark_deleted(
        &self,
        id: SubmissionId,
        stamp: DeletionStamp,
    ) -> Result<DeletionResult, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.mark_deleted(id, stamp).await
    }

    async fn update_review(
        &self,
        id: SubmissionId,
        is_viewed: Option<bool>,
        is_flagged: Option<bool>,
    ) -> Result<ReviewUpdate, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.update_review(id, is_viewed, is_flagged).await
    }
}

pub(super) struct UnavailableDirectory;

#[async_trait]
impl AdminDirectory for UnavailableDirectory {
    async fn profiles(
        &self,
        _ids: &[AdminId],
    ) -> Result<HashMap<AdminId, AdminProfile>, RepositoryError> {
        Err(RepositoryError::Unavailable("directory offline".to_string()))
    }
}

pub(super) fn router_with_service<R, A, D>(
    service: SubmissionService<R, A, D>,
    uploads: &Path,
) -> axum::Router
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    submission_router(
        Arc::new(service),
        LocalUploadStore::new(uploads),
        Arc::new(roster()),
        RouterSettings::default(),
    )
}

pub(super) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
        .expect("build request")
}

pub(super) fn admin_request(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("build request")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
