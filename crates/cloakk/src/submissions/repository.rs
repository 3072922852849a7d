use std::collections::HashMap;

use async_trait::async_trait;

use super::domain::{AdminId, AuditEntry, DeletionStamp, Submission, SubmissionId};
use super::filters::ListFilters;

/// Result of a conditional soft delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionResult {
    /// The submission was active and is now stamped as deleted.
    Deleted(Submission),
    /// The submission was already in the bin; nothing changed.
    AlreadyDeleted(Submission),
}

/// Review flags after an update, and which of them actually changed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewUpdate {
    pub submission: Submission,
    pub viewed_changed: bool,
    pub flagged_changed: bool,
}

/// Storage abstraction for submissions so the service can be exercised in isolation.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Insert a new record. A duplicate id or receipt code yields `RepositoryError::Conflict`.
    async fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError>;
    async fn fetch(&self, id: SubmissionId) -> Result<Option<Submission>, RepositoryError>;
    /// Non-deleted submissions matching every filter, newest first.
    async fn list_active(&self, filters: &ListFilters)
        -> Result<Vec<Submission>, RepositoryError>;
    /// Deleted submissions, most recently deleted first.
    async fn list_deleted(&self) -> Result<Vec<Submission>, RepositoryError>;
    /// Stamp a submission as deleted only if it is not deleted yet.
    /// A missing record yields `RepositoryError::NotFound`.
    async fn mark_deleted(
        &self,
        id: SubmissionId,
        stamp: DeletionStamp,
    ) -> Result<DeletionResult, RepositoryError>;
    /// Overwrite the review flags present in the arguments. Each change is detected in the
    /// same step that writes it, so concurrent identical updates report it only once.
    async fn update_review(
        &self,
        id: SubmissionId,
        is_viewed: Option<bool>,
        is_flagged: Option<bool>,
    ) -> Result<ReviewUpdate, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stored record is malformed: {0}")]
    Corrupt(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Append-only sink for moderation actions.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;
    /// Entries recorded against one submission, oldest first.
    async fn entries_for(&self, submission_id: SubmissionId)
        -> Result<Vec<AuditEntry>, AuditError>;
}

/// Audit write/read failure.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log unavailable: {0}")]
    Unavailable(String),
}

/// Display profile of an administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminProfile {
    pub id: AdminId,
    pub username: String,
}

/// Lookup of administrators referenced by submissions and audit entries.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    /// Resolve the given ids; unknown ids are simply absent from the map.
    async fn profiles(
        &self,
        ids: &[AdminId],
    ) -> Result<HashMap<AdminId, AdminProfile>, RepositoryError>;
}
