//! Anonymous submission intake and the admin moderation workflow around it.
//!
//! Public callers only ever see a receipt code. Admins list, review, and soft-delete
//! submissions, and every moderation action lands in an append-only audit log.

pub mod auth;
pub mod domain;
pub mod filters;
pub mod receipt;
pub mod repository;
pub mod router;
pub(crate) mod sanitizer;
pub mod service;
pub mod store;
pub mod uploads;

#[cfg(test)]
mod tests;

pub use auth::{ActingAdmin, AdminAuthenticator, AdminRoster};
pub use domain::{
    AdminId, AdminSummary, AuditEntry, DeletedSubmissionView, DeletionStamp, FileAttachment,
    IntakeReceipt, ModerationAction, ReviewPatch, Submission, SubmissionDraft, SubmissionId,
    SubmissionView,
};
pub use filters::{FilterError, FlagFilter, ListFilters, ListQuery};
pub use receipt::{RandomReceiptCodes, ReceiptCode, ReceiptCodeGenerator};
pub use repository::{
    AdminDirectory, AdminProfile, AuditError, AuditLog, DeletionResult, RepositoryError,
    ReviewUpdate, SubmissionRepository,
};
pub use router::{submission_router, RouterSettings};
pub use sanitizer::sanitize_text;
pub use service::{
    AuditStatus, DeleteOutcome, ReviewOutcome, ServiceError, SubmissionService,
    AUDIT_BACKLOG_WARN_THRESHOLD, MAX_RECEIPT_ATTEMPTS,
};
pub use store::{MemoryAuditLog, MemorySubmissionStore, SqliteSubmissionStore};
pub use uploads::LocalUploadStore;
