use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    AdminId, AuditEntry, DeletedSubmissionView, DeletionStamp, IntakeReceipt, ModerationAction,
    ReviewPatch, Submission, SubmissionDraft, SubmissionId,
};
use super::filters::ListFilters;
use super::receipt::{RandomReceiptCodes, ReceiptCodeGenerator};
use super::repository::{
    AdminDirectory, AuditError, AuditLog, DeletionResult, RepositoryError, SubmissionRepository,
};
use super::sanitizer::sanitize_text;

/// Receipt codes tried per submission before giving up on finding a free one.
pub const MAX_RECEIPT_ATTEMPTS: usize = 5;

/// Queued audit entries beyond which the outbox is reported as backed up.
pub const AUDIT_BACKLOG_WARN_THRESHOLD: usize = 100;

/// Whether the audit side of a moderation action made it to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Recorded,
    /// The action is committed but at least one audit entry is queued for retry.
    Pending,
    /// Nothing changed, so nothing was audited.
    NotRequired,
}

/// Outcome of moving a submission to the bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted {
        submission: Submission,
        audit: AuditStatus,
    },
    AlreadyDeleted {
        submission: Submission,
    },
}

impl DeleteOutcome {
    pub fn submission(&self) -> &Submission {
        match self {
            DeleteOutcome::Deleted { submission, .. }
            | DeleteOutcome::AlreadyDeleted { submission } => submission,
        }
    }

    pub fn audit_pending(&self) -> bool {
        matches!(
            self,
            DeleteOutcome::Deleted {
                audit: AuditStatus::Pending,
                ..
            }
        )
    }
}

/// Outcome of a review-state update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub submission: Submission,
    pub audit: AuditStatus,
}

/// Service composing sanitization, receipt issuance, storage, and the audit trail.
pub struct SubmissionService<R, A, D> {
    repository: Arc<R>,
    audit: Arc<A>,
    directory: Arc<D>,
    codes: Arc<dyn ReceiptCodeGenerator>,
    outbox: Mutex<Vec<AuditEntry>>,
    backlog_warn_at: usize,
}

impl<R, A, D> SubmissionService<R, A, D>
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    pub fn new(repository: Arc<R>, audit: Arc<A>, directory: Arc<D>) -> Self {
        Self {
            repository,
            audit,
            directory,
            codes: Arc::new(RandomReceiptCodes),
            outbox: Mutex::new(Vec::new()),
            backlog_warn_at: AUDIT_BACKLOG_WARN_THRESHOLD,
        }
    }

    pub fn with_receipt_codes(mut self, codes: Arc<dyn ReceiptCodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_audit_backlog_threshold(mut self, threshold: usize) -> Self {
        self.backlog_warn_at = threshold;
        self
    }

    /// Accept an anonymous submission and hand back its receipt code.
    pub async fn submit(&self, draft: SubmissionDraft) -> Result<IntakeReceipt, ServiceError> {
        let raw = draft
            .text_message
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ServiceError::Validation("Text message is required".to_string()))?;

        let text_message = sanitize_text(raw);
        if text_message.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Text message has no readable content".to_string(),
            ));
        }

        for attempt in 1..=MAX_RECEIPT_ATTEMPTS {
            let submission =
                Submission::new(text_message.clone(), self.codes.generate(), draft.file.clone());

            match self.repository.insert(submission).await {
                Ok(stored) => {
                    info!(
                        submission_id = %stored.id,
                        has_file = stored.file.is_some(),
                        "submission received"
                    );
                    return Ok(IntakeReceipt {
                        receipt_code: stored.receipt_code,
                    });
                }
                Err(RepositoryError::Conflict) => {
                    warn!(attempt, "receipt code collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ServiceError::ReceiptCodesExhausted {
            attempts: MAX_RECEIPT_ATTEMPTS,
        })
    }

    /// Active submissions matching the filters, newest first.
    pub async fn list_active(
        &self,
        filters: &ListFilters,
    ) -> Result<Vec<Submission>, ServiceError> {
        Ok(self.repository.list_active(filters).await?)
    }

    /// Binned submissions with the deleting admin resolved for display.
    pub async fn list_deleted(&self) -> Result<Vec<DeletedSubmissionView>, ServiceError> {
        let deleted = self.repository.list_deleted().await?;

        let mut admin_ids: Vec<AdminId> = deleted
            .iter()
            .filter_map(|submission| submission.deletion.as_ref())
            .map(|stamp| stamp.deleted_by.clone())
            .collect();
        admin_ids.sort();
        admin_ids.dedup();

        let profiles = if admin_ids.is_empty() {
            HashMap::new()
        } else {
            self.directory.profiles(&admin_ids).await?
        };

        Ok(deleted
            .iter()
            .filter_map(|submission| {
                let stamp = submission.deletion.as_ref()?;
                let username = profiles
                    .get(&stamp.deleted_by)
                    .map(|profile| profile.username.clone());
                submission.deleted_view(username)
            })
            .collect())
    }

    /// Move a submission to the bin and audit the action.
    ///
    /// Deleting something already in the bin changes nothing and is not audited again.
    pub async fn soft_delete(
        &self,
        id: SubmissionId,
        admin: &AdminId,
    ) -> Result<DeleteOutcome, ServiceError> {
        let stamp = DeletionStamp {
            deleted_by: admin.clone(),
            deleted_at: Utc::now(),
        };

        match self.repository.mark_deleted(id, stamp).await {
            Ok(DeletionResult::Deleted(submission)) => {
                info!(submission_id = %id, admin_id = %admin, "submission moved to bin");
                let audit = self
                    .record_audit(vec![AuditEntry::new(
                        admin.clone(),
                        ModerationAction::Deleted,
                        id,
                    )])
                    .await;
                Ok(DeleteOutcome::Deleted { submission, audit })
            }
            Ok(DeletionResult::AlreadyDeleted(submission)) => {
                info!(submission_id = %id, admin_id = %admin, "submission already in bin");
                Ok(DeleteOutcome::AlreadyDeleted { submission })
            }
            Err(RepositoryError::NotFound) => Err(ServiceError::NotFound(id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Apply viewed/flagged changes, auditing each field that actually changed.
    pub async fn update_review(
        &self,
        id: SubmissionId,
        admin: &AdminId,
        patch: ReviewPatch,
    ) -> Result<ReviewOutcome, ServiceError> {
        if patch.is_empty() {
            return Err(ServiceError::Validation(
                "Provide isViewed or isFlagged".to_string(),
            ));
        }

        let update = self
            .repository
            .update_review(id, patch.is_viewed, patch.is_flagged)
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound => ServiceError::NotFound(id),
                other => other.into(),
            })?;
        let submission = update.submission;

        let mut entries = Vec::new();
        if let Some(viewed) = patch.is_viewed.filter(|_| update.viewed_changed) {
            entries.push(AuditEntry::new(
                admin.clone(),
                ModerationAction::for_viewed(viewed),
                id,
            ));
        }
        if let Some(flagged) = patch.is_flagged.filter(|_| update.flagged_changed) {
            entries.push(AuditEntry::new(
                admin.clone(),
                ModerationAction::for_flagged(flagged),
                id,
            ));
        }

        info!(
            submission_id = %id,
            admin_id = %admin,
            changes = entries.len(),
            "submission review state updated"
        );
        let audit = self.record_audit(entries).await;
        Ok(ReviewOutcome { submission, audit })
    }

    /// Audit entries for one submission, oldest first.
    pub async fn audit_trail(&self, id: SubmissionId) -> Result<Vec<AuditEntry>, ServiceError> {
        if self.repository.fetch(id).await?.is_none() {
            return Err(ServiceError::NotFound(id));
        }
        Ok(self.audit.entries_for(id).await?)
    }

    /// Number of audit entries waiting for the audit log to come back.
    pub fn pending_audit_count(&self) -> usize {
        self.outbox().len()
    }

    /// Whether more audit entries are queued than the backlog threshold allows.
    pub fn audit_backlog_exceeded(&self) -> bool {
        self.pending_audit_count() > self.backlog_warn_at
    }

    /// Retry queued audit entries, returning how many were written.
    pub async fn retry_pending_audits(&self) -> usize {
        let queued = std::mem::take(&mut *self.outbox());
        if queued.is_empty() {
            return 0;
        }

        let mut written = 0;
        let mut remaining = Vec::new();
        for entry in queued {
            match self.audit.append(entry.clone()).await {
                Ok(()) => written += 1,
                Err(_) => remaining.push(entry),
            }
        }

        if !remaining.is_empty() {
            warn!(
                pending = remaining.len(),
                "audit log still unavailable, keeping entries queued"
            );
            let mut outbox = self.outbox();
            let newer = std::mem::replace(&mut *outbox, remaining);
            outbox.extend(newer);
        }
        written
    }

    async fn record_audit(&self, entries: Vec<AuditEntry>) -> AuditStatus {
        if entries.is_empty() {
            return AuditStatus::NotRequired;
        }

        self.retry_pending_audits().await;

        let mut status = AuditStatus::Recorded;
        for entry in entries {
            if let Err(err) = self.audit.append(entry.clone()).await {
                warn!(
                    submission_id = %entry.submission_id,
                    admin_id = %entry.admin_id,
                    action = %entry.action,
                    error = %err,
                    "audit append failed, queued for retry"
                );
                self.enqueue(entry);
                status = AuditStatus::Pending;
            }
        }
        status
    }

    fn enqueue(&self, entry: AuditEntry) {
        let mut outbox = self.outbox();
        outbox.push(entry);
        if outbox.len() == self.backlog_warn_at + 1 {
            warn!(
                pending = outbox.len(),
                threshold = self.backlog_warn_at,
                "audit outbox backlog exceeds threshold"
            );
        }
    }

    fn outbox(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.outbox.lock().expect("audit outbox mutex poisoned")
    }
}

/// Error raised by the submission service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("submission {0} not found")]
    NotFound(SubmissionId),
    #[error("no free receipt code after {attempts} attempts")]
    ReceiptCodesExhausted { attempts: usize },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}
