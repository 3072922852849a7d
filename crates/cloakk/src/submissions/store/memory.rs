use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::submissions::domain::{AuditEntry, DeletionStamp, Submission, SubmissionId};
use crate::submissions::filters::ListFilters;
use crate::submissions::repository::{
    AuditError, AuditLog, DeletionResult, RepositoryError, ReviewUpdate, SubmissionRepository,
};

/// Process-local submission store. Records are kept in insertion order.
#[derive(Default, Clone)]
pub struct MemorySubmissionStore {
    records: Arc<Mutex<Vec<Submission>>>,
}

impl MemorySubmissionStore {
    /// Every stored record, active and deleted, in insertion order.
    pub fn snapshot(&self) -> Vec<Submission> {
        self.records.lock().expect("submission store mutex poisoned").clone()
    }
}

#[async_trait]
impl SubmissionRepository for MemorySubmissionStore {
    async fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError> {
        let mut guard = self.records.lock().expect("submission store mutex poisoned");
        let duplicate = guard.iter().any(|existing| {
            existing.id == submission.id || existing.receipt_code == submission.receipt_code
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        guard.push(submission.clone());
        Ok(submission)
    }

    async fn fetch(&self, id: SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        let guard = self.records.lock().expect("submission store mutex poisoned");
        Ok(guard.iter().find(|record| record.id == id).cloned())
    }

    async fn list_active(
        &self,
        filters: &ListFilters,
    ) -> Result<Vec<Submission>, RepositoryError> {
        let guard = self.records.lock().expect("submission store mutex poisoned");
        let mut matching: Vec<Submission> = guard
            .iter()
            .rev()
            .filter(|record| filters.matches(record))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn list_deleted(&self) -> Result<Vec<Submission>, RepositoryError> {
        let guard = self.records.lock().expect("submission store mutex poisoned");
        let mut deleted: Vec<Submission> = guard
            .iter()
            .rev()
            .filter(|record| record.is_deleted())
            .cloned()
            .collect();
        deleted.sort_by(|a, b| {
            let deleted_at = |s: &Submission| s.deletion.as_ref().map(|stamp| stamp.deleted_at);
            deleted_at(b).cmp(&deleted_at(a))
        });
        Ok(deleted)
    }

    async fn mark_deleted(
        &self,
        id: SubmissionId,
        stamp: DeletionStamp,
    ) -> Result<DeletionResult, RepositoryError> {
        let mut guard = self.records.lock().expect("submission store mutex poisoned");
        let record = guard
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(RepositoryError::NotFound)?;

        if record.is_deleted() {
            return Ok(DeletionResult::AlreadyDeleted(record.clone()));
        }
        record.deletion = Some(stamp);
        Ok(DeletionResult::Deleted(record.clone()))
    }

    async fn update_review(
        &self,
        id: SubmissionId,
        is_viewed: Option<bool>,
        is_flagged: Option<bool>,
    ) -> Result<ReviewUpdate, RepositoryError> {
        let mut guard = self.records.lock().expect("submission store mutex poisoned");
        let record = guard
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(RepositoryError::NotFound)?;

        let viewed_changed = is_viewed.is_some_and(|viewed| viewed != record.is_viewed);
        let flagged_changed = is_flagged.is_some_and(|flagged| flagged != record.is_flagged);
        if let Some(viewed) = is_viewed {
            record.is_viewed = viewed;
        }
        if let Some(flagged) = is_flagged {
            record.is_flagged = flagged;
        }
        Ok(ReviewUpdate {
            submission: record.clone(),
            viewed_changed,
            flagged_changed,
        })
    }
}

/// Process-local audit log.
#[derive(Default, Clone)]
pub struct MemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit log mutex poisoned").clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .expect("audit log mutex poisoned")
            .push(entry);
        Ok(())
    }

    async fn entries_for(
        &self,
        submission_id: SubmissionId,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let guard = self.entries.lock().expect("audit log mutex poisoned");
        Ok(guard
            .iter()
            .filter(|entry| entry.submission_id == submission_id)
            .cloned()
            .collect())
    }
}
