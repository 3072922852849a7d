use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::receipt::ReceiptCode;

/// Internal identifier for a stored submission. Never handed to public callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub Uuid);

impl SubmissionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SubmissionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Identity of an authenticated administrator. Submissions only hold it as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminId(pub String);

impl AdminId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdminId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata about a file the upload handler already wrote to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub original_name: String,
    pub storage_path: String,
    pub mime_type: String,
}

/// Who moved a submission to the bin and when. Both halves are always present together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionStamp {
    pub deleted_by: AdminId,
    pub deleted_at: DateTime<Utc>,
}

/// Stored anonymous submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub text_message: String,
    pub receipt_code: ReceiptCode,
    pub file: Option<FileAttachment>,
    pub is_viewed: bool,
    pub is_flagged: bool,
    pub deletion: Option<DeletionStamp>,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Fresh, unreviewed submission ready for insertion.
    pub fn new(
        text_message: String,
        receipt_code: ReceiptCode,
        file: Option<FileAttachment>,
    ) -> Self {
        Self {
            id: SubmissionId::generate(),
            text_message,
            receipt_code,
            file,
            is_viewed: false,
            is_flagged: false,
            deletion: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }

    pub fn view(&self) -> SubmissionView {
        SubmissionView {
            id: self.id,
            text_message: self.text_message.clone(),
            receipt_code: self.receipt_code.to_string(),
            file: self.file.clone(),
            is_viewed: self.is_viewed,
            is_flagged: self.is_flagged,
            is_deleted: self.is_deleted(),
            deleted_by: self
                .deletion
                .as_ref()
                .map(|stamp| stamp.deleted_by.clone()),
            deleted_at: self.deletion.as_ref().map(|stamp| stamp.deleted_at),
            created_at: self.created_at,
        }
    }

    /// Bin representation; `None` when the submission is not deleted.
    pub fn deleted_view(&self, username: Option<String>) -> Option<DeletedSubmissionView> {
        let stamp = self.deletion.as_ref()?;
        Some(DeletedSubmissionView {
            id: self.id,
            text_message: self.text_message.clone(),
            receipt_code: self.receipt_code.to_string(),
            file: self.file.clone(),
            is_viewed: self.is_viewed,
            is_flagged: self.is_flagged,
            is_deleted: true,
            deleted_by: AdminSummary {
                id: stamp.deleted_by.clone(),
                username,
            },
            deleted_at: stamp.deleted_at,
            created_at: self.created_at,
        })
    }
}

/// Raw intake as received from a public caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDraft {
    #[serde(default)]
    pub text_message: Option<String>,
    #[serde(skip)]
    pub file: Option<FileAttachment>,
}

impl SubmissionDraft {
    pub fn text(text_message: impl Into<String>) -> Self {
        Self {
            text_message: Some(text_message.into()),
            file: None,
        }
    }

    pub fn with_file(mut self, file: FileAttachment) -> Self {
        self.file = Some(file);
        self
    }
}

/// What the anonymous submitter gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeReceipt {
    pub receipt_code: ReceiptCode,
}

/// Admin-facing representation of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub id: SubmissionId,
    pub text_message: String,
    pub receipt_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
    pub is_viewed: bool,
    pub is_flagged: bool,
    pub is_deleted: bool,
    pub deleted_by: Option<AdminId>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Administrator as displayed next to the moderation actions they took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminSummary {
    pub id: AdminId,
    pub username: Option<String>,
}

/// Binned submission with the deleting admin resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedSubmissionView {
    pub id: SubmissionId,
    pub text_message: String,
    pub receipt_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
    pub is_viewed: bool,
    pub is_flagged: bool,
    pub is_deleted: bool,
    pub deleted_by: AdminSummary,
    pub deleted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Review-state changes an admin can apply in one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPatch {
    #[serde(default)]
    pub is_viewed: Option<bool>,
    #[serde(default)]
    pub is_flagged: Option<bool>,
}

impl ReviewPatch {
    pub fn is_empty(&self) -> bool {
        self.is_viewed.is_none() && self.is_flagged.is_none()
    }
}

/// Moderation actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Deleted,
    MarkedViewed,
    MarkedUnviewed,
    Flagged,
    Unflagged,
}

impl ModerationAction {
    pub const fn label(self) -> &'static str {
        match self {
            ModerationAction::Deleted => "Deleted submission",
            ModerationAction::MarkedViewed => "Marked submission as viewed",
            ModerationAction::MarkedUnviewed => "Marked submission as unviewed",
            ModerationAction::Flagged => "Flagged submission",
            ModerationAction::Unflagged => "Unflagged submission",
        }
    }

    pub(crate) fn for_viewed(viewed: bool) -> Self {
        if viewed {
            Self::MarkedViewed
        } else {
            Self::MarkedUnviewed
        }
    }

    pub(crate) fn for_flagged(flagged: bool) -> Self {
        if flagged {
            Self::Flagged
        } else {
            Self::Unflagged
        }
    }
}

/// Append-only record of a moderation action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub admin_id: AdminId,
    pub action: String,
    pub submission_id: SubmissionId,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(admin_id: AdminId, action: ModerationAction, submission_id: SubmissionId) -> Self {
        Self {
            admin_id,
            action: action.label().to_string(),
            submission_id,
            created_at: Utc::now(),
        }
    }
}
