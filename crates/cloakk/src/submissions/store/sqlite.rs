//! SQLite-backed submission store and audit log.
//!
//! Uniqueness of ids and receipt codes is enforced by the schema, as is the rule that
//! `deleted_by` and `deleted_at` are set together with `is_deleted`.
//!
//! `search_text` holds the message lowercased in Rust, since SQLite's `lower()` only folds
//! ASCII.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::submissions::domain::{
    AdminId, AuditEntry, DeletionStamp, FileAttachment, Submission, SubmissionId,
};
use crate::submissions::filters::{FlagFilter, ListFilters};
use crate::submissions::receipt::ReceiptCode;
use crate::submissions::repository::{
    AuditError, AuditLog, DeletionResult, RepositoryError, ReviewUpdate, SubmissionRepository,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS submissions (
        id TEXT PRIMARY KEY NOT NULL,
        text_message TEXT NOT NULL,
        search_text TEXT NOT NULL,
        receipt_code TEXT NOT NULL UNIQUE,
        file_original_name TEXT,
        file_storage_path TEXT,
        file_mime_type TEXT,
        is_viewed INTEGER NOT NULL DEFAULT 0,
        is_flagged INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        deleted_by TEXT,
        deleted_at TEXT,
        created_at TEXT NOT NULL,
        CHECK (
            (is_deleted = 0 AND deleted_by IS NULL AND deleted_at IS NULL)
            OR (is_deleted = 1 AND deleted_by IS NOT NULL AND deleted_at IS NOT NULL)
        )
    )",
    "CREATE INDEX IF NOT EXISTS submissions_active_idx
        ON submissions (is_deleted, created_at)",
    "CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        admin_id TEXT NOT NULL,
        action TEXT NOT NULL,
        submission_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS audit_log_submission_idx ON audit_log (submission_id)",
];

const SUBMISSION_COLUMNS: &str = "id, text_message, receipt_code, file_original_name, \
     file_storage_path, file_mime_type, is_viewed, is_flagged, deleted_by, deleted_at, created_at";

/// Submission repository and audit log sharing one SQLite connection pool.
#[derive(Clone)]
pub struct SqliteSubmissionStore {
    pool: SqlitePool,
}

impl SqliteSubmissionStore {
    /// Open (creating if needed) the database at `url` and make sure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage_error)?
            .create_if_missing(true);

        // An in-memory database lives only as long as its connection.
        let pool_options = if url.contains(":memory:") || url.contains("mode=memory") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(storage_error)?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    /// Wait for in-flight queries and close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn bootstrap(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        }
        self.backfill_search_text().await
    }

    /// Add and populate `search_text` on databases created before the column existed.
    async fn backfill_search_text(&self) -> Result<(), RepositoryError> {
        let present: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('submissions') WHERE name = 'search_text'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;
        if present > 0 {
            return Ok(());
        }

        sqlx::query("ALTER TABLE submissions ADD COLUMN search_text TEXT NOT NULL DEFAULT ''")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        let rows = sqlx::query("SELECT id, text_message FROM submissions")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        for row in &rows {
            let id: String = row.try_get("id").map_err(storage_error)?;
            let text: String = row.try_get("text_message").map_err(storage_error)?;
            sqlx::query("UPDATE submissions SET search_text = ? WHERE id = ?")
                .bind(text.to_lowercase())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        }
        Ok(())
    }
}

fn storage_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        _ => RepositoryError::Unavailable(err.to_string()),
    }
}

fn audit_error(err: sqlx::Error) -> AuditError {
    AuditError::Unavailable(err.to_string())
}

fn submission_from_row(row: &SqliteRow) -> Result<Submission, RepositoryError> {
    let raw_id: String = row.try_get("id").map_err(storage_error)?;
    let id = raw_id
        .parse::<SubmissionId>()
        .map_err(|err| RepositoryError::Corrupt(format!("submission id '{raw_id}': {err}")))?;

    let raw_code: String = row.try_get("receipt_code").map_err(storage_error)?;
    let receipt_code = ReceiptCode::parse(&raw_code)
        .map_err(|err| RepositoryError::Corrupt(format!("submission {id}: {err}")))?;

    let original_name: Option<String> =
        row.try_get("file_original_name").map_err(storage_error)?;
    let storage_path: Option<String> = row.try_get("file_storage_path").map_err(storage_error)?;
    let mime_type: Option<String> = row.try_get("file_mime_type").map_err(storage_error)?;
    let file = match (original_name, storage_path, mime_type) {
        (Some(original_name), Some(storage_path), Some(mime_type)) => Some(FileAttachment {
            original_name,
            storage_path,
            mime_type,
        }),
        (None, None, None) => None,
        _ => {
            return Err(RepositoryError::Corrupt(format!(
                "submission {id}: partial file metadata"
            )))
        }
    };

    let deleted_by: Option<String> = row.try_get("deleted_by").map_err(storage_error)?;
    let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at").map_err(storage_error)?;
    let deletion = match (deleted_by, deleted_at) {
        (Some(deleted_by), Some(deleted_at)) => Some(DeletionStamp {
            deleted_by: AdminId(deleted_by),
            deleted_at,
        }),
        (None, None) => None,
        _ => {
            return Err(RepositoryError::Corrupt(format!(
                "submission {id}: partial deletion stamp"
            )))
        }
    };

    Ok(Submission {
        id,
        text_message: row.try_get("text_message").map_err(storage_error)?,
        receipt_code,
        file,
        is_viewed: row.try_get("is_viewed").map_err(storage_error)?,
        is_flagged: row.try_get("is_flagged").map_err(storage_error)?,
        deletion,
        created_at: row.try_get("created_at").map_err(storage_error)?,
    })
}

fn audit_entry_from_row(row: &SqliteRow) -> Result<AuditEntry, AuditError> {
    let raw_id: String = row.try_get("submission_id").map_err(audit_error)?;
    let submission_id = raw_id
        .parse::<SubmissionId>()
        .map_err(|err| AuditError::Unavailable(format!("audit submission id '{raw_id}': {err}")))?;

    Ok(AuditEntry {
        admin_id: AdminId(row.try_get("admin_id").map_err(audit_error)?),
        action: row.try_get("action").map_err(audit_error)?,
        submission_id,
        created_at: row.try_get("created_at").map_err(audit_error)?,
    })
}

#[async_trait]
impl SubmissionRepository for SqliteSubmissionStore {
    async fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError> {
        let file = submission.file.clone();
        let deletion = submission.deletion.clone();

        sqlx::query(
            "INSERT INTO submissions (id, text_message, search_text, receipt_code, \
             file_original_name, file_storage_path, file_mime_type, is_viewed, is_flagged, \
             is_deleted, deleted_by, deleted_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(submission.id.to_string())
        .bind(submission.text_message.clone())
        .bind(submission.text_message.to_lowercase())
        .bind(submission.receipt_code.to_string())
        .bind(file.as_ref().map(|file| file.original_name.clone()))
        .bind(file.as_ref().map(|file| file.storage_path.clone()))
        .bind(file.as_ref().map(|file| file.mime_type.clone()))
        .bind(submission.is_viewed)
        .bind(submission.is_flagged)
        .bind(deletion.is_some())
        .bind(deletion.as_ref().map(|stamp| stamp.deleted_by.0.clone()))
        .bind(deletion.as_ref().map(|stamp| stamp.deleted_at))
        .bind(submission.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(submission)
    }

    async fn fetch(&self, id: SubmissionId) -> Result<Option<Submission>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.as_ref().map(submission_from_row).transpose()
    }

    async fn list_active(
        &self,
        filters: &ListFilters,
    ) -> Result<Vec<Submission>, RepositoryError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE is_deleted = 0"
        ));

        if let Some(viewed) = filters.viewed {
            builder.push(" AND is_viewed = ").push_bind(viewed);
        }
        if let FlagFilter::Only(flagged) = filters.flagged {
            builder.push(" AND is_flagged = ").push_bind(flagged);
        }
        if let Some(needle) = filters.search_needle() {
            builder
                .push(" AND instr(search_text, ")
                .push_bind(needle)
                .push(") > 0");
        }
        builder.push(" ORDER BY created_at DESC, rowid DESC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(submission_from_row).collect()
    }

    async fn list_deleted(&self) -> Result<Vec<Submission>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE is_deleted = 1 \
             ORDER BY deleted_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter().map(submission_from_row).collect()
    }

    async fn mark_deleted(
        &self,
        id: SubmissionId,
        stamp: DeletionStamp,
    ) -> Result<DeletionResult, RepositoryError> {
        let result = sqlx::query(
            "UPDATE submissions SET is_deleted = 1, deleted_by = ?, deleted_at = ? \
             WHERE id = ? AND is_deleted = 0",
        )
        .bind(stamp.deleted_by.0)
        .bind(stamp.deleted_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        let current = self.fetch(id).await?.ok_or(RepositoryError::NotFound)?;
        if result.rows_affected() == 1 {
            Ok(DeletionResult::Deleted(current))
        } else {
            Ok(DeletionResult::AlreadyDeleted(current))
        }
    }

    async fn update_review(
        &self,
        id: SubmissionId,
        is_viewed: Option<bool>,
        is_flagged: Option<bool>,
    ) -> Result<ReviewUpdate, RepositoryError> {
        let viewed_changed = match is_viewed {
            Some(viewed) => self.set_review_flag("is_viewed", id, viewed).await?,
            None => false,
        };
        let flagged_changed = match is_flagged {
            Some(flagged) => self.set_review_flag("is_flagged", id, flagged).await?,
            None => false,
        };

        let submission = self.fetch(id).await?.ok_or(RepositoryError::NotFound)?;
        Ok(ReviewUpdate {
            submission,
            viewed_changed,
            flagged_changed,
        })
    }
}

impl SqliteSubmissionStore {
    /// Write one review flag if it differs, reporting whether the row changed.
    async fn set_review_flag(
        &self,
        column: &'static str,
        id: SubmissionId,
        value: bool,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(&format!(
            "UPDATE submissions SET {column} = ? WHERE id = ? AND {column} <> ?"
        ))
        .bind(value)
        .bind(id.to_string())
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl AuditLog for SqliteSubmissionStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO audit_log (admin_id, action, submission_id, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(entry.admin_id.0)
        .bind(entry.action)
        .bind(entry.submission_id.to_string())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(audit_error)?;
        Ok(())
    }

    async fn entries_for(
        &self,
        submission_id: SubmissionId,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let rows = sqlx::query(
            "SELECT admin_id, action, submission_id, created_at FROM audit_log \
             WHERE submission_id = ? ORDER BY id ASC",
        )
        .bind(submission_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(audit_error)?;

        rows.iter().map(audit_entry_from_row).collect()
    }
}
