//! Storage backends for submissions and the audit log.

mod memory;
mod sqlite;

pub use memory::{MemoryAuditLog, MemorySubmissionStore};
pub use sqlite::SqliteSubmissionStore;
