//! Anonymous submission intake and moderation.
//!
//! Public callers submit text (and optionally a file) and receive a receipt code;
//! administrators list, review, soft-delete, and audit those submissions.

pub mod config;
pub mod error;
pub mod submissions;
pub mod telemetry;
