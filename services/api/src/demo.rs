use chrono::SecondsFormat;
use clap::Args;
use std::sync::Arc;

use cloakk::config::AdminAccount;
use cloakk::error::AppError;
use cloakk::submissions::{
    AdminId, AdminRoster, DeleteOutcome, ListFilters, MemoryAuditLog, MemorySubmissionStore,
    ReviewPatch, SubmissionDraft, SubmissionService,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Message submitted anonymously at the start of the walkthrough
    #[arg(long, default_value = "Tip: check warehouse 3")]
    pub(crate) text: String,
    /// Search term used for the filtered listing step
    #[arg(long, default_value = "warehouse")]
    pub(crate) search: String,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            text: "Tip: check warehouse 3".to_string(),
            search: "warehouse".to_string(),
        }
    }
}

type DemoService = SubmissionService<MemorySubmissionStore, MemoryAuditLog, AdminRoster>;

fn demo_service() -> (DemoService, AdminId) {
    let moderator = AdminAccount {
        id: "admin-demo".to_string(),
        username: "demo-moderator".to_string(),
        token: "demo-token".to_string(),
    };
    let admin = AdminId::new(moderator.id.clone());
    let service = SubmissionService::new(
        Arc::new(MemorySubmissionStore::default()),
        Arc::new(MemoryAuditLog::default()),
        Arc::new(AdminRoster::new(&[moderator])),
    );
    (service, admin)
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { text, search } = args;
    let (service, admin) = demo_service();

    println!("Cloakk moderation walkthrough");

    let receipt = service.submit(SubmissionDraft::text(text)).await?;
    println!("\nAnonymous submission accepted");
    println!("  receipt code: {}", receipt.receipt_code);

    let active = service.list_active(&ListFilters::default()).await?;
    println!("\nActive submissions ({})", active.len());
    for submission in &active {
        println!(
            "  - [{}] {} (viewed: {}, flagged: {})",
            submission.receipt_code,
            submission.text_message,
            submission.is_viewed,
            submission.is_flagged
        );
    }
    let Some(target) = active.first() else {
        println!("\nNothing to moderate.");
        return Ok(());
    };
    let id = target.id;

    let filtered = service
        .list_active(&ListFilters::default().search(search.clone()))
        .await?;
    println!(
        "\nSearch for \"{search}\" matched {} submission(s)",
        filtered.len()
    );

    service
        .update_review(
            id,
            &admin,
            ReviewPatch {
                is_viewed: Some(true),
                is_flagged: Some(true),
            },
        )
        .await?;
    println!("\nMarked the submission as viewed and flagged");

    match service.soft_delete(id, &admin).await? {
        DeleteOutcome::Deleted { .. } => println!("Moved the submission to the bin"),
        DeleteOutcome::AlreadyDeleted { .. } => println!("Submission was already in the bin"),
    }

    let remaining = service.list_active(&ListFilters::default()).await?;
    println!("\nActive submissions after deletion: {}", remaining.len());

    let bin = service.list_deleted().await?;
    println!("Bin ({})", bin.len());
    for deleted in &bin {
        println!(
            "  - [{}] deleted by {} at {}",
            deleted.receipt_code,
            deleted
                .deleted_by
                .username
                .as_deref()
                .unwrap_or(deleted.deleted_by.id.as_str()),
            deleted.deleted_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }

    let trail = service.audit_trail(id).await?;
    println!("\nAudit trail ({} entries)", trail.len());
    for entry in &trail {
        println!(
            "  - {} by {} at {}",
            entry.action,
            entry.admin_id,
            entry.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }

    Ok(())
}
