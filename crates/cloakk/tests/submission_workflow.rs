//! End-to-end scenarios for anonymous intake and admin moderation, driven through the public
//! router against both storage backends.

mod common {
    use std::path::Path;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use axum::response::Response;
    use serde_json::Value;

    use cloakk::config::AdminAccount;
    use cloakk::submissions::{
        submission_router, AdminDirectory, AdminRoster, AuditLog, LocalUploadStore,
        RouterSettings, SubmissionRepository, SubmissionService,
    };

    pub(super) const ADMIN_TOKEN: &str = "moderator-token";

    pub(super) fn roster() -> AdminRoster {
        AdminRoster::new(&[AdminAccount {
            id: "admin-7".to_string(),
            username: "nadia".to_string(),
            token: ADMIN_TOKEN.to_string(),
        }])
    }

    pub(super) fn router<R, A, D>(
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

    pub(super) fn request(
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).expect("serialize")))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        }
    }

    pub(super) async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 256 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }
}

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use cloakk::submissions::{
    MemoryAuditLog, MemorySubmissionStore, ReceiptCode, SqliteSubmissionStore, SubmissionService,
};
use common::{body_json, request, router, roster, ADMIN_TOKEN};

async fn run_moderation_scenario(app: axum::Router) {
    let intake = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/submissions",
            None,
            Some(json!({ "textMessage": "Tip: check warehouse 3" })),
        ))
        .await
        .expect("intake responds");
    assert_eq!(intake.status(), StatusCode::CREATED);
    let receipt = body_json(intake).await;
    let code = receipt["receiptCode"].as_str().expect("receipt code");
    ReceiptCode::parse(code).expect("canonical receipt format");

    let active = app
        .clone()
        .oneshot(request(Method::GET, "/api/submissions", Some(ADMIN_TOKEN), None))
        .await
        .expect("listing responds");
    assert_eq!(active.status(), StatusCode::OK);
    let active = body_json(active).await;
    let active = active.as_array().expect("array");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["textMessage"], "Tip: check warehouse 3");
    assert_eq!(active[0]["receiptCode"], code);
    let id = active[0]["id"].as_str().expect("id").to_string();

    let deleted = app
        .clone()
        .oneshot(request(
            Method::DELETE,
            &format!("/api/submissions/{id}"),
            Some(ADMIN_TOKEN),
            None,
        ))
        .await
        .expect("delete responds");
    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(body_json(deleted).await["message"], "Submission moved to bin");

    let after = app
        .clone()
        .oneshot(request(Method::GET, "/api/submissions", Some(ADMIN_TOKEN), None))
        .await
        .expect("listing responds");
    assert_eq!(body_json(after).await, json!([]));

    let bin = app
        .clone()
        .oneshot(request(
            Method::GET,
            "/api/submissions/bin",
            Some(ADMIN_TOKEN),
            None,
        ))
        .await
        .expect("bin responds");
    let bin = body_json(bin).await;
    assert_eq!(bin.as_array().map(Vec::len), Some(1));
    assert_eq!(bin[0]["id"], id.as_str());
    assert_eq!(bin[0]["deletedBy"]["id"], "admin-7");
    assert_eq!(bin[0]["deletedBy"]["username"], "nadia");
    assert!(bin[0]["deletedAt"].is_string());

    let trail = app
        .oneshot(request(
            Method::GET,
            &format!("/api/submissions/{id}/audit"),
            Some(ADMIN_TOKEN),
            None,
        ))
        .await
        .expect("audit responds");
    let trail = body_json(trail).await;
    assert_eq!(trail.as_array().map(Vec::len), Some(1));
    assert_eq!(trail[0]["adminId"], "admin-7");
    assert_eq!(trail[0]["action"], "Deleted submission");
    assert_eq!(trail[0]["submissionId"], id.as_str());
}

#[tokio::test]
async fn moderation_lifecycle_with_memory_stores() {
    let uploads = tempfile::tempdir().expect("temp dir");
    let service = SubmissionService::new(
        Arc::new(MemorySubmissionStore::default()),
        Arc::new(MemoryAuditLog::default()),
        Arc::new(roster()),
    );

    run_moderation_scenario(router(service, uploads.path())).await;
}

#[tokio::test]
async fn moderation_lifecycle_with_sqlite_store() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("cloakk.db").display());
    let store = Arc::new(
        SqliteSubmissionStore::connect(&url)
            .await
            .expect("sqlite opens"),
    );
    let service = SubmissionService::new(store.clone(), store.clone(), Arc::new(roster()));

    run_moderation_scenario(router(service, &dir.path().join("uploads"))).await;
    store.close().await;
}
