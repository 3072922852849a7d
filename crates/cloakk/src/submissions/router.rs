use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRef, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Form, Json, Router,
};
use serde_json::json;
use tracing::{error, warn};

use super::auth::{ActingAdmin, AdminAuthenticator};
use super::domain::{ReviewPatch, Submission, SubmissionDraft, SubmissionId, SubmissionView};
use super::filters::{ListFilters, ListQuery};
use super::repository::{AdminDirectory, AuditLog, SubmissionRepository};
use super::service::{DeleteOutcome, ServiceError, SubmissionService};
use super::uploads::LocalUploadStore;

/// Tunables for the HTTP surface.
#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    /// Upper bound on an intake request body, attachment included.
    pub max_upload_bytes: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

pub(crate) struct SubmissionState<R, A, D> {
    service: Arc<SubmissionService<R, A, D>>,
    uploads: Arc<LocalUploadStore>,
    authenticator: Arc<dyn AdminAuthenticator>,
}

impl<R, A, D> Clone for SubmissionState<R, A, D> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            uploads: self.uploads.clone(),
            authenticator: self.authenticator.clone(),
        }
    }
}

impl<R, A, D> FromRef<SubmissionState<R, A, D>> for Arc<dyn AdminAuthenticator> {
    fn from_ref(state: &SubmissionState<R, A, D>) -> Self {
        state.authenticator.clone()
    }
}

/// Router exposing public intake and the admin moderation endpoints.
pub fn submission_router<R, A, D>(
    service: Arc<SubmissionService<R, A, D>>,
    uploads: LocalUploadStore,
    authenticator: Arc<dyn AdminAuthenticator>,
    settings: RouterSettings,
) -> Router
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    let state = SubmissionState {
        service,
        uploads: Arc::new(uploads),
        authenticator,
    };

    Router::new()
        .route(
            "/api/submissions",
            post(intake_handler::<R, A, D>)
                .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
                .get(list_handler::<R, A, D>),
        )
        .route("/api/submissions/bin", get(bin_handler::<R, A, D>))
        .route(
            "/api/submissions/{id}",
            patch(review_handler::<R, A, D>).delete(delete_handler::<R, A, D>),
        )
        .route(
            "/api/submissions/{id}/audit",
            get(audit_handler::<R, A, D>),
        )
        .with_state(state)
}

pub(crate) async fn intake_handler<R, A, D>(
    State(state): State<SubmissionState<R, A, D>>,
    request: Request,
) -> Response
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let draft = if content_type.starts_with("multipart/form-data") {
        match Multipart::from_request(request, &()).await {
            Ok(multipart) => read_multipart(&state.uploads, multipart).await,
            Err(rejection) => Err(intake_rejection(rejection.status(), rejection.body_text())),
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        Form::<SubmissionDraft>::from_request(request, &())
            .await
            .map(|Form(draft)| draft)
            .map_err(|rejection| intake_rejection(rejection.status(), rejection.body_text()))
    } else {
        Json::<SubmissionDraft>::from_request(request, &())
            .await
            .map(|Json(draft)| draft)
            .map_err(|rejection| intake_rejection(rejection.status(), rejection.body_text()))
    };
    let draft = match draft {
        Ok(draft) => draft,
        Err(response) => return response,
    };

    let attachment = draft.file.clone();
    match state.service.submit(draft).await {
        Ok(receipt) => {
            let payload = json!({
                "message": "Submission received successfully.",
                "receiptCode": receipt.receipt_code,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => {
            if let Some(attachment) = attachment {
                if let Err(io_err) = state.uploads.discard(&attachment).await {
                    warn!(error = %io_err, "failed to discard upload of rejected submission");
                }
            }
            service_error_response(err)
        }
    }
}

/// Collect the text field and at most one file, writing the file only once the whole
/// body has been read.
async fn read_multipart(
    uploads: &LocalUploadStore,
    mut multipart: Multipart,
) -> Result<SubmissionDraft, Response> {
    let mut draft = SubmissionDraft::default();
    let mut upload: Option<(Option<String>, Option<String>, Bytes)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(intake_rejection(err.status(), err.body_text())),
        };
        let name = field.name().map(str::to_owned);

        match name.as_deref() {
            Some("textMessage") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| intake_rejection(err.status(), err.body_text()))?;
                draft.text_message = Some(text);
            }
            Some("file") if upload.is_none() => {
                let file_name = field.file_name().map(str::to_owned);
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| intake_rejection(err.status(), err.body_text()))?;
                // An untouched file input still sends an empty, unnamed part.
                let unnamed = file_name.as_deref().map_or(true, str::is_empty);
                if !(bytes.is_empty() && unnamed) {
                    upload = Some((file_name, content_type, bytes));
                }
            }
            _ => {}
        }
    }

    if let Some((file_name, content_type, bytes)) = upload {
        let attachment = uploads
            .persist(file_name.as_deref(), content_type.as_deref(), &bytes)
            .await
            .map_err(|err| {
                error!(error = %err, "failed to store upload");
                internal_error()
            })?;
        draft.file = Some(attachment);
    }
    Ok(draft)
}

pub(crate) async fn list_handler<R, A, D>(
    ActingAdmin(_admin): ActingAdmin,
    State(state): State<SubmissionState<R, A, D>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    let filters = match ListFilters::try_from(query) {
        Ok(filters) => filters,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, err.to_string()),
    };

    match state.service.list_active(&filters).await {
        Ok(submissions) => {
            let views: Vec<SubmissionView> = submissions.iter().map(Submission::view).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn bin_handler<R, A, D>(
    ActingAdmin(_admin): ActingAdmin,
    State(state): State<SubmissionState<R, A, D>>,
) -> Response
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    match state.service.list_deleted().await {
        Ok(deleted) => (StatusCode::OK, Json(deleted)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn delete_handler<R, A, D>(
    ActingAdmin(admin): ActingAdmin,
    State(state): State<SubmissionState<R, A, D>>,
    Path(raw_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    let Ok(id) = raw_id.parse::<SubmissionId>() else {
        return not_found();
    };

    match state.service.soft_delete(id, &admin).await {
        Ok(outcome) => {
            let message = match &outcome {
                DeleteOutcome::Deleted { .. } => "Submission moved to bin",
                DeleteOutcome::AlreadyDeleted { .. } => "Submission already in bin",
            };
            let mut payload = json!({ "message": message });
            if outcome.audit_pending() {
                payload["auditPending"] = json!(true);
            }
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn review_handler<R, A, D>(
    ActingAdmin(admin): ActingAdmin,
    State(state): State<SubmissionState<R, A, D>>,
    Path(raw_id): Path<String>,
    Json(patch): Json<ReviewPatch>,
) -> Response
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    let Ok(id) = raw_id.parse::<SubmissionId>() else {
        return not_found();
    };

    match state.service.update_review(id, &admin, patch).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome.submission.view())).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn audit_handler<R, A, D>(
    ActingAdmin(_admin): ActingAdmin,
    State(state): State<SubmissionState<R, A, D>>,
    Path(raw_id): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    let Ok(id) = raw_id.parse::<SubmissionId>() else {
        return not_found();
    };

    match state.service.audit_trail(id).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => service_error_response(err),
    }
}

fn service_error_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Validation(message) => error_response(StatusCode::BAD_REQUEST, message),
        ServiceError::NotFound(_) => not_found(),
        other => {
            error!(error = %other, "submission request failed");
            internal_error()
        }
    }
}

fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Submission not found")
}

fn internal_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

/// Unreadable intake bodies are validation failures, except for the size limit.
fn intake_rejection(status: StatusCode, message: String) -> Response {
    let status = if status == StatusCode::PAYLOAD_TOO_LARGE || !status.is_client_error() {
        status
    } else {
        StatusCode::BAD_REQUEST
    };
    error_response(status, message)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({ "error": message.into() });
    (status, Json(payload)).into_response()
}
