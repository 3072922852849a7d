use crate::cli::ServeArgs;
use crate::infra::{
    admin_roster, router_settings, spawn_audit_retry, upload_store, AppState, AUDIT_RETRY_INTERVAL,
};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use cloakk::config::AppConfig;
use cloakk::error::AppError;
use cloakk::submissions::{
    submission_router, AdminDirectory, AdminRoster, AuditLog, MemoryAuditLog,
    MemorySubmissionStore, SqliteSubmissionStore, SubmissionRepository, SubmissionService,
};
use cloakk::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(database_url) = args.database_url.take() {
        config.storage.database_url = Some(database_url);
    }

    telemetry::init(&config.telemetry)?;

    let roster = admin_roster(&config);
    match config.storage.database_url.clone() {
        Some(url) => {
            let store = Arc::new(SqliteSubmissionStore::connect(&url).await?);
            info!("sqlite submission store opened");
            let service = SubmissionService::new(store.clone(), store.clone(), roster.clone());
            let outcome = serve(config, service, roster).await;
            store.close().await;
            outcome
        }
        None => {
            warn!("CLOAKK_DATABASE_URL is not set; submissions are kept in memory only");
            let service = SubmissionService::new(
                Arc::new(MemorySubmissionStore::default()),
                Arc::new(MemoryAuditLog::default()),
                roster.clone(),
            );
            serve(config, service, roster).await
        }
    }
}

async fn serve<R, A, D>(
    config: AppConfig,
    service: SubmissionService<R, A, D>,
    roster: Arc<AdminRoster>,
) -> Result<(), AppError>
where
    R: SubmissionRepository + 'static,
    A: AuditLog + 'static,
    D: AdminDirectory + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(service);
    let audit_retry = spawn_audit_retry(service.clone(), AUDIT_RETRY_INTERVAL);

    let router = submission_router(
        service,
        upload_store(&config),
        roster,
        router_settings(&config),
    );
    let app = with_operational_routes(router)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "cloakk intake service ready");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    readiness_flag.store(false, Ordering::Release);
    audit_retry.abort();
    served?;

    info!("cloakk intake service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
