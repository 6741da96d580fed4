use crate::{
    config::Config,
    coverage::{CoverageResolver, NominatimGeocoder},
    limits::RateLimiter,
    notify::Notifier,
    routes::{
        coverage::check_coverage,
        internal::{cleanup_photos, process_referrals, unlock_jobs},
        jobs::{
            add_photo, arrive_job, available_jobs, cancel_job, claim_job, complete_job,
            create_job, delay_job, start_job,
        },
        payments::distribute_payment,
        ratings::rate_service,
    },
};
use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Config,
    pub coverage: CoverageResolver,
    pub notifier: Notifier,
    pub limits: RateLimiter,
}

pub fn create_router(db: DatabaseConnection, config: Config) -> Router {
    let geocoder = Arc::new(NominatimGeocoder::new(config.geocoder_base_url.clone()));
    let state = AppState {
        db: Arc::new(db),
        coverage: CoverageResolver::new(geocoder),
        notifier: Notifier::new(config.notify_webhook_url.clone()),
        limits: RateLimiter::from_config(config.rate_limit_backend_url.clone()),
        config,
    };

    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/available", get(available_jobs))
        .route("/jobs/{id}/claim", post(claim_job))
        .route("/jobs/{id}/arrive", post(arrive_job))
        .route("/jobs/{id}/start", post(start_job))
        .route("/jobs/{id}/complete", post(complete_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/jobs/{id}/delay", post(delay_job))
        .route("/jobs/{id}/photos", post(add_photo))
        .route("/coverage/check", post(check_coverage))
        .route("/payments/distribute", post(distribute_payment))
        .route("/services/{id}/rate", post(rate_service))
        .route("/internal/jobs/unlock", post(unlock_jobs))
        .route("/internal/referrals/process", post(process_referrals))
        .route("/internal/photos/cleanup", post(cleanup_photos))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
