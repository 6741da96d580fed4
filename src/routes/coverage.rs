use axum::{Json, extract::State};
use serde::Deserialize;

use crate::{
    auth::identity::Identity,
    coverage::{CoverageReport, is_valid_zip},
    error::{ApiError, ApiResult},
    router::AppState,
};

#[derive(Deserialize)]
pub struct CoverageCheckRequest {
    pub zip_code: String,
}

/// Tells any authenticated caller whether a zip is served. Geocoding costs
/// an upstream request, so this sits behind the rate limiter.
pub async fn check_coverage(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CoverageCheckRequest>,
) -> ApiResult<Json<CoverageReport>> {
    if !is_valid_zip(&req.zip_code) {
        return Err(ApiError::InvalidInput(
            "zip_code must be a 5-digit ZIP".into(),
        ));
    }
    if !state.limits.allow(&identity.account_id.to_string()).await {
        return Err(ApiError::RateLimited);
    }

    let report = state.coverage.check(&*state.db, &req.zip_code).await?;
    Ok(Json(report))
}
