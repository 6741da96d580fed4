use anyhow::{Context, anyhow};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::entities::{coverage_area, prelude::CoverageArea};
use crate::error::ApiError;

const EARTH_RADIUS_MILES: f64 = 3958.8;
const GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn is_valid_zip(zip: &str) -> bool {
    zip.len() == 5 && zip.bytes().all(|b| b.is_ascii_digit())
}

/// Great-circle distance in miles.
pub fn haversine_miles(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_MILES * c
}

/// Resolves a ZIP code to coordinates. One strategy serves every call site
/// so claim checks and the public coverage endpoint cannot disagree.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, zip: &str) -> anyhow::Result<(f64, f64)>;
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait::async_trait]
impl Geocoder for NominatimGeocoder {
    async fn locate(&self, zip: &str) -> anyhow::Result<(f64, f64)> {
        let url = format!(
            "{}/search?postalcode={}&country=us&format=json&limit=1",
            self.base_url, zip
        );

        let hits: Vec<GeocodeHit> = self
            .client
            .get(&url)
            .header("User-Agent", "scooper-rs/0.1 (coverage lookup)")
            .timeout(GEOCODE_TIMEOUT)
            .send()
            .await
            .context("geocoder request failed")?
            .json()
            .await
            .context("geocoder returned a malformed response")?;

        let hit = hits
            .first()
            .ok_or_else(|| anyhow!("no geocoder result for zip {zip}"))?;
        let lat = hit.lat.parse().context("invalid latitude in response")?;
        let lng = hit.lon.parse().context("invalid longitude in response")?;

        Ok((lat, lng))
    }
}

#[derive(Debug, Serialize)]
pub struct CoverageReport {
    pub is_covered: bool,
    pub matched_employee_id: Option<Uuid>,
    pub distance_miles: Option<f64>,
    pub reason: Option<String>,
}

fn not_covered(reason: &str) -> CoverageReport {
    CoverageReport {
        is_covered: false,
        matched_employee_id: None,
        distance_miles: None,
        reason: Some(reason.to_string()),
    }
}

#[derive(Clone)]
pub struct CoverageResolver {
    geocoder: Arc<dyn Geocoder>,
}

impl CoverageResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    /// Never fails toward the caller: geocoder trouble degrades to
    /// "not covered" with a reason.
    pub async fn check(
        &self,
        db: &DatabaseConnection,
        zip: &str,
    ) -> Result<CoverageReport, ApiError> {
        let areas = CoverageArea::find()
            .filter(coverage_area::Column::IsActive.eq(true))
            .all(db)
            .await?;
        if areas.is_empty() {
            return Ok(not_covered("no active coverage areas"));
        }

        let (lat, lng) = match self.geocoder.locate(zip).await {
            Ok(coords) => coords,
            Err(e) => {
                tracing::warn!(zip, "geocoder lookup failed: {e:#}");
                return Ok(not_covered("could not resolve zip code"));
            }
        };

        match nearest_covering(&areas, lat, lng) {
            Some((area, distance)) => Ok(CoverageReport {
                is_covered: true,
                matched_employee_id: Some(area.employee_id),
                distance_miles: Some(distance),
                reason: None,
            }),
            None => Ok(not_covered("no worker covers this zip code")),
        }
    }

    /// Claim-time guard: does this worker's active coverage include the zip?
    /// A failed lookup denies coverage rather than erroring the claim.
    pub async fn worker_covers(
        &self,
        db: &DatabaseConnection,
        employee_id: Uuid,
        zip: &str,
    ) -> Result<bool, ApiError> {
        let areas = CoverageArea::find()
            .filter(coverage_area::Column::EmployeeId.eq(employee_id))
            .filter(coverage_area::Column::IsActive.eq(true))
            .all(db)
            .await?;
        if areas.is_empty() {
            return Ok(false);
        }

        // The worker's own base zip needs no lookup.
        if areas.iter().any(|a| a.zip_code == zip) {
            return Ok(true);
        }

        let (lat, lng) = match self.geocoder.locate(zip).await {
            Ok(coords) => coords,
            Err(e) => {
                tracing::warn!(zip, employee_id = %employee_id, "geocoder lookup failed: {e:#}");
                return Ok(false);
            }
        };

        Ok(nearest_covering(&areas, lat, lng).is_some())
    }
}

/// Nearest active area whose declared radius reaches the point.
pub fn nearest_covering(
    areas: &[coverage_area::Model],
    lat: f64,
    lng: f64,
) -> Option<(&coverage_area::Model, f64)> {
    areas
        .iter()
        .map(|a| (a, haversine_miles(a.latitude, a.longitude, lat, lng)))
        .filter(|(a, d)| *d <= a.radius_miles)
        .min_by(|(_, d1), (_, d2)| d1.total_cmp(d2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn area(lat: f64, lng: f64, radius: f64) -> coverage_area::Model {
        coverage_area::Model {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            zip_code: "55401".to_string(),
            latitude: lat,
            longitude: lng,
            radius_miles: radius,
            is_active: true,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn validates_zip_format() {
        assert!(is_valid_zip("55401"));
        assert!(is_valid_zip("00001"));
        assert!(!is_valid_zip("5540"));
        assert!(!is_valid_zip("554011"));
        assert!(!is_valid_zip("5540a"));
        assert!(!is_valid_zip(""));
    }

    #[test]
    fn haversine_sanity() {
        // Minneapolis to St. Paul, roughly 10 miles
        let d = haversine_miles(44.98, -93.27, 44.95, -93.09);
        assert!(d > 8.0 && d < 12.0, "got {d}");

        let zero = haversine_miles(44.98, -93.27, 44.98, -93.27);
        assert!(zero < 0.01);
    }

    #[test]
    fn picks_the_nearest_qualifying_area() {
        let near = area(44.98, -93.27, 15.0);
        let far = area(44.95, -93.09, 50.0);
        let out_of_range = area(46.80, -92.10, 5.0);
        let areas = vec![far.clone(), near.clone(), out_of_range];

        let (matched, distance) = nearest_covering(&areas, 44.97, -93.26).expect("covered");
        assert_eq!(matched.id, near.id);
        assert!(distance < 1.5);
    }

    #[test]
    fn no_match_when_all_radii_too_small() {
        let areas = vec![area(44.98, -93.27, 1.0)];
        // Duluth is far outside a 1 mile radius around Minneapolis
        assert!(nearest_covering(&areas, 46.79, -92.10).is_none());
    }
}
