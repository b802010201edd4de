use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::auth::gate::{self, Operation};
use crate::engine::provider_views;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::listing::{Listing, ListingStatus, ListingView};
use crate::models::user::Identity;
use crate::models::GeoPoint;
use crate::state::AppState;
use crate::store::ListingFilter;

#[derive(Debug, Clone, Serialize)]
pub struct NearbyListing {
    #[serde(flatten)]
    pub listing: ListingView,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyResult {
    pub radius_km: f64,
    pub count: usize,
    pub listings: Vec<NearbyListing>,
}

/// Keeps open, available listings within `radius_km` of `origin`, closest
/// first. Equal distances keep their input order.
pub fn rank_nearby(
    origin: &GeoPoint,
    listings: Vec<Listing>,
    radius_km: f64,
    now: DateTime<Utc>,
) -> Vec<(Listing, f64)> {
    let mut ranked: Vec<(Listing, f64)> = listings
        .into_iter()
        .filter(|listing| {
            listing.status == ListingStatus::Available && listing.details.pickup_time_end >= now
        })
        .map(|listing| {
            let distance_km = haversine_km(origin, &listing.details.pickup);
            (listing, distance_km)
        })
        .filter(|(_, distance_km)| *distance_km <= radius_km)
        .collect();

    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked
}

pub async fn find_nearby(
    state: &AppState,
    identity: &Identity,
    radius_km: Option<f64>,
) -> Result<NearbyResult, AppError> {
    gate::authorize(identity, Operation::NearbyListings)?;

    let radius_km = radius_km.unwrap_or(state.settings.default_radius_km);
    if !(radius_km.is_finite() && radius_km > 0.0) {
        return Err(AppError::Validation(
            "radius must be a positive number of kilometers".to_string(),
        ));
    }

    let profile = state
        .auth(state.users.get(identity.id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", identity.id)))?;
    let origin = profile.location.ok_or(AppError::LocationNotSet)?;

    let started = Instant::now();
    let now = Utc::now();
    let candidates = state
        .store(state.listings.query(&ListingFilter {
            status: Some(ListingStatus::Available),
            pickup_ends_at_or_after: Some(now),
            ..Default::default()
        }))
        .await?;
    let scanned = candidates.len();

    let ranked = rank_nearby(&origin, candidates, radius_km, now);
    let matched: Vec<&Listing> = ranked.iter().map(|(listing, _)| listing).collect();
    let views = provider_views(state, matched).await?;

    let listings: Vec<NearbyListing> = ranked
        .into_iter()
        .zip(views)
        .map(|((listing, distance_km), provider)| NearbyListing {
            listing: ListingView { listing, provider },
            distance_km,
        })
        .collect();

    state
        .metrics
        .nearby_query_seconds
        .observe(started.elapsed().as_secs_f64());
    debug!(
        volunteer_id = %identity.id,
        radius_km,
        scanned,
        matched = listings.len(),
        "nearby query"
    );

    Ok(NearbyResult {
        radius_km,
        count: listings.len(),
        listings,
    })
}
