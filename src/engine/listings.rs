use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit;
use crate::auth::gate::{self, Operation};
use crate::engine::listing_state::{ListingTransition, ListingTrigger};
use crate::engine::provider_views;
use crate::error::AppError;
use crate::models::audit::{AuditAction, AuditEvent, EntityType};
use crate::models::listing::{Listing, ListingDetails, ListingStatus, ListingView};
use crate::models::user::Identity;
use crate::state::AppState;
use crate::store::{ListingFilter, ListingGuard, ListingPatch};

fn record(state: &AppState, event: AuditEvent) {
    audit::emit(&state.audit, &state.metrics.audit_failures_total, event);
}

async fn load(state: &AppState, id: Uuid) -> Result<Listing, AppError> {
    state
        .store(state.listings.get(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("listing {id} not found")))
}

pub async fn create_listing(
    state: &AppState,
    identity: &Identity,
    details: ListingDetails,
) -> Result<Listing, AppError> {
    gate::authorize(identity, Operation::CreateListing)?;

    let now = Utc::now();
    details.validate(now, state.settings.min_pickup_lead)?;

    let listing = state
        .store(state.listings.insert(Listing::new(identity.id, details, now)))
        .await?;

    state.metrics.listings_created_total.inc();
    info!(listing_id = %listing.id, provider_id = %identity.id, "listing created");
    record(
        state,
        AuditEvent::new(
            identity.id,
            AuditAction::ListingCreated,
            EntityType::FoodListing,
            listing.id,
            json!({
                "title": listing.details.title,
                "quantity_kg": listing.details.quantity_kg,
            }),
        ),
    );

    Ok(listing)
}

pub async fn list_own_listings(
    state: &AppState,
    identity: &Identity,
) -> Result<Vec<Listing>, AppError> {
    gate::authorize(identity, Operation::ListOwnListings)?;

    state
        .store(state.listings.query(&ListingFilter {
            provider_id: Some(identity.id),
            ..Default::default()
        }))
        .await
}

pub async fn list_available_listings(
    state: &AppState,
    identity: &Identity,
) -> Result<Vec<ListingView>, AppError> {
    gate::authorize(identity, Operation::ListAvailableListings)?;

    let listings = state
        .store(state.listings.query(&ListingFilter {
            status: Some(ListingStatus::Available),
            pickup_ends_at_or_after: Some(Utc::now()),
            ..Default::default()
        }))
        .await?;

    let providers = provider_views(state, &listings).await?;
    Ok(listings
        .into_iter()
        .zip(providers)
        .map(|(listing, provider)| ListingView { listing, provider })
        .collect())
}

pub async fn get_listing(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
) -> Result<Listing, AppError> {
    gate::authorize(identity, Operation::ViewListing)?;
    load(state, id).await
}

pub async fn edit_listing(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
    details: ListingDetails,
) -> Result<Listing, AppError> {
    gate::authorize(identity, Operation::EditListing)?;

    let current = load(state, id).await?;
    gate::require_listing_owner(identity, &current)?;

    if current.status != ListingStatus::Available {
        return Err(AppError::Conflict(format!(
            "listing is {} and can no longer be edited",
            current.status.as_str()
        )));
    }

    details.validate(Utc::now(), state.settings.min_pickup_lead)?;

    let updated = state
        .store(state.listings.update_where(
            id,
            &ListingGuard::status(ListingStatus::Available),
            ListingPatch {
                details: Some(details),
                ..Default::default()
            },
        ))
        .await?
        .ok_or_else(|| AppError::Conflict("listing is no longer available".to_string()))?;

    info!(listing_id = %id, "listing edited");
    record(
        state,
        AuditEvent::new(
            identity.id,
            AuditAction::ListingUpdated,
            EntityType::FoodListing,
            id,
            json!({ "title": updated.details.title }),
        ),
    );

    Ok(updated)
}

pub async fn change_listing_status(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
    to: ListingStatus,
) -> Result<Listing, AppError> {
    gate::authorize(identity, Operation::ChangeListingStatus)?;

    let current = load(state, id).await?;
    gate::require_listing_owner(identity, &current)?;
    ListingTransition::check(current.status, to, ListingTrigger::Provider)?;

    let mut patch = ListingPatch {
        status: Some(to),
        ..Default::default()
    };
    if to == ListingStatus::Available {
        patch.active_task_id = Some(None);
    }

    let updated = state
        .store(
            state
                .listings
                .update_where(id, &ListingGuard::status(current.status), patch),
        )
        .await?
        .ok_or_else(|| {
            warn!(listing_id = %id, "listing status changed underneath provider update");
            AppError::Conflict("listing status changed, refresh and retry".to_string())
        })?;

    state
        .metrics
        .listing_transitions_total
        .with_label_values(&[to.as_str()])
        .inc();
    info!(
        listing_id = %id,
        from = current.status.as_str(),
        to = to.as_str(),
        "listing status changed by provider"
    );
    record(
        state,
        AuditEvent::new(
            identity.id,
            AuditAction::ListingStatusUpdated,
            EntityType::FoodListing,
            id,
            json!({
                "old_status": current.status,
                "new_status": to,
                "released_task_id": current.active_task_id.filter(|_| to == ListingStatus::Available),
            }),
        ),
    );

    Ok(updated)
}

pub async fn delete_listing(state: &AppState, identity: &Identity, id: Uuid) -> Result<(), AppError> {
    gate::authorize(identity, Operation::DeleteListing)?;

    let current = load(state, id).await?;
    gate::require_listing_owner(identity, &current)?;

    if !state.store(state.listings.delete(id)).await? {
        return Err(AppError::NotFound(format!("listing {id} not found")));
    }

    info!(listing_id = %id, status = current.status.as_str(), "listing deleted");
    record(
        state,
        AuditEvent::new(
            identity.id,
            AuditAction::ListingDeleted,
            EntityType::FoodListing,
            id,
            json!({ "title": current.details.title, "status": current.status }),
        ),
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{
        change_listing_status, create_listing, delete_listing, edit_listing,
        list_available_listings, list_own_listings,
    };
    use crate::audit::MemoryAuditSink;
    use crate::auth::NewUser;
    use crate::config::Config;
    use crate::error::AppError;
    use crate::models::audit::AuditAction;
    use crate::models::listing::{FoodType, ListingDetails, ListingStatus};
    use crate::models::user::{Identity, Role};
    use crate::models::GeoPoint;
    use crate::state::AppState;

    async fn user(state: &AppState, role: Role, name: &str) -> Identity {
        let (profile, _token) = state
            .users
            .register(NewUser {
                email: format!("{}@example.org", Uuid::new_v4()),
                name: name.to_string(),
                role,
                phone: None,
                organization_name: Some("Annapurna Kitchen".to_string()),
                location_address: None,
                location: None,
            })
            .await
            .unwrap();
        profile.identity()
    }

    fn details(title: &str) -> ListingDetails {
        let now = Utc::now();
        ListingDetails {
            title: title.to_string(),
            description: None,
            quantity_kg: 4.5,
            food_type: Some(FoodType::BakeryItems),
            pickup_address: "Bandra West, Mumbai".to_string(),
            pickup: GeoPoint::new(19.0596, 72.8295),
            pickup_time_start: now + Duration::hours(2),
            pickup_time_end: now + Duration::hours(5),
            special_instructions: Some("Ring the back door".to_string()),
        }
    }

    #[tokio::test]
    async fn create_records_an_audit_event() {
        let sink = Arc::new(MemoryAuditSink::new());
        let state = AppState::in_memory(&Config::default()).with_audit(sink.clone());
        let provider = user(&state, Role::Provider, "Asha").await;

        let listing = create_listing(&state, &provider, details("Pav")).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::ListingCreated);
        assert_eq!(events[0].entity_id, listing.id);
        assert_eq!(events[0].actor, provider.id);
        assert_eq!(state.metrics.listings_created_total.get(), 1);
    }

    #[tokio::test]
    async fn short_lead_time_is_rejected_without_a_write() {
        let state = AppState::in_memory(&Config::default());
        let provider = user(&state, Role::Provider, "Asha").await;

        let mut soon = details("Pav");
        soon.pickup_time_start = Utc::now() + Duration::minutes(5);

        let result = create_listing(&state, &provider, soon).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(state.listings.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn own_listings_are_scoped_to_the_provider() {
        let state = AppState::in_memory(&Config::default());
        let asha = user(&state, Role::Provider, "Asha").await;
        let ravi = user(&state, Role::Provider, "Ravi").await;
        create_listing(&state, &asha, details("Pav")).await.unwrap();
        create_listing(&state, &ravi, details("Naan")).await.unwrap();

        let mine = list_own_listings(&state, &asha).await.unwrap();

        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].details.title, "Pav");
    }

    #[tokio::test]
    async fn available_listings_carry_the_provider_view() {
        let state = AppState::in_memory(&Config::default());
        let provider = user(&state, Role::Provider, "Asha").await;
        let volunteer = user(&state, Role::Volunteer, "Vik").await;
        let open = create_listing(&state, &provider, details("Pav")).await.unwrap();
        let expired = create_listing(&state, &provider, details("Naan")).await.unwrap();
        change_listing_status(&state, &provider, expired.id, ListingStatus::Expired)
            .await
            .unwrap();

        let available = list_available_listings(&state, &volunteer).await.unwrap();

        assert_eq!(available.len(), 1);
        assert_eq!(available[0].listing.id, open.id);
        let provider_view = available[0].provider.as_ref().unwrap();
        assert_eq!(provider_view.name, "Asha");
        assert_eq!(
            provider_view.organization_name.as_deref(),
            Some("Annapurna Kitchen")
        );
    }

    #[tokio::test]
    async fn expired_listing_cannot_be_edited_or_reopened() {
        let state = AppState::in_memory(&Config::default());
        let provider = user(&state, Role::Provider, "Asha").await;
        let listing = create_listing(&state, &provider, details("Pav")).await.unwrap();
        change_listing_status(&state, &provider, listing.id, ListingStatus::Expired)
            .await
            .unwrap();

        let edit = edit_listing(&state, &provider, listing.id, details("Pav v2")).await;
        let reopen =
            change_listing_status(&state, &provider, listing.id, ListingStatus::Available).await;

        assert!(matches!(edit, Err(AppError::Conflict(_))));
        assert!(matches!(reopen, Err(AppError::Conflict(_))));
        let stored = state.listings.get(listing.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ListingStatus::Expired);
        assert_eq!(stored.details.title, "Pav");
    }

    #[tokio::test]
    async fn delete_by_non_owner_leaves_listing_in_place() {
        let state = AppState::in_memory(&Config::default());
        let owner = user(&state, Role::Provider, "Asha").await;
        let other = user(&state, Role::Provider, "Ravi").await;
        let listing = create_listing(&state, &owner, details("Pav")).await.unwrap();

        let denied = delete_listing(&state, &other, listing.id).await;
        assert!(matches!(denied, Err(AppError::Authorization(_))));
        assert!(state.listings.get(listing.id).await.unwrap().is_some());

        delete_listing(&state, &owner, listing.id).await.unwrap();
        assert!(state.listings.get(listing.id).await.unwrap().is_none());
    }
}
