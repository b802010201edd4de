//! Volunteer tasks: accepting a listing and walking the task to confirmation.
//!
//! Each operation is a short saga over the storage collaborator. Writes are
//! conditional on the state read just before, and a failed second write rolls
//! the first one back. A rollback that itself fails is logged as an
//! inconsistency and surfaced as a dependency error.

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit;
use crate::auth::gate::{self, Operation};
use crate::engine::listing_state::{ListingTransition, ListingTrigger};
use crate::engine::party_view;
use crate::engine::task_state::{self, listing_mirror, ListingMirror};
use crate::error::AppError;
use crate::models::audit::{AuditAction, AuditEvent, EntityType};
use crate::models::listing::{Listing, ListingStatus};
use crate::models::task::{Task, TaskDetails, TaskStatus};
use crate::models::user::{Identity, Role};
use crate::state::AppState;
use crate::store::{ListingGuard, ListingPatch};

fn record(state: &AppState, event: AuditEvent) {
    audit::emit(&state.audit, &state.metrics.audit_failures_total, event);
}

async fn load_task(state: &AppState, id: Uuid) -> Result<Task, AppError> {
    state
        .store(state.tasks.get(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("task {id} not found")))
}

async fn ensure_recipient(state: &AppState, recipient_id: Uuid) -> Result<(), AppError> {
    let profile = state
        .auth(state.users.get(recipient_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("recipient {recipient_id} not found")))?;

    if profile.role != Role::Recipient {
        return Err(AppError::Validation(format!(
            "user {recipient_id} is not a recipient"
        )));
    }
    Ok(())
}

fn count_accept(state: &AppState, outcome: &str) {
    state
        .metrics
        .task_accepts_total
        .with_label_values(&[outcome])
        .inc();
}

/// Creates an `Assigned` task for an `Available` listing and reserves the
/// listing for it. Exactly one of several concurrent accepts can win.
pub async fn accept_listing(
    state: &AppState,
    identity: &Identity,
    listing_id: Uuid,
    recipient_id: Option<Uuid>,
) -> Result<Task, AppError> {
    gate::authorize(identity, Operation::AcceptListing)?;

    if let Some(recipient_id) = recipient_id {
        ensure_recipient(state, recipient_id).await?;
    }

    let now = Utc::now();
    let listing = state
        .store(state.listings.get(listing_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("listing {listing_id} not found")))?;

    if let Err(err) =
        ListingTransition::check(listing.status, ListingStatus::Reserved, ListingTrigger::Accept)
    {
        count_accept(state, "conflict");
        return Err(err);
    }
    if listing.details.pickup_time_end < now {
        count_accept(state, "conflict");
        return Err(AppError::Conflict(
            "the pickup window for this listing has ended".to_string(),
        ));
    }

    let task = state
        .store(
            state
                .tasks
                .insert(Task::new(listing_id, identity.id, recipient_id, now)),
        )
        .await?;

    let reserve = ListingPatch {
        status: Some(ListingStatus::Reserved),
        active_task_id: Some(Some(task.id)),
        ..Default::default()
    };
    let reserved = state
        .store(state.listings.update_where(
            listing_id,
            &ListingGuard::status(ListingStatus::Available),
            reserve,
        ))
        .await;

    match reserved {
        Ok(Some(_)) => {}
        Ok(None) => {
            count_accept(state, "conflict");
            discard_task(state, &task).await?;
            return Err(AppError::Conflict(
                "this listing is no longer available".to_string(),
            ));
        }
        Err(err) => {
            count_accept(state, "error");
            discard_task(state, &task).await?;
            return Err(err);
        }
    }

    count_accept(state, "success");
    state
        .metrics
        .listing_transitions_total
        .with_label_values(&[ListingStatus::Reserved.as_str()])
        .inc();
    info!(
        task_id = %task.id,
        listing_id = %listing_id,
        volunteer_id = %identity.id,
        "listing accepted"
    );
    record(
        state,
        AuditEvent::new(
            identity.id,
            AuditAction::TaskAccepted,
            EntityType::Task,
            task.id,
            json!({ "listing_id": listing_id }),
        ),
    );

    Ok(task)
}

async fn discard_task(state: &AppState, task: &Task) -> Result<(), AppError> {
    match state.store(state.tasks.delete(task.id)).await {
        Ok(_) => {
            warn!(task_id = %task.id, listing_id = %task.listing_id, "accept rolled back");
            Ok(())
        }
        Err(err) => {
            error!(
                error = %err,
                task_id = %task.id,
                listing_id = %task.listing_id,
                "inconsistent state: task exists without a reservation"
            );
            Err(AppError::Dependency(format!(
                "task {} left without reservation on listing {}: {err}",
                task.id, task.listing_id
            )))
        }
    }
}

pub async fn list_own_tasks(
    state: &AppState,
    identity: &Identity,
) -> Result<Vec<TaskDetails>, AppError> {
    gate::authorize(identity, Operation::ListOwnTasks)?;

    let tasks = state
        .store(state.tasks.list_for_volunteer(identity.id))
        .await?;

    let mut details = Vec::with_capacity(tasks.len());
    for task in tasks {
        let listing = state.store(state.listings.get(task.listing_id)).await?;
        let provider = match &listing {
            Some(listing) => party_view(state, listing.provider_id).await?,
            None => None,
        };
        let recipient = match task.recipient_id {
            Some(recipient_id) => party_view(state, recipient_id).await?,
            None => None,
        };

        details.push(TaskDetails {
            task,
            listing,
            provider,
            recipient,
        });
    }

    Ok(details)
}

pub async fn advance_task(
    state: &AppState,
    identity: &Identity,
    task_id: Uuid,
    to: TaskStatus,
) -> Result<Task, AppError> {
    gate::authorize(identity, Operation::AdvanceTask)?;

    let task = load_task(state, task_id).await?;
    gate::require_task_participant(identity, &task)?;

    let next = task_state::advance(&task, to, Utc::now())?;

    let listing = state.store(state.listings.get(task.listing_id)).await?;
    let mirror = match &listing {
        Some(listing) => planned_mirror(&task, listing, to)?,
        None => {
            warn!(
                task_id = %task.id,
                listing_id = %task.listing_id,
                "listing removed, advancing task without mirroring"
            );
            None
        }
    };

    let updated = state
        .store(state.tasks.replace_where(task.id, task.status, next))
        .await?
        .ok_or_else(|| AppError::Conflict("task changed concurrently, refresh and retry".to_string()))?;

    if let Some(mirror) = mirror {
        let moved = state
            .store(state.listings.update_where(
                task.listing_id,
                &ListingGuard::held_by(mirror.from, task.id),
                ListingPatch {
                    status: Some(mirror.to),
                    ..Default::default()
                },
            ))
            .await;

        let failure = match moved {
            Ok(Some(_)) => None,
            Ok(None) => Some(AppError::Conflict(
                "listing changed concurrently, refresh and retry".to_string(),
            )),
            Err(err) => Some(err),
        };
        if let Some(failure) = failure {
            restore_task(state, &task, to).await?;
            return Err(failure);
        }

        state
            .metrics
            .listing_transitions_total
            .with_label_values(&[mirror.to.as_str()])
            .inc();
    }

    state
        .metrics
        .task_transitions_total
        .with_label_values(&[to.as_str()])
        .inc();
    info!(
        task_id = %task.id,
        listing_id = %task.listing_id,
        from = task.status.as_str(),
        to = to.as_str(),
        "task advanced"
    );
    record(
        state,
        AuditEvent::new(
            identity.id,
            AuditAction::TaskStatusUpdated,
            EntityType::Task,
            task.id,
            json!({ "old_status": task.status, "new_status": to }),
        ),
    );

    Ok(updated)
}

fn planned_mirror(
    task: &Task,
    listing: &Listing,
    to: TaskStatus,
) -> Result<Option<ListingMirror>, AppError> {
    let Some(mirror) = listing_mirror(to, listing.status) else {
        return Ok(None);
    };

    if listing.active_task_id != Some(task.id) {
        return Err(AppError::Conflict(
            "task no longer holds the reservation for this listing".to_string(),
        ));
    }
    ListingTransition::check(listing.status, mirror.to, ListingTrigger::TaskProgress)?;

    Ok(Some(mirror))
}

async fn restore_task(state: &AppState, original: &Task, written: TaskStatus) -> Result<(), AppError> {
    let restored = state
        .store(state.tasks.replace_where(original.id, written, original.clone()))
        .await;

    match restored {
        Ok(Some(_)) => {
            warn!(task_id = %original.id, status = written.as_str(), "task step rolled back");
            Ok(())
        }
        Ok(None) => {
            error!(task_id = %original.id, "inconsistent state: task moved during rollback");
            Err(AppError::Dependency(format!(
                "task {} could not be rolled back",
                original.id
            )))
        }
        Err(err) => {
            error!(error = %err, task_id = %original.id, "inconsistent state: task rollback failed");
            Err(AppError::Dependency(format!(
                "task {} could not be rolled back: {err}",
                original.id
            )))
        }
    }
}

pub async fn assign_recipient(
    state: &AppState,
    identity: &Identity,
    task_id: Uuid,
    recipient_id: Uuid,
) -> Result<Task, AppError> {
    gate::authorize(identity, Operation::AssignRecipient)?;

    let task = load_task(state, task_id).await?;
    gate::require_task_volunteer(identity, &task)?;

    if task.recipient_id.is_some() {
        return Err(AppError::Conflict("task already has a recipient".to_string()));
    }
    if task.status.is_terminal() {
        return Err(AppError::Conflict("task is already confirmed".to_string()));
    }

    ensure_recipient(state, recipient_id).await?;

    let mut next = task.clone();
    next.recipient_id = Some(recipient_id);

    let updated = state
        .store(state.tasks.replace_where(task.id, task.status, next))
        .await?
        .ok_or_else(|| AppError::Conflict("task changed concurrently, refresh and retry".to_string()))?;

    info!(task_id = %task.id, recipient_id = %recipient_id, "recipient assigned");
    record(
        state,
        AuditEvent::new(
            identity.id,
            AuditAction::TaskRecipientAssigned,
            EntityType::Task,
            task.id,
            json!({ "recipient_id": recipient_id }),
        ),
    );

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use futures::future::join_all;
    use uuid::Uuid;

    use super::{accept_listing, advance_task, assign_recipient, list_own_tasks};
    use crate::auth::NewUser;
    use crate::config::Config;
    use crate::engine::listings::{change_listing_status, create_listing};
    use crate::error::AppError;
    use crate::models::listing::{Listing, ListingDetails, ListingStatus};
    use crate::models::task::TaskStatus;
    use crate::models::user::{Identity, Role};
    use crate::models::GeoPoint;
    use crate::state::AppState;
    use crate::store::memory::MemoryListingStore;
    use crate::store::{
        ListingFilter, ListingGuard, ListingPatch, ListingStore, StoreError, StoreResult,
    };

    async fn user(state: &AppState, role: Role) -> Identity {
        let (profile, _token) = state
            .users
            .register(NewUser {
                email: format!("{}@example.org", Uuid::new_v4()),
                name: format!("{role} user"),
                role,
                phone: None,
                organization_name: None,
                location_address: None,
                location: None,
            })
            .await
            .unwrap();
        profile.identity()
    }

    fn details() -> ListingDetails {
        let now = Utc::now();
        ListingDetails {
            title: "Vegetable curry".to_string(),
            description: Some("Two large trays".to_string()),
            quantity_kg: 8.0,
            food_type: None,
            pickup_address: "Dadar, Mumbai".to_string(),
            pickup: GeoPoint::new(19.0178, 72.8478),
            pickup_time_start: now + Duration::hours(1),
            pickup_time_end: now + Duration::hours(3),
            special_instructions: None,
        }
    }

    async fn setup() -> (AppState, Identity, Listing) {
        let state = AppState::in_memory(&Config::default());
        let provider = user(&state, Role::Provider).await;
        let listing = create_listing(&state, &provider, details()).await.unwrap();
        (state, provider, listing)
    }

    async fn listing_status(state: &AppState, id: Uuid) -> ListingStatus {
        state.listings.get(id).await.unwrap().unwrap().status
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_create_exactly_one_task() {
        let (state, _provider, listing) = setup().await;
        let state = Arc::new(state);

        let mut volunteers = Vec::new();
        for _ in 0..8 {
            volunteers.push(user(&state, Role::Volunteer).await);
        }

        let listing_id = listing.id;
        let attempts = volunteers.into_iter().map(|volunteer| {
            let state = Arc::clone(&state);
            tokio::spawn(async move { accept_listing(&state, &volunteer, listing_id, None).await })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let wins = results.iter().filter(|result| result.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|result| matches!(result, Err(AppError::Conflict(_))))
            .count();

        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(state.tasks.count().await.unwrap(), 1);

        let reserved = state.listings.get(listing.id).await.unwrap().unwrap();
        let winner = results.into_iter().find_map(Result::ok).unwrap();
        assert_eq!(reserved.status, ListingStatus::Reserved);
        assert_eq!(reserved.active_task_id, Some(winner.id));
    }

    #[tokio::test]
    async fn full_progression_mirrors_listing_status() {
        let (state, _provider, listing) = setup().await;
        let volunteer = user(&state, Role::Volunteer).await;
        let recipient = user(&state, Role::Recipient).await;

        let task = accept_listing(&state, &volunteer, listing.id, Some(recipient.id))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);

        let task = advance_task(&state, &volunteer, task.id, TaskStatus::PickedUp)
            .await
            .unwrap();
        assert!(task.picked_up_at.is_some());
        assert_eq!(listing_status(&state, listing.id).await, ListingStatus::Collected);

        let task = advance_task(&state, &volunteer, task.id, TaskStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(listing_status(&state, listing.id).await, ListingStatus::Delivered);

        let task = advance_task(&state, &recipient, task.id, TaskStatus::Confirmed)
            .await
            .unwrap();
        assert!(task.confirmed_at.is_some());
        assert_eq!(listing_status(&state, listing.id).await, ListingStatus::Delivered);
    }

    #[tokio::test]
    async fn backward_step_is_a_conflict_and_changes_nothing() {
        let (state, _provider, listing) = setup().await;
        let volunteer = user(&state, Role::Volunteer).await;
        let task = accept_listing(&state, &volunteer, listing.id, None).await.unwrap();
        advance_task(&state, &volunteer, task.id, TaskStatus::PickedUp)
            .await
            .unwrap();
        let delivered = advance_task(&state, &volunteer, task.id, TaskStatus::Delivered)
            .await
            .unwrap();

        let result = advance_task(&state, &volunteer, task.id, TaskStatus::PickedUp).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(state.tasks.get(task.id).await.unwrap().unwrap(), delivered);
        assert_eq!(listing_status(&state, listing.id).await, ListingStatus::Delivered);
    }

    #[tokio::test]
    async fn outsiders_cannot_advance_a_task() {
        let (state, _provider, listing) = setup().await;
        let volunteer = user(&state, Role::Volunteer).await;
        let outsider = user(&state, Role::Volunteer).await;
        let task = accept_listing(&state, &volunteer, listing.id, None).await.unwrap();

        let result = advance_task(&state, &outsider, task.id, TaskStatus::PickedUp).await;

        assert!(matches!(result, Err(AppError::Authorization(_))));
        assert_eq!(
            state.tasks.get(task.id).await.unwrap().unwrap().status,
            TaskStatus::Assigned
        );
        assert_eq!(listing_status(&state, listing.id).await, ListingStatus::Reserved);
    }

    #[tokio::test]
    async fn released_reservation_strands_the_old_task() {
        let (state, provider, listing) = setup().await;
        let first = user(&state, Role::Volunteer).await;
        let second = user(&state, Role::Volunteer).await;

        let stale = accept_listing(&state, &first, listing.id, None).await.unwrap();
        change_listing_status(&state, &provider, listing.id, ListingStatus::Available)
            .await
            .unwrap();
        let fresh = accept_listing(&state, &second, listing.id, None).await.unwrap();

        let result = advance_task(&state, &first, stale.id, TaskStatus::PickedUp).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(
            state.tasks.get(stale.id).await.unwrap().unwrap().status,
            TaskStatus::Assigned
        );
        let current = state.listings.get(listing.id).await.unwrap().unwrap();
        assert_eq!(current.status, ListingStatus::Reserved);
        assert_eq!(current.active_task_id, Some(fresh.id));
    }

    /// Listing store whose conditional updates fail while `failing` is set.
    struct FlakyUpdates {
        inner: MemoryListingStore,
        failing: AtomicBool,
    }

    impl FlakyUpdates {
        fn new(failing: bool) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryListingStore::new(),
                failing: AtomicBool::new(failing),
            })
        }
    }

    #[async_trait]
    impl ListingStore for FlakyUpdates {
        async fn insert(&self, listing: Listing) -> StoreResult<Listing> {
            self.inner.insert(listing).await
        }

        async fn get(&self, id: Uuid) -> StoreResult<Option<Listing>> {
            self.inner.get(id).await
        }

        async fn query(&self, filter: &ListingFilter) -> StoreResult<Vec<Listing>> {
            self.inner.query(filter).await
        }

        async fn update_where(
            &self,
            id: Uuid,
            guard: &ListingGuard,
            patch: ListingPatch,
        ) -> StoreResult<Option<Listing>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.update_where(id, guard, patch).await
        }

        async fn delete(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete(id).await
        }

        async fn count(&self) -> StoreResult<usize> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn failed_reservation_rolls_back_the_task() {
        let mut state = AppState::in_memory(&Config::default());
        state.listings = FlakyUpdates::new(true);
        let provider = user(&state, Role::Provider).await;
        let volunteer = user(&state, Role::Volunteer).await;
        let listing = create_listing(&state, &provider, details()).await.unwrap();

        let result = accept_listing(&state, &volunteer, listing.id, None).await;

        assert!(matches!(result, Err(AppError::Dependency(_))));
        assert_eq!(state.tasks.count().await.unwrap(), 0);
        assert_eq!(listing_status(&state, listing.id).await, ListingStatus::Available);
    }

    #[tokio::test]
    async fn failed_mirror_rolls_the_task_step_back() {
        let listings = FlakyUpdates::new(false);
        let mut state = AppState::in_memory(&Config::default());
        state.listings = listings.clone();
        let provider = user(&state, Role::Provider).await;
        let volunteer = user(&state, Role::Volunteer).await;
        let listing = create_listing(&state, &provider, details()).await.unwrap();
        let task = accept_listing(&state, &volunteer, listing.id, None).await.unwrap();

        listings.failing.store(true, Ordering::SeqCst);
        let result = advance_task(&state, &volunteer, task.id, TaskStatus::PickedUp).await;

        assert!(matches!(result, Err(AppError::Dependency(_))));
        let stored = state.tasks.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Assigned);
        assert!(stored.picked_up_at.is_none());
        let current = state.listings.get(listing.id).await.unwrap().unwrap();
        assert_eq!(current.status, ListingStatus::Reserved);
        assert_eq!(current.active_task_id, Some(task.id));

        listings.failing.store(false, Ordering::SeqCst);
        let retried = advance_task(&state, &volunteer, task.id, TaskStatus::PickedUp)
            .await
            .unwrap();
        assert_eq!(retried.status, TaskStatus::PickedUp);
        assert_eq!(listing_status(&state, listing.id).await, ListingStatus::Collected);
    }

    #[tokio::test]
    async fn accept_rejects_non_recipient_target() {
        let (state, provider, listing) = setup().await;
        let volunteer = user(&state, Role::Volunteer).await;

        let result = accept_listing(&state, &volunteer, listing.id, Some(provider.id)).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(listing_status(&state, listing.id).await, ListingStatus::Available);
    }

    #[tokio::test]
    async fn recipient_can_be_attached_once() {
        let (state, _provider, listing) = setup().await;
        let volunteer = user(&state, Role::Volunteer).await;
        let recipient = user(&state, Role::Recipient).await;
        let task = accept_listing(&state, &volunteer, listing.id, None).await.unwrap();

        let task = assign_recipient(&state, &volunteer, task.id, recipient.id)
            .await
            .unwrap();
        assert_eq!(task.recipient_id, Some(recipient.id));

        let again = assign_recipient(&state, &volunteer, task.id, recipient.id).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let picked_by_recipient =
            advance_task(&state, &recipient, task.id, TaskStatus::PickedUp).await;
        assert!(picked_by_recipient.is_ok());
    }

    #[tokio::test]
    async fn own_tasks_are_joined_with_listing_and_provider() {
        let (state, _provider, listing) = setup().await;
        let volunteer = user(&state, Role::Volunteer).await;
        accept_listing(&state, &volunteer, listing.id, None).await.unwrap();

        let tasks = list_own_tasks(&state, &volunteer).await.unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].listing.as_ref().unwrap().id, listing.id);
        assert_eq!(tasks[0].provider.as_ref().unwrap().name, "provider user");
        assert!(tasks[0].recipient.is_none());
    }
}
