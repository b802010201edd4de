//! Storage collaborator contracts.
//!
//! Every mutation that depends on previously read state goes through a
//! conditional update: the write only lands when the guard columns still hold
//! the expected values, and `Ok(None)` signals that zero rows matched.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::listing::{Listing, ListingDetails, ListingStatus};
use crate::models::task::{Task, TaskStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate key: {0}")]
    Duplicate(Uuid),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub status: Option<ListingStatus>,
    pub provider_id: Option<Uuid>,
    pub pickup_ends_at_or_after: Option<DateTime<Utc>>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        self.status.is_none_or(|status| listing.status == status)
            && self
                .provider_id
                .is_none_or(|provider| listing.provider_id == provider)
            && self
                .pickup_ends_at_or_after
                .is_none_or(|at| listing.details.pickup_time_end >= at)
    }
}

/// Equality preconditions for a conditional listing update.
#[derive(Debug, Clone, Default)]
pub struct ListingGuard {
    pub status: Option<ListingStatus>,
    pub active_task_id: Option<Uuid>,
}

impl ListingGuard {
    pub fn status(status: ListingStatus) -> Self {
        Self {
            status: Some(status),
            active_task_id: None,
        }
    }

    pub fn held_by(status: ListingStatus, task_id: Uuid) -> Self {
        Self {
            status: Some(status),
            active_task_id: Some(task_id),
        }
    }

    pub fn holds(&self, listing: &Listing) -> bool {
        self.status.is_none_or(|status| listing.status == status)
            && self
                .active_task_id
                .is_none_or(|task_id| listing.active_task_id == Some(task_id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListingPatch {
    pub status: Option<ListingStatus>,
    pub active_task_id: Option<Option<Uuid>>,
    pub details: Option<ListingDetails>,
}

impl ListingPatch {
    pub fn apply(self, listing: &mut Listing, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            listing.status = status;
        }
        if let Some(active_task_id) = self.active_task_id {
            listing.active_task_id = active_task_id;
        }
        if let Some(details) = self.details {
            listing.details = details;
        }
        listing.updated_at = now;
    }
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn insert(&self, listing: Listing) -> StoreResult<Listing>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Listing>>;

    async fn query(&self, filter: &ListingFilter) -> StoreResult<Vec<Listing>>;

    /// Applies `patch` only if `guard` holds for the current row.
    async fn update_where(
        &self,
        id: Uuid,
        guard: &ListingGuard,
        patch: ListingPatch,
    ) -> StoreResult<Option<Listing>>;

    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    async fn count(&self) -> StoreResult<usize>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> StoreResult<Task>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Task>>;

    /// Tasks owned by a volunteer, newest first.
    async fn list_for_volunteer(&self, volunteer_id: Uuid) -> StoreResult<Vec<Task>>;

    /// Replaces the row only if its status still equals `expected`.
    async fn replace_where(
        &self,
        id: Uuid,
        expected: TaskStatus,
        task: Task,
    ) -> StoreResult<Option<Task>>;

    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    async fn count(&self) -> StoreResult<usize>;
}
