use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::listing::Listing;
use crate::models::task::{Task, TaskStatus};
use crate::store::{
    ListingFilter, ListingGuard, ListingPatch, ListingStore, StoreError, StoreResult, TaskStore,
};

/// Listing table held in process memory. Conditional updates run under the
/// row's shard lock, so guard check and write are atomic.
#[derive(Default)]
pub struct MemoryListingStore {
    rows: DashMap<Uuid, Listing>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn insert(&self, listing: Listing) -> StoreResult<Listing> {
        match self.rows.entry(listing.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(listing.id)),
            Entry::Vacant(slot) => {
                slot.insert(listing.clone());
                Ok(listing)
            }
        }
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        Ok(self.rows.get(&id).map(|entry| entry.value().clone()))
    }

    async fn query(&self, filter: &ListingFilter) -> StoreResult<Vec<Listing>> {
        let mut listings: Vec<Listing> = self
            .rows
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(listings)
    }

    async fn update_where(
        &self,
        id: Uuid,
        guard: &ListingGuard,
        patch: ListingPatch,
    ) -> StoreResult<Option<Listing>> {
        let Some(mut row) = self.rows.get_mut(&id) else {
            return Ok(None);
        };

        if !guard.holds(&row) {
            return Ok(None);
        }

        patch.apply(&mut row, Utc::now());
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.rows.remove(&id).is_some())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.rows.len())
    }
}

#[derive(Default)]
pub struct MemoryTaskStore {
    rows: DashMap<Uuid, Task>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn newest_first(&self, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .rows
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        tasks
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: Task) -> StoreResult<Task> {
        match self.rows.entry(task.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(task.id)),
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
                Ok(task)
            }
        }
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.rows.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_for_volunteer(&self, volunteer_id: Uuid) -> StoreResult<Vec<Task>> {
        Ok(self.newest_first(|task| task.volunteer_id == volunteer_id))
    }

    async fn replace_where(
        &self,
        id: Uuid,
        expected: TaskStatus,
        task: Task,
    ) -> StoreResult<Option<Task>> {
        let Some(mut row) = self.rows.get_mut(&id) else {
            return Ok(None);
        };

        if row.status != expected {
            return Ok(None);
        }

        *row = task;
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.rows.remove(&id).is_some())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.rows.len())
    }
}
