use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::listing::Listing;
use crate::models::user::PartyView;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Assigned,
    PickedUp,
    Delivered,
    Confirmed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Assigned => "Assigned",
            TaskStatus::PickedUp => "PickedUp",
            TaskStatus::Delivered => "Delivered",
            TaskStatus::Confirmed => "Confirmed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub volunteer_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub status: TaskStatus,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        listing_id: Uuid,
        volunteer_id: Uuid,
        recipient_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            listing_id,
            volunteer_id,
            recipient_id,
            status: TaskStatus::Assigned,
            picked_up_at: None,
            delivered_at: None,
            confirmed_at: None,
            created_at: now,
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.volunteer_id == user_id || self.recipient_id == Some(user_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDetails {
    #[serde(flatten)]
    pub task: Task,
    pub listing: Option<Listing>,
    pub provider: Option<PartyView>,
    pub recipient: Option<PartyView>,
}
