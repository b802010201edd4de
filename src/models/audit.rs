use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ListingCreated,
    ListingUpdated,
    ListingStatusUpdated,
    ListingDeleted,
    TaskAccepted,
    TaskStatusUpdated,
    TaskRecipientAssigned,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    FoodListing,
    Task,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: Uuid,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        actor: Uuid,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Uuid,
        details: serde_json::Value,
    ) -> Self {
        Self {
            actor,
            action,
            entity_type,
            entity_id,
            details,
            at: Utc::now(),
        }
    }
}
