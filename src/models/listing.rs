use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::PartyView;
use crate::models::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    Available,
    Reserved,
    Collected,
    Delivered,
    Expired,
}

impl ListingStatus {
    pub const ALL: [ListingStatus; 5] = [
        ListingStatus::Available,
        ListingStatus::Reserved,
        ListingStatus::Collected,
        ListingStatus::Delivered,
        ListingStatus::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Available => "Available",
            ListingStatus::Reserved => "Reserved",
            ListingStatus::Collected => "Collected",
            ListingStatus::Delivered => "Delivered",
            ListingStatus::Expired => "Expired",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FoodType {
    #[serde(rename = "Cooked Meals")]
    CookedMeals,
    #[serde(rename = "Raw Vegetables")]
    RawVegetables,
    Fruits,
    #[serde(rename = "Bakery Items")]
    BakeryItems,
    #[serde(rename = "Dairy Products")]
    DairyProducts,
    #[serde(rename = "Packaged Foods")]
    PackagedFoods,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingDetails {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity_kg: f64,
    #[serde(default)]
    pub food_type: Option<FoodType>,
    pub pickup_address: String,
    pub pickup: GeoPoint,
    pub pickup_time_start: DateTime<Utc>,
    pub pickup_time_end: DateTime<Utc>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

impl ListingDetails {
    pub fn validate(&self, now: DateTime<Utc>, min_lead: Duration) -> Result<(), AppError> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.pickup_address.trim().is_empty() {
            missing.push("pickup_address");
        }
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        if !(self.quantity_kg.is_finite() && self.quantity_kg > 0.0) {
            return Err(AppError::Validation(
                "quantity_kg must be greater than 0".to_string(),
            ));
        }

        if !self.pickup.is_valid() {
            return Err(AppError::Validation(
                "pickup coordinates are out of range".to_string(),
            ));
        }

        if self.pickup_time_end <= self.pickup_time_start {
            return Err(AppError::Validation(
                "pickup_time_end must be after pickup_time_start".to_string(),
            ));
        }

        if self.pickup_time_start < now + min_lead {
            return Err(AppError::Validation(format!(
                "pickup_time_start must be at least {} minutes from now",
                min_lead.num_minutes()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub provider_id: Uuid,
    #[serde(flatten)]
    pub details: ListingDetails,
    pub status: ListingStatus,
    /// Task currently holding the reservation, if any.
    pub active_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn new(provider_id: Uuid, details: ListingDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id,
            details,
            status: ListingStatus::Available,
            active_task_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    #[serde(flatten)]
    pub listing: Listing,
    pub provider: Option<PartyView>,
}
