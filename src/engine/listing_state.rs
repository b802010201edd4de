use crate::error::AppError;
use crate::models::listing::ListingStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingTrigger {
    Accept,
    Provider,
    TaskProgress,
}

pub struct ListingTransition;

impl ListingTransition {
    pub fn trigger_for(from: ListingStatus, to: ListingStatus) -> Option<ListingTrigger> {
        match (from, to) {
            (ListingStatus::Available, ListingStatus::Reserved) => Some(ListingTrigger::Accept),
            (ListingStatus::Available, ListingStatus::Expired) => Some(ListingTrigger::Provider),
            (ListingStatus::Reserved, ListingStatus::Available) => Some(ListingTrigger::Provider),
            (ListingStatus::Reserved, ListingStatus::Collected) => {
                Some(ListingTrigger::TaskProgress)
            }
            (ListingStatus::Collected, ListingStatus::Delivered) => {
                Some(ListingTrigger::TaskProgress)
            }
            _ => None,
        }
    }

    pub fn is_valid(from: ListingStatus, to: ListingStatus, trigger: ListingTrigger) -> bool {
        Self::trigger_for(from, to) == Some(trigger)
    }

    pub fn allowed_next_states(from: ListingStatus) -> Vec<ListingStatus> {
        ListingStatus::ALL
            .into_iter()
            .filter(|to| Self::trigger_for(from, *to).is_some())
            .collect()
    }

    pub fn check(
        from: ListingStatus,
        to: ListingStatus,
        trigger: ListingTrigger,
    ) -> Result<(), AppError> {
        if Self::is_valid(from, to, trigger) {
            Ok(())
        } else {
            let allowed: Vec<&str> = Self::allowed_next_states(from)
                .into_iter()
                .filter(|next| Self::is_valid(from, *next, trigger))
                .map(ListingStatus::as_str)
                .collect();
            Err(AppError::Conflict(format!(
                "invalid listing transition {} -> {} (allowed: {})",
                from.as_str(),
                to.as_str(),
                if allowed.is_empty() { "none".to_string() } else { allowed.join(", ") }
            )))
        }
    }
}
