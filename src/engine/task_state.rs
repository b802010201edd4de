use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::listing::ListingStatus;
use crate::models::task::{Task, TaskStatus};

impl TaskStatus {
    pub fn next(self) -> Option<TaskStatus> {
        match self {
            TaskStatus::Assigned => Some(TaskStatus::PickedUp),
            TaskStatus::PickedUp => Some(TaskStatus::Delivered),
            TaskStatus::Delivered => Some(TaskStatus::Confirmed),
            TaskStatus::Confirmed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingMirror {
    pub from: ListingStatus,
    pub to: ListingStatus,
}

/// The listing transition a task entering `status` drags along, if any.
/// `Confirmed` only needs the listing delivered, which `Delivered` already did
/// unless the listing lags behind.
pub fn listing_mirror(status: TaskStatus, listing_status: ListingStatus) -> Option<ListingMirror> {
    match status {
        TaskStatus::Assigned => None,
        TaskStatus::PickedUp => Some(ListingMirror {
            from: ListingStatus::Reserved,
            to: ListingStatus::Collected,
        }),
        TaskStatus::Delivered => Some(ListingMirror {
            from: ListingStatus::Collected,
            to: ListingStatus::Delivered,
        }),
        TaskStatus::Confirmed if listing_status == ListingStatus::Delivered => None,
        TaskStatus::Confirmed => Some(ListingMirror {
            from: ListingStatus::Collected,
            to: ListingStatus::Delivered,
        }),
    }
}

/// Returns the task moved one step forward to `to`, with the matching
/// timestamp stamped. Anything but the immediate successor is a conflict.
pub fn advance(task: &Task, to: TaskStatus, now: DateTime<Utc>) -> Result<Task, AppError> {
    if task.status.next() != Some(to) {
        return Err(AppError::Conflict(format!(
            "invalid task transition {} -> {}",
            task.status.as_str(),
            to.as_str()
        )));
    }

    let mut next = task.clone();
    next.status = to;

    let stamp = match to {
        TaskStatus::PickedUp => &mut next.picked_up_at,
        TaskStatus::Delivered => &mut next.delivered_at,
        TaskStatus::Confirmed => &mut next.confirmed_at,
        TaskStatus::Assigned => {
            return Err(AppError::Conflict("tasks cannot return to Assigned".to_string()));
        }
    };
    if stamp.is_none() {
        *stamp = Some(now);
    }

    Ok(next)
}
