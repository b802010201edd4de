use crate::error::AppError;
use crate::models::listing::Listing;
use crate::models::task::Task;
use crate::models::user::{Identity, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ViewProfile,
    UpdateLocation,
    CreateListing,
    ListOwnListings,
    ListAvailableListings,
    ViewListing,
    EditListing,
    ChangeListingStatus,
    DeleteListing,
    NearbyListings,
    AcceptListing,
    ListOwnTasks,
    AdvanceTask,
    AssignRecipient,
}

const ANY_ROLE: &[Role] = &[Role::Provider, Role::Volunteer, Role::Recipient];

impl Operation {
    pub fn permitted_roles(self) -> &'static [Role] {
        match self {
            Operation::ViewProfile
            | Operation::UpdateLocation
            | Operation::ListAvailableListings
            | Operation::ViewListing => ANY_ROLE,

            Operation::CreateListing
            | Operation::ListOwnListings
            | Operation::EditListing
            | Operation::ChangeListingStatus
            | Operation::DeleteListing => &[Role::Provider],

            Operation::NearbyListings
            | Operation::AcceptListing
            | Operation::ListOwnTasks
            | Operation::AssignRecipient => &[Role::Volunteer],

            Operation::AdvanceTask => &[Role::Volunteer, Role::Recipient],
        }
    }
}

impl Role {
    pub fn can(self, operation: Operation) -> bool {
        operation.permitted_roles().contains(&self)
    }
}

pub fn authorize(identity: &Identity, operation: Operation) -> Result<(), AppError> {
    if identity.role.can(operation) {
        return Ok(());
    }

    let roles: Vec<String> = operation
        .permitted_roles()
        .iter()
        .map(|role| role.to_string())
        .collect();
    Err(AppError::Authorization(format!(
        "access denied, required roles: {}",
        roles.join(", ")
    )))
}

pub fn require_listing_owner(identity: &Identity, listing: &Listing) -> Result<(), AppError> {
    if listing.provider_id == identity.id {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "not authorized to modify this listing".to_string(),
        ))
    }
}

pub fn require_task_participant(identity: &Identity, task: &Task) -> Result<(), AppError> {
    if task.is_participant(identity.id) {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "not authorized to update this task".to_string(),
        ))
    }
}

pub fn require_task_volunteer(identity: &Identity, task: &Task) -> Result<(), AppError> {
    if task.volunteer_id == identity.id {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "only the assigned volunteer may do this".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{authorize, require_task_participant, Operation};
    use crate::error::AppError;
    use crate::models::task::Task;
    use crate::models::user::{Identity, Role};

    fn identity(role: Role) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            role,
            name: "someone".to_string(),
            email: "someone@example.org".to_string(),
        }
    }

    #[test]
    fn roles_map_to_their_operations() {
        assert!(Role::Provider.can(Operation::CreateListing));
        assert!(!Role::Volunteer.can(Operation::CreateListing));
        assert!(Role::Volunteer.can(Operation::AcceptListing));
        assert!(!Role::Recipient.can(Operation::NearbyListings));
        assert!(Role::Recipient.can(Operation::AdvanceTask));
        assert!(!Role::Provider.can(Operation::AdvanceTask));
    }

    #[test]
    fn authorize_names_required_roles() {
        match authorize(&identity(Role::Recipient), Operation::AcceptListing) {
            Err(AppError::Authorization(msg)) => assert!(msg.contains("volunteer")),
            other => panic!("expected authorization error, got {other:?}"),
        }
    }

    #[test]
    fn only_participants_may_touch_a_task() {
        let volunteer = identity(Role::Volunteer);
        let recipient = identity(Role::Recipient);
        let outsider = identity(Role::Volunteer);
        let task = Task::new(Uuid::new_v4(), volunteer.id, Some(recipient.id), Utc::now());

        assert!(require_task_participant(&volunteer, &task).is_ok());
        assert!(require_task_participant(&recipient, &task).is_ok());
        assert!(matches!(
            require_task_participant(&outsider, &task),
            Err(AppError::Authorization(_))
        ));
    }
}
