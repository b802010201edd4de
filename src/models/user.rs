use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Provider,
    Volunteer,
    Recipient,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Provider => write!(f, "provider"),
            Role::Volunteer => write!(f, "volunteer"),
            Role::Recipient => write!(f, "recipient"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub organization_name: Option<String>,
    pub location_address: Option<String>,
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            role: self.role,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    pub fn party_view(&self) -> PartyView {
        PartyView {
            name: self.name.clone(),
            organization_name: self.organization_name.clone(),
            phone: self.phone.clone(),
            location_address: self.location_address.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartyView {
    pub name: String,
    pub organization_name: Option<String>,
    pub phone: Option<String>,
    pub location_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn role_parses_lowercase_names() {
        assert_eq!(
            serde_json::from_str::<Role>("\"volunteer\"").unwrap(),
            Role::Volunteer
        );
        assert!(serde_json::from_str::<Role>("\"admin\"").is_err());
        assert_eq!(Role::Recipient.to_string(), "recipient");
    }
}
