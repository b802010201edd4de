use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::auth::{AuthError, IdentityProvider, NewUser, UserDirectory};
use crate::models::user::{Identity, UserProfile};
use crate::models::GeoPoint;

#[derive(Default)]
pub struct MemoryIdentityProvider {
    tokens: DashMap<String, Uuid>,
    profiles: DashMap<Uuid, UserProfile>,
    emails: DashMap<String, Uuid>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let user_id = *self
            .tokens
            .get(token)
            .ok_or(AuthError::InvalidCredential)?
            .value();

        self.profiles
            .get(&user_id)
            .map(|profile| profile.identity())
            .ok_or(AuthError::UnknownUser)
    }
}

#[async_trait]
impl UserDirectory for MemoryIdentityProvider {
    async fn register(&self, user: NewUser) -> Result<(UserProfile, String), AuthError> {
        let email = user.email.trim().to_lowercase();
        let id = Uuid::new_v4();

        match self.emails.entry(email.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(AuthError::DuplicateEmail(email));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let profile = UserProfile {
            id,
            email,
            name: user.name,
            role: user.role,
            phone: user.phone,
            organization_name: user.organization_name,
            location_address: user.location_address,
            location: user.location,
            created_at: Utc::now(),
        };
        self.profiles.insert(id, profile.clone());

        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), id);

        Ok((profile, token))
    }

    async fn get(&self, id: Uuid) -> Result<Option<UserProfile>, AuthError> {
        Ok(self.profiles.get(&id).map(|entry| entry.value().clone()))
    }

    async fn set_location(
        &self,
        id: Uuid,
        location: GeoPoint,
        address: Option<String>,
    ) -> Result<Option<UserProfile>, AuthError> {
        let Some(mut profile) = self.profiles.get_mut(&id) else {
            return Ok(None);
        };

        profile.location = Some(location);
        if address.is_some() {
            profile.location_address = address;
        }
        Ok(Some(profile.clone()))
    }
}
