pub mod listing_state;
pub mod listings;
pub mod matcher;
pub mod task_state;
pub mod tasks;

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::listing::Listing;
use crate::models::user::PartyView;
use crate::state::AppState;

pub async fn party_view(state: &AppState, user_id: Uuid) -> Result<Option<PartyView>, AppError> {
    let profile = state.auth(state.users.get(user_id)).await?;
    Ok(profile.map(|profile| profile.party_view()))
}

pub async fn provider_views<'a, I>(
    state: &AppState,
    listings: I,
) -> Result<Vec<Option<PartyView>>, AppError>
where
    I: IntoIterator<Item = &'a Listing>,
{
    let mut seen: HashMap<Uuid, Option<PartyView>> = HashMap::new();
    let mut views = Vec::new();

    for listing in listings {
        let view = match seen.get(&listing.provider_id) {
            Some(view) => view.clone(),
            None => {
                let view = party_view(state, listing.provider_id).await?;
                seen.insert(listing.provider_id, view.clone());
                view
            }
        };
        views.push(view);
    }

    Ok(views)
}
