use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use trout_core::domain::shout_out::{ShoutOut, ShoutOutDraft, ShoutOutId, Visibility};
use trout_core::domain::user::{User, UserId, UserProfile};
use trout_core::errors::StoreError;
use trout_core::store::{ShoutOutStore, UserStore};

#[derive(Default)]
pub struct InMemoryShoutOutRepository {
    state: RwLock<ShoutOutTable>,
}

#[derive(Default)]
struct ShoutOutTable {
    rows: HashMap<i64, ShoutOut>,
    last_id: i64,
}

#[async_trait::async_trait]
impl ShoutOutStore for InMemoryShoutOutRepository {
    async fn create(&self, draft: ShoutOutDraft) -> Result<ShoutOutId, StoreError> {
        if draft.from_user == draft.to_user {
            return Err(StoreError::Backend("sender and recipient must differ".to_string()));
        }
        let mut state = self.state.write().await;
        state.last_id += 1;
        let id = ShoutOutId(state.last_id);
        state.rows.insert(id.0, ShoutOut::from_draft(id, draft, Utc::now()));
        Ok(id)
    }

    async fn get_by_id(&self, id: ShoutOutId) -> Result<Option<ShoutOut>, StoreError> {
        let state = self.state.read().await;
        Ok(state.rows.get(&id.0).cloned())
    }

    async fn save(&self, shout_out: &ShoutOut) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let mut next = shout_out.clone();
        if let Some(existing) = state.rows.get(&shout_out.id.0) {
            if existing.released_at.is_some() {
                next.released_at = existing.released_at;
            }
        }
        state.last_id = state.last_id.max(shout_out.id.0);
        state.rows.insert(shout_out.id.0, next);
        Ok(())
    }

    async fn mark_released(
        &self,
        id: ShoutOutId,
        released_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let row = state
            .rows
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("shout-out {id}")))?;
        if row.released_at.is_none() {
            row.released_at = Some(released_at);
            row.updated_at = released_at;
        }
        Ok(())
    }

    async fn find_unreleased(&self, visibility: Visibility) -> Result<Vec<ShoutOut>, StoreError> {
        let state = self.state.read().await;
        let mut pending = state
            .rows
            .values()
            .filter(|row| !row.is_released() && row.visibility() == visibility)
            .cloned()
            .collect::<Vec<_>>();
        pending.sort_by(|a, b| a.to_user.cmp(&b.to_user).then(a.id.cmp(&b.id)));
        Ok(pending)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserRepository {
    async fn get_user_by_external_id(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(user_id).cloned())
    }

    async fn create_user(&self, profile: &UserProfile) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let user = users
            .entry(profile.user_id.clone())
            .or_insert_with(|| User::from_profile(profile, Utc::now()));
        Ok(user.clone())
    }
}
