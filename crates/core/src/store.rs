//! Persistence contracts consumed by intake and the release pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::shout_out::{ShoutOut, ShoutOutDraft, ShoutOutId, Visibility};
use crate::domain::user::{User, UserId, UserProfile};
use crate::errors::StoreError;

#[async_trait]
pub trait ShoutOutStore: Send + Sync {
    async fn create(&self, draft: ShoutOutDraft) -> Result<ShoutOutId, StoreError>;
    async fn get_by_id(&self, id: ShoutOutId) -> Result<Option<ShoutOut>, StoreError>;
    async fn save(&self, shout_out: &ShoutOut) -> Result<(), StoreError>;
    /// Stamps the release time and nothing else, so settings changed after the
    /// record was read survive. An existing stamp is kept.
    async fn mark_released(
        &self,
        id: ShoutOutId,
        released_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Unreleased records of one visibility, ordered by recipient id ascending.
    async fn find_unreleased(&self, visibility: Visibility) -> Result<Vec<ShoutOut>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user_by_external_id(&self, user_id: &UserId) -> Result<Option<User>, StoreError>;
    async fn create_user(&self, profile: &UserProfile) -> Result<User, StoreError>;
}
