//! Outbound collaborators: message delivery and profile lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::user::{UserId, UserProfile};
use crate::errors::DeliveryError;

/// Identifier of a posted message that replies can be threaded under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadAnchor(pub String);

#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    async fn post_to_channel(
        &self,
        channel_id: &str,
        text: &str,
        thread: Option<&ThreadAnchor>,
    ) -> Result<ThreadAnchor, DeliveryError>;

    async fn post_direct(&self, user_id: &UserId, text: &str) -> Result<(), DeliveryError>;

    async fn post_ephemeral_notice(
        &self,
        channel_id: &str,
        user_id: &UserId,
        text: &str,
    ) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn fetch_profile(&self, user_id: &UserId) -> Result<UserProfile, DeliveryError>;
}
