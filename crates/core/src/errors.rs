use thiserror::Error;

use crate::domain::shout_out::ShoutOutId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("no recipient mention found in text")]
    NoRecipientFound,
    #[error("sender and recipient are the same user")]
    SelfTargetRejected,
    #[error("expected a single recipient but found {count} mentions")]
    AmbiguousRecipients { count: usize },
    #[error("shout-out {id} has already been released")]
    AlreadyReleased { id: ShoutOutId },
    #[error("unknown shout-out setting `{0}`")]
    UnknownSetting(String),
    #[error("unknown visibility `{0}` (expected public or private)")]
    UnknownVisibility(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("store decode failure: {0}")]
    Decode(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("delivery transport failed: {0}")]
    Transport(String),
    #[error("delivery rejected by platform: {0}")]
    Api(String),
    #[error("delivery rate limited; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::{DeliveryError, DomainError};

    #[test]
    fn visibility_errors_name_the_accepted_values() {
        let error = DomainError::UnknownVisibility("everyone".to_owned());
        assert_eq!(error.to_string(), "unknown visibility `everyone` (expected public or private)");
        assert_ne!(error, DomainError::UnknownSetting("everyone".to_owned()));
    }

    #[test]
    fn delivery_error_messages_carry_platform_detail() {
        let error = DeliveryError::Api("channel_not_found".to_owned());
        assert_eq!(error.to_string(), "delivery rejected by platform: channel_not_found");
    }
}
