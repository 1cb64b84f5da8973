use crate::domain::shout_out::Visibility;
use crate::errors::DomainError;

pub const MISSING_RECIPIENT: &str =
    "Hmmm, who's this about? Please try again and tag the single user you want to shout out.";
pub const SELF_SHOUT_OUT: &str =
    "Glad to hear you're doing some great work, but I don't do self shout-outs.";
pub const MULTIPLE_RECIPIENTS: &str = "Sorry, shouting out multiple users at once is not supported (yet)? Please try again and tag each user in individual messages.";
pub const RECEIVED: &str = "Got it! You're awesome, thanks!";
pub const COMMAND_RECEIVED: &str = "Thanks, got it!";
pub const RELEASE_BUSY: &str = "A release is already running. Give it a minute.";
pub const ALREADY_RELEASED: &str = "That shout out is already out in the wild, so it can't be changed.";

pub fn release_count(visibility: Visibility, count: usize) -> String {
    format!("Releasing {count} {} shout outs!", visibility.as_str())
}

pub fn setting_applied(setting: &str) -> String {
    format!("Successfully set shout out to be {setting}!")
}

/// Corrective prompt for errors the sender can fix; `None` for everything else.
pub fn for_domain_error(error: &DomainError) -> Option<&'static str> {
    match error {
        DomainError::NoRecipientFound => Some(MISSING_RECIPIENT),
        DomainError::SelfTargetRejected => Some(SELF_SHOUT_OUT),
        DomainError::AmbiguousRecipients { .. } => Some(MULTIPLE_RECIPIENTS),
        DomainError::AlreadyReleased { .. }
        | DomainError::UnknownSetting(_)
        | DomainError::UnknownVisibility(_) => None,
    }
}
