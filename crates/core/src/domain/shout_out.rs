use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::parser::{extract_recipient, format_mention, normalize_whitespace};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShoutOutId(pub i64);

impl std::fmt::Display for ShoutOutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn from_is_public(is_public: bool) -> Self {
        if is_public {
            Self::Public
        } else {
            Self::Private
        }
    }

    pub fn is_public(self) -> bool {
        matches!(self, Self::Public)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(DomainError::UnknownVisibility(other.to_owned())),
        }
    }
}

/// A shout-out that has been parsed but not yet persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShoutOutDraft {
    pub from_user: UserId,
    pub to_user: UserId,
    pub message: String,
    pub is_public: bool,
    pub is_anonymous: bool,
}

impl ShoutOutDraft {
    /// Builds a draft from an app-mention event, dropping the bot's own
    /// mention before the recipient is parsed.
    pub fn from_mention_text(
        text: &str,
        sender: &UserId,
        bot_user: &UserId,
    ) -> Result<Self, DomainError> {
        let without_bot = text.replace(&format_mention(bot_user), "");
        Self::from_text(&without_bot, sender)
    }

    pub fn from_text(text: &str, sender: &UserId) -> Result<Self, DomainError> {
        let message = normalize_whitespace(text);
        let to_user = extract_recipient(&message)?;
        if &to_user == sender {
            return Err(DomainError::SelfTargetRejected);
        }

        Ok(Self {
            from_user: sender.clone(),
            to_user,
            message,
            is_public: true,
            is_anonymous: false,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoutOut {
    pub id: ShoutOutId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub message: String,
    pub is_public: bool,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl ShoutOut {
    pub fn from_draft(id: ShoutOutId, draft: ShoutOutDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            from_user: draft.from_user,
            to_user: draft.to_user,
            message: draft.message,
            is_public: draft.is_public,
            is_anonymous: draft.is_anonymous,
            created_at: now,
            updated_at: now,
            released_at: None,
        }
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::from_is_public(self.is_public)
    }

    pub fn is_released(&self) -> bool {
        self.released_at.is_some()
    }

    /// `released_at` moves from unset to set exactly once.
    pub fn mark_released(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.is_released() {
            return Err(DomainError::AlreadyReleased { id: self.id });
        }

        self.released_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn apply_setting(
        &mut self,
        setting: ShoutOutSetting,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.is_released() {
            return Err(DomainError::AlreadyReleased { id: self.id });
        }

        match setting {
            ShoutOutSetting::Private => self.is_public = false,
            ShoutOutSetting::Public => self.is_public = true,
            ShoutOutSetting::Anonymous => self.is_anonymous = true,
            ShoutOutSetting::Named => self.is_anonymous = false,
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Toggles offered on the settings card after a `/trout` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShoutOutSetting {
    Private,
    Public,
    Anonymous,
    Named,
}

impl ShoutOutSetting {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::Anonymous => "anonymous",
            Self::Named => "named",
        }
    }
}

impl std::str::FromStr for ShoutOutSetting {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            "anonymous" => Ok(Self::Anonymous),
            "named" => Ok(Self::Named),
            other => Err(DomainError::UnknownSetting(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{ShoutOut, ShoutOutDraft, ShoutOutId, ShoutOutSetting, Visibility};
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn user(id: &str) -> UserId {
        UserId(id.to_owned())
    }

    fn stored(draft: ShoutOutDraft) -> ShoutOut {
        ShoutOut::from_draft(ShoutOutId(1), draft, Utc::now())
    }

    #[test]
    fn text_constructor_normalizes_and_applies_defaults() {
        let draft =
            ShoutOutDraft::from_text("  <@U2> crushed   the demo ", &user("U1")).expect("draft");

        assert_eq!(draft.from_user, user("U1"));
        assert_eq!(draft.to_user, user("U2"));
        assert_eq!(draft.message, "<@U2> crushedthe demo");
        assert!(draft.is_public);
        assert!(!draft.is_anonymous);
    }

    #[test]
    fn text_constructor_requires_a_recipient() {
        let error = ShoutOutDraft::from_text("nobody in particular", &user("U1"))
            .expect_err("no mention should fail");
        assert_eq!(error, DomainError::NoRecipientFound);
    }

    #[test]
    fn self_shout_outs_fail_before_persistence() {
        let error = ShoutOutDraft::from_text("<@U1> I am great", &user("U1"))
            .expect_err("self target should fail");
        assert_eq!(error, DomainError::SelfTargetRejected);
    }

    #[test]
    fn mention_constructor_strips_bot_mention_first() {
        let draft = ShoutOutDraft::from_mention_text(
            "<@BOT> <@U2|sam> thanks for the help",
            &user("U1"),
            &user("BOT"),
        )
        .expect("draft");

        assert_eq!(draft.to_user, user("U2"));
        assert_eq!(draft.message, "<@U2|sam> thanks for the help");
    }

    #[test]
    fn mention_constructor_with_only_bot_mention_has_no_recipient() {
        let error = ShoutOutDraft::from_mention_text("<@BOT> hello", &user("U1"), &user("BOT"))
            .expect_err("bot-only mention should fail");
        assert_eq!(error, DomainError::NoRecipientFound);
    }

    #[test]
    fn release_is_recorded_at_most_once() {
        let mut shout_out =
            stored(ShoutOutDraft::from_text("<@U2> nice", &user("U1")).expect("draft"));
        let first = Utc::now();

        shout_out.mark_released(first).expect("first release");
        let error = shout_out
            .mark_released(first + Duration::seconds(5))
            .expect_err("second release must fail");

        assert_eq!(error, DomainError::AlreadyReleased { id: ShoutOutId(1) });
        assert_eq!(shout_out.released_at, Some(first));
    }

    #[test]
    fn settings_toggle_visibility_and_anonymity() {
        let mut shout_out =
            stored(ShoutOutDraft::from_text("<@U2> nice", &user("U1")).expect("draft"));
        let now = Utc::now();

        shout_out.apply_setting(ShoutOutSetting::Private, now).expect("private");
        shout_out.apply_setting(ShoutOutSetting::Anonymous, now).expect("anonymous");
        assert_eq!(shout_out.visibility(), Visibility::Private);
        assert!(shout_out.is_anonymous);

        shout_out.apply_setting(ShoutOutSetting::Public, now).expect("public");
        shout_out.apply_setting(ShoutOutSetting::Named, now).expect("named");
        assert_eq!(shout_out.visibility(), Visibility::Public);
        assert!(!shout_out.is_anonymous);
    }

    #[test]
    fn released_shout_outs_reject_setting_changes() {
        let mut shout_out =
            stored(ShoutOutDraft::from_text("<@U2> nice", &user("U1")).expect("draft"));
        shout_out.mark_released(Utc::now()).expect("release");

        let error = shout_out
            .apply_setting(ShoutOutSetting::Private, Utc::now())
            .expect_err("released record is frozen");
        assert!(matches!(error, DomainError::AlreadyReleased { .. }));
        assert!(shout_out.is_public);
    }

    #[test]
    fn setting_values_parse_from_button_payloads() {
        assert_eq!("named".parse::<ShoutOutSetting>(), Ok(ShoutOutSetting::Named));
        assert_eq!(
            "loud".parse::<ShoutOutSetting>(),
            Err(DomainError::UnknownSetting("loud".to_owned()))
        );
        assert_eq!(" Private ".parse::<Visibility>(), Ok(Visibility::Private));
    }

    #[test]
    fn unknown_visibility_is_not_reported_as_a_setting() {
        assert_eq!(
            "everyone".parse::<Visibility>(),
            Err(DomainError::UnknownVisibility("everyone".to_owned()))
        );
        assert_eq!(
            "anonymous".parse::<Visibility>(),
            Err(DomainError::UnknownVisibility("anonymous".to_owned()))
        );
    }
}
