//! Turning inbound mentions and `/trout` commands into stored shout-outs.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::domain::shout_out::{ShoutOut, ShoutOutDraft, ShoutOutId, ShoutOutSetting};
use crate::domain::user::{User, UserId};
use crate::errors::{DeliveryError, DomainError, StoreError};
use crate::gateway::IdentityProvider;
use crate::notices;
use crate::parser::{count_mentions, substitute_mention};
use crate::store::{ShoutOutStore, UserStore};

/// An app mention carries the bot's own token plus the recipient's.
pub const MENTION_FLOW_TOKENS: usize = 2;
pub const COMMAND_FLOW_TOKENS: usize = 1;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("identity lookup failed: {0}")]
    Identity(#[source] DeliveryError),
}

impl IntakeError {
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Self::Domain(error) => notices::for_domain_error(error),
            Self::Store(_) | Self::Identity(_) => None,
        }
    }
}

/// Rejects text whose raw mention count differs from `expected`.
pub fn require_mention_count(text: &str, expected: usize) -> Result<(), DomainError> {
    let count = count_mentions(text);
    if count < expected {
        return Err(DomainError::NoRecipientFound);
    }
    if count > expected {
        return Err(DomainError::AmbiguousRecipients { count: count + 1 - expected });
    }
    Ok(())
}

pub struct ShoutOutIntake {
    shout_outs: Arc<dyn ShoutOutStore>,
    users: Arc<dyn UserStore>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
}

impl ShoutOutIntake {
    pub fn new(
        shout_outs: Arc<dyn ShoutOutStore>,
        users: Arc<dyn UserStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self { shout_outs, users, identity, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn submit_mention(
        &self,
        text: &str,
        sender: &UserId,
        bot_user: &UserId,
    ) -> Result<ShoutOut, IntakeError> {
        require_mention_count(text, MENTION_FLOW_TOKENS)?;
        let draft = ShoutOutDraft::from_mention_text(text, sender, bot_user)?;
        self.persist(draft).await
    }

    pub async fn submit_command(&self, text: &str, sender: &UserId) -> Result<ShoutOut, IntakeError> {
        require_mention_count(text, COMMAND_FLOW_TOKENS)?;
        let draft = ShoutOutDraft::from_text(text, sender)?;
        self.persist(draft).await
    }

    pub async fn get_or_fetch_user(&self, user_id: &UserId) -> Result<User, IntakeError> {
        if let Some(user) = self.users.get_user_by_external_id(user_id).await? {
            return Ok(user);
        }

        let profile = self.identity.fetch_profile(user_id).await.map_err(IntakeError::Identity)?;
        let user = self.users.create_user(&profile).await?;
        info!(
            event_name = "intake.user.cached",
            user_id = %user.user_id,
            team_id = %user.team_id,
            "cached new user profile"
        );
        Ok(user)
    }

    pub async fn apply_setting(
        &self,
        id: ShoutOutId,
        setting: ShoutOutSetting,
    ) -> Result<ShoutOut, IntakeError> {
        let mut shout_out = self
            .shout_outs
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("shout-out {id}")))?;

        shout_out.apply_setting(setting, self.clock.now())?;
        self.shout_outs.save(&shout_out).await?;
        info!(
            event_name = "intake.shout_out.setting_applied",
            shout_out_id = %id,
            setting = setting.as_str(),
            "shout-out setting applied"
        );
        Ok(shout_out)
    }

    async fn persist(&self, mut draft: ShoutOutDraft) -> Result<ShoutOut, IntakeError> {
        let recipient = self.get_or_fetch_user(&draft.to_user).await?;
        self.get_or_fetch_user(&draft.from_user).await?;

        draft.message = substitute_mention(&draft.message, &recipient.user_id, &recipient.display_name);
        let id = self.shout_outs.create(draft).await?;
        let shout_out = self
            .shout_outs
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("shout-out {id}")))?;

        info!(
            event_name = "intake.shout_out.stored",
            shout_out_id = %shout_out.id,
            from_user = %shout_out.from_user,
            to_user = %shout_out.to_user,
            "shout-out stored"
        );
        Ok(shout_out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{require_mention_count, IntakeError, ShoutOutIntake};
    use crate::domain::shout_out::{ShoutOutId, ShoutOutSetting, Visibility};
    use crate::domain::user::UserId;
    use crate::errors::{DomainError, StoreError};
    use crate::notices;
    use crate::store::{ShoutOutStore, UserStore};
    use crate::test_support::{MemoryStore, ScriptedIdentity};

    fn user(id: &str) -> UserId {
        UserId(id.to_owned())
    }

    fn intake(store: &Arc<MemoryStore>, identity: &Arc<ScriptedIdentity>) -> ShoutOutIntake {
        ShoutOutIntake::new(store.clone(), store.clone(), identity.clone())
    }

    #[test]
    fn mention_count_policy() {
        assert_eq!(require_mention_count("<@U2> hi", 1), Ok(()));
        assert_eq!(require_mention_count("hi", 1), Err(DomainError::NoRecipientFound));
        assert_eq!(
            require_mention_count("<@U2> <@U3> hi", 1),
            Err(DomainError::AmbiguousRecipients { count: 2 })
        );
        assert_eq!(require_mention_count("<@BOT> <@U2> hi", 2), Ok(()));
        assert_eq!(require_mention_count("<@BOT> hi", 2), Err(DomainError::NoRecipientFound));
        assert_eq!(
            require_mention_count("<@BOT> <@U2> <@U3>", 2),
            Err(DomainError::AmbiguousRecipients { count: 2 })
        );
    }

    #[tokio::test]
    async fn command_flow_caches_users_and_humanizes_message() {
        let store = Arc::new(MemoryStore::default());
        let identity = Arc::new(ScriptedIdentity::with_users(&[("U1", "ann"), ("U2", "bo")]));

        let shout_out = intake(&store, &identity)
            .submit_command("<@U2|bobby>   nailed it", &user("U1"))
            .await
            .expect("stored");

        assert_eq!(shout_out.message, "bonailed it");
        assert_eq!(shout_out.to_user, user("U2"));
        assert_eq!(shout_out.visibility(), Visibility::Public);
        assert!(!shout_out.is_anonymous);
        assert!(store.get_user_by_external_id(&user("U1")).await.expect("lookup").is_some());
        assert!(store.get_user_by_external_id(&user("U2")).await.expect("lookup").is_some());
        assert_eq!(identity.fetches(), 2);
    }

    #[tokio::test]
    async fn cached_users_are_not_fetched_again() {
        let store = Arc::new(MemoryStore::default());
        let identity = Arc::new(ScriptedIdentity::with_users(&[("U1", "ann"), ("U2", "bo")]));
        let intake = intake(&store, &identity);

        intake.submit_command("<@U2> one", &user("U1")).await.expect("first");
        intake.submit_command("<@U2> two", &user("U1")).await.expect("second");

        assert_eq!(identity.fetches(), 2);
    }

    #[tokio::test]
    async fn mention_flow_strips_bot_token() {
        let store = Arc::new(MemoryStore::default());
        let identity = Arc::new(ScriptedIdentity::with_users(&[("U1", "ann"), ("U2", "bo")]));

        let shout_out = intake(&store, &identity)
            .submit_mention("<@BOT> <@U2> thanks!", &user("U1"), &user("BOT"))
            .await
            .expect("stored");

        assert_eq!(shout_out.message, "bo thanks!");
    }

    #[tokio::test]
    async fn self_target_never_reaches_the_store() {
        let store = Arc::new(MemoryStore::default());
        let identity = Arc::new(ScriptedIdentity::with_users(&[("U1", "ann")]));

        let error = intake(&store, &identity)
            .submit_command("<@U1> me me me", &user("U1"))
            .await
            .expect_err("self target");

        assert_eq!(error.notice(), Some(notices::SELF_SHOUT_OUT));
        assert_eq!(store.shout_out_count(), 0);
        assert_eq!(identity.fetches(), 0);
    }

    #[tokio::test]
    async fn ambiguous_and_missing_recipients_produce_prompts() {
        let store = Arc::new(MemoryStore::default());
        let identity = Arc::new(ScriptedIdentity::default());
        let intake = intake(&store, &identity);

        let missing = intake.submit_command("thanks team", &user("U1")).await.expect_err("missing");
        assert_eq!(missing.notice(), Some(notices::MISSING_RECIPIENT));

        let ambiguous =
            intake.submit_command("<@U2> <@U3> thanks", &user("U1")).await.expect_err("ambiguous");
        assert_eq!(ambiguous.notice(), Some(notices::MULTIPLE_RECIPIENTS));
        assert_eq!(store.shout_out_count(), 0);
    }

    #[tokio::test]
    async fn identity_failure_is_not_a_user_prompt() {
        let store = Arc::new(MemoryStore::default());
        let identity = Arc::new(ScriptedIdentity::default());

        let error = intake(&store, &identity)
            .submit_command("<@U2> thanks", &user("U1"))
            .await
            .expect_err("unknown profile");

        assert!(matches!(error, IntakeError::Identity(_)));
        assert_eq!(error.notice(), None);
    }

    #[tokio::test]
    async fn settings_are_persisted() {
        let store = Arc::new(MemoryStore::default());
        let identity = Arc::new(ScriptedIdentity::with_users(&[("U1", "ann"), ("U2", "bo")]));
        let intake = intake(&store, &identity);
        let stored = intake.submit_command("<@U2> thanks", &user("U1")).await.expect("stored");

        intake.apply_setting(stored.id, ShoutOutSetting::Private).await.expect("private");
        intake.apply_setting(stored.id, ShoutOutSetting::Anonymous).await.expect("anonymous");

        let reloaded = store.get_by_id(stored.id).await.expect("load").expect("present");
        assert_eq!(reloaded.visibility(), Visibility::Private);
        assert!(reloaded.is_anonymous);
    }

    #[tokio::test]
    async fn settings_for_unknown_record_report_not_found() {
        let store = Arc::new(MemoryStore::default());
        let identity = Arc::new(ScriptedIdentity::default());

        let error = intake(&store, &identity)
            .apply_setting(ShoutOutId(404), ShoutOutSetting::Named)
            .await
            .expect_err("missing");

        assert!(matches!(error, IntakeError::Store(StoreError::NotFound(_))));
    }
}
