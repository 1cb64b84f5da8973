//! The bot's behaviour behind the event handlers: intake for mentions and
//! `/trout`, the settings card, and the password-gated release.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use trout_core::config::ReleaseConfig;
use trout_core::{
    notices, DeliveryGateway, DomainError, IntakeError, ReleasePipeline, ReleaseRequest,
    ShoutOutId, ShoutOutIntake, ShoutOutSetting, UserId, Visibility,
};

use crate::blocks::{
    access_granted, password_prompt, plain_message, settings_card, MessageTemplate,
    RELEASE_PROMPT, RELEASE_RETRY_PROMPT,
};
use crate::commands::{
    parse_block_id, CommandRouteError, InteractionTarget, SlashCommandPayload,
    TroutCommandService,
};
use crate::events::{
    AppMentionEvent, BlockActionEvent, BlockActionService, EventContext, EventHandlerError,
    MentionService,
};
use crate::web_api::InteractionResponder;

/// A release is already in flight.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("a release is already running")]
pub struct ReleaseBusy;

#[derive(Clone)]
pub struct TroutService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    intake: ShoutOutIntake,
    pipeline: Arc<ReleasePipeline>,
    gateway: Arc<dyn DeliveryGateway>,
    responder: Arc<dyn InteractionResponder>,
    bot_user: UserId,
    release_password: SecretString,
    max_password_attempts: u32,
    release_guard: Arc<Mutex<()>>,
}

impl TroutService {
    pub fn new(
        intake: ShoutOutIntake,
        pipeline: ReleasePipeline,
        gateway: Arc<dyn DeliveryGateway>,
        responder: Arc<dyn InteractionResponder>,
        bot_user: UserId,
        release: &ReleaseConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                intake,
                pipeline: Arc::new(pipeline),
                gateway,
                responder,
                bot_user,
                release_password: release.password.clone(),
                max_password_attempts: release.max_password_attempts,
                release_guard: Arc::new(Mutex::new(())),
            }),
        }
    }

    /// Starts a public then private release in the background. Only one
    /// release runs at a time.
    pub fn start_release(&self, request: ReleaseRequest) -> Result<JoinHandle<()>, ReleaseBusy> {
        let permit = self.inner.release_guard.clone().try_lock_owned().map_err(|_| ReleaseBusy)?;
        let pipeline = self.inner.pipeline.clone();

        info!(
            event_name = "release.trigger.accepted",
            channel_id = %request.channel_id,
            operator = %request.operator,
            "release triggered"
        );

        Ok(tokio::spawn(async move {
            for visibility in [Visibility::Public, Visibility::Private] {
                if let Err(run_error) = pipeline.run(visibility, &request).await {
                    error!(
                        event_name = "release.trigger.aborted",
                        visibility = visibility.as_str(),
                        channel_id = %request.channel_id,
                        error = %run_error,
                        "release run aborted; later visibilities skipped"
                    );
                    break;
                }
            }
            drop(permit);
        }))
    }

    /// Resolves once no release is running.
    pub async fn release_idle(&self) {
        let _idle = self.inner.release_guard.lock().await;
    }

    async fn notify(&self, channel_id: &str, user: &UserId, text: &str) {
        if let Err(delivery_error) =
            self.inner.gateway.post_ephemeral_notice(channel_id, user, text).await
        {
            warn!(
                event_name = "slack.notice.delivery_failed",
                channel_id = %channel_id,
                user_id = %user,
                error = %delivery_error,
                "could not deliver ephemeral notice"
            );
        }
    }

    async fn respond(&self, event: &BlockActionEvent, message: &MessageTemplate) {
        let Some(response_url) = event.response_url.as_deref() else {
            warn!(block_id = %event.block_id, "block action carried no response url");
            return;
        };
        if let Err(delivery_error) = self.inner.responder.respond(response_url, message).await {
            warn!(
                event_name = "slack.interaction.respond_failed",
                block_id = %event.block_id,
                error = %delivery_error,
                "could not update interactive message"
            );
        }
    }

    async fn change_setting(
        &self,
        event: &BlockActionEvent,
        id: ShoutOutId,
    ) -> Result<(), EventHandlerError> {
        let setting = event
            .value
            .as_deref()
            .unwrap_or_default()
            .parse::<ShoutOutSetting>()
            .map_err(|error| EventHandlerError::BlockAction(error.to_string()))?;

        match self.inner.intake.apply_setting(id, setting).await {
            Ok(shout_out) => {
                let status = notices::setting_applied(setting.as_str());
                self.respond(event, &settings_card(&shout_out, &status)).await;
                Ok(())
            }
            Err(IntakeError::Domain(DomainError::AlreadyReleased { .. })) => {
                self.respond(event, &plain_message(notices::ALREADY_RELEASED)).await;
                Ok(())
            }
            Err(intake_error) => Err(EventHandlerError::BlockAction(intake_error.to_string())),
        }
    }

    async fn check_password(&self, event: &BlockActionEvent, attempt: u32) {
        let max_attempts = self.inner.max_password_attempts;
        let guess = event.value.as_deref().unwrap_or_default();

        if attempt >= max_attempts || guess != self.inner.release_password.expose_secret() {
            info!(
                event_name = "release.trigger.password_rejected",
                user_id = %event.user_id,
                attempt,
                "release password rejected"
            );
            let next_attempt = attempt.saturating_add(1);
            let retry = password_prompt(next_attempt, max_attempts, RELEASE_RETRY_PROMPT);
            self.respond(event, &retry).await;
            return;
        }

        let request = ReleaseRequest {
            channel_id: event.channel_id.clone(),
            operator: UserId(event.user_id.clone()),
        };
        match self.start_release(request) {
            Ok(_detached) => self.respond(event, &access_granted()).await,
            Err(ReleaseBusy) => self.respond(event, &plain_message(notices::RELEASE_BUSY)).await,
        }
    }
}

#[async_trait]
impl MentionService for TroutService {
    async fn handle_mention(
        &self,
        event: &AppMentionEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        let sender = UserId(event.user_id.clone());
        match self.inner.intake.submit_mention(&event.text, &sender, &self.inner.bot_user).await {
            Ok(shout_out) => {
                info!(
                    event_name = "slack.mention.stored",
                    correlation_id = %ctx.correlation_id,
                    shout_out_id = %shout_out.id,
                    "mention stored as shout-out"
                );
                self.notify(&event.channel_id, &sender, notices::RECEIVED).await;
                Ok(())
            }
            Err(intake_error) => match intake_error.notice() {
                Some(notice) => {
                    info!(
                        event_name = "slack.mention.rejected",
                        correlation_id = %ctx.correlation_id,
                        reason = %intake_error,
                        "mention needs a correction from the sender"
                    );
                    self.notify(&event.channel_id, &sender, notice).await;
                    Ok(())
                }
                None => Err(EventHandlerError::Mention(intake_error.to_string())),
            },
        }
    }
}

#[async_trait]
impl TroutCommandService for TroutService {
    async fn shout_out(
        &self,
        text: &str,
        payload: &SlashCommandPayload,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let sender = UserId(payload.user_id.clone());
        match self.inner.intake.submit_command(text, &sender).await {
            Ok(shout_out) => Ok(settings_card(&shout_out, notices::COMMAND_RECEIVED)),
            Err(intake_error) => match intake_error.notice() {
                Some(notice) => Ok(plain_message(notice)),
                None => Err(CommandRouteError::Service(intake_error.to_string())),
            },
        }
    }

    async fn release_prompt(
        &self,
        _payload: &SlashCommandPayload,
    ) -> Result<MessageTemplate, CommandRouteError> {
        Ok(password_prompt(1, self.inner.max_password_attempts, RELEASE_PROMPT))
    }
}

#[async_trait]
impl BlockActionService for TroutService {
    async fn handle_block_action(
        &self,
        event: &BlockActionEvent,
        _ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        match parse_block_id(&event.block_id)? {
            InteractionTarget::Settings { shout_out_id } => {
                self.change_setting(event, shout_out_id).await?
            }
            InteractionTarget::Password { attempt } => self.check_password(event, attempt).await,
        }
        Ok(None)
    }
}
