use async_trait::async_trait;
use thiserror::Error;
use trout_core::ShoutOutId;

use crate::blocks::MessageTemplate;

pub const TROUT_COMMAND: &str = "/trout";
pub const SHOUT_TROUT_COMMAND: &str = "/shout-trout";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
    pub response_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TroutCommand {
    /// `/trout <text>`: store a shout-out for the single mentioned user.
    ShoutOut { text: String },
    /// `/shout-trout`: ask for the release password.
    Release,
}

/// What a block action's `block_id` points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionTarget {
    Settings { shout_out_id: ShoutOutId },
    Password { attempt: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error("unrecognised block id `{0}`")]
    UnknownBlock(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

pub fn parse_command(payload: &SlashCommandPayload) -> Result<TroutCommand, CommandParseError> {
    match payload.command.trim() {
        TROUT_COMMAND => Ok(TroutCommand::ShoutOut { text: payload.text.trim().to_owned() }),
        SHOUT_TROUT_COMMAND => Ok(TroutCommand::Release),
        other => Err(CommandParseError::UnsupportedCommand(other.to_owned())),
    }
}

/// Parses `kudo-<id>` and `shouttrout-<attempt>` block ids.
pub fn parse_block_id(block_id: &str) -> Result<InteractionTarget, CommandParseError> {
    let unknown = || CommandParseError::UnknownBlock(block_id.to_owned());
    let (kind, suffix) = block_id.split_once('-').ok_or_else(unknown)?;

    match kind {
        "kudo" => suffix
            .parse::<i64>()
            .map(|id| InteractionTarget::Settings { shout_out_id: ShoutOutId(id) })
            .map_err(|_| unknown()),
        "shouttrout" => suffix
            .parse::<u32>()
            .map(|attempt| InteractionTarget::Password { attempt })
            .map_err(|_| unknown()),
        _ => Err(unknown()),
    }
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: TroutCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        payload: &SlashCommandPayload,
    ) -> Result<MessageTemplate, CommandRouteError> {
        match parse_command(payload) {
            Ok(TroutCommand::ShoutOut { text }) => self.service.shout_out(&text, payload).await,
            Ok(TroutCommand::Release) => self.service.release_prompt(payload).await,
            Err(error) => Err(CommandRouteError::Service(error.to_string())),
        }
    }
}

#[async_trait]
pub trait TroutCommandService: Send + Sync {
    async fn shout_out(
        &self,
        text: &str,
        payload: &SlashCommandPayload,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn release_prompt(
        &self,
        payload: &SlashCommandPayload,
    ) -> Result<MessageTemplate, CommandRouteError>;
}
