use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    blocks::MessageTemplate,
    commands::{
        CommandParseError, CommandRouteError, CommandRouter, SlashCommandPayload,
        TroutCommandService,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    AppMention(AppMentionEvent),
    SlashCommand(SlashCommandPayload),
    BlockAction(BlockActionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Slash commands answer through the envelope ack; everything else is
    /// acked empty before it is handled.
    pub fn answers_in_ack(&self) -> bool {
        matches!(self, Self::SlashCommand(_))
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::AppMention(event) => Some(&event.channel_id),
            Self::SlashCommand(payload) => Some(&payload.channel_id),
            Self::BlockAction(event) => Some(&event.channel_id),
            Self::Unsupported { .. } => None,
        }
    }

    /// Builds an event from a Socket Mode frame's `type` and `payload`.
    pub fn from_socket_payload(frame_type: &str, payload: &Value) -> Self {
        let unsupported = |event_type: &str| Self::Unsupported { event_type: event_type.to_owned() };

        match frame_type {
            "events_api" => match EventsApiPayload::deserialize(payload) {
                Ok(EventsApiPayload { event: InnerEvent::AppMention { user, text, channel } }) => {
                    Self::AppMention(AppMentionEvent { channel_id: channel, user_id: user, text })
                }
                Ok(EventsApiPayload { event: InnerEvent::Other }) | Err(_) => {
                    let inner = payload
                        .pointer("/event/type")
                        .and_then(Value::as_str)
                        .unwrap_or("events_api");
                    unsupported(inner)
                }
            },
            "slash_commands" => match SlashCommandWire::deserialize(payload) {
                Ok(wire) => Self::SlashCommand(SlashCommandPayload {
                    command: wire.command,
                    text: wire.text,
                    channel_id: wire.channel_id,
                    user_id: wire.user_id,
                    trigger_id: wire.trigger_id,
                    response_url: wire.response_url,
                }),
                Err(_) => unsupported("slash_commands"),
            },
            "interactive" => match InteractionWire::deserialize(payload) {
                Ok(wire) if wire.kind == "block_actions" => match wire.actions.into_iter().next() {
                    Some(action) => Self::BlockAction(BlockActionEvent {
                        channel_id: wire.channel.map(|channel| channel.id).unwrap_or_default(),
                        user_id: wire.user.id,
                        block_id: action.block_id,
                        action_id: action.action_id,
                        value: action.value,
                        response_url: wire.response_url,
                    }),
                    None => unsupported("block_actions"),
                },
                Ok(wire) => unsupported(&wire.kind),
                Err(_) => unsupported("interactive"),
            },
            other => unsupported(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    AppMention,
    SlashCommand,
    BlockAction,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppMentionEvent {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub channel_id: String,
    pub user_id: String,
    pub block_id: String,
    pub action_id: String,
    pub value: Option<String>,
    pub response_url: Option<String>,
}

#[derive(Deserialize)]
struct EventsApiPayload {
    event: InnerEvent,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InnerEvent {
    AppMention {
        user: String,
        text: String,
        channel: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct SlashCommandWire {
    command: String,
    #[serde(default)]
    text: String,
    channel_id: String,
    user_id: String,
    #[serde(default)]
    trigger_id: String,
    response_url: Option<String>,
}

#[derive(Deserialize)]
struct InteractionWire {
    #[serde(rename = "type")]
    kind: String,
    user: IdWire,
    channel: Option<IdWire>,
    response_url: Option<String>,
    #[serde(default)]
    actions: Vec<ActionWire>,
}

#[derive(Deserialize)]
struct IdWire {
    id: String,
}

#[derive(Deserialize)]
struct ActionWire {
    block_id: String,
    action_id: String,
    value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Route(#[from] CommandRouteError),
    #[error("app mention handler failure: {0}")]
    Mention(String),
    #[error("block action handler failure: {0}")]
    BlockAction(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Registers one handler per supported event type, all backed by `service`.
pub fn dispatcher_for<S>(service: S) -> EventDispatcher
where
    S: MentionService + TroutCommandService + BlockActionService + Clone + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(AppMentionHandler::new(service.clone()));
    dispatcher.register(SlashCommandHandler::new(service.clone()));
    dispatcher.register(BlockActionHandler::new(service));
    dispatcher
}

#[async_trait]
pub trait MentionService: Send + Sync {
    async fn handle_mention(
        &self,
        event: &AppMentionEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

pub struct AppMentionHandler<S> {
    service: S,
}

impl<S> AppMentionHandler<S>
where
    S: MentionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for AppMentionHandler<S>
where
    S: MentionService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppMention
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppMention(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.service.handle_mention(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: TroutCommandService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: TroutCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let message = self.router.route(payload).await?;
        Ok(HandlerResult::Responded(message))
    }
}

#[async_trait]
pub trait BlockActionService: Send + Sync {
    async fn handle_block_action(
        &self,
        event: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;
}

pub struct BlockActionHandler<S> {
    service: S,
}

impl<S> BlockActionHandler<S>
where
    S: BlockActionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for BlockActionHandler<S>
where
    S: BlockActionService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let message = self.service.handle_block_action(event, ctx).await?;
        Ok(match message {
            Some(message) => HandlerResult::Responded(message),
            None => HandlerResult::Processed,
        })
    }
}
