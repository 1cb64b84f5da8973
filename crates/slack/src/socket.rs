use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::blocks::error_message;
use crate::events::{
    DispatchError, EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent,
};

const COMMAND_FAILED: &str = "Something went wrong handling that command.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    /// Acks an envelope. Slash commands carry their response as the payload.
    async fn acknowledge(
        &self,
        envelope_id: &str,
        payload: Option<Value>,
    ) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Pumps envelopes until the transport closes cleanly or reconnects are
    /// exhausted. A session that got connected resets the retry budget.
    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0;
        loop {
            let mut established = false;
            let Err(transport_error) = self.connect_and_pump(attempt, &mut established).await
            else {
                return Ok(());
            };
            if established {
                attempt = 0;
            }

            warn!(
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                error = %transport_error,
                "socket mode transport failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "socket mode retries exhausted; continuing process without crash"
                );
                return Ok(());
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn connect_and_pump(
        &self,
        attempt: u32,
        established: &mut bool,
    ) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        *established = true;
        info!(attempt, "socket mode transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let channel_id = envelope.event.channel_id().unwrap_or("unknown").to_owned();

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = %channel_id,
                "received slack envelope"
            );

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            if envelope.event.answers_in_ack() {
                let result = self.dispatcher.dispatch(&envelope, &context).await;
                let payload = match result {
                    Ok(HandlerResult::Responded(message)) => Some(message.to_payload()),
                    Ok(HandlerResult::Processed | HandlerResult::Ignored) => None,
                    Err(error) => {
                        self.log_dispatch_failure(&envelope, &channel_id, &error);
                        let card = error_message(COMMAND_FAILED, &envelope.envelope_id);
                        Some(card.to_payload())
                    }
                };
                self.acknowledge(&envelope, &channel_id, payload).await;
            } else {
                self.acknowledge(&envelope, &channel_id, None).await;
                if let Err(error) = self.dispatcher.dispatch(&envelope, &context).await {
                    self.log_dispatch_failure(&envelope, &channel_id, &error);
                }
            }
        }
    }

    async fn acknowledge(
        &self,
        envelope: &SlackEnvelope,
        channel_id: &str,
        payload: Option<Value>,
    ) {
        let with_payload = payload.is_some();
        if let Err(error) = self.transport.acknowledge(&envelope.envelope_id, payload).await {
            warn!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                channel_id = %channel_id,
                error = %error,
                "failed to acknowledge slack envelope"
            );
        } else {
            debug!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                channel_id = %channel_id,
                with_payload,
                "acknowledged slack envelope"
            );
        }
    }

    fn log_dispatch_failure(
        &self,
        envelope: &SlackEnvelope,
        channel_id: &str,
        error: &DispatchError,
    ) {
        warn!(
            envelope_id = %envelope.envelope_id,
            correlation_id = %envelope.envelope_id,
            channel_id = %channel_id,
            error = %error,
            "event dispatch failed; continuing socket loop"
        );
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a WebSocket opened with `apps.connections.open`.
pub struct SocketModeTransport {
    client: reqwest::Client,
    api_base_url: String,
    app_token: SecretString,
    stream: Mutex<Option<WsStream>>,
}

impl SocketModeTransport {
    pub fn new(api_base_url: impl Into<String>, app_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            app_token,
            stream: Mutex::new(None),
        }
    }

    async fn open_connection_url(&self) -> Result<String, TransportError> {
        let response = self
            .client
            .post(format!("{}/apps.connections.open", self.api_base_url))
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let body: ConnectionsOpen =
            response.json().await.map_err(|error| TransportError::Connect(error.to_string()))?;

        match (body.ok, body.url) {
            (true, Some(url)) => Ok(url),
            _ => Err(TransportError::Connect(
                body.error.unwrap_or_else(|| "apps.connections.open returned no url".to_owned()),
            )),
        }
    }
}

#[derive(Deserialize)]
struct ConnectionsOpen {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct FrameWire {
    #[serde(rename = "type")]
    kind: String,
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
    reason: Option<String>,
}

/// A decoded Socket Mode text frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
    Ignored { kind: String },
}

pub fn parse_frame(text: &str) -> Result<SocketFrame, TransportError> {
    let frame: FrameWire = serde_json::from_str(text)
        .map_err(|error| TransportError::Receive(format!("malformed frame: {error}")))?;

    Ok(match (frame.kind.as_str(), frame.envelope_id) {
        ("hello", _) => SocketFrame::Hello,
        ("disconnect", _) => {
            SocketFrame::Disconnect { reason: frame.reason.unwrap_or_else(|| "unknown".to_owned()) }
        }
        (kind, Some(envelope_id)) => SocketFrame::Envelope(SlackEnvelope {
            envelope_id,
            event: SlackEvent::from_socket_payload(kind, &frame.payload),
        }),
        (kind, None) => SocketFrame::Ignored { kind: kind.to_owned() },
    })
}

#[async_trait]
impl SocketTransport for SocketModeTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.open_connection_url().await?;
        let (stream, _) =
            connect_async(url).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream =
            guard.as_mut().ok_or_else(|| TransportError::Receive("not connected".to_owned()))?;

        // Slack rotates connections, so a closed stream is a reason to reconnect.
        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => return Err(TransportError::Receive("stream ended".to_owned())),
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => {
                    return Err(TransportError::Receive("server closed connection".to_owned()))
                }
                _ => continue,
            };

            match parse_frame(&text)? {
                SocketFrame::Envelope(envelope) => return Ok(Some(envelope)),
                SocketFrame::Disconnect { reason } => {
                    let detail = format!("server requested disconnect: {reason}");
                    return Err(TransportError::Receive(detail));
                }
                SocketFrame::Hello => debug!("socket mode hello received"),
                SocketFrame::Ignored { kind } => debug!(kind = %kind, "ignored socket mode frame"),
            }
        }
    }

    async fn acknowledge(
        &self,
        envelope_id: &str,
        payload: Option<Value>,
    ) -> Result<(), TransportError> {
        let mut ack = json!({ "envelope_id": envelope_id });
        if let Some(payload) = payload {
            ack["payload"] = payload;
        }

        let mut guard = self.stream.lock().await;
        let stream =
            guard.as_mut().ok_or_else(|| TransportError::Acknowledge("not connected".to_owned()))?;
        stream
            .send(Message::Text(ack.to_string()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        stream.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}
