//! Minimal Slack Web API client.
//!
//! Implements the outbound collaborators the core needs (`DeliveryGateway`,
//! `IdentityProvider`) plus interaction responses and `auth.test`.

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use trout_core::{
    DeliveryError, DeliveryGateway, IdentityProvider, ThreadAnchor, UserId, UserProfile,
};

use crate::blocks::MessageTemplate;

const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Replaces the message an interaction came from.
#[async_trait]
pub trait InteractionResponder: Send + Sync {
    async fn respond(
        &self,
        response_url: &str,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError>;
}

#[derive(Clone)]
pub struct SlackWebApi {
    client: Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebApi {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString) -> Self {
        Self::with_client(Client::new(), base_url, bot_token)
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        bot_token: SecretString,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url, bot_token }
    }

    /// Resolves the bot's own user id. App mentions carry it as the first token.
    pub async fn auth_test(&self) -> Result<UserId, DeliveryError> {
        let body: AuthTestResponse = decode(self.call_json("auth.test", json!({})).await?)?;
        Ok(UserId(body.user_id))
    }

    async fn call_json(&self, method: &str, body: Value) -> Result<Value, DeliveryError> {
        let request = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body);
        self.send(method, request).await
    }

    async fn call_form(&self, method: &str, form: &[(&str, &str)]) -> Result<Value, DeliveryError> {
        let request = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .form(form);
        self.send(method, request).await
    }

    async fn send(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, DeliveryError> {
        let response = request.send().await.map_err(|error| {
            warn!(method, error = %error, "slack web api request failed");
            DeliveryError::Transport(error.to_string())
        })?;

        check_status(&response)?;
        let payload: Value =
            response.json().await.map_err(|error| DeliveryError::Transport(error.to_string()))?;
        check_ok(method, payload)
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(DeliveryError::RateLimited { retry_after_secs });
    }
    if !status.is_success() {
        return Err(DeliveryError::Transport(format!("unexpected http status {status}")));
    }
    Ok(())
}

fn check_ok(method: &str, payload: Value) -> Result<Value, DeliveryError> {
    if payload.get("ok").and_then(Value::as_bool) == Some(true) {
        debug!(method, "slack web api call succeeded");
        return Ok(payload);
    }

    let error = payload.get("error").and_then(Value::as_str).unwrap_or("unknown_error").to_owned();
    warn!(method, error = %error, "slack web api call rejected");
    Err(DeliveryError::Api(error))
}

fn decode<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T, DeliveryError> {
    serde_json::from_value(payload).map_err(|error| DeliveryError::Api(error.to_string()))
}

#[derive(Deserialize)]
struct AuthTestResponse {
    user_id: String,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ts: String,
}

#[derive(Deserialize)]
struct UsersInfoResponse {
    user: UserWire,
}

#[derive(Deserialize)]
struct UserWire {
    id: String,
    #[serde(default)]
    team_id: String,
    #[serde(default)]
    real_name: String,
    #[serde(default)]
    profile: ProfileWire,
}

#[derive(Default, Deserialize)]
struct ProfileWire {
    #[serde(default)]
    real_name: String,
    #[serde(default)]
    real_name_normalized: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    display_name_normalized: String,
}

impl From<UserWire> for UserProfile {
    fn from(user: UserWire) -> Self {
        let real_name =
            if user.profile.real_name.is_empty() { user.real_name } else { user.profile.real_name };
        Self {
            user_id: UserId(user.id),
            team_id: user.team_id,
            real_name,
            real_name_normalized: user.profile.real_name_normalized,
            display_name: user.profile.display_name,
            display_name_normalized: user.profile.display_name_normalized,
        }
    }
}

#[async_trait]
impl DeliveryGateway for SlackWebApi {
    async fn post_to_channel(
        &self,
        channel_id: &str,
        text: &str,
        thread: Option<&ThreadAnchor>,
    ) -> Result<ThreadAnchor, DeliveryError> {
        let mut body = json!({ "channel": channel_id, "text": text });
        if let Some(anchor) = thread {
            body["thread_ts"] = json!(anchor.0);
        }
        let posted: PostMessageResponse = decode(self.call_json("chat.postMessage", body).await?)?;
        Ok(ThreadAnchor(posted.ts))
    }

    /// Posting to a user id opens (or reuses) the bot's DM with that user.
    async fn post_direct(&self, user_id: &UserId, text: &str) -> Result<(), DeliveryError> {
        self.call_json("chat.postMessage", json!({ "channel": user_id.0, "text": text })).await?;
        Ok(())
    }

    async fn post_ephemeral_notice(
        &self,
        channel_id: &str,
        user_id: &UserId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.call_json(
            "chat.postEphemeral",
            json!({ "channel": channel_id, "user": user_id.0, "text": text }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for SlackWebApi {
    async fn fetch_profile(&self, user_id: &UserId) -> Result<UserProfile, DeliveryError> {
        let body: UsersInfoResponse =
            decode(self.call_form("users.info", &[("user", user_id.0.as_str())]).await?)?;
        Ok(body.user.into())
    }
}

#[async_trait]
impl InteractionResponder for SlackWebApi {
    async fn respond(
        &self,
        response_url: &str,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        let mut body = message.to_payload();
        body["replace_original"] = json!(true);

        let response = self
            .client
            .post(response_url)
            .json(&body)
            .send()
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;
        check_status(&response)
    }
}
