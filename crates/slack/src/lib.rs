//! Slack Integration - Socket Mode bot interface
//!
//! This crate connects trout to Slack:
//! - **Socket Mode** (`socket`) - WebSocket connection to Slack (no public URL needed)
//! - **Slash Commands** (`commands`) - `/trout <text>` and `/shout-trout`
//! - **Events** (`events`) - App mentions, slash commands and block actions
//! - **Block Kit** (`blocks`) - Settings cards and the release password prompt
//! - **Web API** (`web_api`) - Outbound posts, user lookups and interaction responses
//! - **Service** (`service`) - Glue between the handlers and the trout core
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `app_mention`
//! 3. Add slash commands: `/trout`, `/shout-trout`
//! 4. Set env vars: `TROUT_SLACK_APP_TOKEN`, `TROUT_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Slack Events → EventDispatcher → Handlers → TroutService → Intake / Release pipeline
//!                    ↓
//!              Block Kit UI ← Response
//! ```
//!
//! # Key Types
//!
//! - `SocketModeRunner` - WebSocket event loop with reconnection logic
//! - `EventDispatcher` - Routes events to appropriate handlers
//! - `SlackWebApi` - `DeliveryGateway` and `IdentityProvider` over HTTPS
//! - `TroutService` - Implements every handler-facing service trait

pub mod blocks;
pub mod commands;
pub mod events;
pub mod service;
pub mod socket;
pub mod web_api;
