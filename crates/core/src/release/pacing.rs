//! Pacing gates for outbound release traffic.
//!
//! A gate hands out one slot per interval. Callers that need several gates
//! wait on each in turn, so the scarcest one dominates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::config::ReleaseConfig;

#[async_trait]
pub trait PacingGate: Send + Sync {
    async fn wait(&self);
}

/// Leaky-bucket gate with a bucket depth of one. The first pass is immediate.
#[derive(Debug)]
pub struct IntervalGate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl IntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self { interval, next_slot: Mutex::new(None) }
    }
}

#[async_trait]
impl PacingGate for IntervalGate {
    async fn wait(&self) {
        let mut next_slot = self.next_slot.lock().await;
        if let Some(slot) = *next_slot {
            if slot > Instant::now() {
                sleep_until(slot).await;
            }
        }
        *next_slot = Some(Instant::now() + self.interval);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacingPolicy {
    pub thread_open: Duration,
    pub post: Duration,
    pub direct_message: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            thread_open: Duration::from_millis(1000),
            post: Duration::from_millis(350),
            direct_message: Duration::from_millis(1000),
        }
    }
}

impl From<&ReleaseConfig> for PacingPolicy {
    fn from(config: &ReleaseConfig) -> Self {
        Self {
            thread_open: Duration::from_millis(config.thread_open_interval_ms),
            post: Duration::from_millis(config.post_interval_ms),
            direct_message: Duration::from_millis(config.direct_message_interval_ms),
        }
    }
}

/// The three gates a release run draws from. Shared across runs so the
/// platform rate ceiling holds between back-to-back releases too.
#[derive(Clone)]
pub struct ReleasePacing {
    pub thread_open: Arc<dyn PacingGate>,
    pub post: Arc<dyn PacingGate>,
    pub direct_message: Arc<dyn PacingGate>,
}

impl ReleasePacing {
    pub fn from_policy(policy: PacingPolicy) -> Self {
        Self {
            thread_open: Arc::new(IntervalGate::new(policy.thread_open)),
            post: Arc::new(IntervalGate::new(policy.post)),
            direct_message: Arc::new(IntervalGate::new(policy.direct_message)),
        }
    }

    /// Opening a thread needs both a thread slot and a post slot.
    pub async fn before_thread_open(&self) {
        self.thread_open.wait().await;
        self.post.wait().await;
    }

    pub async fn before_reply(&self) {
        self.post.wait().await;
    }

    pub async fn before_direct_message(&self) {
        self.direct_message.wait().await;
    }
}

impl Default for ReleasePacing {
    fn default() -> Self {
        Self::from_policy(PacingPolicy::default())
    }
}
