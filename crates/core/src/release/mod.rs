//! Release pipeline: drains unreleased shout-outs through the delivery gateway.
//!
//! A run is `Fetching -> (Empty | Delivering) -> Completed`. Each record is
//! marked released and saved right after its own post succeeds, so a run that
//! dies halfway never causes a re-send of what already went out. Records that
//! fail to deliver stay pending for the next run.

pub mod pacing;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::display::DisplayResolver;
use crate::domain::shout_out::{ShoutOut, ShoutOutId, Visibility};
use crate::domain::user::UserId;
use crate::errors::{DeliveryError, StoreError};
use crate::gateway::{DeliveryGateway, ThreadAnchor};
use crate::notices;
use crate::parser::format_mention;
use crate::store::ShoutOutStore;

use self::pacing::ReleasePacing;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("could not fetch unreleased shout-outs: {0}")]
    Fetch(#[source] StoreError),
    #[error("could not report the release count: {0}")]
    Notice(#[source] DeliveryError),
}

/// Where a run was triggered from and who should see the count notice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub channel_id: String,
    pub operator: UserId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Empty,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RecordOutcome {
    Released,
    DeliveryFailed(String),
    PersistenceFailed(String),
    /// The recipient's thread anchor could not be posted.
    Abandoned,
    AlreadyReleased,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordReport {
    pub id: ShoutOutId,
    pub to_user: UserId,
    pub outcome: RecordOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    pub run_id: Uuid,
    pub visibility: Visibility,
    pub state: RunState,
    pub fetched: usize,
    pub released_at: Option<DateTime<Utc>>,
    pub records: Vec<RecordReport>,
}

impl ReleaseReport {
    pub fn released(&self) -> usize {
        self.count(|outcome| matches!(outcome, RecordOutcome::Released))
    }

    pub fn pending(&self) -> usize {
        self.count(|outcome| {
            !matches!(outcome, RecordOutcome::Released | RecordOutcome::AlreadyReleased)
        })
    }

    fn count(&self, predicate: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.records.iter().filter(|record| predicate(&record.outcome)).count()
    }
}

pub fn format_post(message: &str, display_from: &str) -> String {
    format!("> {message}\n - {display_from}")
}

pub struct ReleasePipeline {
    store: Arc<dyn ShoutOutStore>,
    display: DisplayResolver,
    gateway: Arc<dyn DeliveryGateway>,
    pacing: ReleasePacing,
    clock: Arc<dyn Clock>,
}

impl ReleasePipeline {
    pub fn new(
        store: Arc<dyn ShoutOutStore>,
        display: DisplayResolver,
        gateway: Arc<dyn DeliveryGateway>,
        pacing: ReleasePacing,
    ) -> Self {
        Self { store, display, gateway, pacing, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run(
        &self,
        visibility: Visibility,
        request: &ReleaseRequest,
    ) -> Result<ReleaseReport, ReleaseError> {
        let run_id = Uuid::new_v4();
        let batch = self.store.find_unreleased(visibility).await.map_err(ReleaseError::Fetch)?;

        self.gateway
            .post_ephemeral_notice(
                &request.channel_id,
                &request.operator,
                &notices::release_count(visibility, batch.len()),
            )
            .await
            .map_err(ReleaseError::Notice)?;

        let mut report = ReleaseReport {
            run_id,
            visibility,
            state: RunState::Empty,
            fetched: batch.len(),
            released_at: None,
            records: Vec::with_capacity(batch.len()),
        };
        if batch.is_empty() {
            info!(
                event_name = "release.run.empty",
                correlation_id = %run_id,
                visibility = visibility.as_str(),
                "nothing to release"
            );
            return Ok(report);
        }

        let released_at = self.clock.now();
        report.released_at = Some(released_at);
        info!(
            event_name = "release.run.started",
            correlation_id = %run_id,
            visibility = visibility.as_str(),
            fetched = batch.len(),
            operator = %request.operator,
            "release run started"
        );

        match visibility {
            Visibility::Public => {
                self.deliver_public(batch, &request.channel_id, released_at, run_id, &mut report)
                    .await
            }
            Visibility::Private => {
                self.deliver_private(batch, released_at, run_id, &mut report).await
            }
        }

        report.state = RunState::Completed;
        info!(
            event_name = "release.run.completed",
            correlation_id = %run_id,
            visibility = visibility.as_str(),
            released = report.released(),
            pending = report.pending(),
            "release run completed"
        );
        Ok(report)
    }

    async fn deliver_public(
        &self,
        batch: Vec<ShoutOut>,
        channel_id: &str,
        released_at: DateTime<Utc>,
        run_id: Uuid,
        report: &mut ReleaseReport,
    ) {
        let mut current_recipient: Option<UserId> = None;
        let mut anchor: Option<ThreadAnchor> = None;

        for mut shout_out in batch {
            if shout_out.is_released() {
                report.records.push(record(&shout_out, RecordOutcome::AlreadyReleased));
                continue;
            }

            if current_recipient.as_ref() != Some(&shout_out.to_user) {
                current_recipient = Some(shout_out.to_user.clone());
                self.pacing.before_thread_open().await;
                anchor = match self
                    .gateway
                    .post_to_channel(channel_id, &format_mention(&shout_out.to_user), None)
                    .await
                {
                    Ok(anchor) => Some(anchor),
                    Err(error) => {
                        warn!(
                            event_name = "release.thread.open_failed",
                            correlation_id = %run_id,
                            to_user = %shout_out.to_user,
                            error = %error,
                            "abandoning recipient group for this run"
                        );
                        None
                    }
                };
            }

            let Some(thread) = anchor.as_ref() else {
                report.records.push(record(&shout_out, RecordOutcome::Abandoned));
                continue;
            };

            self.pacing.before_reply().await;
            let display_from = self.display.display_from(&shout_out, true).await;
            let body = format_post(&shout_out.message, &display_from);
            let outcome = match self.gateway.post_to_channel(channel_id, &body, Some(thread)).await {
                Ok(_) => self.confirm(&mut shout_out, released_at, run_id).await,
                Err(error) => delivery_failed(&shout_out, error, run_id),
            };
            report.records.push(record(&shout_out, outcome));
        }
    }

    async fn deliver_private(
        &self,
        batch: Vec<ShoutOut>,
        released_at: DateTime<Utc>,
        run_id: Uuid,
        report: &mut ReleaseReport,
    ) {
        for mut shout_out in batch {
            if shout_out.is_released() {
                report.records.push(record(&shout_out, RecordOutcome::AlreadyReleased));
                continue;
            }

            self.pacing.before_direct_message().await;
            let display_from = self.display.display_from(&shout_out, false).await;
            let body = format_post(&shout_out.message, &display_from);
            let outcome = match self.gateway.post_direct(&shout_out.to_user, &body).await {
                Ok(()) => self.confirm(&mut shout_out, released_at, run_id).await,
                Err(error) => delivery_failed(&shout_out, error, run_id),
            };
            report.records.push(record(&shout_out, outcome));
        }
    }

    async fn confirm(
        &self,
        shout_out: &mut ShoutOut,
        released_at: DateTime<Utc>,
        run_id: Uuid,
    ) -> RecordOutcome {
        if shout_out.mark_released(released_at).is_err() {
            return RecordOutcome::AlreadyReleased;
        }

        match self.store.mark_released(shout_out.id, released_at).await {
            Ok(()) => RecordOutcome::Released,
            Err(store_error) => {
                error!(
                    event_name = "release.record.persist_failed",
                    correlation_id = %run_id,
                    shout_out_id = %shout_out.id,
                    error = %store_error,
                    "shout-out was delivered but could not be marked released"
                );
                RecordOutcome::PersistenceFailed(store_error.to_string())
            }
        }
    }
}

fn delivery_failed(shout_out: &ShoutOut, error: DeliveryError, run_id: Uuid) -> RecordOutcome {
    warn!(
        event_name = "release.record.delivery_failed",
        correlation_id = %run_id,
        shout_out_id = %shout_out.id,
        error = %error,
        "shout-out left pending"
    );
    RecordOutcome::DeliveryFailed(error.to_string())
}

fn record(shout_out: &ShoutOut, outcome: RecordOutcome) -> RecordReport {
    RecordReport { id: shout_out.id, to_user: shout_out.to_user.clone(), outcome }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use async_trait::async_trait;

    use super::pacing::{PacingGate, ReleasePacing};
    use super::{
        format_post, RecordOutcome, ReleaseError, ReleasePipeline, ReleaseRequest, RunState,
    };
    use crate::clock::FixedClock;
    use crate::display::DisplayResolver;
    use crate::domain::shout_out::{ShoutOutId, ShoutOutSetting, Visibility};
    use crate::domain::user::UserId;
    use crate::store::ShoutOutStore;
    use crate::test_support::{CountingGate, Delivery, MemoryStore, RecordingGateway};

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<RecordingGateway>,
        thread_gate: Arc<CountingGate>,
        post_gate: Arc<CountingGate>,
        dm_gate: Arc<CountingGate>,
        pipeline: ReleasePipeline,
    }

    fn harness_with(gateway: RecordingGateway) -> Harness {
        let store = Arc::new(MemoryStore::default());
        store.insert_user("U1", "ann");
        store.insert_user("U9", "zed");
        let gateway = Arc::new(gateway);
        let thread_gate = Arc::new(CountingGate::default());
        let post_gate = Arc::new(CountingGate::default());
        let dm_gate = Arc::new(CountingGate::default());
        let pacing = ReleasePacing {
            thread_open: thread_gate.clone(),
            post: post_gate.clone(),
            direct_message: dm_gate.clone(),
        };
        let pipeline = ReleasePipeline::new(
            store.clone(),
            DisplayResolver::with_random_pseudonyms(store.clone()),
            gateway.clone(),
            pacing,
        )
        .with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("valid time"),
        )));
        Harness { store, gateway, thread_gate, post_gate, dm_gate, pipeline }
    }

    /// Flips a record to anonymous while the run waits for its delivery slot.
    struct AnonymizeWhileWaiting {
        store: Arc<MemoryStore>,
        target: ShoutOutId,
    }

    #[async_trait]
    impl PacingGate for AnonymizeWhileWaiting {
        async fn wait(&self) {
            let mut current = self.store.snapshot(self.target);
            if current.is_released() || current.is_anonymous {
                return;
            }
            current.apply_setting(ShoutOutSetting::Anonymous, Utc::now()).expect("toggle");
            self.store.save(&current).await.expect("save toggle");
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingGateway::default())
    }

    fn request() -> ReleaseRequest {
        ReleaseRequest { channel_id: "C1".to_owned(), operator: UserId("UOP".to_owned()) }
    }

    fn channel(text: &str, thread: Option<&str>) -> Delivery {
        Delivery::Channel {
            channel: "C1".to_owned(),
            text: text.to_owned(),
            thread: thread.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn public_run_threads_each_recipient_under_one_anchor() {
        let h = harness();
        let a0 = h.store.seed("U1", "UA", "first for A", Visibility::Public);
        let b = h.store.seed("U1", "UB", "only for B", Visibility::Public);
        let a1 = h.store.seed("U9", "UA", "second for A", Visibility::Public);

        let report = h.pipeline.run(Visibility::Public, &request()).await.expect("run");

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.released(), 3);
        assert_eq!(
            h.gateway.deliveries(),
            vec![
                Delivery::Notice {
                    channel: "C1".to_owned(),
                    user: "UOP".to_owned(),
                    text: "Releasing 3 public shout outs!".to_owned(),
                },
                channel("<@UA>", None),
                channel("> first for A\n - <@U1>", Some("1700000000.000001")),
                channel("> second for A\n - <@U9>", Some("1700000000.000001")),
                channel("<@UB>", None),
                channel("> only for B\n - <@U1>", Some("1700000000.000004")),
            ]
        );
        assert_eq!(h.thread_gate.passes(), 2);
        assert_eq!(h.post_gate.passes(), 5);
        assert_eq!(h.dm_gate.passes(), 0);

        let stamps = [a0, a1, b].map(|id| h.store.snapshot(id).released_at);
        assert!(stamps.iter().all(|stamp| *stamp == report.released_at));
        assert!(report.released_at.is_some());
    }

    #[tokio::test]
    async fn failed_reply_stays_pending_and_the_run_continues() {
        let h = harness();
        let first = h.store.seed("U1", "UA", "one", Visibility::Public);
        let second = h.store.seed("U1", "UA", "two", Visibility::Public);
        let third = h.store.seed("U1", "UB", "three", Visibility::Public);
        h.gateway.fail_when_text_contains("> two");

        let report = h.pipeline.run(Visibility::Public, &request()).await.expect("run");

        assert!(h.store.snapshot(first).released_at.is_some());
        assert!(h.store.snapshot(second).released_at.is_none());
        assert!(h.store.snapshot(third).released_at.is_some());
        assert!(matches!(report.records[1].outcome, RecordOutcome::DeliveryFailed(_)));

        let pending = h.store.find_unreleased(Visibility::Public).await.expect("fetch");
        assert_eq!(pending.iter().map(|row| row.id).collect::<Vec<_>>(), vec![second]);
    }

    #[tokio::test]
    async fn failed_anchor_abandons_only_that_recipient_group() {
        let h = harness();
        h.store.seed("U1", "UA", "one", Visibility::Public);
        h.store.seed("U1", "UA", "two", Visibility::Public);
        let other = h.store.seed("U1", "UB", "three", Visibility::Public);
        h.gateway.fail_when_text_contains("<@UA>");

        let report = h.pipeline.run(Visibility::Public, &request()).await.expect("run");

        let outcomes = report.records.iter().map(|r| r.outcome.clone()).collect::<Vec<_>>();
        assert_eq!(
            outcomes,
            vec![RecordOutcome::Abandoned, RecordOutcome::Abandoned, RecordOutcome::Released]
        );
        assert!(h.store.snapshot(other).released_at.is_some());
        assert_eq!(report.pending(), 2);
    }

    #[tokio::test]
    async fn empty_run_reports_zero_and_delivers_nothing() {
        let h = harness();
        h.store.seed("U1", "UA", "private one", Visibility::Private);

        let report = h.pipeline.run(Visibility::Public, &request()).await.expect("run");

        assert_eq!(report.state, RunState::Empty);
        assert_eq!(report.fetched, 0);
        assert_eq!(report.released_at, None);
        assert_eq!(
            h.gateway.deliveries(),
            vec![Delivery::Notice {
                channel: "C1".to_owned(),
                user: "UOP".to_owned(),
                text: "Releasing 0 public shout outs!".to_owned(),
            }]
        );
        assert_eq!(h.post_gate.passes() + h.thread_gate.passes(), 0);
    }

    #[tokio::test]
    async fn private_run_sends_direct_messages_with_display_names() {
        let h = harness();
        let first = h.store.seed("U1", "UB", "private thanks", Visibility::Private);
        let second = h.store.seed("U404", "UA", "from a stranger", Visibility::Private);

        let report = h.pipeline.run(Visibility::Private, &request()).await.expect("run");

        assert_eq!(report.released(), 2);
        assert_eq!(
            h.gateway.deliveries()[1..],
            [
                Delivery::Direct { user: "UA".to_owned(), text: format_post("from a stranger", "?") },
                Delivery::Direct { user: "UB".to_owned(), text: format_post("private thanks", "ann") },
            ]
        );
        assert_eq!(h.dm_gate.passes(), 2);
        assert_eq!(h.thread_gate.passes() + h.post_gate.passes(), 0);
        assert_eq!(h.store.snapshot(first).released_at, h.store.snapshot(second).released_at);
    }

    #[tokio::test]
    async fn persistence_failure_is_reported_and_later_records_proceed() {
        let h = harness();
        let broken = h.store.seed("U1", "UA", "one", Visibility::Private);
        let fine = h.store.seed("U1", "UB", "two", Visibility::Private);
        h.store.fail_saves_for(broken);

        let report = h.pipeline.run(Visibility::Private, &request()).await.expect("run");

        assert!(matches!(report.records[0].outcome, RecordOutcome::PersistenceFailed(_)));
        assert_eq!(report.records[1].outcome, RecordOutcome::Released);
        assert!(h.store.snapshot(broken).released_at.is_none());
        assert!(h.store.snapshot(fine).released_at.is_some());
    }

    #[tokio::test]
    async fn setting_changed_during_the_run_survives_the_release() {
        let store = Arc::new(MemoryStore::default());
        let target = store.seed("U1", "UA", "quiet thanks", Visibility::Private);
        let gateway = Arc::new(RecordingGateway::default());
        let pacing = ReleasePacing {
            thread_open: Arc::new(CountingGate::default()),
            post: Arc::new(CountingGate::default()),
            direct_message: Arc::new(AnonymizeWhileWaiting { store: store.clone(), target }),
        };
        let pipeline = ReleasePipeline::new(
            store.clone(),
            DisplayResolver::with_random_pseudonyms(store.clone()),
            gateway,
            pacing,
        );

        let report = pipeline.run(Visibility::Private, &request()).await.expect("run");

        assert_eq!(report.released(), 1);
        let stored = store.snapshot(target);
        assert!(stored.is_anonymous);
        assert_eq!(stored.released_at, report.released_at);
    }

    #[tokio::test]
    async fn rerun_after_success_skips_released_records() {
        let h = harness();
        h.store.seed("U1", "UA", "one", Visibility::Public);
        h.pipeline.run(Visibility::Public, &request()).await.expect("first run");

        let again = h.pipeline.run(Visibility::Public, &request()).await.expect("second run");

        assert_eq!(again.state, RunState::Empty);
        let posts = h
            .gateway
            .deliveries()
            .into_iter()
            .filter(|delivery| matches!(delivery, Delivery::Channel { .. }))
            .count();
        assert_eq!(posts, 2);
    }

    #[tokio::test]
    async fn notice_failure_aborts_before_delivery() {
        let h = harness_with(RecordingGateway::failing_notices());
        let id = h.store.seed("U1", "UA", "one", Visibility::Public);

        let error = h.pipeline.run(Visibility::Public, &request()).await.expect_err("abort");

        assert!(matches!(error, ReleaseError::Notice(_)));
        assert_eq!(h.gateway.deliveries().len(), 1);
        assert!(h.store.snapshot(id).released_at.is_none());
    }
}
