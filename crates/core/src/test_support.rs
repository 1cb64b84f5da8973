//! In-process fakes shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::shout_out::{ShoutOut, ShoutOutDraft, ShoutOutId, Visibility};
use crate::domain::user::{User, UserId, UserProfile};
use crate::errors::{DeliveryError, StoreError};
use crate::gateway::{DeliveryGateway, IdentityProvider, ThreadAnchor};
use crate::release::pacing::PacingGate;
use crate::store::{ShoutOutStore, UserStore};

#[derive(Default)]
pub struct MemoryStore {
    shout_outs: Mutex<HashMap<i64, ShoutOut>>,
    users: Mutex<HashMap<UserId, User>>,
    failing_saves: Mutex<HashSet<i64>>,
    next_id: AtomicUsize,
}

impl MemoryStore {
    pub fn shout_out_count(&self) -> usize {
        self.shout_outs.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn fail_saves_for(&self, id: ShoutOutId) {
        self.failing_saves.lock().expect("lock").insert(id.0);
    }

    pub fn snapshot(&self, id: ShoutOutId) -> ShoutOut {
        self.shout_outs.lock().expect("lock").get(&id.0).cloned().expect("stored shout-out")
    }

    pub fn insert_user(&self, id: &str, display_name: &str) {
        let profile = profile(id, display_name);
        self.users
            .lock()
            .expect("lock")
            .insert(profile.user_id.clone(), User::from_profile(&profile, Utc::now()));
    }

    /// Seeds a pending record directly, bypassing intake.
    pub fn seed(&self, from: &str, to: &str, message: &str, visibility: Visibility) -> ShoutOutId {
        let id = ShoutOutId(self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1);
        let draft = ShoutOutDraft {
            from_user: UserId(from.to_owned()),
            to_user: UserId(to.to_owned()),
            message: message.to_owned(),
            is_public: visibility.is_public(),
            is_anonymous: false,
        };
        self.shout_outs
            .lock()
            .expect("lock")
            .insert(id.0, ShoutOut::from_draft(id, draft, Utc::now()));
        id
    }
}

#[async_trait]
impl ShoutOutStore for MemoryStore {
    async fn create(&self, draft: ShoutOutDraft) -> Result<ShoutOutId, StoreError> {
        let id = ShoutOutId(self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1);
        let mut rows = self.shout_outs.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.insert(id.0, ShoutOut::from_draft(id, draft, Utc::now()));
        Ok(id)
    }

    async fn get_by_id(&self, id: ShoutOutId) -> Result<Option<ShoutOut>, StoreError> {
        let rows = self.shout_outs.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows.get(&id.0).cloned())
    }

    async fn save(&self, shout_out: &ShoutOut) -> Result<(), StoreError> {
        let failing = self.failing_saves.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        if failing.contains(&shout_out.id.0) {
            return Err(StoreError::Backend("disk I/O error".to_owned()));
        }
        let mut rows = self.shout_outs.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.insert(shout_out.id.0, shout_out.clone());
        Ok(())
    }

    async fn mark_released(
        &self,
        id: ShoutOutId,
        released_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let failing = self.failing_saves.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        if failing.contains(&id.0) {
            return Err(StoreError::Backend("disk I/O error".to_owned()));
        }
        let mut rows = self.shout_outs.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        let row =
            rows.get_mut(&id.0).ok_or_else(|| StoreError::NotFound(format!("shout-out {id}")))?;
        if row.released_at.is_none() {
            row.released_at = Some(released_at);
            row.updated_at = released_at;
        }
        Ok(())
    }

    async fn find_unreleased(&self, visibility: Visibility) -> Result<Vec<ShoutOut>, StoreError> {
        let rows = self.shout_outs.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut pending = rows
            .values()
            .filter(|row| !row.is_released() && row.visibility() == visibility)
            .cloned()
            .collect::<Vec<_>>();
        pending.sort_by(|a, b| a.to_user.cmp(&b.to_user).then(a.id.cmp(&b.id)));
        Ok(pending)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user_by_external_id(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(users.get(user_id).cloned())
    }

    async fn create_user(&self, profile: &UserProfile) -> Result<User, StoreError> {
        let user = User::from_profile(profile, Utc::now());
        let mut users = self.users.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        users.insert(user.user_id.clone(), user.clone());
        Ok(user)
    }
}

fn profile(id: &str, display_name: &str) -> UserProfile {
    UserProfile {
        user_id: UserId(id.to_owned()),
        team_id: "T1".to_owned(),
        real_name: format!("{display_name} (real)"),
        display_name: display_name.to_owned(),
        ..UserProfile::default()
    }
}

#[derive(Default)]
pub struct ScriptedIdentity {
    profiles: HashMap<UserId, UserProfile>,
    fetches: AtomicUsize,
}

impl ScriptedIdentity {
    pub fn with_users(users: &[(&str, &str)]) -> Self {
        Self {
            profiles: users
                .iter()
                .map(|(id, name)| (UserId((*id).to_owned()), profile(id, name)))
                .collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentity {
    async fn fetch_profile(&self, user_id: &UserId) -> Result<UserProfile, DeliveryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| DeliveryError::Api("user_not_found".to_owned()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Channel { channel: String, text: String, thread: Option<String> },
    Direct { user: String, text: String },
    Notice { channel: String, user: String, text: String },
}

/// Records every delivery attempt. Attempts whose text contains one of the
/// configured fragments fail.
#[derive(Default)]
pub struct RecordingGateway {
    deliveries: Mutex<Vec<Delivery>>,
    failing_fragments: Mutex<Vec<String>>,
    fail_notices: bool,
    anchors: AtomicUsize,
}

impl RecordingGateway {
    pub fn failing_notices() -> Self {
        Self { fail_notices: true, ..Self::default() }
    }

    pub fn fail_when_text_contains(&self, fragment: &str) {
        self.failing_fragments.lock().expect("lock").push(fragment.to_owned());
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().expect("lock").clone()
    }

    fn record(&self, delivery: Delivery, text: &str) -> Result<(), DeliveryError> {
        self.deliveries.lock().map_err(|e| DeliveryError::Transport(e.to_string()))?.push(delivery);
        let failing =
            self.failing_fragments.lock().map_err(|e| DeliveryError::Transport(e.to_string()))?;
        if failing.iter().any(|fragment| text.contains(fragment.as_str())) {
            return Err(DeliveryError::Api("msg_too_long".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryGateway for RecordingGateway {
    async fn post_to_channel(
        &self,
        channel_id: &str,
        text: &str,
        thread: Option<&ThreadAnchor>,
    ) -> Result<ThreadAnchor, DeliveryError> {
        self.record(
            Delivery::Channel {
                channel: channel_id.to_owned(),
                text: text.to_owned(),
                thread: thread.map(|anchor| anchor.0.clone()),
            },
            text,
        )?;
        let n = self.anchors.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ThreadAnchor(format!("1700000000.{n:06}")))
    }

    async fn post_direct(&self, user_id: &UserId, text: &str) -> Result<(), DeliveryError> {
        self.record(Delivery::Direct { user: user_id.0.clone(), text: text.to_owned() }, text)
    }

    async fn post_ephemeral_notice(
        &self,
        channel_id: &str,
        user_id: &UserId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.deliveries.lock().map_err(|e| DeliveryError::Transport(e.to_string()))?.push(
            Delivery::Notice {
                channel: channel_id.to_owned(),
                user: user_id.0.clone(),
                text: text.to_owned(),
            },
        );
        if self.fail_notices {
            return Err(DeliveryError::Transport("connection reset".to_owned()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingGate(AtomicUsize);

impl CountingGate {
    pub fn passes(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PacingGate for CountingGate {
    async fn wait(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}
