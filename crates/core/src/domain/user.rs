use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque platform user identifier, e.g. `U024BE7LH`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw profile fields as returned by the identity provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub team_id: String,
    pub real_name: String,
    pub real_name_normalized: String,
    pub display_name: String,
    pub display_name_normalized: String,
}

impl UserProfile {
    pub fn resolved_real_name(&self) -> &str {
        if self.real_name_normalized.is_empty() {
            &self.real_name
        } else {
            &self.real_name_normalized
        }
    }

    /// Normalized display name, then raw display name, then the real name.
    pub fn resolved_display_name(&self) -> &str {
        if !self.display_name_normalized.is_empty() {
            &self.display_name_normalized
        } else if !self.display_name.is_empty() {
            &self.display_name
        } else {
            self.resolved_real_name()
        }
    }
}

/// Cached projection of a platform user. Never mutated once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub team_id: String,
    pub display_name: String,
    pub real_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn from_profile(profile: &UserProfile, now: DateTime<Utc>) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            team_id: profile.team_id.clone(),
            display_name: profile.resolved_display_name().to_owned(),
            real_name: profile.resolved_real_name().to_owned(),
            created_at: now,
            updated_at: now,
        }
    }
}
