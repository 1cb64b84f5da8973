//! Sender rendering for released shout-outs.
//!
//! Anonymity is applied here, at display time. The stored `from_user` is never
//! rewritten.

use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::domain::shout_out::ShoutOut;
use crate::parser::format_mention;
use crate::store::UserStore;

pub const PSEUDONYMS: &[&str] = &[
    "Sue Doe Nimm",
    "A. Nonny Muz",
    "Naym Less",
    "Mr. E",
    "Sohm Bahdy",
    "See Krett",
    "Hayden P. Son",
    "Ehn Kagn Ito",
    "Cass E. Fied",
    "E. Nigma",
    "D. Sgeyzed",
    "Miss Teekal",
    "Coe Bert",
    "Carrie Terr",
    "Annie Juan",
    "Uda Kuvah",
    "A. Liam",
    "Cohen Seeld",
    "A. Dewd",
    "Guy",
    "Hugh Mann",
    "Indie Vitual",
    "Creed Chore",
    "Moe Sapian",
    "NPC",
    "Roe L.",
    "Kal Eague",
    "Coe Warker",
];

/// Shown when the sender's cached profile cannot be read.
pub const UNKNOWN_SENDER: &str = "?";

/// Chooses an index in `0..len`. Out-of-range answers wrap around.
pub trait PseudonymPicker: Send + Sync {
    fn pick(&self, len: usize) -> usize;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomPseudonymPicker;

impl PseudonymPicker for RandomPseudonymPicker {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len.max(1))
    }
}

pub struct DisplayResolver {
    users: Arc<dyn UserStore>,
    picker: Arc<dyn PseudonymPicker>,
}

impl DisplayResolver {
    pub fn new(users: Arc<dyn UserStore>, picker: Arc<dyn PseudonymPicker>) -> Self {
        Self { users, picker }
    }

    pub fn with_random_pseudonyms(users: Arc<dyn UserStore>) -> Self {
        Self::new(users, Arc::new(RandomPseudonymPicker))
    }

    pub fn pseudonym(&self) -> &'static str {
        PSEUDONYMS[self.picker.pick(PSEUDONYMS.len()) % PSEUDONYMS.len()]
    }

    pub async fn display_from(&self, shout_out: &ShoutOut, as_mention: bool) -> String {
        if shout_out.is_anonymous {
            return self.pseudonym().to_owned();
        }

        if as_mention {
            return format_mention(&shout_out.from_user);
        }

        match self.users.get_user_by_external_id(&shout_out.from_user).await {
            Ok(Some(user)) => user.display_name,
            Ok(None) => UNKNOWN_SENDER.to_owned(),
            Err(error) => {
                debug!(
                    event_name = "display.sender_lookup_failed",
                    shout_out_id = %shout_out.id,
                    error = %error,
                    "falling back to placeholder sender"
                );
                UNKNOWN_SENDER.to_owned()
            }
        }
    }
}
