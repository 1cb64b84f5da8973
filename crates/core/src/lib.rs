pub mod clock;
pub mod config;
pub mod display;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod intake;
pub mod notices;
pub mod parser;
pub mod release;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, FixedClock, SystemClock};
pub use display::{DisplayResolver, PseudonymPicker, RandomPseudonymPicker};
pub use domain::shout_out::{ShoutOut, ShoutOutDraft, ShoutOutId, ShoutOutSetting, Visibility};
pub use domain::user::{User, UserId, UserProfile};
pub use errors::{DeliveryError, DomainError, StoreError};
pub use gateway::{DeliveryGateway, IdentityProvider, ThreadAnchor};
pub use intake::{IntakeError, ShoutOutIntake};
pub use release::pacing::{IntervalGate, PacingGate, PacingPolicy, ReleasePacing};
pub use release::{
    RecordOutcome, RecordReport, ReleaseError, ReleasePipeline, ReleaseReport, ReleaseRequest,
    RunState,
};
pub use store::{ShoutOutStore, UserStore};
