//! Application Layer
//!
//! Use cases over the domain model plus the runtime pieces they share.

pub mod clock;
pub mod config;
pub mod context;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod locks;
pub mod referral;
pub mod sweeper;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{MiningConfig, Settings, SettingsProvider, SharedSettings};
pub use context::MiningContext;
pub use engine::{BoostReceipt, MiningStatus, RewardEngine, Settlement};
pub use events::{
    EventBus, EventDispatcher, LiveChannel, LiveUpdate, LogNotificationSink, MiningEvent,
    NotificationSink, NotifyError,
};
pub use ledger::{Ledger, TransferReceipt};
pub use locks::UserLocks;
pub use referral::{ActivityReport, ReferralCascade, Registration};
pub use sweeper::{HousekeepingReport, Sweeper, SweepReport};
