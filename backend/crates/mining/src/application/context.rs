//! Shared handles for the mining use cases

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::clock::{Clock, SystemClock};
use crate::application::config::{MiningConfig, Settings, SettingsProvider};
use crate::application::events::{EventBus, LiveChannel};
use crate::application::locks::UserLocks;
use crate::domain::profile::MinerProfile;
use crate::domain::repository::{MiningRepository, ProfileRepository, WalletRepository};
use crate::domain::value_objects::UserId;
use crate::domain::wallet::Wallet;
use crate::error::{MiningError, MiningResult};

/// Everything a use case needs. Cheap to clone; all clones share the same
/// lock table, event bus and live channel.
pub struct MiningContext<R> {
    pub repo: Arc<R>,
    pub settings: Arc<dyn SettingsProvider>,
    pub config: Arc<MiningConfig>,
    pub clock: Arc<dyn Clock>,
    pub locks: Arc<UserLocks>,
    pub events: EventBus,
    /// Fed by the [`EventDispatcher`](crate::application::EventDispatcher),
    /// read by the `/live` stream
    pub live: Arc<LiveChannel>,
}

impl<R> Clone for MiningContext<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            settings: self.settings.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
            locks: self.locks.clone(),
            events: self.events.clone(),
            live: self.live.clone(),
        }
    }
}

impl<R> MiningContext<R>
where
    R: MiningRepository,
{
    pub fn new(repo: Arc<R>, settings: Arc<dyn SettingsProvider>, config: MiningConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        let live = Arc::new(LiveChannel::new(config.live_buffer));
        Self {
            repo,
            settings,
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
            locks: Arc::new(UserLocks::new()),
            events,
            live,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// One settings snapshot per operation
    pub fn settings(&self) -> Settings {
        self.settings.snapshot()
    }

    pub async fn load_profile(&self, user_id: &UserId) -> MiningResult<MinerProfile> {
        self.repo
            .find_profile(user_id)
            .await?
            .ok_or(MiningError::UserNotFound)
    }

    /// The stored wallet, or a fresh one seeded from the profile's legacy
    /// total. A fresh wallet is persisted by the first commit that carries it.
    pub async fn load_wallet(
        &self,
        profile: &MinerProfile,
        now: DateTime<Utc>,
    ) -> MiningResult<Wallet> {
        match self.repo.find_wallet(&profile.user_id).await? {
            Some(wallet) => Ok(wallet),
            None => {
                tracing::debug!(user_id = %profile.user_id, "Seeding wallet");
                Ok(Wallet::seeded(profile.user_id, profile.total_coins, now))
            }
        }
    }
}
