//! Application Configuration
//!
//! Two layers:
//! - [`Settings`]: business values owned by operators (rate, cycle length,
//!   bonuses, maintenance flag). The core reads one immutable snapshot per
//!   operation through a [`SettingsProvider`].
//! - [`MiningConfig`]: process tuning (sweep cadence, boost shape, windows).

use std::sync::RwLock;
use std::time::Duration;

use chrono::TimeDelta;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{MiningError, MiningResult};

/// Global settings snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Base coins per hour
    pub mining_rate: Decimal,
    /// Length of one mining cycle in hours
    pub mining_cycle_hours: u32,
    /// Price of one boost
    pub boost_cost: Decimal,
    pub direct_referral_bonus: Decimal,
    pub indirect_referral_bonus: Decimal,
    /// Blocks session start while set
    pub maintenance_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mining_rate: dec!(0.25),
            mining_cycle_hours: 24,
            boost_cost: dec!(10),
            direct_referral_bonus: dec!(50),
            indirect_referral_bonus: dec!(25),
            maintenance_mode: false,
        }
    }
}

impl Settings {
    /// Build from a key/value source, falling back to defaults for missing
    /// keys. Unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> MiningResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "miningRate" => settings.mining_rate = parse_decimal(key, value)?,
                "miningCycleDuration" => {
                    settings.mining_cycle_hours = value.parse().map_err(|_| invalid(key, value))?
                }
                "boostCost" => settings.boost_cost = parse_decimal(key, value)?,
                "directReferralBonus" => {
                    settings.direct_referral_bonus = parse_decimal(key, value)?
                }
                "indirectReferralBonus" => {
                    settings.indirect_referral_bonus = parse_decimal(key, value)?
                }
                "maintenanceMode" => {
                    settings.maintenance_mode = match value.to_ascii_lowercase().as_str() {
                        "true" | "1" | "on" => true,
                        "false" | "0" | "off" => false,
                        _ => return Err(invalid(key, value)),
                    }
                }
                other => tracing::debug!(key = other, "Ignoring unknown setting"),
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> MiningResult<()> {
        if self.mining_rate < Decimal::ZERO
            || self.boost_cost < Decimal::ZERO
            || self.direct_referral_bonus < Decimal::ZERO
            || self.indirect_referral_bonus < Decimal::ZERO
        {
            return Err(MiningError::InvalidRequest(
                "settings amounts must not be negative".into(),
            ));
        }
        if self.mining_cycle_hours == 0 {
            return Err(MiningError::InvalidRequest(
                "miningCycleDuration must be at least one hour".into(),
            ));
        }
        Ok(())
    }
}

fn parse_decimal(key: &str, value: &str) -> MiningResult<Decimal> {
    value.parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> MiningError {
    MiningError::InvalidRequest(format!("invalid value for {key}: {value}"))
}

/// Read-only source of settings snapshots
pub trait SettingsProvider: Send + Sync {
    fn snapshot(&self) -> Settings;
}

impl SettingsProvider for Settings {
    fn snapshot(&self) -> Settings {
        self.clone()
    }
}

/// Settings the host process can replace at runtime (e.g. on a refresh
/// schedule). Readers always see a whole snapshot, old or new.
#[derive(Debug, Default)]
pub struct SharedSettings {
    current: RwLock<Settings>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(settings),
        }
    }

    pub fn replace(&self, settings: Settings) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = settings;
    }
}

impl SettingsProvider for SharedSettings {
    fn snapshot(&self) -> Settings {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Mining application configuration
#[derive(Debug, Clone)]
pub struct MiningConfig {
    /// How often the sweeper looks for due sessions
    pub sweep_interval: Duration,
    /// Sessions fetched per sweep query
    pub sweep_batch_size: usize,
    /// How often referral activity and streaks are recomputed
    pub housekeeping_interval: Duration,
    /// Rate multiplier of a speed boost
    pub speed_boost_multiplier: Decimal,
    /// End-time reduction of a duration boost
    pub duration_boost_offset: Duration,
    /// A duration boost never leaves less than this much time
    pub min_remaining_guard: Duration,
    /// Max gap between sessions that keeps a streak alive
    pub streak_window: Duration,
    /// A referred user counts as active if seen within this window
    pub activity_window: Duration,
    /// Coins of lifetime mining per level
    pub level_step: Decimal,
    /// Capacity of the outbound event bus
    pub event_capacity: usize,
    /// Per-subscriber buffer of the live channel
    pub live_buffer: usize,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5 * 60),
            sweep_batch_size: 200,
            housekeeping_interval: Duration::from_secs(6 * 3600),
            speed_boost_multiplier: dec!(1.5),
            duration_boost_offset: Duration::from_secs(2 * 3600),
            min_remaining_guard: Duration::from_secs(60),
            streak_window: Duration::from_secs(48 * 3600),
            activity_window: Duration::from_secs(48 * 3600),
            level_step: dec!(100),
            event_capacity: 1024,
            live_buffer: 32,
        }
    }
}

impl MiningConfig {
    /// Faster cadence for local runs
    pub fn development() -> Self {
        Self {
            sweep_interval: Duration::from_secs(15),
            housekeeping_interval: Duration::from_secs(5 * 60),
            ..Default::default()
        }
    }

    pub fn duration_boost_offset(&self) -> TimeDelta {
        to_delta(self.duration_boost_offset)
    }

    pub fn min_remaining_guard(&self) -> TimeDelta {
        to_delta(self.min_remaining_guard)
    }

    pub fn streak_window(&self) -> TimeDelta {
        to_delta(self.streak_window)
    }

    pub fn activity_window(&self) -> TimeDelta {
        to_delta(self.activity_window)
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
