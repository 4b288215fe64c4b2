//! Domain Services
//!
//! Pure reward arithmetic. Nothing here reads a clock or touches storage, so
//! the same functions serve status previews and session commits.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Referral boost per active referral, as a fraction of the base rate
pub const REFERRAL_BOOST_PER_REFERRAL: Decimal = dec!(0.20);

/// Referral boost ceiling (100% of base)
pub const REFERRAL_BOOST_CAP: Decimal = dec!(1.00);

/// Level boost per level above 1, uncapped
pub const LEVEL_BOOST_PER_LEVEL: Decimal = dec!(0.05);

/// Attributes the rate depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateInputs {
    pub active_referrals: u32,
    pub level: u32,
    /// Caller-supplied boost as a fraction of base (e.g. a streak bonus)
    pub extra_boost: Decimal,
}

/// Rate breakdown and projected yield of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuote {
    pub base_rate: Decimal,
    pub referral_boost_rate: Decimal,
    pub level_boost_rate: Decimal,
    pub extra_boost_rate: Decimal,
    pub total_rate: Decimal,
    pub cycle_hours: u32,
    pub expected_coins: Decimal,
}

/// Reward rate calculator
pub struct RateCalculator;

impl RateCalculator {
    /// Compute rate (coins per hour) and cycle yield.
    ///
    /// `referral = min(active * 0.20, 1.00) * base`,
    /// `level = (level - 1) * 0.05 * base`,
    /// `total = base + referral + level + extra * base`.
    pub fn quote(base_rate: Decimal, cycle_hours: u32, inputs: &RateInputs) -> RateQuote {
        let referral_factor = (Decimal::from(inputs.active_referrals)
            * REFERRAL_BOOST_PER_REFERRAL)
            .min(REFERRAL_BOOST_CAP);
        let level_factor = Decimal::from(inputs.level.saturating_sub(1)) * LEVEL_BOOST_PER_LEVEL;

        let referral_boost_rate = base_rate * referral_factor;
        let level_boost_rate = base_rate * level_factor;
        let extra_boost_rate = base_rate * inputs.extra_boost.max(Decimal::ZERO);
        let total_rate = base_rate + referral_boost_rate + level_boost_rate + extra_boost_rate;

        RateQuote {
            base_rate,
            referral_boost_rate,
            level_boost_rate,
            extra_boost_rate,
            total_rate,
            cycle_hours,
            expected_coins: cycle_yield(total_rate, cycle_hours),
        }
    }
}

/// Coins produced by `rate` over `hours`
pub fn cycle_yield(rate: Decimal, hours: u32) -> Decimal {
    rate * Decimal::from(hours)
}

/// `floor(total_mined / step) + 1`
pub fn level_for(total_mined: Decimal, step: Decimal) -> u32 {
    if step <= Decimal::ZERO || total_mined <= Decimal::ZERO {
        return 1;
    }
    (total_mined / step)
        .floor()
        .to_u32()
        .unwrap_or(u32::MAX - 1)
        .saturating_add(1)
}

/// Streak after a settlement at `now`.
///
/// Continues when the previous session ended within `window`, otherwise
/// restarts at 1.
pub fn next_streak(
    current: u32,
    last_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: TimeDelta,
) -> u32 {
    match last_end {
        Some(end) if now - end <= window => current.saturating_add(1),
        _ => 1,
    }
}
