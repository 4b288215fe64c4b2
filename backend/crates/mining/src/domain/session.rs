//! Mining Session Entity
//!
//! `active -> completed | cancelled`. Transitions take the current instant
//! explicitly so the state machine stays clock-free.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::services::{RateQuote, cycle_yield};
use crate::domain::value_objects::{BoostKind, MiningSessionId, SessionPhase, SessionStatus, UserId};
use crate::error::{MiningError, MiningResult};

#[derive(Debug, Clone, PartialEq)]
pub struct MiningSession {
    pub id: MiningSessionId,
    pub user_id: UserId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub cycle_hours: u32,
    pub base_rate: Decimal,
    pub referral_boost_rate: Decimal,
    pub level_boost_rate: Decimal,
    pub total_rate: Decimal,
    pub expected_coins: Decimal,
    /// Set only on settlement
    pub coins_earned: Decimal,
    pub status: SessionStatus,
    pub speed_boosts: u32,
    pub duration_boosts: u32,
    pub settled_at: Option<DateTime<Utc>>,
}

impl MiningSession {
    /// Start a session from a rate quote
    pub fn start(user_id: UserId, quote: &RateQuote, now: DateTime<Utc>) -> Self {
        Self {
            id: MiningSessionId::new(),
            user_id,
            start_time: now,
            end_time: now + TimeDelta::hours(i64::from(quote.cycle_hours)),
            cycle_hours: quote.cycle_hours,
            base_rate: quote.base_rate,
            referral_boost_rate: quote.referral_boost_rate,
            level_boost_rate: quote.level_boost_rate,
            total_rate: quote.total_rate,
            expected_coins: quote.expected_coins,
            coins_earned: Decimal::ZERO,
            status: SessionStatus::Active,
            speed_boosts: 0,
            duration_boosts: 0,
            settled_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Active and past its end time, waiting for claim or sweep
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now >= self.end_time
    }

    pub fn phase(&self, now: DateTime<Utc>) -> SessionPhase {
        match self.status {
            SessionStatus::Active if now >= self.end_time => SessionPhase::Expired,
            SessionStatus::Active => SessionPhase::Active,
            SessionStatus::Completed => SessionPhase::Completed,
            SessionStatus::Cancelled => SessionPhase::Cancelled,
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        (self.end_time - now).max(TimeDelta::zero())
    }

    /// `active -> completed`, crediting the projected yield.
    ///
    /// Returns the coins to credit. A session that already left `active`
    /// yields `AlreadySettled` so racing settlers stay harmless.
    pub fn settle(&mut self, now: DateTime<Utc>) -> MiningResult<Decimal> {
        if !self.is_active() {
            return Err(MiningError::AlreadySettled);
        }
        if now < self.end_time {
            return Err(MiningError::SessionConflict("mining session still in progress"));
        }
        self.status = SessionStatus::Completed;
        self.coins_earned = self.expected_coins;
        self.settled_at = Some(now);
        Ok(self.coins_earned)
    }

    /// `active -> cancelled`, forfeiting everything accrued
    pub fn cancel(&mut self, now: DateTime<Utc>) -> MiningResult<()> {
        if !self.is_active() {
            return Err(MiningError::SessionConflict("no active mining session"));
        }
        self.status = SessionStatus::Cancelled;
        self.coins_earned = Decimal::ZERO;
        self.settled_at = Some(now);
        Ok(())
    }

    /// Check that a boost may be applied at `now`
    pub fn ensure_boostable(&self, now: DateTime<Utc>) -> MiningResult<()> {
        if !self.is_active() {
            return Err(MiningError::SessionConflict("no active mining session"));
        }
        if now >= self.end_time {
            return Err(MiningError::SessionConflict("mining session already finished"));
        }
        Ok(())
    }

    /// Multiply the total rate and re-project the cycle yield
    pub fn apply_speed_boost(&mut self, multiplier: Decimal, now: DateTime<Utc>) -> MiningResult<()> {
        self.ensure_boostable(now)?;
        self.total_rate *= multiplier;
        self.expected_coins = cycle_yield(self.total_rate, self.cycle_hours);
        self.speed_boosts += 1;
        Ok(())
    }

    /// Pull the end time in by `offset`, never closer than `now + guard`
    pub fn apply_duration_boost(
        &mut self,
        offset: TimeDelta,
        guard: TimeDelta,
        now: DateTime<Utc>,
    ) -> MiningResult<()> {
        self.ensure_boostable(now)?;
        let floor = now + guard;
        self.end_time = (self.end_time - offset).max(floor.min(self.end_time));
        self.duration_boosts += 1;
        Ok(())
    }

    pub fn apply_boost(
        &mut self,
        kind: BoostKind,
        speed_multiplier: Decimal,
        offset: TimeDelta,
        guard: TimeDelta,
        now: DateTime<Utc>,
    ) -> MiningResult<()> {
        match kind {
            BoostKind::Speed => self.apply_speed_boost(speed_multiplier, now),
            BoostKind::Duration => self.apply_duration_boost(offset, guard, now),
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            user_id: self.user_id,
            phase: self.phase(now),
            start_time: self.start_time,
            end_time: self.end_time,
            remaining_secs: self.remaining(now).num_seconds(),
            base_rate: self.base_rate,
            referral_boost_rate: self.referral_boost_rate,
            level_boost_rate: self.level_boost_rate,
            total_rate: self.total_rate,
            expected_coins: self.expected_coins,
            coins_earned: self.coins_earned,
            speed_boosts: self.speed_boosts,
            duration_boosts: self.duration_boosts,
        }
    }
}

/// Read model of a session at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: MiningSessionId,
    pub user_id: UserId,
    pub phase: SessionPhase,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub remaining_secs: i64,
    pub base_rate: Decimal,
    pub referral_boost_rate: Decimal,
    pub level_boost_rate: Decimal,
    pub total_rate: Decimal,
    pub expected_coins: Decimal,
    pub coins_earned: Decimal,
    pub speed_boosts: u32,
    pub duration_boosts: u32,
}
