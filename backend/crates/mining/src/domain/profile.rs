//! Miner Profile Entity
//!
//! Denormalized per-user summary used for fast reads. `total_coins` mirrors
//! the wallet total once a wallet exists; before that it holds the legacy
//! accumulated total the wallet gets seeded from. The wallet, never this
//! record, decides what can be spent.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::value_objects::UserId;
use crate::domain::wallet::Wallet;

/// Length of generated referral codes
pub const REFERRAL_CODE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub total_count: u32,
    pub active_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinerProfile {
    pub user_id: UserId,
    pub referral_code: String,
    pub referred_by: Option<UserId>,
    pub total_coins: Decimal,
    pub total_mined: Decimal,
    pub level: u32,
    pub streak: u32,
    /// End time of the last completed session
    pub last_mining_end: Option<DateTime<Utc>>,
    pub current_mining_end_time: Option<DateTime<Utc>>,
    pub referral_stats: ReferralStats,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MinerProfile {
    pub fn new(
        user_id: UserId,
        referral_code: String,
        referred_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            referral_code,
            referred_by,
            total_coins: Decimal::ZERO,
            total_mined: Decimal::ZERO,
            level: 1,
            streak: 0,
            last_mining_end: None,
            current_mining_end_time: None,
            referral_stats: ReferralStats::default(),
            last_active_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh the cached coin total from the authoritative wallet
    pub fn sync_wallet(&mut self, wallet: &Wallet, now: DateTime<Utc>) {
        self.total_coins = wallet.total();
        self.updated_at = now;
    }

    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        self.last_active_at = now;
        self.updated_at = now;
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            user_id: self.user_id,
            referral_code: self.referral_code.clone(),
            referred_by: self.referred_by,
            total_coins: self.total_coins,
            total_mined: self.total_mined,
            level: self.level,
            streak: self.streak,
            current_mining_end_time: self.current_mining_end_time,
            referral_stats: self.referral_stats,
        }
    }
}

/// Generate an upper-case alphanumeric referral code
pub fn generate_referral_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(REFERRAL_CODE_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

/// Codes are matched case-insensitively
pub fn normalize_referral_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    Some(code.to_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub user_id: UserId,
    pub referral_code: String,
    pub referred_by: Option<UserId>,
    pub total_coins: Decimal,
    pub total_mined: Decimal,
    pub level: u32,
    pub streak: u32,
    pub current_mining_end_time: Option<DateTime<Utc>>,
    pub referral_stats: ReferralStats,
}
