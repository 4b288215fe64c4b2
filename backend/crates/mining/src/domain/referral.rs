//! Referral Entity
//!
//! Provenance of a referral bonus. `coins_earned` is fixed at creation; only
//! `status` changes afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::value_objects::{ReferralId, ReferralKind, ReferralStatus, UserId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: ReferralId,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub kind: ReferralKind,
    pub coins_earned: Decimal,
    pub status: ReferralStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Referral {
    pub fn new(
        referrer_id: UserId,
        referred_id: UserId,
        kind: ReferralKind,
        coins_earned: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReferralId::new(),
            referrer_id,
            referred_id,
            kind,
            coins_earned,
            status: ReferralStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true when the status actually changed
    pub fn set_status(&mut self, status: ReferralStatus, now: DateTime<Utc>) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.updated_at = now;
        true
    }
}
