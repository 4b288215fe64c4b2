//! Domain Value Objects
//!
//! Closed enums for every label the ledger and session store persist. Each
//! one round-trips through `as_str` / `FromStr` for storage.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MiningError, MiningResult};

pub use kernel::id::{MiningSessionId, ReferralId, TransactionId, UserId};

/// Declares `as_str`, `Display` and `FromStr` for a fieldless enum.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = MiningError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(MiningError::InvalidRequest(format!(
                        "unknown {}: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

/// One of the three balances held by a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubWallet {
    /// Coins earned by mining sessions
    Mining,
    /// Coins bought or received from other users
    Purchase,
    /// Referral bonuses
    Referral,
}

string_enum!(SubWallet {
    Mining => "mining",
    Purchase => "purchase",
    Referral => "referral",
});

impl SubWallet {
    pub const ALL: [SubWallet; 3] = [SubWallet::Mining, SubWallet::Purchase, SubWallet::Referral];

    /// Referral coins are only ever spent through the aggregate paths.
    pub const fn is_withdrawable(&self) -> bool {
        matches!(self, SubWallet::Mining | SubWallet::Purchase)
    }
}

/// Where a debit is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "source", content = "wallet")]
pub enum DebitSource {
    /// A single named sub-wallet
    Only(SubWallet),
    /// Mining first, spilling into purchase
    Auto,
}

impl DebitSource {
    /// Sub-wallets drained by this source, in order
    pub fn order(&self) -> &'static [SubWallet] {
        match self {
            DebitSource::Only(SubWallet::Mining) => &[SubWallet::Mining],
            DebitSource::Only(SubWallet::Purchase) => &[SubWallet::Purchase],
            DebitSource::Only(SubWallet::Referral) => &[SubWallet::Referral],
            DebitSource::Auto => &[SubWallet::Mining, SubWallet::Purchase],
        }
    }
}

/// Paid accelerations of an active session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostKind {
    /// Multiply the total rate
    Speed,
    /// Pull the end time closer
    Duration,
}

string_enum!(BoostKind {
    Speed => "speed",
    Duration => "duration",
});

/// Persisted session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
}

string_enum!(SessionStatus {
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// Session status as seen at a given instant.
///
/// `Expired` is never stored: it is an `Active` session whose end time has
/// passed and which is waiting for claim or sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Active,
    Expired,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralKind {
    /// The referred user used the referrer's code
    Direct,
    /// The referrer's own referrer
    Indirect,
}

string_enum!(ReferralKind {
    Direct => "direct",
    Indirect => "indirect",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Active,
    Inactive,
}

string_enum!(ReferralStatus {
    Active => "active",
    Inactive => "inactive",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    MiningReward,
    ReferralBonus,
    BoostSpend,
    InternalTransfer,
    TransferOut,
    TransferIn,
    Withdrawal,
    /// Host-side credit or debit (purchases, support corrections)
    Adjustment,
}

string_enum!(TransactionKind {
    MiningReward => "mining_reward",
    ReferralBonus => "referral_bonus",
    BoostSpend => "boost_spend",
    InternalTransfer => "internal_transfer",
    TransferOut => "transfer_out",
    TransferIn => "transfer_in",
    Withdrawal => "withdrawal",
    Adjustment => "adjustment",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Rejected,
}

string_enum!(TransactionStatus {
    Pending => "pending",
    Completed => "completed",
    Rejected => "rejected",
});

/// Kinds accepted by the notification sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LevelUp,
    MiningComplete,
    ReferralBonus,
    Boost,
}

string_enum!(NotificationKind {
    LevelUp => "level_up",
    MiningComplete => "mining_complete",
    ReferralBonus => "referral_bonus",
    Boost => "boost",
});

/// Reject zero and negative amounts before any state change.
pub fn ensure_positive(amount: Decimal) -> MiningResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(MiningError::InvalidAmount(amount));
    }
    Ok(amount.normalize())
}
