//! API DTOs (Data Transfer Objects)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::{BoostReceipt, TransferReceipt};
use crate::domain::session::SessionSnapshot;
use crate::domain::value_objects::{BoostKind, DebitSource, SubWallet, UserId};
use crate::domain::wallet::WalletSnapshot;

/// Default page size of list endpoints
pub const DEFAULT_LIMIT: usize = 20;
/// Largest page size a client may ask for
pub const MAX_LIMIT: usize = 100;

// ============================================================================
// Shared
// ============================================================================

/// `?limit=` on list endpoints
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Wallet selector accepted from clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletChoice {
    Mining,
    Purchase,
    #[default]
    Auto,
}

impl From<WalletChoice> for DebitSource {
    fn from(choice: WalletChoice) -> Self {
        match choice {
            WalletChoice::Mining => DebitSource::Only(SubWallet::Mining),
            WalletChoice::Purchase => DebitSource::Only(SubWallet::Purchase),
            WalletChoice::Auto => DebitSource::Auto,
        }
    }
}

/// Amount taken from one sub-wallet
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitPart {
    pub wallet: SubWallet,
    pub amount: Decimal,
}

fn debit_parts(parts: Vec<(SubWallet, Decimal)>) -> Vec<DebitPart> {
    parts
        .into_iter()
        .map(|(wallet, amount)| DebitPart { wallet, amount })
        .collect()
}

// ============================================================================
// Mining
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostRequest {
    #[serde(rename = "type")]
    pub kind: BoostKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostResponse {
    #[serde(rename = "type")]
    pub kind: BoostKind,
    pub cost: Decimal,
    pub debited: Vec<DebitPart>,
    pub session: SessionSnapshot,
    pub wallet: WalletSnapshot,
}

impl From<BoostReceipt> for BoostResponse {
    fn from(receipt: BoostReceipt) -> Self {
        Self {
            kind: receipt.kind,
            cost: receipt.cost,
            debited: debit_parts(receipt.debited),
            session: receipt.session,
            wallet: receipt.wallet,
        }
    }
}

// ============================================================================
// Wallet
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInternalRequest {
    pub from: SubWallet,
    pub to: SubWallet,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub recipient_id: UserId,
    pub amount: Decimal,
    #[serde(default)]
    pub wallet: WalletChoice,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub recipient_id: UserId,
    pub amount: Decimal,
    pub debited: Vec<DebitPart>,
    pub wallet: WalletSnapshot,
}

impl From<TransferReceipt> for TransferResponse {
    fn from(receipt: TransferReceipt) -> Self {
        Self {
            recipient_id: receipt.recipient_id,
            amount: receipt.amount,
            debited: debit_parts(receipt.debited),
            wallet: receipt.sender,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub wallet: SubWallet,
    pub amount: Decimal,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub referral_code: Option<String>,
}
