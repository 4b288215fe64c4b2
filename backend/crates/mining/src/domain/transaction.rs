//! Wallet Transaction Entity
//!
//! Append-only log of ledger movements. Withdrawals start `pending` and end
//! `completed` or `rejected`; everything else is recorded `completed`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::value_objects::{
    SubWallet, TransactionId, TransactionKind, TransactionStatus, UserId,
};
use crate::error::{MiningError, MiningResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub sub_wallet: SubWallet,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub counterparty: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// A movement that is final the moment it is recorded
    pub fn completed(
        user_id: UserId,
        kind: TransactionKind,
        sub_wallet: SubWallet,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            user_id,
            kind,
            sub_wallet,
            amount,
            status: TransactionStatus::Completed,
            counterparty: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pending_withdrawal(
        user_id: UserId,
        sub_wallet: SubWallet,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: TransactionStatus::Pending,
            ..Self::completed(user_id, TransactionKind::Withdrawal, sub_wallet, amount, now)
        }
    }

    pub fn with_counterparty(mut self, counterparty: UserId) -> Self {
        self.counterparty = Some(counterparty);
        self
    }

    /// `pending -> completed | rejected`
    pub fn resolve(&mut self, status: TransactionStatus, now: DateTime<Utc>) -> MiningResult<()> {
        if self.status != TransactionStatus::Pending {
            return Err(MiningError::TransactionNotPending);
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }
}
