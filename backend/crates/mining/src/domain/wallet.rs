//! Wallet Entity
//!
//! One wallet per user, holding three sub-balances. Every sub-balance keeps
//! `0 <= locked <= balance`; all mutating methods either apply completely or
//! return an error with the wallet untouched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::value_objects::{DebitSource, SubWallet, UserId, ensure_positive};
use crate::error::{MiningError, MiningResult};

/// Balance of one sub-wallet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubBalance {
    pub balance: Decimal,
    pub locked: Decimal,
    /// Lifetime credits into this sub-wallet
    pub earned: Decimal,
}

impl SubBalance {
    pub fn available(&self) -> Decimal {
        self.balance - self.locked
    }
}

#[derive(Debug, Clone)]
pub struct Wallet {
    pub user_id: UserId,
    pub mining: SubBalance,
    pub purchase: SubBalance,
    pub referral: SubBalance,
    /// Number of stored writes this copy was read at; 0 before the first.
    /// A commit only lands if the stored row is still at this version.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create an empty wallet
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            mining: SubBalance::default(),
            purchase: SubBalance::default(),
            referral: SubBalance::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a wallet carrying over the coins accumulated before wallets
    /// existed. The legacy total lands in the mining sub-wallet.
    pub fn seeded(user_id: UserId, legacy_total: Decimal, now: DateTime<Utc>) -> Self {
        let mut wallet = Self::new(user_id, now);
        if legacy_total > Decimal::ZERO {
            wallet.mining.balance = legacy_total;
            wallet.mining.earned = legacy_total;
        }
        wallet
    }

    pub fn sub(&self, sub: SubWallet) -> &SubBalance {
        match sub {
            SubWallet::Mining => &self.mining,
            SubWallet::Purchase => &self.purchase,
            SubWallet::Referral => &self.referral,
        }
    }

    fn sub_mut(&mut self, sub: SubWallet) -> &mut SubBalance {
        match sub {
            SubWallet::Mining => &mut self.mining,
            SubWallet::Purchase => &mut self.purchase,
            SubWallet::Referral => &mut self.referral,
        }
    }

    pub fn available(&self, sub: SubWallet) -> Decimal {
        self.sub(sub).available()
    }

    pub fn total(&self) -> Decimal {
        SubWallet::ALL.iter().map(|s| self.sub(*s).balance).sum()
    }

    pub fn total_available(&self) -> Decimal {
        SubWallet::ALL.iter().map(|s| self.available(*s)).sum()
    }

    /// Combined available balance of the sub-wallets a source drains
    pub fn available_for(&self, source: DebitSource) -> Decimal {
        source.order().iter().map(|s| self.available(*s)).sum()
    }

    /// Refuses amounts that would overflow the sub-wallet or the wallet
    /// total, so the sums above never overflow either.
    pub fn credit(&mut self, sub: SubWallet, amount: Decimal) -> MiningResult<()> {
        let amount = ensure_positive(amount)?;
        self.total()
            .checked_add(amount)
            .ok_or(MiningError::InvalidAmount(amount))?;
        let entry = self.sub_mut(sub);
        let (Some(balance), Some(earned)) =
            (entry.balance.checked_add(amount), entry.earned.checked_add(amount))
        else {
            return Err(MiningError::InvalidAmount(amount));
        };
        entry.balance = balance;
        entry.earned = earned;
        Ok(())
    }

    pub fn debit(&mut self, sub: SubWallet, amount: Decimal) -> MiningResult<()> {
        let amount = ensure_positive(amount)?;
        let entry = self.sub_mut(sub);
        if entry.available() < amount {
            return Err(MiningError::InsufficientBalance {
                requested: amount,
                available: entry.available(),
            });
        }
        entry.balance -= amount;
        Ok(())
    }

    /// Debit `amount` from the sub-wallets of `source` in order.
    ///
    /// Returns how much was taken from each sub-wallet. Nothing is taken
    /// unless the combined available balance covers the whole amount.
    pub fn debit_from(
        &mut self,
        source: DebitSource,
        amount: Decimal,
    ) -> MiningResult<Vec<(SubWallet, Decimal)>> {
        let amount = ensure_positive(amount)?;
        let available = self.available_for(source);
        if available < amount {
            return Err(MiningError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let mut remaining = amount;
        let mut taken = Vec::with_capacity(2);
        for sub in source.order() {
            if remaining.is_zero() {
                break;
            }
            let part = remaining.min(self.available(*sub));
            if part > Decimal::ZERO {
                self.sub_mut(*sub).balance -= part;
                remaining -= part;
                taken.push((*sub, part));
            }
        }
        Ok(taken)
    }

    pub fn lock(&mut self, sub: SubWallet, amount: Decimal) -> MiningResult<()> {
        let amount = ensure_positive(amount)?;
        let entry = self.sub_mut(sub);
        if entry.available() < amount {
            return Err(MiningError::InsufficientBalance {
                requested: amount,
                available: entry.available(),
            });
        }
        entry.locked += amount;
        Ok(())
    }

    /// Move up to `amount` back from locked to available.
    ///
    /// Clamps at zero locked so that a retried refund cannot drive the lock
    /// negative. Returns the amount actually released.
    pub fn unlock(&mut self, sub: SubWallet, amount: Decimal) -> MiningResult<Decimal> {
        let amount = ensure_positive(amount)?;
        let entry = self.sub_mut(sub);
        let released = amount.min(entry.locked);
        entry.locked -= released;
        Ok(released)
    }

    /// Pay out a locked amount: it leaves both locked and balance.
    pub fn consume_locked(&mut self, sub: SubWallet, amount: Decimal) -> MiningResult<Decimal> {
        let amount = ensure_positive(amount)?;
        let entry = self.sub_mut(sub);
        let consumed = amount.min(entry.locked);
        entry.locked -= consumed;
        entry.balance -= consumed;
        Ok(consumed)
    }

    /// Debit one sub-wallet and credit another as a single unit.
    pub fn transfer_internal(
        &mut self,
        from: SubWallet,
        to: SubWallet,
        amount: Decimal,
    ) -> MiningResult<()> {
        if from == to {
            return Err(MiningError::InvalidRequest(
                "source and destination wallets must differ".into(),
            ));
        }
        // staged so that a refused credit does not keep the debit
        let mut next = self.clone();
        next.debit(from, amount)?;
        next.credit(to, amount)?;
        *self = next;
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Invariant check used by tests and by the in-memory store
    pub fn is_consistent(&self) -> bool {
        SubWallet::ALL.iter().all(|s| {
            let entry = self.sub(*s);
            entry.locked >= Decimal::ZERO
                && entry.locked <= entry.balance
                && entry.available() >= Decimal::ZERO
        })
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        let part = |sub: SubWallet| {
            let entry = self.sub(sub);
            SubWalletSnapshot {
                balance: entry.balance,
                locked: entry.locked,
                available: entry.available(),
                earned: entry.earned,
            }
        };
        WalletSnapshot {
            user_id: self.user_id,
            mining: part(SubWallet::Mining),
            purchase: part(SubWallet::Purchase),
            referral: part(SubWallet::Referral),
            total: self.total(),
            total_available: self.total_available(),
        }
    }
}

/// Read model pushed to clients and returned by the API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubWalletSnapshot {
    pub balance: Decimal,
    pub locked: Decimal,
    pub available: Decimal,
    pub earned: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    pub user_id: UserId,
    pub mining: SubWalletSnapshot,
    pub purchase: SubWalletSnapshot,
    pub referral: SubWalletSnapshot,
    pub total: Decimal,
    pub total_available: Decimal,
}
