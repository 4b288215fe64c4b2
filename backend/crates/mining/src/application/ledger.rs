//! Ledger Use Cases
//!
//! Wallet mutations driven from outside a mining session: host credits and
//! debits, locks, internal and cross-user transfers, and the withdrawal
//! lifecycle. Each operation loads the wallet under the owner's lock,
//! applies the change to a local copy, and commits the wallet together with
//! its transaction records and the profile cache.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::application::context::MiningContext;
use crate::application::events::MiningEvent;
use crate::domain::profile::MinerProfile;
use crate::domain::repository::{ChangeSet, MiningRepository, TransactionRepository, UnitOfWork};
use crate::domain::transaction::WalletTransaction;
use crate::domain::value_objects::{
    DebitSource, SubWallet, TransactionId, TransactionKind, TransactionStatus, UserId,
    ensure_positive,
};
use crate::domain::wallet::{Wallet, WalletSnapshot};
use crate::error::{MiningError, MiningResult};

/// Reads and commits a wallet mutation may take before giving up on a
/// contended wallet
pub const WALLET_WRITE_ATTEMPTS: u32 = 3;

/// Outcome of a cross-user transfer
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub amount: Decimal,
    /// Amount taken from each sender sub-wallet, in debit order
    pub debited: Vec<(SubWallet, Decimal)>,
    pub sender: WalletSnapshot,
    pub recipient_id: UserId,
}

pub struct Ledger<R> {
    ctx: MiningContext<R>,
}

impl<R> Ledger<R>
where
    R: MiningRepository,
{
    pub fn new(ctx: MiningContext<R>) -> Self {
        Self { ctx }
    }

    pub async fn wallet(&self, user_id: UserId) -> MiningResult<WalletSnapshot> {
        let profile = self.ctx.load_profile(&user_id).await?;
        let wallet = self.ctx.load_wallet(&profile, self.ctx.now()).await?;
        Ok(wallet.snapshot())
    }

    /// Credit one sub-wallet and record why
    pub async fn credit(
        &self,
        user_id: UserId,
        sub: SubWallet,
        amount: Decimal,
        kind: TransactionKind,
    ) -> MiningResult<WalletSnapshot> {
        let amount = ensure_positive(amount)?;
        let wallet = self
            .mutate(user_id, move |wallet, now| {
                wallet.credit(sub, amount)?;
                Ok(((), vec![WalletTransaction::completed(user_id, kind, sub, amount, now)]))
            })
            .await?
            .1;
        tracing::info!(user_id = %user_id, sub_wallet = %sub, amount = %amount, kind = %kind, "Wallet credited");
        Ok(wallet)
    }

    /// Debit from a sub-wallet or, with [`DebitSource::Auto`], from mining
    /// then purchase
    pub async fn debit(
        &self,
        user_id: UserId,
        source: DebitSource,
        amount: Decimal,
        kind: TransactionKind,
    ) -> MiningResult<WalletSnapshot> {
        let amount = ensure_positive(amount)?;
        let wallet = self
            .mutate(user_id, move |wallet, now| {
                let taken = wallet.debit_from(source, amount)?;
                let txs = taken
                    .into_iter()
                    .map(|(sub, part)| WalletTransaction::completed(user_id, kind, sub, part, now))
                    .collect();
                Ok(((), txs))
            })
            .await?
            .1;
        tracing::info!(user_id = %user_id, amount = %amount, kind = %kind, "Wallet debited");
        Ok(wallet)
    }

    pub async fn lock(
        &self,
        user_id: UserId,
        sub: SubWallet,
        amount: Decimal,
    ) -> MiningResult<WalletSnapshot> {
        let (_, wallet) = self
            .mutate(user_id, move |wallet, _| {
                wallet.lock(sub, amount)?;
                Ok(((), Vec::new()))
            })
            .await?;
        Ok(wallet)
    }

    /// Release up to `amount`; returns what was actually released
    pub async fn unlock(
        &self,
        user_id: UserId,
        sub: SubWallet,
        amount: Decimal,
    ) -> MiningResult<Decimal> {
        let (released, _) = self
            .mutate(user_id, move |wallet, _| Ok((wallet.unlock(sub, amount)?, Vec::new())))
            .await?;
        if released < amount {
            tracing::warn!(user_id = %user_id, sub_wallet = %sub, %amount, %released, "Unlock clamped");
        }
        Ok(released)
    }

    pub async fn transfer_internal(
        &self,
        user_id: UserId,
        from: SubWallet,
        to: SubWallet,
        amount: Decimal,
    ) -> MiningResult<WalletSnapshot> {
        let (_, wallet) = self
            .mutate(user_id, move |wallet, now| {
                wallet.transfer_internal(from, to, amount)?;
                let tx = WalletTransaction::completed(
                    user_id,
                    TransactionKind::InternalTransfer,
                    from,
                    amount,
                    now,
                );
                Ok(((), vec![tx]))
            })
            .await?;
        tracing::info!(user_id = %user_id, %from, %to, %amount, "Internal transfer");
        Ok(wallet)
    }

    /// Move coins to another user. The recipient always receives into the
    /// purchase sub-wallet. Both wallets commit together.
    pub async fn transfer_to_user(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        source: DebitSource,
        amount: Decimal,
    ) -> MiningResult<TransferReceipt> {
        if sender_id == recipient_id {
            return Err(MiningError::InvalidRequest("cannot transfer to yourself".into()));
        }
        let amount = ensure_positive(amount)?;

        let guard = self.ctx.locks.lock_pair(sender_id, recipient_id).await;
        let now = self.ctx.now();

        let mut sender_profile = self.ctx.load_profile(&sender_id).await?;
        let mut recipient_profile = self.ctx.load_profile(&recipient_id).await?;
        let mut sender = self.ctx.load_wallet(&sender_profile, now).await?;
        let mut recipient = self.ctx.load_wallet(&recipient_profile, now).await?;

        let debited = sender.debit_from(source, amount)?;
        recipient.credit(SubWallet::Purchase, amount)?;

        let mut txs: Vec<WalletTransaction> = debited
            .iter()
            .map(|(sub, part)| {
                WalletTransaction::completed(sender_id, TransactionKind::TransferOut, *sub, *part, now)
                    .with_counterparty(recipient_id)
            })
            .collect();
        txs.push(
            WalletTransaction::completed(
                recipient_id,
                TransactionKind::TransferIn,
                SubWallet::Purchase,
                amount,
                now,
            )
            .with_counterparty(sender_id),
        );

        sync_cache(&mut sender_profile, &mut sender, now);
        sync_cache(&mut recipient_profile, &mut recipient, now);
        let changes = ChangeSet::new()
            .wallet(sender.clone())
            .wallet(recipient.clone())
            .profile(sender_profile)
            .profile(recipient_profile)
            .transactions(txs);
        self.ctx.repo.commit(changes).await?;
        drop(guard);

        tracing::info!(
            sender_id = %sender_id,
            recipient_id = %recipient_id,
            amount = %amount,
            "Transfer between users"
        );
        self.ctx.events.publish_all([
            MiningEvent::WalletChanged(sender.snapshot()),
            MiningEvent::WalletChanged(recipient.snapshot()),
        ]);

        Ok(TransferReceipt {
            amount,
            debited,
            sender: sender.snapshot(),
            recipient_id,
        })
    }

    /// Lock `amount` and open a pending withdrawal
    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        sub: SubWallet,
        amount: Decimal,
    ) -> MiningResult<WalletTransaction> {
        if !sub.is_withdrawable() {
            return Err(MiningError::NotWithdrawable(sub));
        }
        let (tx, _) = self
            .mutate(user_id, move |wallet, now| {
                wallet.lock(sub, amount)?;
                let tx = WalletTransaction::pending_withdrawal(user_id, sub, amount, now);
                Ok((tx.clone(), vec![tx]))
            })
            .await?;
        tracing::info!(user_id = %user_id, tx_id = %tx.id, sub_wallet = %sub, amount = %tx.amount, "Withdrawal requested");
        Ok(tx)
    }

    /// Unlock the funds of a pending withdrawal
    pub async fn reject_withdrawal(
        &self,
        user_id: UserId,
        tx_id: TransactionId,
    ) -> MiningResult<WalletTransaction> {
        self.resolve_withdrawal(user_id, tx_id, TransactionStatus::Rejected)
            .await
    }

    /// Pay out a pending withdrawal: the locked funds leave the wallet
    pub async fn complete_withdrawal(
        &self,
        user_id: UserId,
        tx_id: TransactionId,
    ) -> MiningResult<WalletTransaction> {
        self.resolve_withdrawal(user_id, tx_id, TransactionStatus::Completed)
            .await
    }

    pub async fn transactions(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> MiningResult<Vec<WalletTransaction>> {
        self.ctx.repo.list_transactions(&user_id, limit).await
    }

    async fn resolve_withdrawal(
        &self,
        user_id: UserId,
        tx_id: TransactionId,
        status: TransactionStatus,
    ) -> MiningResult<WalletTransaction> {
        let guard = self.ctx.locks.lock(user_id).await;
        let now = self.ctx.now();

        let mut tx = self
            .ctx
            .repo
            .find_transaction(&tx_id)
            .await?
            .filter(|tx| tx.user_id == user_id && tx.kind == TransactionKind::Withdrawal)
            .ok_or(MiningError::TransactionNotFound)?;
        tx.resolve(status, now)?;

        let mut profile = self.ctx.load_profile(&user_id).await?;
        let mut wallet = self.ctx.load_wallet(&profile, now).await?;
        let moved = match status {
            TransactionStatus::Completed => wallet.consume_locked(tx.sub_wallet, tx.amount)?,
            _ => wallet.unlock(tx.sub_wallet, tx.amount)?,
        };
        if moved < tx.amount {
            tracing::warn!(user_id = %user_id, tx_id = %tx_id, amount = %tx.amount, %moved, "Withdrawal lock was short");
        }

        sync_cache(&mut profile, &mut wallet, now);
        let changes = ChangeSet::new()
            .wallet(wallet.clone())
            .profile(profile)
            .transaction(tx.clone());
        self.ctx.repo.commit(changes).await?;
        drop(guard);

        tracing::info!(user_id = %user_id, tx_id = %tx_id, status = %status, "Withdrawal resolved");
        self.ctx
            .events
            .publish(MiningEvent::WalletChanged(wallet.snapshot()));
        Ok(tx)
    }

    /// Run `f` against the user's wallet under their lock and commit the
    /// result. `f` either succeeds completely or leaves storage untouched.
    ///
    /// A write that lost to another process is rerun on a fresh read, up to
    /// [`WALLET_WRITE_ATTEMPTS`] times.
    async fn mutate<T, F>(&self, user_id: UserId, f: F) -> MiningResult<(T, WalletSnapshot)>
    where
        T: Send,
        F: Fn(&mut Wallet, DateTime<Utc>) -> MiningResult<(T, Vec<WalletTransaction>)> + Send,
    {
        let guard = self.ctx.locks.lock(user_id).await;
        let mut attempt = 1;
        let (out, wallet) = loop {
            let now = self.ctx.now();
            let mut profile = self.ctx.load_profile(&user_id).await?;
            let mut wallet = self.ctx.load_wallet(&profile, now).await?;
            let (out, txs) = f(&mut wallet, now)?;

            sync_cache(&mut profile, &mut wallet, now);
            let changes = ChangeSet::new()
                .wallet(wallet.clone())
                .profile(profile)
                .transactions(txs);
            match self.ctx.repo.commit(changes).await {
                Ok(()) => break (out, wallet),
                Err(MiningError::StaleWrite) if attempt < WALLET_WRITE_ATTEMPTS => {
                    tracing::warn!(user_id = %user_id, attempt, "Wallet changed underneath, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        drop(guard);

        let snapshot = wallet.snapshot();
        self.ctx
            .events
            .publish(MiningEvent::WalletChanged(snapshot.clone()));
        Ok((out, snapshot))
    }
}

/// Stamp the wallet and mirror its total into the profile cache
pub(crate) fn sync_cache(profile: &mut MinerProfile, wallet: &mut Wallet, now: DateTime<Utc>) {
    wallet.touch(now);
    profile.sync_wallet(wallet, now);
}
