//! Repository Traits
//!
//! Interfaces for data persistence. Implementations live in the
//! infrastructure layer.
//!
//! Reads go through the per-entity traits. Every write goes through
//! [`UnitOfWork::commit`], so that a wallet change and the records that
//! explain it (session, referral, transaction, profile cache) become visible
//! together or not at all.

use chrono::{DateTime, Utc};

use crate::domain::profile::MinerProfile;
use crate::domain::referral::Referral;
use crate::domain::session::MiningSession;
use crate::domain::transaction::WalletTransaction;
use crate::domain::value_objects::{MiningSessionId, TransactionId, UserId};
use crate::domain::wallet::Wallet;
use crate::error::MiningResult;

/// Position in the due-session order, taken from the last session of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DueCursor {
    pub end_time: DateTime<Utc>,
    pub session_id: MiningSessionId,
}

impl DueCursor {
    pub fn of(session: &MiningSession) -> Self {
        Self {
            end_time: session.end_time,
            session_id: session.id,
        }
    }
}

/// Wallet repository trait
#[trait_variant::make(WalletRepository: Send)]
pub trait LocalWalletRepository {
    async fn find_wallet(&self, user_id: &UserId) -> MiningResult<Option<Wallet>>;
}

/// Miner profile repository trait
#[trait_variant::make(ProfileRepository: Send)]
pub trait LocalProfileRepository {
    async fn find_profile(&self, user_id: &UserId) -> MiningResult<Option<MinerProfile>>;

    /// Case-normalized referral code lookup
    async fn find_profile_by_referral_code(&self, code: &str) -> MiningResult<Option<MinerProfile>>;

    async fn list_profile_ids(&self) -> MiningResult<Vec<UserId>>;
}

/// Mining session repository trait
#[trait_variant::make(SessionRepository: Send)]
pub trait LocalSessionRepository {
    async fn find_session(&self, session_id: &MiningSessionId) -> MiningResult<Option<MiningSession>>;

    /// The single `active` session of a user, if any
    async fn find_active_session(&self, user_id: &UserId) -> MiningResult<Option<MiningSession>>;

    /// Most recent session of a user regardless of status
    async fn find_latest_session(&self, user_id: &UserId) -> MiningResult<Option<MiningSession>>;

    /// Active sessions whose end time is at or before `now`, ordered by
    /// `(end_time, id)` and strictly after `after` when given
    async fn list_due_sessions(
        &self,
        now: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: usize,
    ) -> MiningResult<Vec<MiningSession>>;

    /// Newest first
    async fn list_sessions(&self, user_id: &UserId, limit: usize) -> MiningResult<Vec<MiningSession>>;
}

/// Referral repository trait
#[trait_variant::make(ReferralRepository: Send)]
pub trait LocalReferralRepository {
    /// Newest first
    async fn list_referrals(&self, referrer_id: &UserId) -> MiningResult<Vec<Referral>>;
}

/// Wallet transaction repository trait
#[trait_variant::make(TransactionRepository: Send)]
pub trait LocalTransactionRepository {
    async fn find_transaction(&self, tx_id: &TransactionId) -> MiningResult<Option<WalletTransaction>>;

    /// Newest first
    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> MiningResult<Vec<WalletTransaction>>;
}

/// Records written together by one core operation
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub wallets: Vec<Wallet>,
    pub profiles: Vec<MinerProfile>,
    pub sessions: Vec<MiningSession>,
    pub referrals: Vec<Referral>,
    pub transactions: Vec<WalletTransaction>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wallet(mut self, wallet: Wallet) -> Self {
        self.wallets.push(wallet);
        self
    }

    pub fn profile(mut self, profile: MinerProfile) -> Self {
        self.profiles.push(profile);
        self
    }

    pub fn session(mut self, session: MiningSession) -> Self {
        self.sessions.push(session);
        self
    }

    pub fn referral(mut self, referral: Referral) -> Self {
        self.referrals.push(referral);
        self
    }

    pub fn transaction(mut self, tx: WalletTransaction) -> Self {
        self.transactions.push(tx);
        self
    }

    pub fn transactions(mut self, txs: impl IntoIterator<Item = WalletTransaction>) -> Self {
        self.transactions.extend(txs);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
            && self.profiles.is_empty()
            && self.sessions.is_empty()
            && self.referrals.is_empty()
            && self.transactions.is_empty()
    }
}

/// Atomic multi-record write
#[trait_variant::make(UnitOfWork: Send)]
pub trait LocalUnitOfWork {
    /// Upsert every record in `changes` as one atomic unit
    async fn commit(&self, changes: ChangeSet) -> MiningResult<()>;
}

/// Everything the core needs from storage
pub trait MiningRepository:
    WalletRepository
    + ProfileRepository
    + SessionRepository
    + ReferralRepository
    + TransactionRepository
    + UnitOfWork
    + Send
    + Sync
    + 'static
{
}

impl<T> MiningRepository for T where
    T: WalletRepository
        + ProfileRepository
        + SessionRepository
        + ReferralRepository
        + TransactionRepository
        + UnitOfWork
        + Send
        + Sync
        + 'static
{
}
