//! In-Memory Repository
//!
//! Process-local store used by tests and local runs without a database.
//! `commit` validates the whole change set before applying any of it, which
//! gives the same all-or-nothing behavior as a SQL transaction. Wallet
//! writes are checked against the stored version like the SQL store does.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::profile::MinerProfile;
use crate::domain::referral::Referral;
use crate::domain::repository::{
    ChangeSet, DueCursor, ProfileRepository, ReferralRepository, SessionRepository, TransactionRepository,
    UnitOfWork, WalletRepository,
};
use crate::domain::session::MiningSession;
use crate::domain::transaction::WalletTransaction;
use crate::domain::value_objects::{MiningSessionId, TransactionId, UserId};
use crate::domain::wallet::Wallet;
use crate::error::{MiningError, MiningResult};

#[derive(Debug, Default)]
struct State {
    wallets: HashMap<UserId, Wallet>,
    profiles: HashMap<UserId, MinerProfile>,
    /// Registration order
    profile_ids: Vec<UserId>,
    /// Insertion order
    sessions: Vec<MiningSession>,
    referrals: Vec<Referral>,
    transactions: Vec<WalletTransaction>,
    /// Users whose commits are refused
    failing: HashSet<UserId>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryMiningRepository {
    state: Arc<RwLock<State>>,
}

impl MemoryMiningRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every commit that touches `user_id` until cleared
    pub async fn fail_commits_for(&self, user_id: UserId) {
        self.state.write().await.failing.insert(user_id);
    }

    pub async fn clear_failures(&self) {
        self.state.write().await.failing.clear();
    }

    pub async fn wallet_count(&self) -> usize {
        self.state.read().await.wallets.len()
    }
}

impl State {
    fn validate(&self, changes: &ChangeSet) -> MiningResult<()> {
        let touched = changes
            .wallets
            .iter()
            .map(|w| w.user_id)
            .chain(changes.profiles.iter().map(|p| p.user_id))
            .chain(changes.sessions.iter().map(|s| s.user_id));
        for user_id in touched {
            if self.failing.contains(&user_id) {
                return Err(MiningError::Internal(format!("store unavailable for {user_id}")));
            }
        }

        for wallet in &changes.wallets {
            let stored = self.wallets.get(&wallet.user_id).map_or(0, |w| w.version);
            if wallet.version != stored {
                return Err(MiningError::StaleWrite);
            }
        }

        if let Some(wallet) = changes.wallets.iter().find(|w| !w.is_consistent()) {
            return Err(MiningError::Internal(format!(
                "ledger constraint violation for {}",
                wallet.user_id
            )));
        }

        for session in changes.sessions.iter().filter(|s| s.is_active()) {
            let conflict = self.sessions.iter().any(|stored| {
                stored.user_id == session.user_id
                    && stored.id != session.id
                    && stored.is_active()
                    && !changes
                        .sessions
                        .iter()
                        .any(|c| c.id == stored.id && !c.is_active())
            });
            if conflict {
                return Err(MiningError::SessionConflict("mining session already active"));
            }
        }

        for profile in &changes.profiles {
            let taken = self.profiles.values().any(|p| {
                p.user_id != profile.user_id && p.referral_code == profile.referral_code
            });
            if taken {
                return Err(MiningError::Internal("duplicate referral code".into()));
            }
        }
        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        for mut wallet in changes.wallets {
            wallet.version += 1;
            self.wallets.insert(wallet.user_id, wallet);
        }
        for profile in changes.profiles {
            if !self.profiles.contains_key(&profile.user_id) {
                self.profile_ids.push(profile.user_id);
            }
            self.profiles.insert(profile.user_id, profile);
        }
        for session in changes.sessions {
            upsert(&mut self.sessions, session, |a, b| a.id == b.id);
        }
        for referral in changes.referrals {
            upsert(&mut self.referrals, referral, |a, b| a.id == b.id);
        }
        for tx in changes.transactions {
            upsert(&mut self.transactions, tx, |a, b| a.id == b.id);
        }
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T, &T) -> bool) {
    match items.iter_mut().find(|existing| same(existing, &item)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

/// Last `limit` items matching `keep`, newest first
fn newest<T: Clone>(items: &[T], limit: usize, keep: impl Fn(&T) -> bool) -> Vec<T> {
    items.iter().rev().filter(|i| keep(i)).take(limit).cloned().collect()
}

impl WalletRepository for MemoryMiningRepository {
    async fn find_wallet(&self, user_id: &UserId) -> MiningResult<Option<Wallet>> {
        Ok(self.state.read().await.wallets.get(user_id).cloned())
    }
}

impl ProfileRepository for MemoryMiningRepository {
    async fn find_profile(&self, user_id: &UserId) -> MiningResult<Option<MinerProfile>> {
        Ok(self.state.read().await.profiles.get(user_id).cloned())
    }

    async fn find_profile_by_referral_code(&self, code: &str) -> MiningResult<Option<MinerProfile>> {
        let code = code.to_ascii_uppercase();
        Ok(self
            .state
            .read()
            .await
            .profiles
            .values()
            .find(|p| p.referral_code == code)
            .cloned())
    }

    async fn list_profile_ids(&self) -> MiningResult<Vec<UserId>> {
        Ok(self.state.read().await.profile_ids.clone())
    }
}

impl SessionRepository for MemoryMiningRepository {
    async fn find_session(&self, session_id: &MiningSessionId) -> MiningResult<Option<MiningSession>> {
        let state = self.state.read().await;
        Ok(state.sessions.iter().find(|s| s.id == *session_id).cloned())
    }

    async fn find_active_session(&self, user_id: &UserId) -> MiningResult<Option<MiningSession>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .iter()
            .find(|s| s.user_id == *user_id && s.is_active())
            .cloned())
    }

    async fn find_latest_session(&self, user_id: &UserId) -> MiningResult<Option<MiningSession>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .iter()
            .rev()
            .find(|s| s.user_id == *user_id)
            .cloned())
    }

    async fn list_due_sessions(
        &self,
        now: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: usize,
    ) -> MiningResult<Vec<MiningSession>> {
        let state = self.state.read().await;
        let mut due: Vec<MiningSession> = state
            .sessions
            .iter()
            .filter(|s| s.is_due(now))
            .filter(|s| after.is_none_or(|cursor| DueCursor::of(s) > cursor))
            .cloned()
            .collect();
        due.sort_by_key(DueCursor::of);
        due.truncate(limit);
        Ok(due)
    }

    async fn list_sessions(&self, user_id: &UserId, limit: usize) -> MiningResult<Vec<MiningSession>> {
        let state = self.state.read().await;
        Ok(newest(&state.sessions, limit, |s| s.user_id == *user_id))
    }
}

impl ReferralRepository for MemoryMiningRepository {
    async fn list_referrals(&self, referrer_id: &UserId) -> MiningResult<Vec<Referral>> {
        let state = self.state.read().await;
        Ok(newest(&state.referrals, usize::MAX, |r| {
            r.referrer_id == *referrer_id
        }))
    }
}

impl TransactionRepository for MemoryMiningRepository {
    async fn find_transaction(&self, tx_id: &TransactionId) -> MiningResult<Option<WalletTransaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.iter().find(|t| t.id == *tx_id).cloned())
    }

    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> MiningResult<Vec<WalletTransaction>> {
        let state = self.state.read().await;
        Ok(newest(&state.transactions, limit, |t| t.user_id == *user_id))
    }
}

impl UnitOfWork for MemoryMiningRepository {
    async fn commit(&self, changes: ChangeSet) -> MiningResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        state.validate(&changes)?;
        state.apply(changes);
        Ok(())
    }
}
