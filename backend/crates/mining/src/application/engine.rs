//! Reward Engine
//!
//! Session lifecycle: start, claim, cancel and boost. Interactive claims and
//! the sweeper share [`RewardEngine::settle_locked`], and both run it under
//! the owner's lock after re-reading the session, so whichever caller comes
//! second sees a non-active session and gets `AlreadySettled`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::application::context::MiningContext;
use crate::application::events::MiningEvent;
use crate::application::ledger::sync_cache;
use crate::domain::profile::{MinerProfile, ProfileSnapshot};
use crate::domain::repository::{
    ChangeSet, MiningRepository, ProfileRepository, SessionRepository, UnitOfWork,
};
use crate::domain::services::{RateCalculator, RateInputs, RateQuote, level_for, next_streak};
use crate::domain::session::{MiningSession, SessionSnapshot};
use crate::domain::transaction::WalletTransaction;
use crate::domain::value_objects::{
    BoostKind, DebitSource, MiningSessionId, NotificationKind, SessionStatus, SubWallet,
    TransactionKind, UserId,
};
use crate::domain::wallet::WalletSnapshot;
use crate::error::{MiningError, MiningResult};

/// Read model behind `GET /mining/status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningStatus {
    /// Active session, or the most recent one when none is active
    pub session: Option<SessionSnapshot>,
    /// Rate a session started now would get
    pub quote: RateQuote,
    pub can_start: bool,
    pub maintenance: bool,
    pub profile: ProfileSnapshot,
    pub wallet: WalletSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub session: SessionSnapshot,
    pub coins: Decimal,
    /// New level when the settlement crossed a level boundary
    pub level_up: Option<u32>,
    pub streak: u32,
    pub wallet: WalletSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostReceipt {
    pub kind: BoostKind,
    pub cost: Decimal,
    /// Amount taken from each sub-wallet, in debit order
    pub debited: Vec<(SubWallet, Decimal)>,
    pub session: SessionSnapshot,
    pub wallet: WalletSnapshot,
}

pub struct RewardEngine<R> {
    ctx: MiningContext<R>,
}

impl<R> RewardEngine<R>
where
    R: MiningRepository,
{
    pub fn new(ctx: MiningContext<R>) -> Self {
        Self { ctx }
    }

    /// Rate a session started now would get
    pub fn quote(&self, profile: &MinerProfile, base_rate: Decimal, cycle_hours: u32) -> RateQuote {
        let inputs = RateInputs {
            active_referrals: profile.referral_stats.active_count,
            level: profile.level,
            extra_boost: Decimal::ZERO,
        };
        RateCalculator::quote(base_rate, cycle_hours, &inputs)
    }

    pub async fn status(&self, user_id: UserId) -> MiningResult<MiningStatus> {
        let settings = self.ctx.settings();
        let now = self.ctx.now();
        let profile = self.ctx.load_profile(&user_id).await?;
        let wallet = self.ctx.load_wallet(&profile, now).await?;

        let active = self.ctx.repo.find_active_session(&user_id).await?;
        let can_start = active.is_none() && !settings.maintenance_mode;
        let session = match active {
            Some(session) => Some(session),
            None => self.ctx.repo.find_latest_session(&user_id).await?,
        };

        Ok(MiningStatus {
            session: session.map(|s| s.snapshot(now)),
            quote: self.quote(&profile, settings.mining_rate, settings.mining_cycle_hours),
            can_start,
            maintenance: settings.maintenance_mode,
            profile: profile.snapshot(),
            wallet: wallet.snapshot(),
        })
    }

    /// Start a new cycle. Rejected while any session is still active,
    /// including one past its end time that nobody has settled yet.
    pub async fn start(&self, user_id: UserId) -> MiningResult<SessionSnapshot> {
        let settings = self.ctx.settings();
        if settings.maintenance_mode {
            return Err(MiningError::MaintenanceBlocked);
        }

        let guard = self.ctx.locks.lock(user_id).await;
        let now = self.ctx.now();
        let mut profile = self.ctx.load_profile(&user_id).await?;
        if self.ctx.repo.find_active_session(&user_id).await?.is_some() {
            return Err(MiningError::SessionConflict("mining session already active"));
        }

        let quote = self.quote(&profile, settings.mining_rate, settings.mining_cycle_hours);
        let session = MiningSession::start(user_id, &quote, now);
        profile.current_mining_end_time = Some(session.end_time);
        profile.record_activity(now);

        self.ctx
            .repo
            .commit(ChangeSet::new().session(session.clone()).profile(profile))
            .await?;
        drop(guard);

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            total_rate = %session.total_rate,
            expected_coins = %session.expected_coins,
            "Mining session started"
        );
        let snapshot = session.snapshot(now);
        self.ctx
            .events
            .publish(MiningEvent::SessionChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Interactive settlement of the user's due session
    pub async fn claim(&self, user_id: UserId) -> MiningResult<Settlement> {
        let guard = self.ctx.locks.lock(user_id).await;
        let now = self.ctx.now();

        let Some(session) = self.ctx.repo.find_active_session(&user_id).await? else {
            let latest = self.ctx.repo.find_latest_session(&user_id).await?;
            return Err(match latest {
                Some(s) if s.status == SessionStatus::Completed => MiningError::AlreadySettled,
                _ => MiningError::SessionConflict("no active mining session"),
            });
        };

        let (settlement, events) = self.settle_locked(session, now).await?;
        drop(guard);

        self.ctx.events.publish_all(events);
        Ok(settlement)
    }

    /// Sweep-path settlement of one session by id
    pub async fn settle_session(&self, session_id: MiningSessionId) -> MiningResult<Settlement> {
        let session = self
            .ctx
            .repo
            .find_session(&session_id)
            .await?
            .ok_or(MiningError::SessionConflict("mining session not found"))?;

        let guard = self.ctx.locks.lock(session.user_id).await;
        let now = self.ctx.now();
        // re-read: a claim may have won while we waited for the lock
        let session = self
            .ctx
            .repo
            .find_session(&session_id)
            .await?
            .ok_or(MiningError::SessionConflict("mining session not found"))?;

        let (settlement, events) = self.settle_locked(session, now).await?;
        drop(guard);

        self.ctx.events.publish_all(events);
        Ok(settlement)
    }

    /// `active -> completed`. Caller holds the owner's lock.
    async fn settle_locked(
        &self,
        mut session: MiningSession,
        now: DateTime<Utc>,
    ) -> MiningResult<(Settlement, Vec<MiningEvent>)> {
        let user_id = session.user_id;
        let coins = session.settle(now)?;

        let mut profile = self.ctx.load_profile(&user_id).await?;
        let mut wallet = self.ctx.load_wallet(&profile, now).await?;

        let mut txs = Vec::new();
        if coins > Decimal::ZERO {
            wallet.credit(SubWallet::Mining, coins)?;
            txs.push(WalletTransaction::completed(
                user_id,
                TransactionKind::MiningReward,
                SubWallet::Mining,
                coins,
                now,
            ));
        }

        let previous_level = profile.level;
        profile.total_mined = profile
            .total_mined
            .checked_add(coins)
            .ok_or(MiningError::InvalidAmount(coins))?;
        profile.streak = next_streak(
            profile.streak,
            profile.last_mining_end,
            now,
            self.ctx.config.streak_window(),
        );
        profile.level = level_for(profile.total_mined, self.ctx.config.level_step).max(previous_level);
        profile.last_mining_end = Some(session.end_time);
        profile.current_mining_end_time = None;
        profile.record_activity(now);
        sync_cache(&mut profile, &mut wallet, now);

        let level_up = (profile.level > previous_level).then_some(profile.level);
        let streak = profile.streak;

        let changes = ChangeSet::new()
            .session(session.clone())
            .wallet(wallet.clone())
            .profile(profile)
            .transactions(txs);
        self.ctx.repo.commit(changes).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            coins = %coins,
            streak,
            "Mining session settled"
        );

        let snapshot = session.snapshot(now);
        let wallet = wallet.snapshot();
        let mut events = vec![
            MiningEvent::WalletChanged(wallet.clone()),
            MiningEvent::SessionChanged(snapshot.clone()),
            MiningEvent::notify(
                user_id,
                NotificationKind::MiningComplete,
                serde_json::json!({ "sessionId": session.id, "coins": coins }),
            ),
        ];
        if let Some(level) = level_up {
            tracing::info!(user_id = %user_id, level, "Level up");
            events.push(MiningEvent::notify(
                user_id,
                NotificationKind::LevelUp,
                serde_json::json!({ "level": level, "previousLevel": previous_level }),
            ));
        }

        Ok((
            Settlement {
                session: snapshot,
                coins,
                level_up,
                streak,
                wallet,
            },
            events,
        ))
    }

    /// Abandon the active session. Nothing is credited.
    pub async fn cancel(&self, user_id: UserId) -> MiningResult<SessionSnapshot> {
        let guard = self.ctx.locks.lock(user_id).await;
        let now = self.ctx.now();

        let mut session = self
            .ctx
            .repo
            .find_active_session(&user_id)
            .await?
            .ok_or(MiningError::SessionConflict("no active mining session"))?;
        session.cancel(now)?;

        let mut profile = self.ctx.load_profile(&user_id).await?;
        profile.current_mining_end_time = None;
        profile.record_activity(now);

        self.ctx
            .repo
            .commit(ChangeSet::new().session(session.clone()).profile(profile))
            .await?;
        drop(guard);

        tracing::info!(user_id = %user_id, session_id = %session.id, "Mining session cancelled");
        let snapshot = session.snapshot(now);
        self.ctx
            .events
            .publish(MiningEvent::SessionChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Pay the boost cost (mining first, then purchase) and apply the boost
    pub async fn boost(&self, user_id: UserId, kind: BoostKind) -> MiningResult<BoostReceipt> {
        let settings = self.ctx.settings();
        let config = self.ctx.config.clone();

        let guard = self.ctx.locks.lock(user_id).await;
        let now = self.ctx.now();

        let mut session = self
            .ctx
            .repo
            .find_active_session(&user_id)
            .await?
            .ok_or(MiningError::SessionConflict("no active mining session"))?;
        session.ensure_boostable(now)?;

        let mut profile = self.ctx.load_profile(&user_id).await?;
        let mut wallet = self.ctx.load_wallet(&profile, now).await?;

        let cost = settings.boost_cost;
        let debited = if cost > Decimal::ZERO {
            wallet.debit_from(DebitSource::Auto, cost)?
        } else {
            Vec::new()
        };
        session.apply_boost(
            kind,
            config.speed_boost_multiplier,
            config.duration_boost_offset(),
            config.min_remaining_guard(),
            now,
        )?;

        let txs = debited.iter().map(|(sub, part)| {
            WalletTransaction::completed(user_id, TransactionKind::BoostSpend, *sub, *part, now)
        });
        profile.current_mining_end_time = Some(session.end_time);
        profile.record_activity(now);
        sync_cache(&mut profile, &mut wallet, now);

        let mut changes = ChangeSet::new()
            .session(session.clone())
            .profile(profile)
            .transactions(txs);
        if !debited.is_empty() {
            changes = changes.wallet(wallet.clone());
        }
        self.ctx.repo.commit(changes).await?;
        drop(guard);

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            kind = %kind,
            cost = %cost,
            total_rate = %session.total_rate,
            end_time = %session.end_time,
            "Mining session boosted"
        );

        let snapshot = session.snapshot(now);
        let wallet = wallet.snapshot();
        self.ctx.events.publish_all([
            MiningEvent::WalletChanged(wallet.clone()),
            MiningEvent::SessionChanged(snapshot.clone()),
            MiningEvent::notify(
                user_id,
                NotificationKind::Boost,
                serde_json::json!({ "sessionId": session.id, "kind": kind, "cost": cost }),
            ),
        ]);

        Ok(BoostReceipt {
            kind,
            cost,
            debited,
            session: snapshot,
            wallet,
        })
    }

    /// Newest first
    pub async fn history(&self, user_id: UserId, limit: usize) -> MiningResult<Vec<SessionSnapshot>> {
        let now = self.ctx.now();
        self.ctx.load_profile(&user_id).await?;
        let sessions = self.ctx.repo.list_sessions(&user_id, limit).await?;
        Ok(sessions.into_iter().map(|s| s.snapshot(now)).collect())
    }

    /// Zero the streak of every user whose last completed session ended
    /// outside the streak window. Returns how many streaks were reset.
    pub async fn reset_stale_streaks(&self) -> MiningResult<usize> {
        let window = self.ctx.config.streak_window();
        let mut reset = 0;

        for user_id in self.ctx.repo.list_profile_ids().await? {
            let guard = self.ctx.locks.lock(user_id).await;
            let now = self.ctx.now();
            let Some(mut profile) = self.ctx.repo.find_profile(&user_id).await? else {
                continue;
            };
            let stale = match profile.last_mining_end {
                Some(end) => now - end > window,
                None => true,
            };
            if profile.streak > 0 && stale {
                profile.streak = 0;
                profile.updated_at = now;
                self.ctx.repo.commit(ChangeSet::new().profile(profile)).await?;
                reset += 1;
            }
            drop(guard);
            tokio::task::yield_now().await;
        }

        if reset > 0 {
            tracing::info!(reset, "Stale streaks reset");
        }
        Ok(reset)
    }
}
