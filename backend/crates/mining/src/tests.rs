//! Scenario tests for the mining crate
//! Runs the use cases end to end against the in-memory repository with a
//! manual clock.

#[cfg(test)]
mod support {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::application::{
        Ledger, ManualClock, MiningConfig, MiningContext, NotificationSink, NotifyError,
        ReferralCascade, RewardEngine, Settings, SettingsProvider, Sweeper,
    };
    use crate::domain::profile::MinerProfile;
    use crate::domain::repository::ProfileRepository;
    use crate::domain::value_objects::{NotificationKind, SubWallet, TransactionKind, UserId};
    use crate::domain::wallet::WalletSnapshot;
    use crate::infra::MemoryMiningRepository;

    pub type Repo = MemoryMiningRepository;

    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    pub struct Harness {
        pub repo: Arc<Repo>,
        pub clock: Arc<ManualClock>,
        pub ctx: MiningContext<Repo>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_settings(Settings::default())
        }

        pub fn with_settings(settings: Settings) -> Self {
            Self::with(Arc::new(settings), MiningConfig::default())
        }

        pub fn with(settings: Arc<dyn SettingsProvider>, config: MiningConfig) -> Self {
            let repo = Arc::new(MemoryMiningRepository::new());
            let clock = Arc::new(ManualClock::new(epoch()));
            let ctx = MiningContext::new(repo.clone(), settings, config).with_clock(clock.clone());
            Self { repo, clock, ctx }
        }

        pub fn engine(&self) -> RewardEngine<Repo> {
            RewardEngine::new(self.ctx.clone())
        }

        pub fn ledger(&self) -> Ledger<Repo> {
            Ledger::new(self.ctx.clone())
        }

        pub fn cascade(&self) -> ReferralCascade<Repo> {
            ReferralCascade::new(self.ctx.clone())
        }

        pub fn sweeper(&self) -> Sweeper<Repo> {
            Sweeper::new(self.ctx.clone())
        }

        pub fn advance(&self, by: TimeDelta) {
            self.clock.advance(by);
        }

        pub async fn user(&self) -> UserId {
            let user_id = UserId::new();
            self.cascade().register(user_id, None).await.unwrap();
            user_id
        }

        /// Register with a referral code, returning the new user's own code
        pub async fn referred_user(&self, code: &str) -> (UserId, String) {
            let user_id = UserId::new();
            let registration = self.cascade().register(user_id, Some(code)).await.unwrap();
            (user_id, registration.profile.referral_code)
        }

        pub async fn fund(&self, user_id: UserId, sub: SubWallet, amount: Decimal) {
            self.ledger()
                .credit(user_id, sub, amount, TransactionKind::Adjustment)
                .await
                .unwrap();
        }

        pub async fn wallet(&self, user_id: UserId) -> WalletSnapshot {
            self.ledger().wallet(user_id).await.unwrap()
        }

        pub async fn profile(&self, user_id: UserId) -> MinerProfile {
            self.repo.find_profile(&user_id).await.unwrap().unwrap()
        }

        /// The profile cache must always mirror the wallet
        pub async fn assert_cache_matches(&self, user_id: UserId) {
            let profile = self.profile(user_id).await;
            let wallet = self.wallet(user_id).await;
            assert_eq!(profile.total_coins, wallet.total, "cache diverged for {user_id}");
        }

        /// Start a session and move the clock past its end
        pub async fn due_session(&self, user_id: UserId) {
            self.engine().start(user_id).await.unwrap();
            self.advance(TimeDelta::hours(24));
        }
    }

    /// Notification sink that records calls and can be told to fail
    #[derive(Default)]
    pub struct RecordingSink {
        pub fail: bool,
        pub calls: Mutex<Vec<(UserId, NotificationKind)>>,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn kinds(&self) -> Vec<NotificationKind> {
            self.calls.lock().unwrap().iter().map(|(_, k)| *k).collect()
        }
    }

    impl NotificationSink for RecordingSink {
        async fn notify(
            &self,
            user_id: UserId,
            kind: NotificationKind,
            _payload: serde_json::Value,
        ) -> Result<(), NotifyError> {
            self.calls.lock().unwrap().push((user_id, kind));
            if self.fail {
                return Err(NotifyError::Unavailable("push gateway down".into()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod settlement_tests {
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    use super::support::Harness;
    use crate::application::{MiningEvent, Settings};
    use crate::domain::repository::{SessionRepository, TransactionRepository};
    use crate::domain::value_objects::{NotificationKind, SessionPhase, TransactionKind};
    use crate::error::MiningError;

    #[tokio::test]
    async fn test_claim_credits_expected_coins() {
        let h = Harness::new();
        let user = h.user().await;
        h.due_session(user).await;

        let settlement = h.engine().claim(user).await.unwrap();
        assert_eq!(settlement.coins, dec!(6.0));
        assert_eq!(settlement.session.phase, SessionPhase::Completed);
        assert_eq!(settlement.wallet.mining.balance, dec!(6.0));

        let profile = h.profile(user).await;
        assert_eq!(profile.total_mined, dec!(6.0));
        assert_eq!(profile.streak, 1);
        assert!(profile.current_mining_end_time.is_none());
        h.assert_cache_matches(user).await;

        let txs = h.repo.list_transactions(&user, 10).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].kind, TransactionKind::MiningReward);
    }

    #[tokio::test]
    async fn test_claim_then_sweep_credits_once() {
        let h = Harness::new();
        let user = h.user().await;
        h.due_session(user).await;

        h.engine().claim(user).await.unwrap();
        let report = h.sweeper().sweep_once().await.unwrap();
        assert_eq!(report.settled, 0);

        let again = h.engine().claim(user).await.unwrap_err();
        assert!(again.is_already_settled());
        assert_eq!(h.wallet(user).await.mining.balance, dec!(6.0));
    }

    #[tokio::test]
    async fn test_sweep_then_claim_credits_once() {
        let h = Harness::new();
        let user = h.user().await;
        h.due_session(user).await;
        h.advance(TimeDelta::hours(1));

        let report = h.sweeper().sweep_once().await.unwrap();
        assert_eq!(report.settled, 1);

        let err = h.engine().claim(user).await.unwrap_err();
        assert!(matches!(err, MiningError::AlreadySettled));
        assert_eq!(h.wallet(user).await.mining.balance, dec!(6.0));
        h.assert_cache_matches(user).await;
    }

    #[tokio::test]
    async fn test_settle_same_session_twice() {
        let h = Harness::new();
        let user = h.user().await;
        h.due_session(user).await;
        let session = h.repo.find_active_session(&user).await.unwrap().unwrap();

        h.engine().settle_session(session.id).await.unwrap();
        let err = h.engine().settle_session(session.id).await.unwrap_err();
        assert!(err.is_already_settled());
        assert_eq!(h.wallet(user).await.mining.balance, dec!(6.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claim_and_sweep_credit_once() {
        let h = Harness::new();
        let mut users = Vec::new();
        for _ in 0..16 {
            let user = h.user().await;
            h.engine().start(user).await.unwrap();
            users.push(user);
        }
        h.advance(TimeDelta::hours(24));

        let mut tasks = Vec::new();
        for user in users.iter().copied() {
            let session = h.repo.find_active_session(&user).await.unwrap().unwrap();
            let claimer = h.engine();
            let settler = h.engine();
            tasks.push(tokio::spawn(async move {
                let (claim, sweep) = tokio::join!(
                    claimer.claim(user),
                    settler.settle_session(session.id)
                );
                (claim.is_ok(), sweep.is_ok(), claim.err().or(sweep.err()))
            }));
        }

        for task in tasks {
            let (claimed, swept, loser) = task.await.unwrap();
            assert!(claimed ^ swept, "exactly one path must settle");
            assert!(loser.is_some_and(|e| e.is_already_settled()));
        }
        for user in users {
            assert_eq!(h.wallet(user).await.mining.balance, dec!(6.0));
            assert_eq!(h.repo.list_transactions(&user, 10).await.unwrap().len(), 1);
            h.assert_cache_matches(user).await;
        }
    }

    #[tokio::test]
    async fn test_claim_before_end_is_rejected() {
        let h = Harness::new();
        let user = h.user().await;
        h.engine().start(user).await.unwrap();
        h.advance(TimeDelta::hours(23));

        let err = h.engine().claim(user).await.unwrap_err();
        assert!(matches!(err, MiningError::SessionConflict(_)));
        assert_eq!(h.wallet(user).await.total, dec!(0));
        assert!(h.repo.find_active_session(&user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_claim_without_session() {
        let h = Harness::new();
        let user = h.user().await;
        let err = h.engine().claim(user).await.unwrap_err();
        assert!(matches!(err, MiningError::SessionConflict(_)));
    }

    #[tokio::test]
    async fn test_streak_continues_within_window() {
        let h = Harness::new();
        let user = h.user().await;

        h.due_session(user).await;
        h.engine().claim(user).await.unwrap();
        h.due_session(user).await;
        let second = h.engine().claim(user).await.unwrap();
        assert_eq!(second.streak, 2);

        h.advance(TimeDelta::hours(72));
        h.due_session(user).await;
        let third = h.engine().claim(user).await.unwrap();
        assert_eq!(third.streak, 1);
    }

    #[tokio::test]
    async fn test_level_up_emits_notification_once() {
        let h = Harness::with_settings(Settings {
            mining_rate: dec!(5),
            ..Settings::default()
        });
        let user = h.user().await;
        let mut events = h.ctx.events.subscribe();

        h.due_session(user).await;
        let settlement = h.engine().claim(user).await.unwrap();
        assert_eq!(settlement.coins, dec!(120));
        assert_eq!(settlement.level_up, Some(2));
        assert_eq!(h.profile(user).await.level, 2);

        let mut level_ups = 0;
        while let Ok(event) = events.try_recv() {
            if let MiningEvent::Notify { kind, user_id, .. } = event {
                if kind == NotificationKind::LevelUp {
                    assert_eq!(user_id, user);
                    level_ups += 1;
                }
            }
        }
        assert_eq!(level_ups, 1);

        // 6 more coins stay inside level 2
        let h_small = Harness::new();
        let other = h_small.user().await;
        h_small.due_session(other).await;
        assert_eq!(h_small.engine().claim(other).await.unwrap().level_up, None);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use std::sync::Arc;

    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    use super::support::Harness;
    use crate::application::{MiningConfig, Settings, SharedSettings};
    use crate::domain::value_objects::{SessionPhase, UserId};
    use crate::error::MiningError;

    #[tokio::test]
    async fn test_start_while_active_is_rejected() {
        let h = Harness::new();
        let user = h.user().await;
        let session = h.engine().start(user).await.unwrap();
        assert_eq!(session.expected_coins, dec!(6.0));
        assert_eq!(
            h.profile(user).await.current_mining_end_time,
            Some(session.end_time)
        );

        let err = h.engine().start(user).await.unwrap_err();
        assert!(matches!(err, MiningError::SessionConflict(_)));
    }

    #[tokio::test]
    async fn test_start_while_expired_unsettled_is_rejected() {
        let h = Harness::new();
        let user = h.user().await;
        h.due_session(user).await;

        assert!(h.engine().start(user).await.is_err());
        h.engine().claim(user).await.unwrap();
        assert!(h.engine().start(user).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_then_restart() {
        let h = Harness::new();
        let user = h.user().await;
        h.engine().start(user).await.unwrap();
        h.advance(TimeDelta::hours(20));

        let cancelled = h.engine().cancel(user).await.unwrap();
        assert_eq!(cancelled.phase, SessionPhase::Cancelled);
        assert_eq!(cancelled.coins_earned, dec!(0));
        assert_eq!(h.wallet(user).await.total, dec!(0));
        assert!(h.profile(user).await.current_mining_end_time.is_none());

        let err = h.engine().cancel(user).await.unwrap_err();
        assert!(matches!(err, MiningError::SessionConflict(_)));

        let restarted = h.engine().start(user).await.unwrap();
        assert_eq!(restarted.phase, SessionPhase::Active);
    }

    #[tokio::test]
    async fn test_claim_then_restart() {
        let h = Harness::new();
        let user = h.user().await;
        h.due_session(user).await;
        h.engine().claim(user).await.unwrap();
        assert!(h.engine().start(user).await.is_ok());
    }

    #[tokio::test]
    async fn test_maintenance_blocks_start_only() {
        let shared = Arc::new(SharedSettings::new(Settings::default()));
        let h = Harness::with(shared.clone(), MiningConfig::default());
        let user = h.user().await;
        h.engine().start(user).await.unwrap();

        shared.replace(Settings {
            maintenance_mode: true,
            ..Settings::default()
        });
        h.advance(TimeDelta::hours(24));
        h.engine().claim(user).await.unwrap();

        let err = h.engine().start(user).await.unwrap_err();
        assert!(matches!(err, MiningError::MaintenanceBlocked));
        let status = h.engine().status(user).await.unwrap();
        assert!(status.maintenance);
        assert!(!status.can_start);
    }

    #[tokio::test]
    async fn test_status_reports_phase() {
        let h = Harness::new();
        let user = h.user().await;

        let status = h.engine().status(user).await.unwrap();
        assert!(status.session.is_none());
        assert!(status.can_start);
        assert_eq!(status.quote.expected_coins, dec!(6.0));

        h.engine().start(user).await.unwrap();
        h.advance(TimeDelta::hours(2));
        let status = h.engine().status(user).await.unwrap();
        let session = status.session.unwrap();
        assert_eq!(session.phase, SessionPhase::Active);
        assert_eq!(session.remaining_secs, 22 * 3600);
        assert!(!status.can_start);

        h.advance(TimeDelta::hours(23));
        let session = h.engine().status(user).await.unwrap().session.unwrap();
        assert_eq!(session.phase, SessionPhase::Expired);
        assert_eq!(session.remaining_secs, 0);

        h.engine().claim(user).await.unwrap();
        let status = h.engine().status(user).await.unwrap();
        assert_eq!(status.session.unwrap().phase, SessionPhase::Completed);
        assert!(status.can_start);
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let h = Harness::new();
        let user = h.user().await;
        h.engine().start(user).await.unwrap();
        h.engine().cancel(user).await.unwrap();
        h.advance(TimeDelta::minutes(5));
        h.due_session(user).await;
        h.engine().claim(user).await.unwrap();

        let history = h.engine().history(user, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].phase, SessionPhase::Completed);
        assert_eq!(history[1].phase, SessionPhase::Cancelled);
        assert_eq!(h.engine().history(user, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let h = Harness::new();
        let err = h.engine().start(UserId::new()).await;
        assert!(matches!(err, Err(MiningError::UserNotFound)));
    }
}

#[cfg(test)]
mod boost_tests {
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    use super::support::Harness;
    use crate::application::Settings;
    use crate::domain::repository::{SessionRepository, TransactionRepository};
    use crate::domain::value_objects::{BoostKind, SubWallet, TransactionKind};
    use crate::error::MiningError;

    fn boost_cost(cost: rust_decimal::Decimal) -> Settings {
        Settings {
            boost_cost: cost,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_boost_spills_from_mining_into_purchase() {
        let h = Harness::with_settings(boost_cost(dec!(50)));
        let user = h.user().await;
        h.fund(user, SubWallet::Mining, dec!(30)).await;
        h.fund(user, SubWallet::Purchase, dec!(40)).await;
        h.engine().start(user).await.unwrap();

        let receipt = h.engine().boost(user, BoostKind::Speed).await.unwrap();
        assert_eq!(
            receipt.debited,
            vec![(SubWallet::Mining, dec!(30)), (SubWallet::Purchase, dec!(20))]
        );
        assert_eq!(receipt.wallet.mining.balance, dec!(0));
        assert_eq!(receipt.wallet.purchase.balance, dec!(20));
        assert_eq!(receipt.session.total_rate, dec!(0.375));
        assert_eq!(receipt.session.expected_coins, dec!(9.0));

        let spends = h
            .repo
            .list_transactions(&user, 10)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TransactionKind::BoostSpend)
            .count();
        assert_eq!(spends, 2);
        h.assert_cache_matches(user).await;
    }

    #[tokio::test]
    async fn test_boost_without_funds_changes_nothing() {
        let h = Harness::with_settings(boost_cost(dec!(50)));
        let user = h.user().await;
        h.fund(user, SubWallet::Mining, dec!(30)).await;
        h.fund(user, SubWallet::Referral, dec!(100)).await;
        h.engine().start(user).await.unwrap();

        let err = h.engine().boost(user, BoostKind::Speed).await.unwrap_err();
        assert!(matches!(
            err,
            MiningError::InsufficientBalance { available, .. } if available == dec!(30)
        ));

        let wallet = h.wallet(user).await;
        assert_eq!(wallet.mining.balance, dec!(30));
        assert_eq!(wallet.referral.balance, dec!(100));
        let session = h.repo.find_active_session(&user).await.unwrap().unwrap();
        assert_eq!(session.total_rate, dec!(0.25));
        assert_eq!(session.speed_boosts, 0);
    }

    #[tokio::test]
    async fn test_duration_boost_never_expires_session() {
        let h = Harness::with_settings(boost_cost(dec!(0)));
        let user = h.user().await;
        let started = h.engine().start(user).await.unwrap();

        let first = h.engine().boost(user, BoostKind::Duration).await.unwrap();
        assert_eq!(first.session.end_time, started.end_time - TimeDelta::hours(2));
        assert!(first.debited.is_empty());
        assert_eq!(first.session.expected_coins, dec!(6.0));

        h.advance(TimeDelta::hours(21) + TimeDelta::minutes(30));
        let second = h.engine().boost(user, BoostKind::Duration).await.unwrap();
        assert_eq!(second.session.end_time, h.ctx.now() + TimeDelta::minutes(1));
        assert!(h.engine().claim(user).await.is_err());

        h.advance(TimeDelta::minutes(1));
        assert_eq!(h.engine().claim(user).await.unwrap().coins, dec!(6.0));
        assert!(h.profile(user).await.current_mining_end_time.is_none());
    }

    #[tokio::test]
    async fn test_boost_requires_running_session() {
        let h = Harness::with_settings(boost_cost(dec!(0)));
        let user = h.user().await;
        let err = h.engine().boost(user, BoostKind::Speed).await.unwrap_err();
        assert!(matches!(err, MiningError::SessionConflict(_)));

        h.due_session(user).await;
        let err = h.engine().boost(user, BoostKind::Speed).await.unwrap_err();
        assert!(matches!(err, MiningError::SessionConflict(_)));
    }
}

#[cfg(test)]
mod referral_tests {
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    use super::support::Harness;
    use crate::domain::repository::{ReferralRepository, TransactionRepository};
    use crate::domain::value_objects::{ReferralKind, ReferralStatus, TransactionKind, UserId};
    use crate::error::MiningError;

    #[tokio::test]
    async fn test_cascade_credits_two_ancestors_once() {
        let h = Harness::new();
        let grandparent = UserId::new();
        let code = h
            .cascade()
            .register(grandparent, None)
            .await
            .unwrap()
            .profile
            .referral_code;
        let (parent, parent_code) = h.referred_user(&code).await;

        let gp_before = h.wallet(grandparent).await.referral.balance;
        let parent_before = h.wallet(parent).await.referral.balance;

        let child = UserId::new();
        let registration = h
            .cascade()
            .register(child, Some(&parent_code))
            .await
            .unwrap();

        assert_eq!(registration.bonuses.len(), 2);
        let direct = &registration.bonuses[0];
        let indirect = &registration.bonuses[1];
        assert_eq!((direct.kind, direct.referrer_id), (ReferralKind::Direct, parent));
        assert_eq!(
            (indirect.kind, indirect.referrer_id),
            (ReferralKind::Indirect, grandparent)
        );
        assert_eq!(registration.profile.referred_by, Some(parent));

        assert_eq!(h.wallet(parent).await.referral.balance - parent_before, dec!(50));
        assert_eq!(h.wallet(grandparent).await.referral.balance - gp_before, dec!(25));
        assert_eq!(h.wallet(child).await.total, dec!(0));

        let bonus_txs = h
            .repo
            .list_transactions(&parent, 10)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TransactionKind::ReferralBonus && t.counterparty == Some(child))
            .count();
        assert_eq!(bonus_txs, 1);

        for user in [grandparent, parent, child] {
            h.assert_cache_matches(user).await;
        }
    }

    #[tokio::test]
    async fn test_only_direct_referrals_count_in_stats() {
        let h = Harness::new();
        let root = UserId::new();
        let code = h.cascade().register(root, None).await.unwrap().profile.referral_code;
        let (_, middle_code) = h.referred_user(&code).await;
        h.referred_user(&middle_code).await;

        let stats = h.profile(root).await.referral_stats;
        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.active_count, 1);
        assert_eq!(h.repo.list_referrals(&root).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_code_registers_without_referrer() {
        let h = Harness::new();
        let user = UserId::new();
        let registration = h.cascade().register(user, Some("NOPE0000")).await.unwrap();
        assert!(registration.bonuses.is_empty());
        assert!(registration.profile.referred_by.is_none());
        assert_eq!(registration.profile.referral_code.len(), 8);
    }

    #[tokio::test]
    async fn test_code_is_case_insensitive() {
        let h = Harness::new();
        let owner = UserId::new();
        let code = h.cascade().register(owner, None).await.unwrap().profile.referral_code;
        let registration = h
            .cascade()
            .register(UserId::new(), Some(&code.to_lowercase()))
            .await
            .unwrap();
        assert_eq!(registration.profile.referred_by, Some(owner));
    }

    #[tokio::test]
    async fn test_register_twice_is_rejected() {
        let h = Harness::new();
        let user = h.user().await;
        let err = h.cascade().register(user, None).await.unwrap_err();
        assert!(matches!(err, MiningError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_active_referrals_raise_rate() {
        let h = Harness::new();
        let referrer = UserId::new();
        let code = h.cascade().register(referrer, None).await.unwrap().profile.referral_code;
        for _ in 0..3 {
            h.referred_user(&code).await;
        }

        let status = h.engine().status(referrer).await.unwrap();
        assert_eq!(status.quote.total_rate, dec!(0.40));
        assert_eq!(status.quote.expected_coins, dec!(9.6));
        let session = h.engine().start(referrer).await.unwrap();
        assert_eq!(session.expected_coins, dec!(9.6));
    }

    #[tokio::test]
    async fn test_refresh_activity_tracks_referred_users() {
        let h = Harness::new();
        let referrer = UserId::new();
        let code = h.cascade().register(referrer, None).await.unwrap().profile.referral_code;
        let (referred, _) = h.referred_user(&code).await;

        h.advance(TimeDelta::hours(49));
        let report = h.cascade().refresh_activity().await.unwrap();
        assert_eq!(report.referrals_updated, 1);
        assert_eq!(h.profile(referrer).await.referral_stats.active_count, 0);
        let referrals = h.cascade().referrals(referrer).await.unwrap();
        assert_eq!(referrals[0].status, ReferralStatus::Inactive);
        assert_eq!(referrals[0].coins_earned, dec!(50));

        h.engine().start(referred).await.unwrap();
        h.cascade().refresh_activity().await.unwrap();
        let profile = h.profile(referrer).await;
        assert_eq!(profile.referral_stats.active_count, 1);
        assert_eq!(profile.referral_stats.total_count, 1);
        let referrals = h.cascade().referrals(referrer).await.unwrap();
        assert_eq!(referrals[0].status, ReferralStatus::Active);
    }
}

#[cfg(test)]
mod ledger_tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::support::{Harness, epoch};
    use crate::application::{Ledger, MiningConfig, MiningContext, Settings};
    use crate::domain::profile::MinerProfile;
    use crate::domain::repository::{ChangeSet, TransactionRepository, UnitOfWork};
    use crate::domain::value_objects::{
        DebitSource, SubWallet, TransactionId, TransactionKind, TransactionStatus, UserId,
    };
    use crate::error::MiningError;

    /// Two contexts over one store have separate user locks, like two
    /// server processes sharing a database.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_processes_do_not_lose_credits() {
        let h = Harness::new();
        let user = h.user().await;
        let other = MiningContext::new(
            h.repo.clone(),
            Arc::new(Settings::default()),
            MiningConfig::default(),
        )
        .with_clock(h.clock.clone());

        let mut tasks = Vec::new();
        for ctx in [h.ctx.clone(), other] {
            for _ in 0..10 {
                let ledger = Ledger::new(ctx.clone());
                tasks.push(tokio::spawn(async move {
                    ledger
                        .credit(user, SubWallet::Purchase, dec!(1), TransactionKind::Adjustment)
                        .await
                }));
            }
        }

        let mut credited = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => credited += 1,
                Err(e) => assert!(matches!(e, MiningError::StaleWrite), "unexpected {e}"),
            }
        }
        assert!(credited > 0);
        let wallet = h.wallet(user).await;
        assert_eq!(wallet.purchase.balance, Decimal::from(credited));
        h.assert_cache_matches(user).await;
    }

    #[tokio::test]
    async fn test_overflowing_credit_is_rejected() {
        let h = Harness::new();
        let user = h.user().await;
        h.fund(user, SubWallet::Purchase, Decimal::MAX).await;

        let err = h
            .ledger()
            .credit(user, SubWallet::Mining, dec!(1), TransactionKind::Adjustment)
            .await
            .unwrap_err();
        assert!(matches!(err, MiningError::InvalidAmount(_)));
        assert_eq!(h.wallet(user).await.total, Decimal::MAX);
        assert_eq!(h.repo.list_transactions(&user, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cross_user_transfer_applies_both_sides() {
        let h = Harness::new();
        let (sender, recipient) = (h.user().await, h.user().await);
        h.fund(sender, SubWallet::Mining, dec!(30)).await;
        h.fund(sender, SubWallet::Purchase, dec!(40)).await;

        let receipt = h
            .ledger()
            .transfer_to_user(sender, recipient, DebitSource::Auto, dec!(50))
            .await
            .unwrap();
        assert_eq!(
            receipt.debited,
            vec![(SubWallet::Mining, dec!(30)), (SubWallet::Purchase, dec!(20))]
        );
        assert_eq!(receipt.sender.total, dec!(20));

        let to = h.wallet(recipient).await;
        assert_eq!(to.purchase.balance, dec!(50));
        assert_eq!(to.mining.balance, dec!(0));

        let kinds: Vec<_> = h
            .repo
            .list_transactions(&sender, 10)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TransactionKind::TransferOut)
            .map(|t| t.counterparty)
            .collect();
        assert_eq!(kinds, vec![Some(recipient), Some(recipient)]);
        let incoming = h.repo.list_transactions(&recipient, 10).await.unwrap();
        assert_eq!(incoming[0].kind, TransactionKind::TransferIn);
        assert_eq!(incoming[0].amount, dec!(50));

        h.assert_cache_matches(sender).await;
        h.assert_cache_matches(recipient).await;
    }

    #[tokio::test]
    async fn test_failed_transfer_changes_neither_side() {
        let h = Harness::new();
        let (sender, recipient) = (h.user().await, h.user().await);
        h.fund(sender, SubWallet::Mining, dec!(10)).await;
        h.fund(sender, SubWallet::Purchase, dec!(10)).await;

        let err = h
            .ledger()
            .transfer_to_user(sender, recipient, DebitSource::Only(SubWallet::Mining), dec!(15))
            .await
            .unwrap_err();
        assert!(matches!(err, MiningError::InsufficientBalance { .. }));
        assert_eq!(h.wallet(sender).await.total, dec!(20));
        assert_eq!(h.wallet(recipient).await.total, dec!(0));

        let err = h
            .ledger()
            .transfer_to_user(sender, UserId::new(), DebitSource::Auto, dec!(5))
            .await
            .unwrap_err();
        assert!(matches!(err, MiningError::UserNotFound));
        assert_eq!(h.wallet(sender).await.total, dec!(20));

        let err = h
            .ledger()
            .transfer_to_user(sender, sender, DebitSource::Auto, dec!(5))
            .await
            .unwrap_err();
        assert!(matches!(err, MiningError::InvalidRequest(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_transfers_conserve_coins() {
        let h = Harness::new();
        let (a, b) = (h.user().await, h.user().await);
        h.fund(a, SubWallet::Purchase, dec!(100)).await;
        h.fund(b, SubWallet::Purchase, dec!(100)).await;

        let mut tasks = Vec::new();
        for i in 0..50 {
            let ledger = h.ledger();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    ledger.transfer_to_user(a, b, DebitSource::Auto, dec!(3)).await
                } else {
                    ledger.transfer_to_user(b, a, DebitSource::Auto, dec!(2)).await
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let (wa, wb) = (h.wallet(a).await, h.wallet(b).await);
        assert_eq!(wa.total, dec!(75));
        assert_eq!(wb.total, dec!(125));
        assert_eq!(wa.total + wb.total, dec!(200));
    }

    #[tokio::test]
    async fn test_internal_transfer() {
        let h = Harness::new();
        let user = h.user().await;
        h.fund(user, SubWallet::Mining, dec!(10)).await;

        let wallet = h
            .ledger()
            .transfer_internal(user, SubWallet::Mining, SubWallet::Purchase, dec!(4))
            .await
            .unwrap();
        assert_eq!(wallet.mining.balance, dec!(6));
        assert_eq!(wallet.purchase.balance, dec!(4));

        let ledger = h.ledger();
        assert!(matches!(
            ledger
                .transfer_internal(user, SubWallet::Mining, SubWallet::Mining, dec!(1))
                .await,
            Err(MiningError::InvalidRequest(_))
        ));
        assert!(matches!(
            ledger
                .transfer_internal(user, SubWallet::Mining, SubWallet::Purchase, dec!(7))
                .await,
            Err(MiningError::InsufficientBalance { .. })
        ));
        assert_eq!(h.wallet(user).await.purchase.balance, dec!(4));
        h.assert_cache_matches(user).await;
    }

    #[tokio::test]
    async fn test_withdrawal_lifecycle() {
        let h = Harness::new();
        let user = h.user().await;
        h.fund(user, SubWallet::Mining, dec!(30)).await;
        let ledger = h.ledger();

        let pending = ledger
            .request_withdrawal(user, SubWallet::Mining, dec!(20))
            .await
            .unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);
        let wallet = h.wallet(user).await;
        assert_eq!(wallet.mining.locked, dec!(20));
        assert_eq!(wallet.mining.available, dec!(10));

        // locked funds are not spendable
        assert!(matches!(
            ledger
                .debit(user, DebitSource::Only(SubWallet::Mining), dec!(15), TransactionKind::Adjustment)
                .await,
            Err(MiningError::InsufficientBalance { .. })
        ));

        let rejected = ledger.reject_withdrawal(user, pending.id).await.unwrap();
        assert_eq!(rejected.status, TransactionStatus::Rejected);
        assert_eq!(h.wallet(user).await.mining.locked, dec!(0));
        assert!(matches!(
            ledger.reject_withdrawal(user, pending.id).await,
            Err(MiningError::TransactionNotPending)
        ));

        let paid = ledger
            .request_withdrawal(user, SubWallet::Mining, dec!(20))
            .await
            .unwrap();
        ledger.complete_withdrawal(user, paid.id).await.unwrap();
        let wallet = h.wallet(user).await;
        assert_eq!(wallet.mining.balance, dec!(10));
        assert_eq!(wallet.mining.locked, dec!(0));
        h.assert_cache_matches(user).await;
    }

    #[tokio::test]
    async fn test_withdrawal_rules() {
        let h = Harness::new();
        let (user, other) = (h.user().await, h.user().await);
        h.fund(user, SubWallet::Referral, dec!(50)).await;
        h.fund(user, SubWallet::Purchase, dec!(5)).await;
        let ledger = h.ledger();

        assert!(matches!(
            ledger.request_withdrawal(user, SubWallet::Referral, dec!(10)).await,
            Err(MiningError::NotWithdrawable(SubWallet::Referral))
        ));
        assert!(matches!(
            ledger.request_withdrawal(user, SubWallet::Purchase, dec!(6)).await,
            Err(MiningError::InsufficientBalance { .. })
        ));

        let pending = ledger
            .request_withdrawal(user, SubWallet::Purchase, dec!(5))
            .await
            .unwrap();
        assert!(matches!(
            ledger.complete_withdrawal(other, pending.id).await,
            Err(MiningError::TransactionNotFound)
        ));
        assert!(matches!(
            ledger.complete_withdrawal(user, TransactionId::new()).await,
            Err(MiningError::TransactionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_unlock_clamps_at_zero() {
        let h = Harness::new();
        let user = h.user().await;
        h.fund(user, SubWallet::Purchase, dec!(10)).await;
        let ledger = h.ledger();

        ledger.lock(user, SubWallet::Purchase, dec!(5)).await.unwrap();
        assert_eq!(ledger.unlock(user, SubWallet::Purchase, dec!(8)).await.unwrap(), dec!(5));
        assert_eq!(ledger.unlock(user, SubWallet::Purchase, dec!(8)).await.unwrap(), dec!(0));
        let wallet = h.wallet(user).await;
        assert_eq!(wallet.purchase.locked, dec!(0));
        assert_eq!(wallet.purchase.available, dec!(10));
    }

    #[tokio::test]
    async fn test_invalid_amounts_rejected() {
        let h = Harness::new();
        let user = h.user().await;
        let ledger = h.ledger();
        for amount in [dec!(0), dec!(-3)] {
            assert!(matches!(
                ledger
                    .credit(user, SubWallet::Mining, amount, TransactionKind::Adjustment)
                    .await,
                Err(MiningError::InvalidAmount(_))
            ));
        }
        assert!(h.repo.list_transactions(&user, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wallet_seeded_from_legacy_total() {
        let h = Harness::new();
        let user = UserId::new();
        let mut profile = MinerProfile::new(user, "LEGACY01".into(), None, epoch());
        profile.total_coins = dec!(42);
        h.repo.commit(ChangeSet::new().profile(profile)).await.unwrap();

        assert_eq!(h.wallet(user).await.mining.balance, dec!(42));
        assert_eq!(h.repo.wallet_count().await, 0);

        h.fund(user, SubWallet::Purchase, dec!(8)).await;
        assert_eq!(h.wallet(user).await.total, dec!(50));
        assert_eq!(h.profile(user).await.total_coins, dec!(50));
        assert_eq!(h.repo.wallet_count().await, 1);
    }
}

#[cfg(test)]
mod sweeper_tests {
    use std::time::Duration;

    use chrono::TimeDelta;
    use rust_decimal_macros::dec;
    use tokio::sync::watch;

    use super::support::Harness;
    use crate::application::{MiningConfig, Settings};
    use crate::domain::repository::SessionRepository;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sweep_survives_partial_failure() {
        let h = Harness::new();
        let users = [h.user().await, h.user().await, h.user().await];
        for user in users {
            h.engine().start(user).await.unwrap();
        }
        h.advance(TimeDelta::hours(25));
        h.repo.fail_commits_for(users[1]).await;

        let report = h.sweeper().sweep_once().await.unwrap();
        assert_eq!((report.settled, report.failed), (2, 1));
        assert!(h.repo.find_active_session(&users[1]).await.unwrap().is_some());
        assert_eq!(h.wallet(users[0]).await.mining.balance, dec!(6.0));
        assert_eq!(h.wallet(users[2]).await.mining.balance, dec!(6.0));

        h.repo.clear_failures().await;
        let retry = h.sweeper().sweep_once().await.unwrap();
        assert_eq!((retry.settled, retry.failed), (1, 0));
        assert_eq!(h.wallet(users[1]).await.mining.balance, dec!(6.0));
    }

    #[tokio::test]
    async fn test_failing_sessions_do_not_block_later_batches() {
        let config = MiningConfig {
            sweep_batch_size: 1,
            ..MiningConfig::default()
        };
        let h = Harness::with(Arc::new(Settings::default()), config);
        let stuck = h.user().await;
        let healthy = h.user().await;
        h.engine().start(stuck).await.unwrap();
        h.advance(TimeDelta::minutes(5));
        h.engine().start(healthy).await.unwrap();

        h.advance(TimeDelta::hours(25));
        h.repo.fail_commits_for(stuck).await;

        let report = h.sweeper().sweep_once().await.unwrap();
        assert_eq!((report.settled, report.failed), (1, 1));
        let again = h.sweeper().sweep_once().await.unwrap();
        assert_eq!((again.settled, again.failed), (0, 1));
        assert!(h.repo.find_active_session(&healthy).await.unwrap().is_none());
        assert_eq!(h.wallet(healthy).await.mining.balance, dec!(6.0));
        assert!(h.repo.find_active_session(&stuck).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_drains_multiple_batches() {
        let config = MiningConfig {
            sweep_batch_size: 2,
            ..MiningConfig::default()
        };
        let h = Harness::with(Arc::new(Settings::default()), config);
        let mut users = Vec::new();
        for _ in 0..5 {
            let user = h.user().await;
            h.engine().start(user).await.unwrap();
            users.push(user);
        }

        h.advance(TimeDelta::hours(12));
        assert_eq!(h.sweeper().sweep_once().await.unwrap().settled, 0);

        h.advance(TimeDelta::hours(12));
        assert_eq!(h.sweeper().sweep_once().await.unwrap().settled, 5);
        for user in users {
            assert!(h.repo.find_active_session(&user).await.unwrap().is_none());
            h.assert_cache_matches(user).await;
        }
    }

    #[tokio::test]
    async fn test_housekeeping_resets_stale_streaks() {
        let h = Harness::new();
        let user = h.user().await;
        h.due_session(user).await;
        h.engine().claim(user).await.unwrap();
        assert_eq!(h.profile(user).await.streak, 1);

        h.advance(TimeDelta::hours(24));
        assert_eq!(h.sweeper().housekeeping_once().await.unwrap().streaks_reset, 0);

        h.advance(TimeDelta::hours(48));
        let report = h.sweeper().housekeeping_once().await.unwrap();
        assert_eq!(report.streaks_reset, 1);
        assert_eq!(h.profile(user).await.streak, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = Harness::new();
        let (tx, rx) = watch::channel(false);
        let handle = h.sweeper().spawn(rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}

#[cfg(test)]
mod event_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use super::support::{Harness, RecordingSink};
    use crate::application::{EventDispatcher, LiveChannel, LiveUpdate, Settings};
    use crate::domain::value_objects::{NotificationKind, SessionPhase, SubWallet};

    #[tokio::test]
    async fn test_wallet_changes_reach_live_subscriber() {
        let h = Harness::new();
        let user = h.user().await;
        let live = Arc::new(LiveChannel::new(8));
        let sink = Arc::new(RecordingSink::default());
        EventDispatcher::new(live.clone(), sink).spawn(h.ctx.events.subscribe());
        let mut updates = live.subscribe(user);

        h.fund(user, SubWallet::Mining, dec!(5)).await;

        let update = tokio::time::timeout(Duration::from_secs(1), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(update, LiveUpdate::Wallet(w) if w.mining.balance == dec!(5)));
    }

    #[tokio::test]
    async fn test_session_updates_follow_start() {
        let h = Harness::new();
        let user = h.user().await;
        let live = Arc::new(LiveChannel::new(8));
        EventDispatcher::new(live.clone(), Arc::new(RecordingSink::default()))
            .spawn(h.ctx.events.subscribe());
        let mut updates = live.subscribe(user);

        h.engine().start(user).await.unwrap();
        let update = tokio::time::timeout(Duration::from_secs(1), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(update, LiveUpdate::Session(s) if s.phase == SessionPhase::Active));
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_affect_ledger() {
        let h = Harness::with_settings(Settings {
            mining_rate: dec!(5),
            ..Settings::default()
        });
        let user = h.user().await;
        let sink = Arc::new(RecordingSink::failing());
        EventDispatcher::new(Arc::new(LiveChannel::default()), sink.clone())
            .spawn(h.ctx.events.subscribe());

        h.due_session(user).await;
        let settlement = h.engine().claim(user).await.unwrap();
        assert_eq!(settlement.coins, dec!(120));

        tokio::time::timeout(Duration::from_secs(1), async {
            while sink.kinds().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let kinds = sink.kinds();
        assert!(kinds.contains(&NotificationKind::MiningComplete));
        assert!(kinds.contains(&NotificationKind::LevelUp));
        assert_eq!(h.wallet(user).await.mining.balance, dec!(120));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_affect_ledger() {
        let h = Harness::new();
        let user = h.user().await;
        let live = Arc::new(LiveChannel::new(1));
        EventDispatcher::new(live.clone(), Arc::new(RecordingSink::default()))
            .spawn(h.ctx.events.subscribe());
        drop(live.subscribe(user));

        h.fund(user, SubWallet::Purchase, dec!(1)).await;
        h.fund(user, SubWallet::Purchase, dec!(1)).await;
        assert_eq!(h.wallet(user).await.purchase.balance, dec!(2));
    }
}

#[cfg(test)]
mod router_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::support::{Harness, RecordingSink};
    use crate::application::EventDispatcher;
    use crate::domain::value_objects::{SubWallet, UserId};
    use crate::presentation::{USER_ID_HEADER, mining_router};

    fn request(method: &str, uri: &str, user: Option<UserId>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(h: &Harness, req: Request<Body>) -> (StatusCode, Value) {
        let resp = mining_router(h.ctx.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_live_stream_carries_wallet_updates() {
        let h = Harness::new();
        let user = h.user().await;
        EventDispatcher::new(h.ctx.live.clone(), Arc::new(RecordingSink::default()))
            .spawn(h.ctx.events.subscribe());

        let resp = mining_router(h.ctx.clone())
            .oneshot(request("GET", "/live", Some(user), Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");
        assert_eq!(h.ctx.live.subscriber_count(user), 1);

        h.fund(user, SubWallet::Purchase, dec!(3)).await;
        let mut frames = resp.into_body().into_data_stream();
        let frame = tokio::time::timeout(Duration::from_secs(1), frames.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        let data: Value = serde_json::from_str(text.trim().trim_start_matches("data:")).unwrap();
        assert_eq!(data["type"], "wallet");
        assert_eq!(data["data"]["purchase"]["balance"], "3");

        h.ctx.live.close_all();
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_live_stream_requires_registered_user() {
        let h = Harness::new();
        let resp = mining_router(h.ctx.clone())
            .oneshot(request("GET", "/live", Some(UserId::new()), Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_register_start_and_status() {
        let h = Harness::new();
        let user = UserId::new();

        let (status, body) = send(&h, request("POST", "/users", Some(user), serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["profile"]["referralCode"].as_str().map(str::len), Some(8));

        let (status, body) = send(&h, request("POST", "/mining/start", Some(user), Value::Null)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["phase"], "active");

        let (status, body) = send(&h, request("GET", "/mining/status", Some(user), Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["phase"], "active");
        assert_eq!(body["canStart"], false);
    }

    #[tokio::test]
    async fn test_errors_render_problem_details() {
        let h = Harness::new();
        let user = h.user().await;

        let (status, _) = send(&h, request("GET", "/wallet", None, Value::Null)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&h, request("POST", "/mining/claim", Some(user), Value::Null)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], 409);

        send(&h, request("POST", "/mining/start", Some(user), Value::Null)).await;
        let (status, _) = send(
            &h,
            request("POST", "/mining/boost", Some(user), serde_json::json!({ "type": "speed" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&h, request("GET", "/wallet", Some(UserId::new()), Value::Null)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_transfer_and_transactions() {
        let h = Harness::new();
        let (sender, recipient) = (h.user().await, h.user().await);
        h.fund(sender, SubWallet::Mining, dec!(8)).await;

        let (status, body) = send(
            &h,
            request(
                "POST",
                "/wallet/transfer",
                Some(sender),
                serde_json::json!({ "recipientId": recipient, "amount": "5" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["debited"][0]["wallet"], "mining");

        let (status, body) = send(
            &h,
            request("GET", "/wallet/transactions?limit=5", Some(recipient), Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["kind"], "transfer_in");

        let (status, body) = send(
            &h,
            request(
                "POST",
                "/wallet/withdraw",
                Some(sender),
                serde_json::json!({ "wallet": "mining", "amount": "2" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "pending");
        assert_eq!(h.wallet(sender).await.mining.locked, dec!(2));
    }
}
