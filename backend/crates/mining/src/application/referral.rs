//! Referral Cascade
//!
//! Signup registers the miner profile and then credits up to two ancestors:
//! the owner of the referral code (direct) and that user's own referrer
//! (indirect). The chain is never followed further. Each beneficiary's
//! credit, provenance record and transaction commit as one unit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::application::context::MiningContext;
use crate::application::events::MiningEvent;
use crate::application::ledger::sync_cache;
use crate::domain::profile::{
    MinerProfile, ProfileSnapshot, generate_referral_code, normalize_referral_code,
};
use crate::domain::referral::Referral;
use crate::domain::repository::{
    ChangeSet, MiningRepository, ProfileRepository, ReferralRepository, UnitOfWork,
};
use crate::domain::transaction::WalletTransaction;
use crate::domain::value_objects::{
    NotificationKind, ReferralKind, ReferralStatus, SubWallet, TransactionKind, UserId,
};
use crate::error::{MiningError, MiningResult};

/// Attempts at drawing an unused referral code
const CODE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub profile: ProfileSnapshot,
    /// Provenance records created for this signup
    pub bonuses: Vec<Referral>,
}

/// Result of one housekeeping pass over referral activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityReport {
    pub referrers: usize,
    pub referrals_updated: usize,
}

pub struct ReferralCascade<R> {
    ctx: MiningContext<R>,
}

impl<R> ReferralCascade<R>
where
    R: MiningRepository,
{
    pub fn new(ctx: MiningContext<R>) -> Self {
        Self { ctx }
    }

    /// Create the miner profile of `user_id` and run the cascade for the
    /// optional referral code. An unknown code registers the user without a
    /// referrer.
    pub async fn register(
        &self,
        user_id: UserId,
        referral_code: Option<&str>,
    ) -> MiningResult<Registration> {
        let settings = self.ctx.settings();

        let referrer = match referral_code.and_then(normalize_referral_code) {
            Some(code) => {
                let found = self.ctx.repo.find_profile_by_referral_code(&code).await?;
                if found.is_none() {
                    tracing::warn!(user_id = %user_id, code = %code, "Unknown referral code ignored");
                }
                found.filter(|p| p.user_id != user_id)
            }
            None => None,
        };

        let profile = {
            let _guard = self.ctx.locks.lock(user_id).await;
            if self.ctx.repo.find_profile(&user_id).await?.is_some() {
                return Err(MiningError::InvalidRequest("user is already registered".into()));
            }
            let now = self.ctx.now();
            let code = self.unused_code().await?;
            let profile = MinerProfile::new(user_id, code, referrer.as_ref().map(|r| r.user_id), now);
            self.ctx
                .repo
                .commit(ChangeSet::new().profile(profile.clone()))
                .await?;
            profile
        };
        tracing::info!(user_id = %user_id, referral_code = %profile.referral_code, "Miner registered");

        let mut bonuses = Vec::with_capacity(2);
        if let Some(referrer) = referrer {
            let grandparent = referrer.referred_by.filter(|gp| *gp != user_id);
            let direct = self
                .credit_beneficiary(
                    referrer.user_id,
                    user_id,
                    ReferralKind::Direct,
                    settings.direct_referral_bonus,
                )
                .await;
            let indirect = match grandparent {
                Some(gp) => Some(
                    self.credit_beneficiary(
                        gp,
                        user_id,
                        ReferralKind::Indirect,
                        settings.indirect_referral_bonus,
                    )
                    .await,
                ),
                None => None,
            };
            for outcome in std::iter::once(direct).chain(indirect) {
                match outcome {
                    Ok(referral) => bonuses.push(referral),
                    // the signup stands; the bonus is logged for manual repair
                    Err(e) => tracing::error!(user_id = %user_id, error = %e, "Referral bonus failed"),
                }
            }
        }

        Ok(Registration {
            profile: profile.snapshot(),
            bonuses,
        })
    }

    /// Credit one ancestor and record why, atomically
    async fn credit_beneficiary(
        &self,
        beneficiary_id: UserId,
        referred_id: UserId,
        kind: ReferralKind,
        bonus: Decimal,
    ) -> MiningResult<Referral> {
        let guard = self.ctx.locks.lock(beneficiary_id).await;
        let now = self.ctx.now();

        let mut profile = self.ctx.load_profile(&beneficiary_id).await?;
        let mut wallet = self.ctx.load_wallet(&profile, now).await?;

        let referral = Referral::new(beneficiary_id, referred_id, kind, bonus, now);
        let mut changes = ChangeSet::new().referral(referral.clone());
        if bonus > Decimal::ZERO {
            wallet.credit(SubWallet::Referral, bonus)?;
            changes = changes.transaction(
                WalletTransaction::completed(
                    beneficiary_id,
                    TransactionKind::ReferralBonus,
                    SubWallet::Referral,
                    bonus,
                    now,
                )
                .with_counterparty(referred_id),
            );
        }
        if kind == ReferralKind::Direct {
            profile.referral_stats.total_count += 1;
            profile.referral_stats.active_count += 1;
        }
        sync_cache(&mut profile, &mut wallet, now);

        self.ctx
            .repo
            .commit(changes.wallet(wallet.clone()).profile(profile))
            .await?;
        drop(guard);

        tracing::info!(
            beneficiary_id = %beneficiary_id,
            referred_id = %referred_id,
            kind = %kind,
            bonus = %bonus,
            "Referral bonus credited"
        );
        self.ctx.events.publish_all([
            MiningEvent::WalletChanged(wallet.snapshot()),
            MiningEvent::notify(
                beneficiary_id,
                NotificationKind::ReferralBonus,
                serde_json::json!({ "referredId": referred_id, "kind": kind, "bonus": bonus }),
            ),
        ]);
        Ok(referral)
    }

    async fn unused_code(&self) -> MiningResult<String> {
        for _ in 0..CODE_ATTEMPTS {
            let code = generate_referral_code();
            if self
                .ctx
                .repo
                .find_profile_by_referral_code(&code)
                .await?
                .is_none()
            {
                return Ok(code);
            }
        }
        Err(MiningError::Internal("could not allocate a referral code".into()))
    }

    /// Newest first
    pub async fn referrals(&self, user_id: UserId) -> MiningResult<Vec<Referral>> {
        self.ctx.load_profile(&user_id).await?;
        self.ctx.repo.list_referrals(&user_id).await
    }

    /// Recompute every referrer's active count and the status of each
    /// direct referral from the referred user's last activity.
    pub async fn refresh_activity(&self) -> MiningResult<ActivityReport> {
        let window = self.ctx.config.activity_window();
        let mut report = ActivityReport::default();
        let mut last_seen: HashMap<UserId, Option<DateTime<Utc>>> = HashMap::new();

        for referrer_id in self.ctx.repo.list_profile_ids().await? {
            let referrals = self.ctx.repo.list_referrals(&referrer_id).await?;
            let directs: Vec<Referral> = referrals
                .into_iter()
                .filter(|r| r.kind == ReferralKind::Direct)
                .collect();
            if directs.is_empty() {
                continue;
            }

            for referral in &directs {
                if !last_seen.contains_key(&referral.referred_id) {
                    let seen = self
                        .ctx
                        .repo
                        .find_profile(&referral.referred_id)
                        .await?
                        .map(|p| p.last_active_at);
                    last_seen.insert(referral.referred_id, seen);
                }
            }

            let guard = self.ctx.locks.lock(referrer_id).await;
            let now = self.ctx.now();
            let Some(mut profile) = self.ctx.repo.find_profile(&referrer_id).await? else {
                continue;
            };

            let mut changes = ChangeSet::new();
            let mut active = 0u32;
            for mut referral in directs {
                let is_active = matches!(
                    last_seen.get(&referral.referred_id),
                    Some(Some(seen)) if now - *seen <= window
                );
                if is_active {
                    active += 1;
                }
                let status = if is_active {
                    ReferralStatus::Active
                } else {
                    ReferralStatus::Inactive
                };
                if referral.set_status(status, now) {
                    changes = changes.referral(referral);
                    report.referrals_updated += 1;
                }
            }

            if profile.referral_stats.active_count != active {
                profile.referral_stats.active_count = active;
                profile.updated_at = now;
                changes = changes.profile(profile);
            }
            if !changes.is_empty() {
                self.ctx.repo.commit(changes).await?;
            }
            drop(guard);

            report.referrers += 1;
            tokio::task::yield_now().await;
        }

        tracing::info!(
            referrers = report.referrers,
            referrals_updated = report.referrals_updated,
            "Referral activity refreshed"
        );
        Ok(report)
    }
}
