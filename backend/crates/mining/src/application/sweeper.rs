//! Background Sweeper
//!
//! Settles sessions nobody claimed through the same path as an interactive
//! claim, and runs referral and streak housekeeping on a slower cadence.
//! A failing session is logged and left `active` for the next tick.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::application::context::MiningContext;
use crate::application::engine::RewardEngine;
use crate::application::referral::{ActivityReport, ReferralCascade};
use crate::domain::repository::{DueCursor, MiningRepository, SessionRepository};
use crate::error::MiningResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub settled: usize,
    /// Lost the race to an interactive claim
    pub already_settled: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub activity: ActivityReport,
    pub streaks_reset: usize,
}

pub struct Sweeper<R> {
    ctx: MiningContext<R>,
    engine: RewardEngine<R>,
    cascade: ReferralCascade<R>,
}

impl<R> Sweeper<R>
where
    R: MiningRepository,
{
    pub fn new(ctx: MiningContext<R>) -> Self {
        Self {
            engine: RewardEngine::new(ctx.clone()),
            cascade: ReferralCascade::new(ctx.clone()),
            ctx,
        }
    }

    /// Settle every session that is due now
    ///
    /// Pages through the due sessions by `(end_time, id)`, so a session that
    /// keeps failing is passed over instead of refetched.
    pub async fn sweep_once(&self) -> MiningResult<SweepReport> {
        let batch_size = self.ctx.config.sweep_batch_size.max(1);
        let now = self.ctx.now();
        let mut report = SweepReport::default();
        let mut cursor: Option<DueCursor> = None;

        loop {
            let due = self
                .ctx
                .repo
                .list_due_sessions(now, cursor, batch_size)
                .await?;
            let Some(last) = due.last() else {
                break;
            };
            cursor = Some(DueCursor::of(last));

            for session in due {
                match self.engine.settle_session(session.id).await {
                    Ok(_) => report.settled += 1,
                    Err(e) if e.is_already_settled() => {
                        tracing::debug!(session_id = %session.id, "Session already settled");
                        report.already_settled += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            session_id = %session.id,
                            user_id = %session.user_id,
                            error = %e,
                            "Sweep settlement failed, retrying next tick"
                        );
                        report.failed += 1;
                    }
                }
                tokio::task::yield_now().await;
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                settled = report.settled,
                already_settled = report.already_settled,
                failed = report.failed,
                "Sweep finished"
            );
        }
        Ok(report)
    }

    pub async fn housekeeping_once(&self) -> MiningResult<HousekeepingReport> {
        let activity = self.cascade.refresh_activity().await?;
        let streaks_reset = self.engine.reset_stale_streaks().await?;
        Ok(HousekeepingReport {
            activity,
            streaks_reset,
        })
    }

    /// Tick until `shutdown` flips to true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut sweep = interval(self.ctx.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut housekeeping = interval(self.ctx.config.housekeeping_interval);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            sweep_interval = ?self.ctx.config.sweep_interval,
            housekeeping_interval = ?self.ctx.config.housekeeping_interval,
            "Sweeper started"
        );

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Sweep failed");
                    }
                }
                _ = housekeeping.tick() => {
                    if let Err(e) = self.housekeeping_once().await {
                        tracing::error!(error = %e, "Housekeeping failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Sweeper stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
