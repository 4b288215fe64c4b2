//! PostgreSQL Repository Implementation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::profile::{MinerProfile, ReferralStats};
use crate::domain::referral::Referral;
use crate::domain::repository::{
    ChangeSet, DueCursor, ProfileRepository, ReferralRepository, SessionRepository, TransactionRepository,
    UnitOfWork, WalletRepository,
};
use crate::domain::session::MiningSession;
use crate::domain::transaction::WalletTransaction;
use crate::domain::value_objects::{MiningSessionId, ReferralId, TransactionId, UserId};
use crate::domain::wallet::{SubBalance, Wallet};
use crate::error::{MiningError, MiningResult};

/// Partial unique index guarding one active session per user
const ONE_ACTIVE_SESSION: &str = "mining_sessions_one_active";

/// PostgreSQL-backed mining repository
#[derive(Clone)]
pub struct PgMiningRepository {
    pool: PgPool,
}

impl PgMiningRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Read Repositories
// ============================================================================

impl WalletRepository for PgMiningRepository {
    async fn find_wallet(&self, user_id: &UserId) -> MiningResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            SELECT
                user_id,
                mining_balance, mining_locked, mining_earned,
                purchase_balance, purchase_locked, purchase_earned,
                referral_balance, referral_locked, referral_earned,
                version,
                created_at,
                updated_at
            FROM mining_wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(WalletRow::into_wallet))
    }
}

impl ProfileRepository for PgMiningRepository {
    async fn find_profile(&self, user_id: &UserId) -> MiningResult<Option<MinerProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT
                user_id,
                referral_code,
                referred_by,
                total_coins,
                total_mined,
                level,
                streak,
                last_mining_end,
                current_mining_end_time,
                referral_total_count,
                referral_active_count,
                last_active_at,
                created_at,
                updated_at
            FROM miner_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_profile()).transpose()
    }

    async fn find_profile_by_referral_code(&self, code: &str) -> MiningResult<Option<MinerProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT
                user_id,
                referral_code,
                referred_by,
                total_coins,
                total_mined,
                level,
                streak,
                last_mining_end,
                current_mining_end_time,
                referral_total_count,
                referral_active_count,
                last_active_at,
                created_at,
                updated_at
            FROM miner_profiles
            WHERE referral_code = UPPER($1)
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_profile()).transpose()
    }

    async fn list_profile_ids(&self) -> MiningResult<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM miner_profiles ORDER BY created_at, user_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }
}

impl SessionRepository for PgMiningRepository {
    async fn find_session(&self, session_id: &MiningSessionId) -> MiningResult<Option<MiningSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id, user_id, start_time, end_time, cycle_hours,
                base_rate, referral_boost_rate, level_boost_rate, total_rate,
                expected_coins, coins_earned, status,
                speed_boosts, duration_boosts, settled_at
            FROM mining_sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_session()).transpose()
    }

    async fn find_active_session(&self, user_id: &UserId) -> MiningResult<Option<MiningSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id, user_id, start_time, end_time, cycle_hours,
                base_rate, referral_boost_rate, level_boost_rate, total_rate,
                expected_coins, coins_earned, status,
                speed_boosts, duration_boosts, settled_at
            FROM mining_sessions
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_session()).transpose()
    }

    async fn find_latest_session(&self, user_id: &UserId) -> MiningResult<Option<MiningSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id, user_id, start_time, end_time, cycle_hours,
                base_rate, referral_boost_rate, level_boost_rate, total_rate,
                expected_coins, coins_earned, status,
                speed_boosts, duration_boosts, settled_at
            FROM mining_sessions
            WHERE user_id = $1
            ORDER BY start_time DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_session()).transpose()
    }

    async fn list_due_sessions(
        &self,
        now: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: usize,
    ) -> MiningResult<Vec<MiningSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id, user_id, start_time, end_time, cycle_hours,
                base_rate, referral_boost_rate, level_boost_rate, total_rate,
                expected_coins, coins_earned, status,
                speed_boosts, duration_boosts, settled_at
            FROM mining_sessions
            WHERE status = 'active' AND end_time <= $1
              AND ($2::timestamptz IS NULL OR (end_time, session_id) > ($2, $3))
            ORDER BY end_time, session_id
            LIMIT $4
            "#,
        )
        .bind(now)
        .bind(after.map(|c| c.end_time))
        .bind(after.map(|c| c.session_id.into_uuid()))
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    async fn list_sessions(&self, user_id: &UserId, limit: usize) -> MiningResult<Vec<MiningSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id, user_id, start_time, end_time, cycle_hours,
                base_rate, referral_boost_rate, level_boost_rate, total_rate,
                expected_coins, coins_earned, status,
                speed_boosts, duration_boosts, settled_at
            FROM mining_sessions
            WHERE user_id = $1
            ORDER BY start_time DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }
}

impl ReferralRepository for PgMiningRepository {
    async fn list_referrals(&self, referrer_id: &UserId) -> MiningResult<Vec<Referral>> {
        let rows = sqlx::query_as::<_, ReferralRow>(
            r#"
            SELECT
                referral_id, referrer_id, referred_id, kind,
                coins_earned, status, created_at, updated_at
            FROM referrals
            WHERE referrer_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(referrer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReferralRow::into_referral).collect()
    }
}

impl TransactionRepository for PgMiningRepository {
    async fn find_transaction(&self, tx_id: &TransactionId) -> MiningResult<Option<WalletTransaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT
                tx_id, user_id, kind, sub_wallet, amount,
                status, counterparty, created_at, updated_at
            FROM wallet_transactions
            WHERE tx_id = $1
            "#,
        )
        .bind(tx_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_transaction()).transpose()
    }

    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> MiningResult<Vec<WalletTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT
                tx_id, user_id, kind, sub_wallet, amount,
                status, counterparty, created_at, updated_at
            FROM wallet_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }
}

// ============================================================================
// Unit of Work
// ============================================================================

impl UnitOfWork for PgMiningRepository {
    async fn commit(&self, changes: ChangeSet) -> MiningResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        // parents before children so foreign keys hold
        for profile in &changes.profiles {
            upsert_profile(&mut tx, profile).await.map_err(map_db_error)?;
        }
        for wallet in &changes.wallets {
            let applied = upsert_wallet(&mut tx, wallet).await.map_err(map_db_error)?;
            if !applied {
                return Err(MiningError::StaleWrite);
            }
        }
        for session in &changes.sessions {
            let applied = upsert_session(&mut tx, session).await.map_err(map_db_error)?;
            if !applied {
                // another process moved the session out of `active` first
                return Err(MiningError::AlreadySettled);
            }
        }
        for referral in &changes.referrals {
            upsert_referral(&mut tx, referral).await.map_err(map_db_error)?;
        }
        for record in &changes.transactions {
            upsert_transaction(&mut tx, record).await.map_err(map_db_error)?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn upsert_profile(
    tx: &mut Transaction<'_, Postgres>,
    profile: &MinerProfile,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO miner_profiles (
            user_id, referral_code, referred_by, total_coins, total_mined,
            level, streak, last_mining_end, current_mining_end_time,
            referral_total_count, referral_active_count,
            last_active_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (user_id) DO UPDATE SET
            total_coins = EXCLUDED.total_coins,
            total_mined = EXCLUDED.total_mined,
            level = EXCLUDED.level,
            streak = EXCLUDED.streak,
            last_mining_end = EXCLUDED.last_mining_end,
            current_mining_end_time = EXCLUDED.current_mining_end_time,
            referral_total_count = EXCLUDED.referral_total_count,
            referral_active_count = EXCLUDED.referral_active_count,
            last_active_at = EXCLUDED.last_active_at,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(profile.user_id.as_uuid())
    .bind(&profile.referral_code)
    .bind(profile.referred_by.map(UserId::into_uuid))
    .bind(profile.total_coins)
    .bind(profile.total_mined)
    .bind(to_i32(profile.level))
    .bind(to_i32(profile.streak))
    .bind(profile.last_mining_end)
    .bind(profile.current_mining_end_time)
    .bind(to_i32(profile.referral_stats.total_count))
    .bind(to_i32(profile.referral_stats.active_count))
    .bind(profile.last_active_at)
    .bind(profile.created_at)
    .bind(profile.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Returns false when the stored row is no longer at `wallet.version`
async fn upsert_wallet(
    tx: &mut Transaction<'_, Postgres>,
    wallet: &Wallet,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO mining_wallets (
            user_id,
            mining_balance, mining_locked, mining_earned,
            purchase_balance, purchase_locked, purchase_earned,
            referral_balance, referral_locked, referral_earned,
            version, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11 + 1, $12, $13)
        ON CONFLICT (user_id) DO UPDATE SET
            mining_balance = EXCLUDED.mining_balance,
            mining_locked = EXCLUDED.mining_locked,
            mining_earned = EXCLUDED.mining_earned,
            purchase_balance = EXCLUDED.purchase_balance,
            purchase_locked = EXCLUDED.purchase_locked,
            purchase_earned = EXCLUDED.purchase_earned,
            referral_balance = EXCLUDED.referral_balance,
            referral_locked = EXCLUDED.referral_locked,
            referral_earned = EXCLUDED.referral_earned,
            version = EXCLUDED.version,
            updated_at = EXCLUDED.updated_at
        WHERE mining_wallets.version = $11
        "#,
    )
    .bind(wallet.user_id.as_uuid())
    .bind(wallet.mining.balance)
    .bind(wallet.mining.locked)
    .bind(wallet.mining.earned)
    .bind(wallet.purchase.balance)
    .bind(wallet.purchase.locked)
    .bind(wallet.purchase.earned)
    .bind(wallet.referral.balance)
    .bind(wallet.referral.locked)
    .bind(wallet.referral.earned)
    .bind(wallet.version)
    .bind(wallet.created_at)
    .bind(wallet.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Returns false when the stored row had already left `active`
async fn upsert_session(
    tx: &mut Transaction<'_, Postgres>,
    session: &MiningSession,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO mining_sessions (
            session_id, user_id, start_time, end_time, cycle_hours,
            base_rate, referral_boost_rate, level_boost_rate, total_rate,
            expected_coins, coins_earned, status,
            speed_boosts, duration_boosts, settled_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (session_id) DO UPDATE SET
            end_time = EXCLUDED.end_time,
            total_rate = EXCLUDED.total_rate,
            expected_coins = EXCLUDED.expected_coins,
            coins_earned = EXCLUDED.coins_earned,
            status = EXCLUDED.status,
            speed_boosts = EXCLUDED.speed_boosts,
            duration_boosts = EXCLUDED.duration_boosts,
            settled_at = EXCLUDED.settled_at
        WHERE mining_sessions.status = 'active'
        "#,
    )
    .bind(session.id.as_uuid())
    .bind(session.user_id.as_uuid())
    .bind(session.start_time)
    .bind(session.end_time)
    .bind(to_i32(session.cycle_hours))
    .bind(session.base_rate)
    .bind(session.referral_boost_rate)
    .bind(session.level_boost_rate)
    .bind(session.total_rate)
    .bind(session.expected_coins)
    .bind(session.coins_earned)
    .bind(session.status.as_str())
    .bind(to_i32(session.speed_boosts))
    .bind(to_i32(session.duration_boosts))
    .bind(session.settled_at)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn upsert_referral(
    tx: &mut Transaction<'_, Postgres>,
    referral: &Referral,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO referrals (
            referral_id, referrer_id, referred_id, kind,
            coins_earned, status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (referral_id) DO UPDATE SET
            status = EXCLUDED.status,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(referral.id.as_uuid())
    .bind(referral.referrer_id.as_uuid())
    .bind(referral.referred_id.as_uuid())
    .bind(referral.kind.as_str())
    .bind(referral.coins_earned)
    .bind(referral.status.as_str())
    .bind(referral.created_at)
    .bind(referral.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_transaction(
    tx: &mut Transaction<'_, Postgres>,
    record: &WalletTransaction,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO wallet_transactions (
            tx_id, user_id, kind, sub_wallet, amount,
            status, counterparty, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (tx_id) DO UPDATE SET
            status = EXCLUDED.status,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.user_id.as_uuid())
    .bind(record.kind.as_str())
    .bind(record.sub_wallet.as_str())
    .bind(record.amount)
    .bind(record.status.as_str())
    .bind(record.counterparty.map(UserId::into_uuid))
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Translate storage guards into their domain errors
fn map_db_error(err: sqlx::Error) -> MiningError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some(ONE_ACTIVE_SESSION) {
            return MiningError::SessionConflict("mining session already active");
        }
        if db_err.code().as_deref() == Some("23514") {
            tracing::error!(error = %db_err, "Ledger constraint violation");
            return MiningError::Internal("ledger constraint violation".into());
        }
    }
    MiningError::Database(err)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_u32(value: i32, field: &str) -> MiningResult<u32> {
    u32::try_from(value).map_err(|_| MiningError::Internal(format!("Invalid {field}: {value}")))
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ============================================================================
// Row Types for sqlx mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct WalletRow {
    user_id: Uuid,
    mining_balance: Decimal,
    mining_locked: Decimal,
    mining_earned: Decimal,
    purchase_balance: Decimal,
    purchase_locked: Decimal,
    purchase_earned: Decimal,
    referral_balance: Decimal,
    referral_locked: Decimal,
    referral_earned: Decimal,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WalletRow {
    fn into_wallet(self) -> Wallet {
        Wallet {
            user_id: UserId::from_uuid(self.user_id),
            mining: SubBalance {
                balance: self.mining_balance,
                locked: self.mining_locked,
                earned: self.mining_earned,
            },
            purchase: SubBalance {
                balance: self.purchase_balance,
                locked: self.purchase_locked,
                earned: self.purchase_earned,
            },
            referral: SubBalance {
                balance: self.referral_balance,
                locked: self.referral_locked,
                earned: self.referral_earned,
            },
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    referral_code: String,
    referred_by: Option<Uuid>,
    total_coins: Decimal,
    total_mined: Decimal,
    level: i32,
    streak: i32,
    last_mining_end: Option<DateTime<Utc>>,
    current_mining_end_time: Option<DateTime<Utc>>,
    referral_total_count: i32,
    referral_active_count: i32,
    last_active_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProfileRow {
    fn into_profile(self) -> MiningResult<MinerProfile> {
        Ok(MinerProfile {
            user_id: UserId::from_uuid(self.user_id),
            referral_code: self.referral_code,
            referred_by: self.referred_by.map(UserId::from_uuid),
            total_coins: self.total_coins,
            total_mined: self.total_mined,
            level: to_u32(self.level, "level")?,
            streak: to_u32(self.streak, "streak")?,
            last_mining_end: self.last_mining_end,
            current_mining_end_time: self.current_mining_end_time,
            referral_stats: ReferralStats {
                total_count: to_u32(self.referral_total_count, "referral_total_count")?,
                active_count: to_u32(self.referral_active_count, "referral_active_count")?,
            },
            last_active_at: self.last_active_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    user_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    cycle_hours: i32,
    base_rate: Decimal,
    referral_boost_rate: Decimal,
    level_boost_rate: Decimal,
    total_rate: Decimal,
    expected_coins: Decimal,
    coins_earned: Decimal,
    status: String,
    speed_boosts: i32,
    duration_boosts: i32,
    settled_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    fn into_session(self) -> MiningResult<MiningSession> {
        Ok(MiningSession {
            id: MiningSessionId::from_uuid(self.session_id),
            user_id: UserId::from_uuid(self.user_id),
            start_time: self.start_time,
            end_time: self.end_time,
            cycle_hours: to_u32(self.cycle_hours, "cycle_hours")?,
            base_rate: self.base_rate,
            referral_boost_rate: self.referral_boost_rate,
            level_boost_rate: self.level_boost_rate,
            total_rate: self.total_rate,
            expected_coins: self.expected_coins,
            coins_earned: self.coins_earned,
            status: self.status.parse()?,
            speed_boosts: to_u32(self.speed_boosts, "speed_boosts")?,
            duration_boosts: to_u32(self.duration_boosts, "duration_boosts")?,
            settled_at: self.settled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReferralRow {
    referral_id: Uuid,
    referrer_id: Uuid,
    referred_id: Uuid,
    kind: String,
    coins_earned: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReferralRow {
    fn into_referral(self) -> MiningResult<Referral> {
        Ok(Referral {
            id: ReferralId::from_uuid(self.referral_id),
            referrer_id: UserId::from_uuid(self.referrer_id),
            referred_id: UserId::from_uuid(self.referred_id),
            kind: self.kind.parse()?,
            coins_earned: self.coins_earned,
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    tx_id: Uuid,
    user_id: Uuid,
    kind: String,
    sub_wallet: String,
    amount: Decimal,
    status: String,
    counterparty: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> MiningResult<WalletTransaction> {
        Ok(WalletTransaction {
            id: TransactionId::from_uuid(self.tx_id),
            user_id: UserId::from_uuid(self.user_id),
            kind: self.kind.parse()?,
            sub_wallet: self.sub_wallet.parse()?,
            amount: self.amount,
            status: self.status.parse()?,
            counterparty: self.counterparty.map(UserId::from_uuid),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
