//! HTTP Handlers
//!
//! Thin adapters: parse the request, build the use case over the shared
//! context, run it, serialize the result. Errors render through
//! `MiningError`'s `IntoResponse`.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, stream};

use crate::application::{
    Ledger, MiningContext, MiningStatus, ReferralCascade, Registration, RewardEngine, Settlement,
};
use crate::domain::referral::Referral;
use crate::domain::repository::MiningRepository;
use crate::domain::session::SessionSnapshot;
use crate::domain::transaction::WalletTransaction;
use crate::domain::wallet::WalletSnapshot;
use crate::error::MiningResult;
use crate::presentation::dto::{
    BoostRequest, BoostResponse, ListQuery, RegisterRequest, TransferInternalRequest,
    TransferRequest, TransferResponse, WithdrawRequest,
};
use crate::presentation::extract::AuthenticatedUser;

/// Shared state for mining handlers
pub struct MiningAppState<R> {
    pub ctx: MiningContext<R>,
}

impl<R> Clone for MiningAppState<R> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

// ============================================================================
// Mining
// ============================================================================

/// GET /mining/status
pub async fn status<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> MiningResult<Json<MiningStatus>> {
    let engine = RewardEngine::new(state.ctx);
    Ok(Json(engine.status(user_id).await?))
}

/// POST /mining/start
pub async fn start<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> MiningResult<(StatusCode, Json<SessionSnapshot>)> {
    let engine = RewardEngine::new(state.ctx);
    let session = engine.start(user_id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /mining/claim
pub async fn claim<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> MiningResult<Json<Settlement>> {
    let engine = RewardEngine::new(state.ctx);
    Ok(Json(engine.claim(user_id).await?))
}

/// POST /mining/cancel
pub async fn cancel<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> MiningResult<Json<SessionSnapshot>> {
    let engine = RewardEngine::new(state.ctx);
    Ok(Json(engine.cancel(user_id).await?))
}

/// POST /mining/boost
pub async fn boost<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(req): Json<BoostRequest>,
) -> MiningResult<Json<BoostResponse>> {
    let engine = RewardEngine::new(state.ctx);
    let receipt = engine.boost(user_id, req.kind).await?;
    Ok(Json(receipt.into()))
}

/// GET /mining/history
pub async fn history<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> MiningResult<Json<Vec<SessionSnapshot>>> {
    let engine = RewardEngine::new(state.ctx);
    Ok(Json(engine.history(user_id, query.limit()).await?))
}

// ============================================================================
// Wallet
// ============================================================================

/// GET /wallet
pub async fn wallet<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> MiningResult<Json<WalletSnapshot>> {
    let ledger = Ledger::new(state.ctx);
    Ok(Json(ledger.wallet(user_id).await?))
}

/// POST /wallet/transfer-internal
pub async fn transfer_internal<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(req): Json<TransferInternalRequest>,
) -> MiningResult<Json<WalletSnapshot>> {
    let ledger = Ledger::new(state.ctx);
    let wallet = ledger
        .transfer_internal(user_id, req.from, req.to, req.amount)
        .await?;
    Ok(Json(wallet))
}

/// POST /wallet/transfer
pub async fn transfer<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(req): Json<TransferRequest>,
) -> MiningResult<Json<TransferResponse>> {
    let ledger = Ledger::new(state.ctx);
    let receipt = ledger
        .transfer_to_user(user_id, req.recipient_id, req.wallet.into(), req.amount)
        .await?;
    Ok(Json(receipt.into()))
}

/// POST /wallet/withdraw
pub async fn withdraw<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(req): Json<WithdrawRequest>,
) -> MiningResult<(StatusCode, Json<WalletTransaction>)> {
    let ledger = Ledger::new(state.ctx);
    let tx = ledger
        .request_withdrawal(user_id, req.wallet, req.amount)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(tx)))
}

/// GET /wallet/transactions
pub async fn transactions<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> MiningResult<Json<Vec<WalletTransaction>>> {
    let ledger = Ledger::new(state.ctx);
    Ok(Json(ledger.transactions(user_id, query.limit()).await?))
}

// ============================================================================
// Referrals / Users
// ============================================================================

/// GET /referrals
pub async fn referrals<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> MiningResult<Json<Vec<Referral>>> {
    let cascade = ReferralCascade::new(state.ctx);
    Ok(Json(cascade.referrals(user_id).await?))
}

/// POST /users
pub async fn register<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(req): Json<RegisterRequest>,
) -> MiningResult<(StatusCode, Json<Registration>)> {
    let cascade = ReferralCascade::new(state.ctx);
    let registration = cascade
        .register(user_id, req.referral_code.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

// ============================================================================
// Live
// ============================================================================

/// GET /live
///
/// Server-sent events carrying the caller's wallet and session updates.
/// Updates that find the client's buffer full are dropped.
pub async fn live<R: MiningRepository>(
    State(state): State<MiningAppState<R>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> MiningResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    state.ctx.load_profile(&user_id).await?;
    let updates = state.ctx.live.subscribe(user_id);
    tracing::debug!(user_id = %user_id, "Live stream opened");

    let stream = stream::unfold(updates, |mut updates| async move {
        let update = updates.recv().await?;
        Some((Event::default().json_data(&update), updates))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
