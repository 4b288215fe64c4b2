//! Mining Router

use axum::{
    Router,
    routing::{get, post},
};

use crate::application::MiningContext;
use crate::domain::repository::MiningRepository;
use crate::presentation::handlers::{self, MiningAppState};

/// Create the mining router for any repository implementation
pub fn mining_router<R>(ctx: MiningContext<R>) -> Router
where
    R: MiningRepository,
{
    let state = MiningAppState { ctx };

    Router::new()
        .route("/mining/status", get(handlers::status::<R>))
        .route("/mining/start", post(handlers::start::<R>))
        .route("/mining/claim", post(handlers::claim::<R>))
        .route("/mining/cancel", post(handlers::cancel::<R>))
        .route("/mining/boost", post(handlers::boost::<R>))
        .route("/mining/history", get(handlers::history::<R>))
        .route("/wallet", get(handlers::wallet::<R>))
        .route("/wallet/transfer-internal", post(handlers::transfer_internal::<R>))
        .route("/wallet/transfer", post(handlers::transfer::<R>))
        .route("/wallet/withdraw", post(handlers::withdraw::<R>))
        .route("/wallet/transactions", get(handlers::transactions::<R>))
        .route("/referrals", get(handlers::referrals::<R>))
        .route("/users", post(handlers::register::<R>))
        .route("/live", get(handlers::live::<R>))
        .with_state(state)
}
