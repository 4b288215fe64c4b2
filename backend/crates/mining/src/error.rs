//! Mining Error Types
//!
//! Ledger and session errors, integrated with the unified
//! `kernel::error::AppError` system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::value_objects::SubWallet;

/// Mining-specific result type alias
pub type MiningResult<T> = Result<T, MiningError>;

/// Mining-specific error variants
///
/// All of these are local and synchronous: they are returned to the
/// immediate caller and never leave partial state behind.
#[derive(Debug, Error)]
pub enum MiningError {
    /// Non-positive amount passed to a ledger mutation
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Debit, lock, boost or withdrawal exceeds available funds
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// Session state does not allow the requested transition
    #[error("Mining session conflict: {0}")]
    SessionConflict(&'static str),

    /// Session was settled by another caller first
    #[error("Mining session already settled")]
    AlreadySettled,

    /// Session start is disabled by the maintenance flag
    #[error("Mining is under maintenance")]
    MaintenanceBlocked,

    /// The sub-wallet cannot be withdrawn from directly
    #[error("The {0} wallet is not withdrawable")]
    NotWithdrawable(SubWallet),

    #[error("User not found")]
    UserNotFound,

    #[error("Transaction not found")]
    TransactionNotFound,

    /// Withdrawal was already completed or rejected
    #[error("Transaction is no longer pending")]
    TransactionNotPending,

    /// The stored wallet moved on since it was read, e.g. another process
    /// wrote it in between
    #[error("Wallet was modified concurrently")]
    StaleWrite,

    /// Malformed request (bad id, self transfer, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No trusted user id was supplied by the identity layer
    #[error("Missing authenticated user")]
    Unauthenticated,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MiningError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MiningError::InvalidAmount(_)
            | MiningError::NotWithdrawable(_)
            | MiningError::InvalidRequest(_) => ErrorKind::BadRequest,
            MiningError::InsufficientBalance { .. } => ErrorKind::UnprocessableEntity,
            MiningError::SessionConflict(_)
            | MiningError::AlreadySettled
            | MiningError::StaleWrite
            | MiningError::TransactionNotPending => ErrorKind::Conflict,
            MiningError::MaintenanceBlocked => ErrorKind::ServiceUnavailable,
            MiningError::UserNotFound | MiningError::TransactionNotFound => ErrorKind::NotFound,
            MiningError::Unauthenticated => ErrorKind::Unauthorized,
            MiningError::Database(_) | MiningError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// True for the benign outcome of losing a settlement race
    pub fn is_already_settled(&self) -> bool {
        matches!(self, MiningError::AlreadySettled)
    }

    /// Convert to AppError
    ///
    /// Storage failures go through the kernel's `sqlx::Error` mapping, so
    /// the client only sees its generic message.
    pub fn into_app_error(self) -> AppError {
        let err = AppError::new(self.kind(), self.to_string());
        match self {
            MiningError::AlreadySettled => {
                err.with_action("Check your wallet, the reward has already been credited")
            }
            MiningError::InsufficientBalance { .. } => {
                err.with_action("Top up the purchase wallet or wait for mining rewards")
            }
            MiningError::MaintenanceBlocked => err.with_action("Try again later"),
            MiningError::StaleWrite => err.with_action("Retry the request"),
            MiningError::Database(e) => AppError::from(e),
            _ => err,
        }
    }

    /// Log the error with appropriate level
    pub(crate) fn log(&self) {
        match self {
            MiningError::Database(e) => {
                tracing::error!(error = %e, "Mining database error");
            }
            MiningError::Internal(msg) => {
                tracing::error!(message = %msg, "Mining internal error");
            }
            MiningError::InsufficientBalance {
                requested,
                available,
            } => {
                tracing::warn!(%requested, %available, "Insufficient balance");
            }
            MiningError::AlreadySettled => {
                tracing::warn!("Settlement raced and lost");
            }
            MiningError::StaleWrite => {
                tracing::warn!("Wallet write lost to a concurrent writer");
            }
            _ => {
                tracing::debug!(error = %self, "Mining error");
            }
        }
    }
}

impl From<MiningError> for AppError {
    fn from(err: MiningError) -> Self {
        err.into_app_error()
    }
}

impl IntoResponse for MiningError {
    fn into_response(self) -> Response {
        self.log();
        self.into_app_error().into_response()
    }
}
