//! Mining Reward Loop Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Wallet, sessions, referrals, reward arithmetic, repository traits
//! - `application/` - Ledger, RewardEngine, ReferralCascade, Sweeper, events
//! - `infra/` - In-memory and PostgreSQL repositories
//! - `presentation/` - HTTP handlers, DTOs, router
//!
//! ## Features
//! - Timed mining cycles with speed and duration boosts
//! - Three sub-wallets (mining, purchase, referral) with available/locked balances
//! - Two-level referral bonuses at signup
//! - Background settlement of unclaimed sessions
//! - Best-effort live updates and notifications
//!
//! ## Consistency Model
//! - Every wallet or session change for a user runs under that user's lock
//! - Cross-user transfers lock both users in id order and commit once
//! - Claim and sweep share one settlement path; the loser gets `AlreadySettled`
//! - Events are published only after the lock is released

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::{MiningConfig, MiningContext, Settings};
pub use error::{MiningError, MiningResult};
pub use infra::{MemoryMiningRepository, PgMiningRepository};
pub use presentation::router::mining_router;

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

pub mod models {
    pub use crate::domain::profile::*;
    pub use crate::domain::referral::*;
    pub use crate::domain::session::*;
    pub use crate::domain::transaction::*;
    pub use crate::domain::value_objects::*;
    pub use crate::domain::wallet::*;
    pub use crate::presentation::dto::*;
}

pub mod store {
    pub use crate::infra::memory::MemoryMiningRepository as MemoryStore;
    pub use crate::infra::postgres::PgMiningRepository as MiningStore;
}

#[cfg(test)]
mod tests;
