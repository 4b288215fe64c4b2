//! Domain Layer - Business logic and entities
//!
//! This layer contains:
//! - Entities (Wallet, MiningSession, MinerProfile, Referral, WalletTransaction)
//! - Value objects (SubWallet, DebitSource, BoostKind, statuses)
//! - Domain services (rate calculator, level and streak rules)
//! - Repository traits (interfaces)

pub mod profile;
pub mod referral;
pub mod repository;
pub mod services;
pub mod session;
pub mod transaction;
pub mod value_objects;
pub mod wallet;
