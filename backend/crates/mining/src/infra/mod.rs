//! Infrastructure Layer
//!
//! Storage implementations of the domain repository traits.

pub mod memory;
pub mod postgres;

pub use memory::MemoryMiningRepository;
pub use postgres::PgMiningRepository;
