//! Presentation Layer
//!
//! HTTP handlers, DTOs and router.

pub mod dto;
pub mod extract;
pub mod handlers;
pub mod router;

pub use extract::{AuthenticatedUser, USER_ID_HEADER};
pub use router::mining_router;
