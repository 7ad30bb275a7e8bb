//! Usage
//!
//! The authoritative redemption counters. Every increment is a conditional
//! statement evaluated by PostgreSQL against the locked discount row, so
//! concurrent checkouts can never push a discount past its caps.

pub mod errors;
pub(crate) mod repository;
pub mod service;

pub use errors::UsageServiceError;
pub use service::*;
