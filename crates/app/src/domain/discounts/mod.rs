//! Discounts
//!
//! Storage for discount definitions. Redemption counters are only written by
//! the usage ledger.

pub mod errors;
pub mod records;
pub(crate) mod repository;
pub mod service;

pub use errors::DiscountsServiceError;
pub use service::*;
