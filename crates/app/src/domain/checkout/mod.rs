//! Checkout
//!
//! Commits a cart as an order. The cart lock, every ledger increment and the
//! cleared cart share one transaction, so an order either redeems all of its
//! accepted discounts or none of them.

pub mod errors;
pub mod service;

pub use errors::CheckoutServiceError;
pub use service::*;
