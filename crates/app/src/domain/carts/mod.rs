//! Carts
//!
//! Carts are priced by the engine against a snapshot of the shop loaded inside
//! the same transaction that holds the cart's row lock.

pub mod errors;
pub(crate) mod repositories;
pub(crate) mod snapshot;
pub mod service;

pub use errors::CartsServiceError;
pub use service::*;
