//! Usage ledger
//!
//! The authoritative redemption counters. Only order commit writes here.

use std::sync::Arc;

use thiserror::Error;

use crate::ids::{CustomerId, DiscountId};

/// Errors returned by a [`UsageLedger`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageLedgerError {
    /// The discount does not exist.
    #[error("discount {0} not found")]
    DiscountNotFound(DiscountId),

    /// The backing store could not be written.
    #[error("usage ledger unavailable: {0}")]
    Unavailable(String),
}

/// Atomic, conditional redemption counters.
pub trait UsageLedger {
    /// Record one redemption if both caps still allow it.
    ///
    /// The global and per-customer increments happen as one conditional step.
    /// Returns `false`, changing nothing, when either cap is already reached.
    ///
    /// # Errors
    ///
    /// Returns an error if the discount is unknown or the store fails.
    fn try_record_usage(
        &self,
        discount_id: DiscountId,
        customer_id: Option<CustomerId>,
        amount_spent: u64,
    ) -> Result<bool, UsageLedgerError>;

    /// Move a customer's recorded spend on a discount from `recorded` to
    /// `settled`, leaving every counter as it is.
    ///
    /// Used when an order is re-priced after some of its redemptions were
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the discount is unknown or the store fails.
    fn settle_spend(
        &self,
        discount_id: DiscountId,
        customer_id: CustomerId,
        recorded: u64,
        settled: u64,
    ) -> Result<(), UsageLedgerError>;
}

impl<T: UsageLedger + ?Sized> UsageLedger for &T {
    fn try_record_usage(
        &self,
        discount_id: DiscountId,
        customer_id: Option<CustomerId>,
        amount_spent: u64,
    ) -> Result<bool, UsageLedgerError> {
        (**self).try_record_usage(discount_id, customer_id, amount_spent)
    }

    fn settle_spend(
        &self,
        discount_id: DiscountId,
        customer_id: CustomerId,
        recorded: u64,
        settled: u64,
    ) -> Result<(), UsageLedgerError> {
        (**self).settle_spend(discount_id, customer_id, recorded, settled)
    }
}

impl<T: UsageLedger + ?Sized> UsageLedger for Arc<T> {
    fn try_record_usage(
        &self,
        discount_id: DiscountId,
        customer_id: Option<CustomerId>,
        amount_spent: u64,
    ) -> Result<bool, UsageLedgerError> {
        (**self).try_record_usage(discount_id, customer_id, amount_spent)
    }

    fn settle_spend(
        &self,
        discount_id: DiscountId,
        customer_id: CustomerId,
        recorded: u64,
        settled: u64,
    ) -> Result<(), UsageLedgerError> {
        (**self).settle_spend(discount_id, customer_id, recorded, settled)
    }
}
