//! Savings
//!
//! How much a discount takes off one line item.

use rusty_money::iso::Currency;

use crate::money::{self, percent_of};

use super::{DiscountError, SimpleDiscount};

impl SimpleDiscount {
    /// Savings on `quantity` units at `unit_price`, in minor units of
    /// `currency`.
    ///
    /// A fixed amount never takes a line below zero.
    ///
    /// # Errors
    ///
    /// Returns [`DiscountError::Amount`] if the line total or the savings
    /// cannot be represented.
    pub fn savings(
        &self,
        unit_price: u64,
        quantity: u32,
        currency: &'static Currency,
    ) -> Result<u64, DiscountError> {
        let line_total = money::from_minor(unit_price, currency)?.mul(quantity)?;

        let savings = match *self {
            Self::AmountOff { amount } => money::from_minor(amount, currency)?.mul(quantity)?,
            Self::PercentageOff { percentage } => percent_of(percentage, &line_total)?,
        };

        Ok(money::to_minor(&money::min(savings, line_total)?)?)
    }
}
