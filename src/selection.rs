//! Best discount selection

use rusty_money::iso::Currency;
use tracing::debug;

use crate::discounts::{Discount, DiscountError};

/// The discount chosen for a line and what it saves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedDiscount {
    /// Winning discount
    pub discount: Discount,

    /// Savings on the line, minor units
    pub savings: u64,
}

/// Pick the eligible candidate saving the most on `quantity` units at
/// `unit_price`, in minor units of `currency`.
///
/// Candidates are ordered by id and a later one only wins with strictly greater
/// savings, so the lowest id wins a tie whatever order they arrive in. A
/// candidate saving nothing is never selected.
///
/// # Errors
///
/// Returns [`DiscountError::Amount`] if any candidate's savings overflow.
pub fn select_best(
    mut candidates: Vec<Discount>,
    unit_price: u64,
    quantity: u32,
    currency: &'static Currency,
) -> Result<Option<SelectedDiscount>, DiscountError> {
    candidates.sort_by_key(Discount::id);

    let mut best: Option<SelectedDiscount> = None;

    for discount in candidates {
        let savings = discount.discount().savings(unit_price, quantity, currency)?;

        if savings == 0 {
            continue;
        }

        if best.as_ref().is_none_or(|best| savings > best.savings) {
            best = Some(SelectedDiscount { discount, savings });
        }
    }

    if let Some(selected) = &best {
        debug!(
            discount_id = %selected.discount.id(),
            savings = selected.savings,
            "selected best discount"
        );
    }

    Ok(best)
}
