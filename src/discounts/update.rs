//! Discount updates

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{
    Discount, DiscountCategory, DiscountError, DiscountTargets, EligibilityScope, SimpleDiscount,
};

/// A partial update to a discount.
///
/// `None` leaves a field alone. For optional fields, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscountUpdate {
    /// New name
    pub name: Option<String>,

    /// New category
    pub category: Option<DiscountCategory>,

    /// New value
    pub discount: Option<SimpleDiscount>,

    /// New targets
    pub targets: Option<DiscountTargets>,

    /// Set or clear the coupon code
    pub coupon_code: Option<Option<String>>,

    /// New scope
    pub scope: Option<EligibilityScope>,

    /// Set or clear the global cap
    pub usage_limit: Option<Option<u32>>,

    /// Set or clear the per-customer cap
    pub per_customer_limit: Option<Option<u32>>,

    /// New window start
    pub start_at: Option<Timestamp>,

    /// New window end
    pub end_at: Option<Timestamp>,

    /// Toggle the kill switch
    pub active: Option<bool>,
}

impl DiscountUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Discount {
    /// Apply a partial update.
    ///
    /// The merged discount is validated as a whole before anything changes;
    /// usage counters are kept.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Discount::new`]; on error `self` is left
    /// untouched.
    pub fn apply_update(&mut self, update: DiscountUpdate) -> Result<(), DiscountError> {
        let mut merged = self.to_new();

        if let Some(name) = update.name {
            merged.name = name;
        }

        if let Some(category) = update.category {
            merged.category = category;
        }

        if let Some(discount) = update.discount {
            merged.discount = discount;
        }

        if let Some(targets) = update.targets {
            merged.targets = targets;
        }

        if let Some(coupon_code) = update.coupon_code {
            merged.coupon_code = coupon_code;
        }

        if let Some(scope) = update.scope {
            merged.scope = scope;
        }

        if let Some(usage_limit) = update.usage_limit {
            merged.usage_limit = usage_limit;
        }

        if let Some(per_customer_limit) = update.per_customer_limit {
            merged.per_customer_limit = per_customer_limit;
        }

        if let Some(start_at) = update.start_at {
            merged.start_at = start_at;
        }

        if let Some(end_at) = update.end_at {
            merged.end_at = end_at;
        }

        if let Some(active) = update.active {
            merged.active = active;
        }

        let updated = Self::new(merged)?;
        let tracking = std::mem::take(&mut self.usage_tracking);

        *self = updated.with_usage(self.current_usage, tracking);

        Ok(())
    }
}
