//! Discounts Records

use bazaar::discounts::Discount;
use jiff::Timestamp;

/// Discount Record
#[derive(Debug, Clone)]
pub struct DiscountRecord {
    /// The validated discount with its usage counters.
    pub discount: Discount,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
