//! Discounts
//!
//! The discount data model: what a discount is worth, what it targets, who may
//! use it, when, and how often.

use std::{collections::BTreeSet, fmt, str::FromStr};

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ids::{CollectionId, CustomerId, DiscountId, ProductId, SegmentId, SellerId, ShopId, VariantId},
    money::AmountError,
};

pub mod savings;
pub mod store;
pub mod update;

pub use store::{DiscountStore, DiscountStoreError};
pub use update::DiscountUpdate;

/// Errors raised while building, updating or pricing a discount.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscountError {
    /// The validity window is empty or inverted.
    #[error("discount must end after it starts ({start_at} >= {end_at})")]
    InvalidWindow {
        /// Window start
        start_at: Timestamp,
        /// Window end
        end_at: Timestamp,
    },

    /// A discount worth nothing.
    #[error("discount value must be greater than zero")]
    ZeroValue,

    /// Percentages run above 0 up to 100.
    #[error("percentage must be above 0 and at most 100, got {0}")]
    PercentageOutOfRange(Decimal),

    /// Blank discount name.
    #[error("discount name must not be empty")]
    EmptyName,

    /// A coupon code that is blank once trimmed.
    #[error("coupon code must not be empty")]
    EmptyCouponCode,

    /// A usage cap of zero.
    #[error("{0} must be greater than zero when set")]
    ZeroLimit(&'static str),

    /// Savings could not be represented in minor units.
    #[error(transparent)]
    Amount(#[from] AmountError),
}

impl From<rusty_money::MoneyError> for DiscountError {
    fn from(err: rusty_money::MoneyError) -> Self {
        Self::Amount(err.into())
    }
}

/// What part of an order a discount reduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountCategory {
    /// Targeted at products, variants or collections
    Product,

    /// Applies to every line of the order
    Order,

    /// Reduces shipping; never prices a line
    Shipping,

    /// Buy-X-get-Y; targets like a product discount
    BuyXGetY,
}

impl DiscountCategory {
    /// Stable name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Order => "order",
            Self::Shipping => "shipping",
            Self::BuyXGetY => "buy_x_get_y",
        }
    }

    /// Whether the discount only matches the products it targets.
    #[must_use]
    pub const fn uses_targets(self) -> bool {
        matches!(self, Self::Product | Self::BuyXGetY)
    }

    /// Whether the cart engine may price a line item with it.
    #[must_use]
    pub const fn prices_lines(self) -> bool {
        matches!(self, Self::Product | Self::Order)
    }
}

impl fmt::Display for DiscountCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised category name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown discount category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for DiscountCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(Self::Product),
            "order" => Ok(Self::Order),
            "shipping" => Ok(Self::Shipping),
            "buy_x_get_y" => Ok(Self::BuyXGetY),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Whether a discount's value is an amount or a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Amount off each unit
    Fixed,

    /// Percentage off each unit
    Percentage,
}

impl DiscountType {
    /// Stable name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Percentage => "percentage",
        }
    }
}

/// The value of a discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimpleDiscount {
    /// Subtract a fixed amount from each unit (e.g. "$5 off")
    AmountOff {
        /// Minor units off per unit of quantity
        amount: u64,
    },

    /// Take a percentage off (e.g. "20% off", "12.5% off")
    PercentageOff {
        /// Percent points, above 0 up to 100
        percentage: Decimal,
    },
}

impl SimpleDiscount {
    /// Fixed or percentage.
    #[must_use]
    pub const fn discount_type(&self) -> DiscountType {
        match self {
            Self::AmountOff { .. } => DiscountType::Fixed,
            Self::PercentageOff { .. } => DiscountType::Percentage,
        }
    }

    /// `percentage` percent off.
    #[must_use]
    pub fn percentage_off(percentage: impl Into<Decimal>) -> Self {
        Self::PercentageOff {
            percentage: percentage.into(),
        }
    }

    /// The raw value: minor units or percent points.
    #[must_use]
    pub fn value(&self) -> Decimal {
        match *self {
            Self::AmountOff { amount } => Decimal::from(amount),
            Self::PercentageOff { percentage } => percentage,
        }
    }

    fn validate(&self) -> Result<(), DiscountError> {
        match *self {
            Self::AmountOff { amount: 0 } => Err(DiscountError::ZeroValue),
            Self::PercentageOff { percentage } if percentage.is_zero() => {
                Err(DiscountError::ZeroValue)
            }
            Self::PercentageOff { percentage }
                if percentage.is_sign_negative() || percentage > Decimal::ONE_HUNDRED =>
            {
                Err(DiscountError::PercentageOutOfRange(percentage))
            }
            _ => Ok(()),
        }
    }
}

/// Products, variants and collections a targeted discount applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountTargets {
    /// Targeted products
    #[serde(default)]
    pub products: BTreeSet<ProductId>,

    /// Targeted variants
    #[serde(default)]
    pub variants: BTreeSet<VariantId>,

    /// Targeted collections
    #[serde(default)]
    pub collections: BTreeSet<CollectionId>,
}

impl DiscountTargets {
    /// Nothing targeted; such a discount never matches a line.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.variants.is_empty() && self.collections.is_empty()
    }

    /// Whether a line for `product_id` / `variant_id` in `collection_ids` is targeted.
    #[must_use]
    pub fn matches(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        collection_ids: &BTreeSet<CollectionId>,
    ) -> bool {
        self.products.contains(&product_id)
            || variant_id.is_some_and(|variant_id| self.variants.contains(&variant_id))
            || !self.collections.is_disjoint(collection_ids)
    }
}

/// Who may use a discount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum EligibilityScope {
    /// Everyone, guests included
    #[default]
    All,

    /// Only these customers
    Customers(BTreeSet<CustomerId>),

    /// Members of any of these segments
    Segments(BTreeSet<SegmentId>),
}

impl EligibilityScope {
    /// Whether the customer (or guest, when `None`) is in scope.
    #[must_use]
    pub fn admits(
        &self,
        customer_id: Option<CustomerId>,
        segment_ids: &BTreeSet<SegmentId>,
    ) -> bool {
        match self {
            Self::All => true,
            Self::Customers(customers) => {
                customer_id.is_some_and(|customer_id| customers.contains(&customer_id))
            }
            Self::Segments(segments) => customer_id.is_some() && !segments.is_disjoint(segment_ids),
        }
    }
}

/// One customer's redemptions of one discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUsage {
    /// Customer
    pub customer_id: CustomerId,

    /// Times redeemed
    pub usage_count: u32,

    /// Most recent redemption
    pub last_used_at: Timestamp,

    /// Cumulative spend, minor units
    pub total_spent: u64,
}

/// Input for [`Discount::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDiscount {
    /// Discount id
    pub id: DiscountId,

    /// Owning shop
    pub shop_id: ShopId,

    /// Owning seller
    pub seller_id: SellerId,

    /// Display name
    pub name: String,

    /// Category
    pub category: DiscountCategory,

    /// Value
    pub discount: SimpleDiscount,

    /// Targets, used by targeted categories
    #[serde(default)]
    pub targets: DiscountTargets,

    /// Coupon code; when set the discount must be entered by the customer
    #[serde(default)]
    pub coupon_code: Option<String>,

    /// Who may use it
    #[serde(default)]
    pub scope: EligibilityScope,

    /// Global redemption cap
    #[serde(default)]
    pub usage_limit: Option<u32>,

    /// Redemption cap per customer
    #[serde(default)]
    pub per_customer_limit: Option<u32>,

    /// Window start, inclusive
    pub start_at: Timestamp,

    /// Window end, inclusive
    pub end_at: Timestamp,

    /// Kill switch
    pub active: bool,
}

/// A validated discount together with its usage counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discount {
    id: DiscountId,
    shop_id: ShopId,
    seller_id: SellerId,
    name: String,
    category: DiscountCategory,
    discount: SimpleDiscount,
    targets: DiscountTargets,
    coupon_code: Option<String>,
    scope: EligibilityScope,
    usage_limit: Option<u32>,
    per_customer_limit: Option<u32>,
    current_usage: u32,
    usage_tracking: Vec<CustomerUsage>,
    start_at: Timestamp,
    end_at: Timestamp,
    active: bool,
}

/// Canonical form of a coupon code: trimmed and upper-cased.
///
/// Returns `None` for a blank code.
#[must_use]
pub fn normalize_coupon_code(code: &str) -> Option<String> {
    let code = code.trim();

    (!code.is_empty()).then(|| code.to_uppercase())
}

impl Discount {
    /// Validate and build a discount with no recorded usage.
    ///
    /// # Errors
    ///
    /// Returns a [`DiscountError`] if the window is not strictly increasing,
    /// the value is zero or out of range, the name or coupon code is blank, or
    /// a usage cap is zero.
    pub fn new(new: NewDiscount) -> Result<Self, DiscountError> {
        if new.end_at <= new.start_at {
            return Err(DiscountError::InvalidWindow {
                start_at: new.start_at,
                end_at: new.end_at,
            });
        }

        new.discount.validate()?;

        let name = new.name.trim();

        if name.is_empty() {
            return Err(DiscountError::EmptyName);
        }

        let coupon_code = match new.coupon_code.as_deref() {
            Some(code) => Some(normalize_coupon_code(code).ok_or(DiscountError::EmptyCouponCode)?),
            None => None,
        };

        if new.usage_limit == Some(0) {
            return Err(DiscountError::ZeroLimit("usage limit"));
        }

        if new.per_customer_limit == Some(0) {
            return Err(DiscountError::ZeroLimit("per-customer limit"));
        }

        Ok(Self {
            id: new.id,
            shop_id: new.shop_id,
            seller_id: new.seller_id,
            name: name.to_string(),
            category: new.category,
            discount: new.discount,
            targets: new.targets,
            coupon_code,
            scope: new.scope,
            usage_limit: new.usage_limit,
            per_customer_limit: new.per_customer_limit,
            current_usage: 0,
            usage_tracking: Vec::new(),
            start_at: new.start_at,
            end_at: new.end_at,
            active: new.active,
        })
    }

    /// Attach usage counters loaded from storage.
    #[must_use]
    pub fn with_usage(mut self, current_usage: u32, usage_tracking: Vec<CustomerUsage>) -> Self {
        self.current_usage = current_usage;
        self.usage_tracking = usage_tracking;
        self
    }

    /// The fields this discount was built from.
    #[must_use]
    pub fn to_new(&self) -> NewDiscount {
        NewDiscount {
            id: self.id,
            shop_id: self.shop_id,
            seller_id: self.seller_id,
            name: self.name.clone(),
            category: self.category,
            discount: self.discount,
            targets: self.targets.clone(),
            coupon_code: self.coupon_code.clone(),
            scope: self.scope.clone(),
            usage_limit: self.usage_limit,
            per_customer_limit: self.per_customer_limit,
            start_at: self.start_at,
            end_at: self.end_at,
            active: self.active,
        }
    }

    /// Discount id
    #[must_use]
    pub const fn id(&self) -> DiscountId {
        self.id
    }

    /// Owning shop
    #[must_use]
    pub const fn shop_id(&self) -> ShopId {
        self.shop_id
    }

    /// Owning seller
    #[must_use]
    pub const fn seller_id(&self) -> SellerId {
        self.seller_id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category
    #[must_use]
    pub const fn category(&self) -> DiscountCategory {
        self.category
    }

    /// Value
    #[must_use]
    pub const fn discount(&self) -> SimpleDiscount {
        self.discount
    }

    /// Fixed or percentage
    #[must_use]
    pub const fn discount_type(&self) -> DiscountType {
        self.discount.discount_type()
    }

    /// Targeted products, variants and collections
    #[must_use]
    pub const fn targets(&self) -> &DiscountTargets {
        &self.targets
    }

    /// Normalised coupon code
    #[must_use]
    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    /// Whether the discount only applies once its code has been entered.
    #[must_use]
    pub const fn is_coupon_gated(&self) -> bool {
        self.coupon_code.is_some()
    }

    /// Who may use it
    #[must_use]
    pub const fn scope(&self) -> &EligibilityScope {
        &self.scope
    }

    /// Global redemption cap
    #[must_use]
    pub const fn usage_limit(&self) -> Option<u32> {
        self.usage_limit
    }

    /// Per-customer redemption cap
    #[must_use]
    pub const fn per_customer_limit(&self) -> Option<u32> {
        self.per_customer_limit
    }

    /// Redemptions so far
    #[must_use]
    pub const fn current_usage(&self) -> u32 {
        self.current_usage
    }

    /// Per-customer redemptions
    #[must_use]
    pub fn usage_tracking(&self) -> &[CustomerUsage] {
        &self.usage_tracking
    }

    /// Window start
    #[must_use]
    pub const fn start_at(&self) -> Timestamp {
        self.start_at
    }

    /// Window end
    #[must_use]
    pub const fn end_at(&self) -> Timestamp {
        self.end_at
    }

    /// Kill switch
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Active and `now` inside the (inclusive) window.
    #[must_use]
    pub fn is_usable_at(&self, now: Timestamp) -> bool {
        self.active && self.is_within_window(now)
    }

    /// `now` inside the (inclusive) window.
    #[must_use]
    pub fn is_within_window(&self, now: Timestamp) -> bool {
        self.start_at <= now && now <= self.end_at
    }

    /// Tracked usage for one customer.
    #[must_use]
    pub fn customer_usage(&self, customer_id: CustomerId) -> Option<&CustomerUsage> {
        self.usage_tracking
            .iter()
            .find(|usage| usage.customer_id == customer_id)
    }

    /// Redemptions left before the global cap, `None` when uncapped.
    #[must_use]
    pub fn remaining_total(&self) -> Option<u32> {
        self.usage_limit
            .map(|limit| limit.saturating_sub(self.current_usage))
    }

    /// Conditionally record one redemption.
    ///
    /// Both caps are checked and both counters bumped together; when either
    /// cap is already reached nothing changes and `false` is returned. A guest
    /// redemption of a per-customer-capped discount is refused.
    pub fn record_usage(
        &mut self,
        customer_id: Option<CustomerId>,
        amount_spent: u64,
        now: Timestamp,
    ) -> bool {
        if self
            .usage_limit
            .is_some_and(|limit| self.current_usage >= limit)
        {
            return false;
        }

        if let Some(limit) = self.per_customer_limit {
            let Some(customer_id) = customer_id else {
                return false;
            };

            let used = self
                .customer_usage(customer_id)
                .map_or(0, |usage| usage.usage_count);

            if used >= limit {
                return false;
            }
        }

        let Some(current_usage) = self.current_usage.checked_add(1) else {
            return false;
        };

        self.current_usage = current_usage;

        if let Some(customer_id) = customer_id {
            match self
                .usage_tracking
                .iter_mut()
                .find(|usage| usage.customer_id == customer_id)
            {
                Some(usage) => {
                    usage.usage_count = usage.usage_count.saturating_add(1);
                    usage.last_used_at = now;
                    usage.total_spent = usage.total_spent.saturating_add(amount_spent);
                }
                None => self.usage_tracking.push(CustomerUsage {
                    customer_id,
                    usage_count: 1,
                    last_used_at: now,
                    total_spent: amount_spent,
                }),
            }
        }

        true
    }

    /// Replace `recorded` with `settled` in a customer's total spend. A
    /// customer with no usage row is left alone.
    pub fn settle_spend(&mut self, customer_id: CustomerId, recorded: u64, settled: u64) {
        if let Some(usage) = self
            .usage_tracking
            .iter_mut()
            .find(|usage| usage.customer_id == customer_id)
        {
            usage.total_spent = usage
                .total_spent
                .saturating_sub(recorded)
                .saturating_add(settled);
        }
    }
}
