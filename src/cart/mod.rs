//! Carts
//!
//! A cart is re-priced from scratch after every mutation. Only the display
//! snapshot of each item is kept from the moment it was added; prices, discounts
//! and totals are always derived again from the catalog and discount store.

use std::collections::BTreeMap;

use jiff::Timestamp;
use rusty_money::iso::Currency;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    catalog::CatalogProduct,
    ids::{CartId, CustomerId, DiscountId, ProductId, ShopId, VariantId},
    money,
};

pub mod engine;
pub mod errors;

pub use engine::CartPricingEngine;
pub use errors::{CartError, ValidationError};

/// Who a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartOwner {
    /// A signed-in customer
    Customer {
        /// Customer id
        customer_id: CustomerId,
    },

    /// An anonymous session
    Guest {
        /// Session id
        session_id: String,
    },
}

impl CartOwner {
    /// The customer, when not a guest.
    #[must_use]
    pub const fn customer_id(&self) -> Option<CustomerId> {
        match self {
            Self::Customer { customer_id } => Some(*customer_id),
            Self::Guest { .. } => None,
        }
    }
}

/// Whether a cart has anything in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartState {
    /// No items
    Empty,

    /// At least one item
    Populated,
}

/// One product or variant line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Product
    pub product_id: ProductId,

    /// Chosen variant
    pub variant_id: Option<VariantId>,

    /// Units
    pub quantity: u32,

    /// Product name when added
    pub product_name: String,

    /// Variant options when added
    pub variant_options: BTreeMap<String, String>,

    /// Image when added
    pub image: Option<String>,

    /// Live unit price
    pub unit_price: u64,

    /// `unit_price * quantity`
    pub line_total: u64,

    /// Savings from the applied discount
    pub discount_amount: u64,

    /// `line_total - discount_amount`
    pub final_line_total: u64,

    /// The discount priced into this line; at most one
    pub applied_discount_ids: SmallVec<[DiscountId; 1]>,

    /// False when the product could not be priced on the last pass
    pub available: bool,
}

impl CartItem {
    /// Snapshot a product (or one of its variants) into a new, unpriced line.
    #[must_use]
    pub fn snapshot(
        product: &CatalogProduct,
        variant_id: Option<VariantId>,
        quantity: u32,
    ) -> Self {
        let variant = variant_id.and_then(|id| product.variant(id));

        Self {
            product_id: product.id,
            variant_id,
            quantity,
            product_name: product.name.clone(),
            variant_options: variant
                .map(|variant| variant.options.clone())
                .unwrap_or_default(),
            image: variant
                .and_then(|variant| variant.image.clone())
                .or_else(|| product.main_image.clone()),
            unit_price: 0,
            line_total: 0,
            discount_amount: 0,
            final_line_total: 0,
            applied_discount_ids: SmallVec::new(),
            available: true,
        }
    }

    /// Whether this is the line for `product_id` / `variant_id`.
    #[must_use]
    pub fn is_line(&self, product_id: ProductId, variant_id: Option<VariantId>) -> bool {
        self.product_id == product_id && self.variant_id == variant_id
    }

    /// The discount applied to this line, if any.
    #[must_use]
    pub fn applied_discount_id(&self) -> Option<DiscountId> {
        self.applied_discount_ids.first().copied()
    }

    fn mark_unavailable(&mut self) {
        self.available = false;
        self.unit_price = 0;
        self.line_total = 0;
        self.discount_amount = 0;
        self.final_line_total = 0;
        self.applied_discount_ids.clear();
    }
}

/// A shopping cart.
///
/// The aggregates are overwritten by every pricing pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Cart id
    pub id: CartId,

    /// Owning shop
    pub shop_id: ShopId,

    /// Customer or guest session
    pub owner: CartOwner,

    /// ISO 4217 code
    pub currency: String,

    /// Lines in insertion order
    pub items: Vec<CartItem>,

    /// Sum of available line totals
    pub subtotal: u64,

    /// Sum of line discounts
    pub total_discounts: u64,

    /// Externally computed shipping
    pub shipping_cost: u64,

    /// Externally computed tax
    pub tax_amount: u64,

    /// `subtotal - total_discounts + shipping_cost + tax_amount`, never negative
    pub grand_total: u64,

    /// Coupons entered for the whole order
    pub applied_discount_ids: Vec<DiscountId>,

    /// Created
    pub created_at: Timestamp,

    /// Last re-priced
    pub updated_at: Timestamp,
}

impl Cart {
    /// An empty cart.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownCurrency`] if `currency` is not an
    /// ISO 4217 code.
    pub fn new(
        id: CartId,
        shop_id: ShopId,
        owner: CartOwner,
        currency: &str,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let currency = money::currency(currency)
            .ok_or_else(|| ValidationError::UnknownCurrency(currency.to_string()))?;

        Ok(Self {
            id,
            shop_id,
            owner,
            currency: currency.iso_alpha_code.to_string(),
            items: Vec::new(),
            subtotal: 0,
            total_discounts: 0,
            shipping_cost: 0,
            tax_amount: 0,
            grand_total: 0,
            applied_discount_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// The cart's currency, for money arithmetic.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownCurrency`] if the stored code is not
    /// an ISO 4217 code.
    pub fn iso_currency(&self) -> Result<&'static Currency, ValidationError> {
        money::currency(&self.currency)
            .ok_or_else(|| ValidationError::UnknownCurrency(self.currency.clone()))
    }

    /// The signed-in customer, if any.
    #[must_use]
    pub const fn customer_id(&self) -> Option<CustomerId> {
        self.owner.customer_id()
    }

    /// Empty or populated.
    #[must_use]
    pub fn state(&self) -> CartState {
        if self.items.is_empty() {
            CartState::Empty
        } else {
            CartState::Populated
        }
    }

    /// Look up a line.
    #[must_use]
    pub fn item(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Option<&CartItem> {
        self.items
            .iter()
            .find(|item| item.is_line(product_id, variant_id))
    }

    /// Whether any line could be priced on the last pass.
    #[must_use]
    pub fn has_available_items(&self) -> bool {
        self.items.iter().any(|item| item.available)
    }
}
