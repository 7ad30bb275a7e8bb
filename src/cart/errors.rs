//! Cart Errors

use thiserror::Error;

use crate::{
    catalog::CatalogError,
    directory::DirectoryError,
    discounts::{DiscountError, DiscountStoreError},
    ids::{ProductId, VariantId},
    money::AmountError,
};

/// Input rejected before anything is looked up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Adding zero units.
    #[error("quantity must be greater than zero")]
    ZeroQuantity,

    /// Setting a negative quantity.
    #[error("quantity must not be negative, got {0}")]
    NegativeQuantity(i64),

    /// More units than a line can hold.
    #[error("quantity {0} is too large")]
    QuantityTooLarge(i64),

    /// Not an ISO 4217 code.
    #[error("unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Blank coupon code.
    #[error("coupon code must not be empty")]
    EmptyCouponCode,
}

/// Cart operation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    /// Invalid input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The product does not exist in this shop.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// The variant does not belong to the product.
    #[error("variant {variant_id} of product {product_id} not found")]
    VariantNotFound {
        /// Product
        product_id: ProductId,
        /// Missing variant
        variant_id: VariantId,
    },

    /// No such line in the cart.
    #[error("cart item not found")]
    ItemNotFound {
        /// Product
        product_id: ProductId,
        /// Variant
        variant_id: Option<VariantId>,
    },

    /// Unknown coupon code.
    #[error("coupon {0} not found")]
    CouponNotFound(String),

    /// The coupon belongs to a different shop.
    #[error("coupon does not belong to this shop")]
    CouponShopMismatch,

    /// The coupon is switched off or outside its window.
    #[error("coupon {0} is not currently active")]
    CouponInactive(String),

    /// Catalog failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Directory failure.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Discount store failure.
    #[error(transparent)]
    DiscountStore(#[from] DiscountStoreError),

    /// Discount pricing failure.
    #[error(transparent)]
    Discount(#[from] DiscountError),

    /// Money arithmetic failure.
    #[error(transparent)]
    Amount(#[from] AmountError),
}

impl From<rusty_money::MoneyError> for CartError {
    fn from(err: rusty_money::MoneyError) -> Self {
        Self::Amount(err.into())
    }
}
