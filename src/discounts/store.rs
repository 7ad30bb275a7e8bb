//! Discount lookups

use std::{collections::BTreeSet, sync::Arc};

use thiserror::Error;

use crate::ids::{CollectionId, ProductId, ShopId, VariantId};

use super::Discount;

/// Errors returned by a [`DiscountStore`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscountStoreError {
    /// No discount carries the code.
    #[error("coupon {0} not found")]
    CouponNotFound(String),

    /// The backing store could not be read.
    #[error("discount store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to discounts.
pub trait DiscountStore {
    /// Resolve a coupon code.
    ///
    /// Codes match case-insensitively. The returned discount may belong to a
    /// shop other than `shop_id` if the store is not partitioned by shop;
    /// callers check ownership.
    ///
    /// # Errors
    ///
    /// Returns [`DiscountStoreError::CouponNotFound`] for an unknown code.
    fn by_coupon_code(&self, shop_id: ShopId, code: &str) -> Result<Discount, DiscountStoreError>;

    /// Active discounts of the shop that could apply to a line.
    ///
    /// The result is a superset: callers still evaluate eligibility. Stores
    /// have no clock, so discounts outside their validity window are returned
    /// too and reported as out of window by
    /// [`CartPricingEngine::details`](crate::cart::CartPricingEngine::details).
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn active_candidates(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        collection_ids: &BTreeSet<CollectionId>,
    ) -> Result<Vec<Discount>, DiscountStoreError>;
}

impl<T: DiscountStore + ?Sized> DiscountStore for &T {
    fn by_coupon_code(&self, shop_id: ShopId, code: &str) -> Result<Discount, DiscountStoreError> {
        (**self).by_coupon_code(shop_id, code)
    }

    fn active_candidates(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        collection_ids: &BTreeSet<CollectionId>,
    ) -> Result<Vec<Discount>, DiscountStoreError> {
        (**self).active_candidates(shop_id, product_id, variant_id, collection_ids)
    }
}

impl<T: DiscountStore + ?Sized> DiscountStore for Arc<T> {
    fn by_coupon_code(&self, shop_id: ShopId, code: &str) -> Result<Discount, DiscountStoreError> {
        (**self).by_coupon_code(shop_id, code)
    }

    fn active_candidates(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        collection_ids: &BTreeSet<CollectionId>,
    ) -> Result<Vec<Discount>, DiscountStoreError> {
        (**self).active_candidates(shop_id, product_id, variant_id, collection_ids)
    }
}
