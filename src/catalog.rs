//! Catalog
//!
//! Read access to products, their variants and the collections they belong to.
//! Prices always come from here; nothing a client sends is trusted.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cache::Cache,
    ids::{CollectionId, ProductId, ShopId, VariantId},
};

/// Errors returned by a [`Catalog`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No such product.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// The backing store could not be read.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// A purchasable variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogVariant {
    /// Variant id
    pub id: VariantId,

    /// Unit price in minor units
    pub price: u64,

    /// Chosen options, e.g. `size: M`
    pub options: BTreeMap<String, String>,

    /// Variant image, if it has its own
    pub image: Option<String>,
}

/// A product as seen by the pricing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    /// Product id
    pub id: ProductId,

    /// Owning shop
    pub shop_id: ShopId,

    /// Display name
    pub name: String,

    /// Unit price in minor units, used when no variant is chosen
    pub price: u64,

    /// Primary image
    pub main_image: Option<String>,

    /// Variants, empty for single-SKU products
    pub variants: Vec<CatalogVariant>,
}

impl CatalogProduct {
    /// Look up one of this product's variants.
    #[must_use]
    pub fn variant(&self, id: VariantId) -> Option<&CatalogVariant> {
        self.variants.iter().find(|variant| variant.id == id)
    }

    /// Live unit price for the product or the given variant.
    ///
    /// Returns `None` when the variant does not belong to this product.
    #[must_use]
    pub fn unit_price(&self, variant_id: Option<VariantId>) -> Option<u64> {
        match variant_id {
            Some(id) => self.variant(id).map(|variant| variant.price),
            None => Some(self.price),
        }
    }
}

/// Product lookups.
pub trait Catalog {
    /// Fetch a product with its variants.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ProductNotFound`] if the product does not exist.
    fn product(&self, id: ProductId) -> Result<CatalogProduct, CatalogError>;

    /// Collections the product belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn collection_ids_for_product(&self, id: ProductId)
    -> Result<BTreeSet<CollectionId>, CatalogError>;
}

impl<T: Catalog + ?Sized> Catalog for &T {
    fn product(&self, id: ProductId) -> Result<CatalogProduct, CatalogError> {
        (**self).product(id)
    }

    fn collection_ids_for_product(
        &self,
        id: ProductId,
    ) -> Result<BTreeSet<CollectionId>, CatalogError> {
        (**self).collection_ids_for_product(id)
    }
}

impl<T: Catalog + ?Sized> Catalog for Arc<T> {
    fn product(&self, id: ProductId) -> Result<CatalogProduct, CatalogError> {
        (**self).product(id)
    }

    fn collection_ids_for_product(
        &self,
        id: ProductId,
    ) -> Result<BTreeSet<CollectionId>, CatalogError> {
        (**self).collection_ids_for_product(id)
    }
}

/// A [`Catalog`] that memoises collection membership.
///
/// Products, and so prices, are always read through.
#[derive(Debug)]
pub struct CachedCatalog<C, K> {
    inner: C,
    cache: K,
    ttl: SignedDuration,
}

impl<C, K> CachedCatalog<C, K>
where
    C: Catalog,
    K: Cache<ProductId, BTreeSet<CollectionId>>,
{
    /// Wrap `inner`, caching collection membership for `ttl`.
    pub fn new(inner: C, cache: K, ttl: SignedDuration) -> Self {
        Self { inner, cache, ttl }
    }

    /// Forget the cached collections of one product.
    pub fn invalidate(&self, id: ProductId) {
        self.cache.invalidate(&id);
    }
}

impl<C, K> Catalog for CachedCatalog<C, K>
where
    C: Catalog,
    K: Cache<ProductId, BTreeSet<CollectionId>>,
{
    fn product(&self, id: ProductId) -> Result<CatalogProduct, CatalogError> {
        self.inner.product(id)
    }

    fn collection_ids_for_product(
        &self,
        id: ProductId,
    ) -> Result<BTreeSet<CollectionId>, CatalogError> {
        if let Some(hit) = self.cache.get(&id) {
            return Ok(hit);
        }

        let collections = self.inner.collection_ids_for_product(id)?;

        self.cache.insert(id, collections.clone(), self.ttl);

        Ok(collections)
    }
}
