//! Catalog Records

use std::collections::BTreeSet;

use bazaar::{
    catalog::CatalogProduct,
    ids::{CollectionId, ShopId},
};
use jiff::Timestamp;

/// Product Record
#[derive(Debug, Clone)]
pub struct ProductRecord {
    /// The product as the pricing engine sees it.
    pub product: CatalogProduct,

    /// Collections the product belongs to.
    pub collections: BTreeSet<CollectionId>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Collection Record
#[derive(Debug, Clone)]
pub struct CollectionRecord {
    pub uuid: CollectionId,
    pub shop_uuid: ShopId,
    pub name: String,
    pub created_at: Timestamp,
}
