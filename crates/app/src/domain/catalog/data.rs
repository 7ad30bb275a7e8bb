//! Catalog Data

use std::collections::BTreeMap;

use bazaar::ids::{CollectionId, ProductId, VariantId};

/// New Product Data
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub uuid: ProductId,
    pub name: String,
    pub price: u64,
    pub main_image: Option<String>,
    pub variants: Vec<NewVariant>,
}

/// New Variant Data
#[derive(Debug, Clone, PartialEq)]
pub struct NewVariant {
    pub uuid: VariantId,
    pub price: u64,
    pub options: BTreeMap<String, String>,
    pub image: Option<String>,
}

/// Product Update Data
///
/// `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price: Option<u64>,
    pub main_image: Option<Option<String>>,
}

/// New Collection Data
#[derive(Debug, Clone, PartialEq)]
pub struct NewCollection {
    pub uuid: CollectionId,
    pub name: String,
}
