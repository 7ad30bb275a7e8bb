//! Typed Ids

use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    marker::PhantomData,
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A UUID tagged with the kind of entity it identifies.
///
/// The marker only exists at compile time, so a [`ProductId`] can never be
/// passed where a [`DiscountId`] is expected.
pub struct TypedUuid<T>(Uuid, PhantomData<T>);

impl<T> TypedUuid<T> {
    /// Generate a new, time-ordered id.
    #[must_use]
    pub fn new() -> Self {
        Self::from_uuid(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    /// Unwrap into the raw UUID.
    #[must_use]
    pub const fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl<T> Default for TypedUuid<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedUuid<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedUuid<T> {}

impl<T> Debug for TypedUuid<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.0, f)
    }
}

impl<T> Display for TypedUuid<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

impl<T> PartialEq for TypedUuid<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for TypedUuid<T> {}

impl<T> Hash for TypedUuid<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> PartialOrd for TypedUuid<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TypedUuid<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T> From<Uuid> for TypedUuid<T> {
    fn from(value: Uuid) -> Self {
        Self::from_uuid(value)
    }
}

impl<T> From<TypedUuid<T>> for Uuid {
    fn from(value: TypedUuid<T>) -> Self {
        value.into_uuid()
    }
}

impl<T> FromStr for TypedUuid<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self::from_uuid)
    }
}

impl<T> Serialize for TypedUuid<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for TypedUuid<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Self::from_uuid)
    }
}

/// Shop marker
#[derive(Debug)]
pub enum ShopMarker {}

/// Shop Id
pub type ShopId = TypedUuid<ShopMarker>;

/// Seller marker
#[derive(Debug)]
pub enum SellerMarker {}

/// Seller Id
pub type SellerId = TypedUuid<SellerMarker>;

/// Customer marker
#[derive(Debug)]
pub enum CustomerMarker {}

/// Customer Id
pub type CustomerId = TypedUuid<CustomerMarker>;

/// Segment marker
#[derive(Debug)]
pub enum SegmentMarker {}

/// Customer Segment Id
pub type SegmentId = TypedUuid<SegmentMarker>;

/// Product marker
#[derive(Debug)]
pub enum ProductMarker {}

/// Product Id
pub type ProductId = TypedUuid<ProductMarker>;

/// Variant marker
#[derive(Debug)]
pub enum VariantMarker {}

/// Product Variant Id
pub type VariantId = TypedUuid<VariantMarker>;

/// Collection marker
#[derive(Debug)]
pub enum CollectionMarker {}

/// Collection Id
pub type CollectionId = TypedUuid<CollectionMarker>;

/// Discount marker
#[derive(Debug)]
pub enum DiscountMarker {}

/// Discount Id
pub type DiscountId = TypedUuid<DiscountMarker>;

/// Cart marker
#[derive(Debug)]
pub enum CartMarker {}

/// Cart Id
pub type CartId = TypedUuid<CartMarker>;
