//! Shop Data

use bazaar::ids::ShopId;

/// New Shop Data
#[derive(Debug, Clone, PartialEq)]
pub struct NewShop {
    /// UUID to assign to the shop row.
    pub uuid: ShopId,

    /// Shop name to persist.
    pub name: String,

    /// ISO 4217 code carts of this shop are priced in.
    pub currency: String,
}
