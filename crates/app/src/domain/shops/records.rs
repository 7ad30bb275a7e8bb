//! Shop Records

use bazaar::ids::ShopId;
use jiff::Timestamp;

/// Shop Record
#[derive(Debug, Clone)]
pub struct ShopRecord {
    /// Unique shop identifier.
    pub uuid: ShopId,

    /// Human-readable shop name.
    pub name: String,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Shop creation timestamp.
    pub created_at: Timestamp,

    /// Last update timestamp.
    pub updated_at: Timestamp,

    /// Soft-delete timestamp when deleted.
    pub deleted_at: Option<Timestamp>,
}
