//! Customers Records

use bazaar::ids::{CustomerId, SegmentId, ShopId};
use jiff::Timestamp;

/// Customer Record
#[derive(Debug, Clone)]
pub struct CustomerRecord {
    pub uuid: CustomerId,
    pub shop_uuid: ShopId,
    pub email: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Segment Record
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    pub uuid: SegmentId,
    pub shop_uuid: ShopId,
    pub name: String,
    pub created_at: Timestamp,
}
