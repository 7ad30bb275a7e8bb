//! Customers Data

use bazaar::ids::{CustomerId, SegmentId};

/// New Customer Data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub uuid: CustomerId,
    pub email: String,
}

/// New Segment Data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSegment {
    pub uuid: SegmentId,
    pub name: String,
}
