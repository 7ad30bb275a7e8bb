//! Customer directory

use std::{collections::BTreeSet, sync::Arc};

use thiserror::Error;

use crate::ids::{CustomerId, SegmentId, ShopId};

/// Errors returned by a [`Directory`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The backing store could not be read.
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Customer segment membership.
pub trait Directory {
    /// Segments the customer belongs to within the shop.
    ///
    /// Unknown customers belong to no segments.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn customer_segment_ids(
        &self,
        shop_id: ShopId,
        customer_id: CustomerId,
    ) -> Result<BTreeSet<SegmentId>, DirectoryError>;
}

impl<T: Directory + ?Sized> Directory for &T {
    fn customer_segment_ids(
        &self,
        shop_id: ShopId,
        customer_id: CustomerId,
    ) -> Result<BTreeSet<SegmentId>, DirectoryError> {
        (**self).customer_segment_ids(shop_id, customer_id)
    }
}

impl<T: Directory + ?Sized> Directory for Arc<T> {
    fn customer_segment_ids(
        &self,
        shop_id: ShopId,
        customer_id: CustomerId,
    ) -> Result<BTreeSet<SegmentId>, DirectoryError> {
        (**self).customer_segment_ids(shop_id, customer_id)
    }
}
