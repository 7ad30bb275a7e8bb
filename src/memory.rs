//! In-memory store
//!
//! One mutex-guarded state implementing every collaborator the engine needs.
//! Used for tests and fixtures, and by services that price against a snapshot
//! loaded from the database.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{
    catalog::{Catalog, CatalogError, CatalogProduct},
    clock::{Clock, SystemClock},
    directory::{Directory, DirectoryError},
    discounts::{
        Discount, DiscountError, DiscountStore, DiscountStoreError, DiscountUpdate,
        normalize_coupon_code,
    },
    ids::{CollectionId, CustomerId, DiscountId, ProductId, SegmentId, ShopId, VariantId},
    ledger::{UsageLedger, UsageLedgerError},
};

/// Errors from [`MemoryStore`] writes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryStoreError {
    /// No such discount.
    #[error("discount {0} not found")]
    DiscountNotFound(DiscountId),

    /// The update was invalid.
    #[error(transparent)]
    Discount(#[from] DiscountError),
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: FxHashMap<ProductId, CatalogProduct>,
    collections: FxHashMap<ProductId, BTreeSet<CollectionId>>,
    segments: FxHashMap<(ShopId, CustomerId), BTreeSet<SegmentId>>,
    discounts: BTreeMap<DiscountId, Discount>,
}

/// Mutex-guarded catalog, directory, discount store and usage ledger.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store on the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// An empty store stamping usage with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }

    /// The store's clock.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// A detached copy of the current state sharing this store's clock.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self {
            state: Mutex::new(self.lock().clone()),
            clock: self.clock(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a product.
    pub fn insert_product(&self, product: CatalogProduct) {
        self.lock().products.insert(product.id, product);
    }

    /// Remove a product, returning it.
    pub fn remove_product(&self, id: ProductId) -> Option<CatalogProduct> {
        self.lock().products.remove(&id)
    }

    /// Set the collections a product belongs to.
    pub fn set_collections(&self, product_id: ProductId, collections: BTreeSet<CollectionId>) {
        self.lock().collections.insert(product_id, collections);
    }

    /// Set a customer's segments within a shop.
    pub fn set_segments(
        &self,
        shop_id: ShopId,
        customer_id: CustomerId,
        segments: BTreeSet<SegmentId>,
    ) {
        self.lock().segments.insert((shop_id, customer_id), segments);
    }

    /// Insert or replace a discount, usage counters included.
    pub fn insert_discount(&self, discount: Discount) {
        self.lock().discounts.insert(discount.id(), discount);
    }

    /// A copy of one discount.
    #[must_use]
    pub fn discount(&self, id: DiscountId) -> Option<Discount> {
        self.lock().discounts.get(&id).cloned()
    }

    /// Every discount of a shop, ordered by id.
    #[must_use]
    pub fn discounts(&self, shop_id: ShopId) -> Vec<Discount> {
        self.lock()
            .discounts
            .values()
            .filter(|discount| discount.shop_id() == shop_id)
            .cloned()
            .collect()
    }

    /// Apply a partial update to a discount.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryStoreError::DiscountNotFound`] for an unknown id, or the
    /// validation error of the merged discount.
    pub fn update_discount(
        &self,
        id: DiscountId,
        update: DiscountUpdate,
    ) -> Result<Discount, MemoryStoreError> {
        let mut state = self.lock();

        let discount = state
            .discounts
            .get_mut(&id)
            .ok_or(MemoryStoreError::DiscountNotFound(id))?;

        discount.apply_update(update)?;

        Ok(discount.clone())
    }
}

impl Catalog for MemoryStore {
    fn product(&self, id: ProductId) -> Result<CatalogProduct, CatalogError> {
        self.lock()
            .products
            .get(&id)
            .cloned()
            .ok_or(CatalogError::ProductNotFound(id))
    }

    fn collection_ids_for_product(
        &self,
        id: ProductId,
    ) -> Result<BTreeSet<CollectionId>, CatalogError> {
        Ok(self
            .lock()
            .collections
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}

impl Directory for MemoryStore {
    fn customer_segment_ids(
        &self,
        shop_id: ShopId,
        customer_id: CustomerId,
    ) -> Result<BTreeSet<SegmentId>, DirectoryError> {
        Ok(self
            .lock()
            .segments
            .get(&(shop_id, customer_id))
            .cloned()
            .unwrap_or_default())
    }
}

impl DiscountStore for MemoryStore {
    /// Codes are not partitioned by shop here: a code owned by another shop is
    /// still returned when the requested shop has none, so callers can report
    /// the mismatch.
    fn by_coupon_code(&self, shop_id: ShopId, code: &str) -> Result<Discount, DiscountStoreError> {
        let code = normalize_coupon_code(code)
            .ok_or_else(|| DiscountStoreError::CouponNotFound(code.to_string()))?;

        self.lock()
            .discounts
            .values()
            .filter(|discount| discount.coupon_code() == Some(code.as_str()))
            .min_by_key(|discount| (discount.shop_id() != shop_id, discount.id()))
            .cloned()
            .ok_or(DiscountStoreError::CouponNotFound(code))
    }

    /// Filters on the active flag and targets only; the window is left to
    /// eligibility so status views can explain it.
    fn active_candidates(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        collection_ids: &BTreeSet<CollectionId>,
    ) -> Result<Vec<Discount>, DiscountStoreError> {
        Ok(self
            .lock()
            .discounts
            .values()
            .filter(|discount| {
                discount.shop_id() == shop_id
                    && discount.is_active()
                    && (!discount.category().uses_targets()
                        || discount
                            .targets()
                            .matches(product_id, variant_id, collection_ids))
            })
            .cloned()
            .collect())
    }
}

impl UsageLedger for MemoryStore {
    fn try_record_usage(
        &self,
        discount_id: DiscountId,
        customer_id: Option<CustomerId>,
        amount_spent: u64,
    ) -> Result<bool, UsageLedgerError> {
        let now = self.clock.now();
        let mut state = self.lock();

        let discount = state
            .discounts
            .get_mut(&discount_id)
            .ok_or(UsageLedgerError::DiscountNotFound(discount_id))?;

        Ok(discount.record_usage(customer_id, amount_spent, now))
    }

    fn settle_spend(
        &self,
        discount_id: DiscountId,
        customer_id: CustomerId,
        recorded: u64,
        settled: u64,
    ) -> Result<(), UsageLedgerError> {
        self.lock()
            .discounts
            .get_mut(&discount_id)
            .ok_or(UsageLedgerError::DiscountNotFound(discount_id))?
            .settle_spend(customer_id, recorded, settled);

        Ok(())
    }
}
