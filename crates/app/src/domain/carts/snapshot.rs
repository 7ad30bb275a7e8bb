//! Pricing snapshots
//!
//! The engine is synchronous, so everything it may look up while pricing one
//! cart is read up front into a [`MemoryStore`].

use std::sync::Arc;

use sqlx::{Postgres, Transaction};
use tracing::debug;

use bazaar::{
    cart::{Cart, CartPricingEngine},
    clock::Clock,
    ids::ProductId,
    memory::MemoryStore,
};

use crate::domain::{
    catalog::repository::PgCatalogRepository,
    customers::repository::PgCustomersRepository,
    discounts::repository::{PgDiscountsRepository, UsageScope},
};

/// Engine pricing against a loaded snapshot.
pub(crate) type SnapshotEngine<'a> =
    CartPricingEngine<&'a MemoryStore, &'a MemoryStore, &'a MemoryStore, Arc<dyn Clock>>;

/// Engine over `store` using the store's clock.
pub(crate) fn engine(store: &MemoryStore) -> SnapshotEngine<'_> {
    CartPricingEngine::new(store, store, store, store.clock())
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgSnapshotLoader {
    catalog: PgCatalogRepository,
    customers: PgCustomersRepository,
    discounts: PgDiscountsRepository,
}

impl PgSnapshotLoader {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            catalog: PgCatalogRepository::new(),
            customers: PgCustomersRepository::new(),
            discounts: PgDiscountsRepository::new(),
        }
    }

    /// Load the products in `cart` plus `adding`, their collections, the
    /// owner's segments and every live discount of the shop with the owner's
    /// usage.
    pub(crate) async fn load(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: &Cart,
        adding: Option<ProductId>,
        clock: Arc<dyn Clock>,
    ) -> Result<MemoryStore, sqlx::Error> {
        let mut product_ids: Vec<ProductId> = cart
            .items
            .iter()
            .map(|item| item.product_id)
            .chain(adding)
            .collect();

        product_ids.sort_unstable();
        product_ids.dedup();

        let store = MemoryStore::with_clock(clock);

        for product in self.catalog.get_products(tx, &product_ids).await? {
            store.insert_product(product);
        }

        for (product, collections) in self
            .catalog
            .collection_ids_for_products(tx, &product_ids)
            .await?
        {
            store.set_collections(product, collections);
        }

        let customer = cart.customer_id();

        if let Some(customer) = customer {
            let segments = self.customers.segment_ids(tx, customer).await?;

            store.set_segments(cart.shop_id, customer, segments);
        }

        let discounts = self
            .discounts
            .list_discounts(tx, UsageScope::for_customer(customer))
            .await?;

        debug!(
            cart_id = %cart.id,
            products = product_ids.len(),
            discounts = discounts.len(),
            "loaded pricing snapshot"
        );

        for record in discounts {
            store.insert_discount(record.discount);
        }

        Ok(store)
    }
}
