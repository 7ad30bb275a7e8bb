//! App Context

use std::sync::Arc;

use thiserror::Error;

use bazaar::clock::{Clock, SystemClock};

use crate::{
    database::{self, Db},
    domain::{
        carts::{CartsService, PgCartsService},
        catalog::{CatalogService, PgCatalogService},
        checkout::{CheckoutService, PgCheckoutService},
        customers::{CustomersService, PgCustomersService},
        discounts::{DiscountsService, PgDiscountsService},
        shops::{PgShopsService, ShopsService},
        usage::{PgUsageLedgerService, UsageLedgerService},
    },
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),
}

#[derive(Clone)]
pub struct AppContext {
    pub shops: Arc<dyn ShopsService>,
    pub catalog: Arc<dyn CatalogService>,
    pub customers: Arc<dyn CustomersService>,
    pub discounts: Arc<dyn DiscountsService>,
    pub usage: Arc<dyn UsageLedgerService>,
    pub carts: Arc<dyn CartsService>,
    pub checkout: Arc<dyn CheckoutService>,
}

impl AppContext {
    /// Build application context from a database URL.
    ///
    /// # Errors
    ///
    /// Returns an error when establishing a database connection fails.
    pub async fn from_database_url(url: &str) -> Result<Self, AppInitError> {
        let pool = database::connect(url)
            .await
            .map_err(AppInitError::Database)?;

        Ok(Self::new(Db::new(pool), Arc::new(SystemClock)))
    }

    /// Wire every service over one pool and clock.
    #[must_use]
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self {
            shops: Arc::new(PgShopsService::new(db.clone())),
            catalog: Arc::new(PgCatalogService::new(db.clone())),
            customers: Arc::new(PgCustomersService::new(db.clone())),
            discounts: Arc::new(PgDiscountsService::new(db.clone())),
            usage: Arc::new(PgUsageLedgerService::new(db.clone(), Arc::clone(&clock))),
            carts: Arc::new(PgCartsService::new(db.clone(), Arc::clone(&clock))),
            checkout: Arc::new(PgCheckoutService::new(db, clock)),
        }
    }
}
