//! Shops service.

use async_trait::async_trait;
use mockall::automock;
use tracing::info;

use bazaar::ids::ShopId;

use crate::{
    database::Db,
    domain::shops::{
        data::NewShop, errors::ShopsServiceError, records::ShopRecord,
        repository::PgShopsRepository,
    },
};

#[derive(Debug, Clone)]
pub struct PgShopsService {
    db: Db,
    repository: PgShopsRepository,
}

impl PgShopsService {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            repository: PgShopsRepository::new(),
        }
    }
}

#[async_trait]
impl ShopsService for PgShopsService {
    #[tracing::instrument(
        name = "shops.service.create_shop",
        skip(self, shop),
        fields(shop_uuid = %shop.uuid, currency = %shop.currency),
        err
    )]
    async fn create_shop(&self, shop: NewShop) -> Result<ShopRecord, ShopsServiceError> {
        let mut shop = shop;

        shop.currency = shop.currency.trim().to_ascii_uppercase();

        if rusty_money::iso::find(&shop.currency).is_none() {
            return Err(ShopsServiceError::UnknownCurrency(shop.currency));
        }

        // The new row must pass the shop's own RLS check.
        let mut tx = self.db.begin_shop_transaction(shop.uuid).await?;

        let record = self.repository.create_shop(&mut tx, shop).await?;

        tx.commit().await?;

        info!(shop_uuid = %record.uuid, "created shop");

        Ok(record)
    }

    #[tracing::instrument(
        name = "shops.service.get_shop",
        skip(self),
        fields(shop_uuid = %shop),
        err
    )]
    async fn get_shop(&self, shop: ShopId) -> Result<ShopRecord, ShopsServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = self.repository.get_shop(&mut tx, shop).await?;

        tx.commit().await?;

        Ok(record)
    }
}

#[automock]
#[async_trait]
/// Shop persistence operations.
pub trait ShopsService: Send + Sync {
    /// Creates a new shop.
    async fn create_shop(&self, shop: NewShop) -> Result<ShopRecord, ShopsServiceError>;

    /// Retrieves a shop.
    async fn get_shop(&self, shop: ShopId) -> Result<ShopRecord, ShopsServiceError>;
}
