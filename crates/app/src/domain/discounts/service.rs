//! Discounts service.

use async_trait::async_trait;
use mockall::automock;
use tracing::{Span, info};

use bazaar::{
    discounts::{Discount, DiscountUpdate, NewDiscount},
    ids::{DiscountId, ShopId},
};

use crate::{
    database::Db,
    domain::discounts::{
        errors::DiscountsServiceError,
        records::DiscountRecord,
        repository::{PgDiscountsRepository, UsageScope},
    },
};

#[derive(Debug, Clone)]
pub struct PgDiscountsService {
    db: Db,
    repository: PgDiscountsRepository,
}

impl PgDiscountsService {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            repository: PgDiscountsRepository::new(),
        }
    }
}

#[async_trait]
impl DiscountsService for PgDiscountsService {
    #[tracing::instrument(
        name = "discounts.service.create_discount",
        skip(self, discount),
        fields(
            shop_uuid = %shop,
            discount_uuid = %discount.id,
            category = %discount.category,
            coupon = discount.coupon_code.is_some()
        ),
        err
    )]
    async fn create_discount(
        &self,
        shop: ShopId,
        discount: NewDiscount,
    ) -> Result<DiscountRecord, DiscountsServiceError> {
        if discount.shop_id != shop {
            return Err(DiscountsServiceError::ShopMismatch);
        }

        let discount = Discount::new(discount)?;

        let mut tx = self.db.begin_shop_transaction(shop).await?;

        self.repository.create_discount(&mut tx, &discount).await?;

        let record = self.repository.get_discount(&mut tx, discount.id()).await?;

        tx.commit().await?;

        info!(discount_uuid = %discount.id(), "created discount");

        Ok(record)
    }

    #[tracing::instrument(
        name = "discounts.service.get_discount",
        skip(self),
        fields(shop_uuid = %shop, discount_uuid = %discount),
        err
    )]
    async fn get_discount(
        &self,
        shop: ShopId,
        discount: DiscountId,
    ) -> Result<DiscountRecord, DiscountsServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = self.repository.get_discount(&mut tx, discount).await?;

        tx.commit().await?;

        Ok(record)
    }

    #[tracing::instrument(
        name = "discounts.service.list_discounts",
        skip(self),
        fields(shop_uuid = %shop, discount_count = tracing::field::Empty),
        err
    )]
    async fn list_discounts(
        &self,
        shop: ShopId,
    ) -> Result<Vec<DiscountRecord>, DiscountsServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let records = self
            .repository
            .list_discounts(&mut tx, UsageScope::None)
            .await?;

        tx.commit().await?;

        Span::current().record("discount_count", records.len());

        Ok(records)
    }

    #[tracing::instrument(
        name = "discounts.service.update_discount",
        skip(self, update),
        fields(shop_uuid = %shop, discount_uuid = %discount),
        err
    )]
    async fn update_discount(
        &self,
        shop: ShopId,
        discount: DiscountId,
        update: DiscountUpdate,
    ) -> Result<DiscountRecord, DiscountsServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let mut current = self.repository.lock_discount(&mut tx, discount).await?;

        if update.is_empty() {
            tx.commit().await?;

            return Ok(current);
        }

        current.discount.apply_update(update)?;

        self.repository
            .update_discount(&mut tx, &current.discount)
            .await?;

        let record = self.repository.get_discount(&mut tx, discount).await?;

        tx.commit().await?;

        info!(discount_uuid = %discount, "updated discount");

        Ok(record)
    }

    #[tracing::instrument(
        name = "discounts.service.delete_discount",
        skip(self),
        fields(shop_uuid = %shop, discount_uuid = %discount),
        err
    )]
    async fn delete_discount(
        &self,
        shop: ShopId,
        discount: DiscountId,
    ) -> Result<(), DiscountsServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let rows_affected = self.repository.delete_discount(&mut tx, discount).await?;

        if rows_affected == 0 {
            return Err(DiscountsServiceError::NotFound);
        }

        tx.commit().await?;

        info!(discount_uuid = %discount, "deleted discount");

        Ok(())
    }
}

#[automock]
#[async_trait]
pub trait DiscountsService: Send + Sync {
    /// Validates and stores a new discount for `shop`.
    async fn create_discount(
        &self,
        shop: ShopId,
        discount: NewDiscount,
    ) -> Result<DiscountRecord, DiscountsServiceError>;

    /// Retrieve a discount with every customer's usage.
    async fn get_discount(
        &self,
        shop: ShopId,
        discount: DiscountId,
    ) -> Result<DiscountRecord, DiscountsServiceError>;

    /// Every live discount of the shop.
    async fn list_discounts(
        &self,
        shop: ShopId,
    ) -> Result<Vec<DiscountRecord>, DiscountsServiceError>;

    /// Apply a partial update. The merged discount is validated before it is
    /// written; usage counters are never touched.
    async fn update_discount(
        &self,
        shop: ShopId,
        discount: DiscountId,
        update: DiscountUpdate,
    ) -> Result<DiscountRecord, DiscountsServiceError>;

    /// Soft-deletes a discount.
    async fn delete_discount(
        &self,
        shop: ShopId,
        discount: DiscountId,
    ) -> Result<(), DiscountsServiceError>;
}
