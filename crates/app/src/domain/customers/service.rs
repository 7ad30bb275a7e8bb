//! Customers service.

use std::collections::BTreeSet;

use async_trait::async_trait;
use mockall::automock;
use tracing::info;

use bazaar::ids::{CustomerId, SegmentId, ShopId};

use crate::{
    database::Db,
    domain::customers::{
        data::{NewCustomer, NewSegment},
        errors::CustomersServiceError,
        records::{CustomerRecord, SegmentRecord},
        repository::PgCustomersRepository,
    },
};

#[derive(Debug, Clone)]
pub struct PgCustomersService {
    db: Db,
    repository: PgCustomersRepository,
}

impl PgCustomersService {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            repository: PgCustomersRepository::new(),
        }
    }
}

#[async_trait]
impl CustomersService for PgCustomersService {
    #[tracing::instrument(
        name = "customers.service.create_customer",
        skip(self, customer),
        fields(shop_uuid = %shop, customer_uuid = %customer.uuid),
        err
    )]
    async fn create_customer(
        &self,
        shop: ShopId,
        customer: NewCustomer,
    ) -> Result<CustomerRecord, CustomersServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = self.repository.create_customer(&mut tx, customer).await?;

        tx.commit().await?;

        info!(customer_uuid = %record.uuid, "created customer");

        Ok(record)
    }

    #[tracing::instrument(
        name = "customers.service.get_customer",
        skip(self),
        fields(shop_uuid = %shop, customer_uuid = %customer),
        err
    )]
    async fn get_customer(
        &self,
        shop: ShopId,
        customer: CustomerId,
    ) -> Result<CustomerRecord, CustomersServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = self.repository.get_customer(&mut tx, customer).await?;

        tx.commit().await?;

        Ok(record)
    }

    #[tracing::instrument(
        name = "customers.service.create_segment",
        skip(self, segment),
        fields(shop_uuid = %shop, segment_uuid = %segment.uuid),
        err
    )]
    async fn create_segment(
        &self,
        shop: ShopId,
        segment: NewSegment,
    ) -> Result<SegmentRecord, CustomersServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = self.repository.create_segment(&mut tx, segment).await?;

        tx.commit().await?;

        Ok(record)
    }

    #[tracing::instrument(
        name = "customers.service.add_to_segment",
        skip(self),
        fields(shop_uuid = %shop, segment_uuid = %segment, customer_uuid = %customer),
        err
    )]
    async fn add_to_segment(
        &self,
        shop: ShopId,
        segment: SegmentId,
        customer: CustomerId,
    ) -> Result<(), CustomersServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        self.repository
            .add_customer_to_segment(&mut tx, segment, customer)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    #[tracing::instrument(
        name = "customers.service.remove_from_segment",
        skip(self),
        fields(shop_uuid = %shop, segment_uuid = %segment, customer_uuid = %customer),
        err
    )]
    async fn remove_from_segment(
        &self,
        shop: ShopId,
        segment: SegmentId,
        customer: CustomerId,
    ) -> Result<(), CustomersServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let rows_affected = self
            .repository
            .remove_customer_from_segment(&mut tx, segment, customer)
            .await?;

        if rows_affected == 0 {
            return Err(CustomersServiceError::NotFound);
        }

        tx.commit().await?;

        Ok(())
    }

    #[tracing::instrument(
        name = "customers.service.segment_ids",
        skip(self),
        fields(shop_uuid = %shop, customer_uuid = %customer),
        err
    )]
    async fn segment_ids(
        &self,
        shop: ShopId,
        customer: CustomerId,
    ) -> Result<BTreeSet<SegmentId>, CustomersServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let segments = self.repository.segment_ids(&mut tx, customer).await?;

        tx.commit().await?;

        Ok(segments)
    }
}

#[automock]
#[async_trait]
pub trait CustomersService: Send + Sync {
    async fn create_customer(
        &self,
        shop: ShopId,
        customer: NewCustomer,
    ) -> Result<CustomerRecord, CustomersServiceError>;

    async fn get_customer(
        &self,
        shop: ShopId,
        customer: CustomerId,
    ) -> Result<CustomerRecord, CustomersServiceError>;

    async fn create_segment(
        &self,
        shop: ShopId,
        segment: NewSegment,
    ) -> Result<SegmentRecord, CustomersServiceError>;

    /// Adds a customer to a segment; adding twice is a no-op.
    async fn add_to_segment(
        &self,
        shop: ShopId,
        segment: SegmentId,
        customer: CustomerId,
    ) -> Result<(), CustomersServiceError>;

    async fn remove_from_segment(
        &self,
        shop: ShopId,
        segment: SegmentId,
        customer: CustomerId,
    ) -> Result<(), CustomersServiceError>;

    /// Segments the customer belongs to.
    async fn segment_ids(
        &self,
        shop: ShopId,
        customer: CustomerId,
    ) -> Result<BTreeSet<SegmentId>, CustomersServiceError>;
}
