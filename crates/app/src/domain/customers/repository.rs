//! Customers Repository

use std::collections::BTreeSet;

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, query_scalar};
use uuid::Uuid;

use bazaar::ids::{CustomerId, SegmentId, ShopId};

use crate::domain::customers::{
    data::{NewCustomer, NewSegment},
    records::{CustomerRecord, SegmentRecord},
};

const CREATE_CUSTOMER_SQL: &str = include_str!("sql/create_customer.sql");
const GET_CUSTOMER_SQL: &str = include_str!("sql/get_customer.sql");
const CREATE_SEGMENT_SQL: &str = include_str!("sql/create_segment.sql");
const ADD_SEGMENT_CUSTOMER_SQL: &str = include_str!("sql/add_segment_customer.sql");
const REMOVE_SEGMENT_CUSTOMER_SQL: &str = include_str!("sql/remove_segment_customer.sql");
const GET_SEGMENT_IDS_SQL: &str = include_str!("sql/get_segment_ids.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgCustomersRepository;

impl PgCustomersRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_customer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        customer: NewCustomer,
    ) -> Result<CustomerRecord, sqlx::Error> {
        query_as::<Postgres, CustomerRecord>(CREATE_CUSTOMER_SQL)
            .bind(customer.uuid.into_uuid())
            .bind(customer.email.trim())
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn get_customer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        customer: CustomerId,
    ) -> Result<CustomerRecord, sqlx::Error> {
        query_as::<Postgres, CustomerRecord>(GET_CUSTOMER_SQL)
            .bind(customer.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn create_segment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        segment: NewSegment,
    ) -> Result<SegmentRecord, sqlx::Error> {
        query_as::<Postgres, SegmentRecord>(CREATE_SEGMENT_SQL)
            .bind(segment.uuid.into_uuid())
            .bind(segment.name)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn add_customer_to_segment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        segment: SegmentId,
        customer: CustomerId,
    ) -> Result<(), sqlx::Error> {
        query(ADD_SEGMENT_CUSTOMER_SQL)
            .bind(segment.into_uuid())
            .bind(customer.into_uuid())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    pub(crate) async fn remove_customer_from_segment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        segment: SegmentId,
        customer: CustomerId,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(REMOVE_SEGMENT_CUSTOMER_SQL)
            .bind(segment.into_uuid())
            .bind(customer.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    /// Segments the customer belongs to. Unknown customers belong to none.
    pub(crate) async fn segment_ids(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        customer: CustomerId,
    ) -> Result<BTreeSet<SegmentId>, sqlx::Error> {
        let uuids: Vec<Uuid> = query_scalar(GET_SEGMENT_IDS_SQL)
            .bind(customer.into_uuid())
            .fetch_all(&mut **tx)
            .await?;

        Ok(uuids.into_iter().map(SegmentId::from_uuid).collect())
    }
}

impl<'r> FromRow<'r, PgRow> for CustomerRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            uuid: CustomerId::from_uuid(row.try_get("uuid")?),
            shop_uuid: ShopId::from_uuid(row.try_get("shop_uuid")?),
            email: row.try_get("email")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}

impl<'r> FromRow<'r, PgRow> for SegmentRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            uuid: SegmentId::from_uuid(row.try_get("uuid")?),
            shop_uuid: ShopId::from_uuid(row.try_get("shop_uuid")?),
            name: row.try_get("name")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        })
    }
}
