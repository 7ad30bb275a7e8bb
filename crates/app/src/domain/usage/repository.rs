//! Usage Repository

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{Acquire, Postgres, Transaction, query, query_scalar};
use tracing::debug;

use bazaar::ids::{CustomerId, DiscountId};

use crate::database::amount_to_sql;

const CLAIM_USAGE_SQL: &str = include_str!("sql/claim_usage.sql");
const RECORD_CUSTOMER_USAGE_SQL: &str = include_str!("sql/record_customer_usage.sql");
const DISCOUNT_EXISTS_SQL: &str = include_str!("sql/discount_exists.sql");
const SETTLE_CUSTOMER_SPEND_SQL: &str = include_str!("sql/settle_customer_spend.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgUsageRepository;

impl PgUsageRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Record one redemption if both caps still allow it.
    ///
    /// The global counter is bumped by a conditional `UPDATE`, which also
    /// takes the discount's row lock and so serialises every committer of the
    /// discount. The per-customer counter is bumped by a conditional upsert.
    /// Both run inside a savepoint; if either matches no row the savepoint is
    /// rolled back and `false` is returned with nothing changed.
    ///
    /// Returns [`sqlx::Error::RowNotFound`] when the discount does not exist.
    pub(crate) async fn try_record_usage(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        discount: DiscountId,
        customer: Option<CustomerId>,
        amount_spent: u64,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let amount_spent = amount_to_sql(amount_spent, "total_spent")?;
        let customer_uuid = customer.map(|customer| customer.into_uuid());

        let mut savepoint = (&mut **tx).begin().await?;

        let claimed: Option<Option<i32>> = query_scalar(CLAIM_USAGE_SQL)
            .bind(discount.into_uuid())
            .bind(customer_uuid)
            .fetch_optional(&mut *savepoint)
            .await?;

        let Some(per_customer_limit) = claimed else {
            savepoint.rollback().await?;

            let exists: bool = query_scalar(DISCOUNT_EXISTS_SQL)
                .bind(discount.into_uuid())
                .fetch_one(&mut **tx)
                .await?;

            if !exists {
                return Err(sqlx::Error::RowNotFound);
            }

            debug!(discount_uuid = %discount, "usage limit reached");

            return Ok(false);
        };

        if let Some(customer_uuid) = customer_uuid {
            let usage_count: Option<i32> = query_scalar(RECORD_CUSTOMER_USAGE_SQL)
                .bind(discount.into_uuid())
                .bind(customer_uuid)
                .bind(SqlxTimestamp::from(now))
                .bind(amount_spent)
                .bind(per_customer_limit)
                .fetch_optional(&mut *savepoint)
                .await?;

            if usage_count.is_none() {
                savepoint.rollback().await?;

                debug!(discount_uuid = %discount, "per-customer limit reached");

                return Ok(false);
            }
        }

        savepoint.commit().await?;

        Ok(true)
    }
    /// Replace `recorded` with `settled` in the customer's total spend on the
    /// discount. Counters are left alone.
    pub(crate) async fn settle_spend(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        discount: DiscountId,
        customer: CustomerId,
        recorded: u64,
        settled: u64,
    ) -> Result<(), sqlx::Error> {
        query(SETTLE_CUSTOMER_SPEND_SQL)
            .bind(discount.into_uuid())
            .bind(customer.into_uuid())
            .bind(amount_to_sql(recorded, "total_spent")?)
            .bind(amount_to_sql(settled, "total_spent")?)
            .execute(&mut **tx)
            .await?;

        debug!(discount_uuid = %discount, recorded, settled, "settled customer spend");

        Ok(())
    }
}
