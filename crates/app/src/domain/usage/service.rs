//! Usage ledger service.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::info;

use bazaar::{
    clock::Clock,
    ids::{CustomerId, DiscountId, ShopId},
    reporting::DiscountUsageReport,
};

use crate::{
    database::Db,
    domain::{
        discounts::repository::PgDiscountsRepository,
        usage::{errors::UsageServiceError, repository::PgUsageRepository},
    },
};

#[derive(Debug, Clone)]
pub struct PgUsageLedgerService {
    db: Db,
    repository: PgUsageRepository,
    discounts: PgDiscountsRepository,
    clock: Arc<dyn Clock>,
}

impl PgUsageLedgerService {
    #[must_use]
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            repository: PgUsageRepository::new(),
            discounts: PgDiscountsRepository::new(),
            clock,
        }
    }
}

#[async_trait]
impl UsageLedgerService for PgUsageLedgerService {
    #[tracing::instrument(
        name = "usage.service.record_usage",
        skip(self),
        fields(
            shop_uuid = %shop,
            discount_uuid = %discount,
            customer_uuid = ?customer,
            accepted = tracing::field::Empty
        ),
        err
    )]
    async fn record_usage(
        &self,
        shop: ShopId,
        discount: DiscountId,
        customer: Option<CustomerId>,
        amount_spent: u64,
    ) -> Result<bool, UsageServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let accepted = self
            .repository
            .try_record_usage(&mut tx, discount, customer, amount_spent, self.clock.now())
            .await?;

        tx.commit().await?;

        tracing::Span::current().record("accepted", accepted);

        if accepted {
            info!(discount_uuid = %discount, "recorded discount usage");
        }

        Ok(accepted)
    }

    #[tracing::instrument(
        name = "usage.service.usage_report",
        skip(self),
        fields(shop_uuid = %shop, discount_uuid = %discount),
        err
    )]
    async fn usage_report(
        &self,
        shop: ShopId,
        discount: DiscountId,
    ) -> Result<DiscountUsageReport, UsageServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = self.discounts.get_discount(&mut tx, discount).await?;

        tx.commit().await?;

        Ok(DiscountUsageReport::new(&record.discount))
    }
}

#[automock]
#[async_trait]
pub trait UsageLedgerService: Send + Sync {
    /// Record one redemption if both the global and per-customer caps allow
    /// it. Returns `false`, changing nothing, when either cap is reached.
    async fn record_usage(
        &self,
        shop: ShopId,
        discount: DiscountId,
        customer: Option<CustomerId>,
        amount_spent: u64,
    ) -> Result<bool, UsageServiceError>;

    /// Redemption totals and per-customer usage of one discount.
    async fn usage_report(
        &self,
        shop: ShopId,
        discount: DiscountId,
    ) -> Result<DiscountUsageReport, UsageServiceError>;
}

#[cfg(test)]
mod tests {
    use bazaar::discounts::SimpleDiscount;
    use testresult::TestResult;
    use tokio::task::JoinSet;

    use crate::test::{TestContext, helpers::order_discount};

    use super::*;

    const RACERS: usize = 8;

    #[tokio::test]
    async fn concurrent_redemptions_of_single_use_discount_accept_exactly_one() -> TestResult {
        let ctx = TestContext::new().await;

        let mut new = order_discount(ctx.shop_uuid, SimpleDiscount::AmountOff { amount: 1_500 })?;
        new.usage_limit = Some(1);
        let discount = new.id;

        ctx.discounts.create_discount(ctx.shop_uuid, new).await?;

        let mut customers = Vec::with_capacity(RACERS);

        for n in 0..RACERS {
            customers.push(
                ctx.create_customer(ctx.shop_uuid, &format!("racer-{n}@example.com"))
                    .await?,
            );
        }

        let mut racers = JoinSet::new();

        for customer in customers {
            let usage = Arc::clone(&ctx.usage);
            let shop = ctx.shop_uuid;

            racers.spawn(async move {
                usage
                    .record_usage(shop, discount, Some(customer), 2_500)
                    .await
            });
        }

        let mut accepted = 0;

        while let Some(result) = racers.join_next().await {
            if result?? {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);

        let report = ctx.usage.usage_report(ctx.shop_uuid, discount).await?;

        assert_eq!(report.total_usage, 1);
        assert_eq!(report.remaining, Some(0));
        assert_eq!(report.customers.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn per_customer_cap_refuses_only_that_customer() -> TestResult {
        let ctx = TestContext::new().await;

        let mut new = order_discount(ctx.shop_uuid, SimpleDiscount::AmountOff { amount: 500 })?;
        new.per_customer_limit = Some(2);
        let discount = new.id;

        ctx.discounts.create_discount(ctx.shop_uuid, new).await?;

        let alice = ctx.create_customer(ctx.shop_uuid, "alice@example.com").await?;
        let bob = ctx.create_customer(ctx.shop_uuid, "bob@example.com").await?;

        assert!(ctx.usage.record_usage(ctx.shop_uuid, discount, Some(alice), 1_000).await?);
        assert!(ctx.usage.record_usage(ctx.shop_uuid, discount, Some(alice), 3_000).await?);
        assert!(!ctx.usage.record_usage(ctx.shop_uuid, discount, Some(alice), 1_000).await?);
        assert!(ctx.usage.record_usage(ctx.shop_uuid, discount, Some(bob), 500).await?);

        let report = ctx.usage.usage_report(ctx.shop_uuid, discount).await?;

        // The refused redemption must not have touched the global counter.
        assert_eq!(report.total_usage, 3);
        assert_eq!(
            report
                .customers
                .iter()
                .map(|usage| (usage.customer_id, usage.usage_count, usage.total_spent))
                .collect::<Vec<_>>(),
            vec![(alice, 2, 4_000), (bob, 1, 500)]
        );

        Ok(())
    }

    #[tokio::test]
    async fn guests_cannot_redeem_per_customer_capped_discounts() -> TestResult {
        let ctx = TestContext::new().await;

        let mut capped = order_discount(ctx.shop_uuid, SimpleDiscount::AmountOff { amount: 500 })?;
        capped.per_customer_limit = Some(1);
        let capped_id = capped.id;

        let open = order_discount(ctx.shop_uuid, SimpleDiscount::AmountOff { amount: 200 })?;
        let open_id = open.id;

        ctx.discounts.create_discount(ctx.shop_uuid, capped).await?;
        ctx.discounts.create_discount(ctx.shop_uuid, open).await?;

        assert!(!ctx.usage.record_usage(ctx.shop_uuid, capped_id, None, 1_000).await?);
        assert!(ctx.usage.record_usage(ctx.shop_uuid, open_id, None, 1_000).await?);

        let report = ctx.usage.usage_report(ctx.shop_uuid, open_id).await?;

        assert_eq!(report.total_usage, 1);
        assert!(report.customers.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn unknown_discount_is_not_found() -> TestResult {
        let ctx = TestContext::new().await;

        let result = ctx
            .usage
            .record_usage(ctx.shop_uuid, DiscountId::new(), None, 1_000)
            .await;

        assert!(
            matches!(result, Err(UsageServiceError::NotFound)),
            "expected NotFound, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn other_shops_discount_is_not_found() -> TestResult {
        let ctx = TestContext::new().await;
        let other = ctx.create_shop("Other").await;

        let new = order_discount(other, SimpleDiscount::AmountOff { amount: 500 })?;
        let discount = new.id;

        ctx.discounts.create_discount(other, new).await?;

        let result = ctx
            .usage
            .record_usage(ctx.shop_uuid, discount, None, 1_000)
            .await;

        assert!(
            matches!(result, Err(UsageServiceError::NotFound)),
            "expected NotFound across shops, got {result:?}"
        );

        Ok(())
    }
}
