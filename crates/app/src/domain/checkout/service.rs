//! Checkout service.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{Span, info};

use bazaar::{
    checkout::CheckoutOutcome,
    clock::Clock,
    ids::{CartId, ShopId},
};

use crate::{
    database::Db,
    domain::{
        carts::{
            repositories::PgCartsRepository,
            snapshot::{PgSnapshotLoader, engine},
        },
        checkout::errors::CheckoutServiceError,
        usage::repository::PgUsageRepository,
    },
};

#[derive(Debug, Clone)]
pub struct PgCheckoutService {
    db: Db,
    carts: PgCartsRepository,
    snapshots: PgSnapshotLoader,
    usage: PgUsageRepository,
    clock: Arc<dyn Clock>,
}

impl PgCheckoutService {
    #[must_use]
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            carts: PgCartsRepository::new(),
            snapshots: PgSnapshotLoader::new(),
            usage: PgUsageRepository::new(),
            clock,
        }
    }
}

#[async_trait]
impl CheckoutService for PgCheckoutService {
    #[tracing::instrument(
        name = "checkout.service.checkout",
        skip(self),
        fields(
            shop_uuid = %shop,
            cart_uuid = %cart,
            grand_total = tracing::field::Empty,
            dropped = tracing::field::Empty
        ),
        err
    )]
    async fn checkout(
        &self,
        shop: ShopId,
        cart: CartId,
    ) -> Result<CheckoutOutcome, CheckoutServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let mut current = self.carts.lock_cart(&mut tx, cart).await?;
        let customer = current.customer_id();

        let store = self
            .snapshots
            .load(&mut tx, &current, None, Arc::clone(&self.clock))
            .await?;

        let engine = engine(&store);
        let mut session = engine.begin_checkout(&current)?;

        // Redemptions come out in discount id order, so concurrent checkouts
        // take discount row locks in the same order.
        while let Some(redemption) = session.pending()? {
            let accepted = match self
                .usage
                .try_record_usage(
                    &mut tx,
                    redemption.discount_id,
                    customer,
                    redemption.amount_spent,
                    self.clock.now(),
                )
                .await
            {
                Ok(accepted) => accepted,
                // Deleted since the snapshot was read.
                Err(sqlx::Error::RowNotFound) => false,
                Err(error) => return Err(error.into()),
            };

            if accepted {
                session.accept(&redemption);
            } else {
                engine.reject_redemption(&mut session, redemption.discount_id)?;
            }
        }

        if let Some(customer) = customer {
            for settlement in session.unsettled()? {
                self.usage
                    .settle_spend(
                        &mut tx,
                        settlement.discount_id,
                        customer,
                        settlement.recorded,
                        settlement.settled,
                    )
                    .await?;
            }
        }

        let outcome = session.finish()?;

        engine.clear_cart(&mut current)?;

        self.carts.save_cart(&mut tx, &current).await?;

        tx.commit().await?;

        Span::current().record("grand_total", outcome.order.grand_total);
        Span::current().record("dropped", outcome.dropped.len());

        info!(
            cart_uuid = %cart,
            redemptions = outcome.accepted.len(),
            "checked out cart"
        );

        Ok(outcome)
    }
}

#[automock]
#[async_trait]
pub trait CheckoutService: Send + Sync {
    /// Commit the cart as an order.
    ///
    /// Every discount the order uses is redeemed against the usage ledger.
    /// A discount whose cap was taken by a concurrent order is dropped and the
    /// order re-priced without it. The cart is emptied in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutServiceError::Checkout`] for a cart with nothing to
    /// buy, or [`CheckoutServiceError::NotFound`] for an unknown cart.
    async fn checkout(
        &self,
        shop: ShopId,
        cart: CartId,
    ) -> Result<CheckoutOutcome, CheckoutServiceError>;
}

#[cfg(test)]
mod tests {
    use std::{cmp::Reverse, sync::Arc};

    use bazaar::{
        cart::{Cart, CartOwner},
        checkout::CheckoutError,
        discounts::SimpleDiscount,
        ids::CustomerId,
    };
    use testresult::TestResult;
    use tokio::task::JoinSet;

    use crate::test::{
        TestContext,
        helpers::{order_discount, product_discount},
    };

    use super::*;

    const ORDERS: usize = 6;

    #[tokio::test]
    async fn concurrent_checkouts_redeem_a_single_use_discount_once() -> TestResult {
        let ctx = TestContext::new().await;
        let gadget = ctx.create_product(ctx.shop_uuid, "Gadget", 2_500).await?;

        let mut first_come =
            product_discount(ctx.shop_uuid, gadget, SimpleDiscount::AmountOff { amount: 1_500 })?;
        first_come.usage_limit = Some(1);
        let first_come_id = first_come.id;

        let everyone = order_discount(ctx.shop_uuid, SimpleDiscount::AmountOff { amount: 200 })?;
        let everyone_id = everyone.id;

        ctx.discounts.create_discount(ctx.shop_uuid, first_come).await?;
        ctx.discounts.create_discount(ctx.shop_uuid, everyone).await?;

        let mut carts = Vec::with_capacity(ORDERS);

        for order in 0..ORDERS {
            let customer_id = ctx
                .create_customer(ctx.shop_uuid, &format!("customer-{order}@example.com"))
                .await?;

            let cart = ctx
                .carts
                .get_or_create_cart(ctx.shop_uuid, CartOwner::Customer { customer_id })
                .await?;

            let priced = ctx
                .carts
                .add_item(ctx.shop_uuid, cart.id, gadget, None, 1)
                .await?;

            assert_eq!(priced.total_discounts, 1_500);

            carts.push(priced.id);
        }

        let mut tasks = JoinSet::new();

        for cart in carts {
            let checkout = Arc::clone(&ctx.checkout);
            let shop = ctx.shop_uuid;

            tasks.spawn(async move { checkout.checkout(shop, cart).await });
        }

        let mut outcomes = Vec::with_capacity(ORDERS);

        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined??);
        }

        let winners = outcomes
            .iter()
            .filter(|outcome| {
                outcome
                    .accepted
                    .iter()
                    .any(|redemption| redemption.discount_id == first_come_id)
            })
            .count();

        assert_eq!(winners, 1);

        let losers: Vec<_> = outcomes
            .iter()
            .filter(|outcome| outcome.dropped == vec![first_come_id])
            .collect();

        assert_eq!(losers.len(), ORDERS - 1);
        assert!(losers.iter().all(|outcome| {
            outcome.order.grand_total == 2_300
                && outcome
                    .accepted
                    .iter()
                    .map(|redemption| redemption.discount_id)
                    .eq([everyone_id])
        }));

        let report = ctx.usage.usage_report(ctx.shop_uuid, first_come_id).await?;

        assert_eq!(report.total_usage, 1);
        assert_eq!(report.remaining, Some(0));

        let fallback = ctx.usage.usage_report(ctx.shop_uuid, everyone_id).await?;

        assert_eq!(fallback.total_usage, u32::try_from(ORDERS - 1)?);

        Ok(())
    }

    #[tokio::test]
    async fn spend_follows_the_order_after_a_contested_discount_is_dropped() -> TestResult {
        let ctx = TestContext::new().await;
        let gadget = ctx.create_product(ctx.shop_uuid, "Gadget", 2_500).await?;
        let mug = ctx.create_product(ctx.shop_uuid, "Mug", 1_000).await?;

        // Created first, so it is recorded before the contested discount.
        let sitewide = order_discount(ctx.shop_uuid, SimpleDiscount::percentage_off(10))?;
        let sitewide_id = sitewide.id;

        let mut first_come =
            product_discount(ctx.shop_uuid, gadget, SimpleDiscount::AmountOff { amount: 1_500 })?;
        first_come.usage_limit = Some(1);

        ctx.discounts.create_discount(ctx.shop_uuid, sitewide).await?;
        ctx.discounts.create_discount(ctx.shop_uuid, first_come).await?;

        let mut carts = Vec::with_capacity(ORDERS);

        for order in 0..ORDERS {
            let (_, cart) = customer_cart(&ctx, &format!("spender-{order}@example.com")).await?;

            ctx.carts
                .add_item(ctx.shop_uuid, cart.id, gadget, None, 1)
                .await?;
            ctx.carts
                .add_item(ctx.shop_uuid, cart.id, mug, None, 1)
                .await?;

            carts.push(cart.id);
        }

        let mut tasks = JoinSet::new();

        for cart in carts {
            let checkout = Arc::clone(&ctx.checkout);
            let shop = ctx.shop_uuid;

            tasks.spawn(async move { checkout.checkout(shop, cart).await });
        }

        let mut spent: Vec<(CustomerId, u32, u64)> = Vec::with_capacity(ORDERS);

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined??;
            let customer_id = outcome.order.customer_id().ok_or("guest order")?;
            let redemption = outcome
                .accepted
                .iter()
                .find(|redemption| redemption.discount_id == sitewide_id)
                .ok_or("sitewide discount not redeemed")?;

            spent.push((customer_id, 1, redemption.amount_spent));
        }

        spent.sort_by_key(|&(customer_id, _, amount)| (Reverse(amount), customer_id));

        assert_eq!(
            spent.iter().filter(|&&(_, _, amount)| amount == 3_150).count(),
            ORDERS - 1
        );

        let report = ctx.usage.usage_report(ctx.shop_uuid, sitewide_id).await?;

        assert_eq!(
            report
                .customers
                .iter()
                .map(|usage| (usage.customer_id, usage.usage_count, usage.total_spent))
                .collect::<Vec<_>>(),
            spent
        );

        Ok(())
    }

    async fn customer_cart(ctx: &TestContext, email: &str) -> TestResult<(CustomerId, Cart)> {
        let customer_id = ctx.create_customer(ctx.shop_uuid, email).await?;

        let cart = ctx
            .carts
            .get_or_create_cart(ctx.shop_uuid, CartOwner::Customer { customer_id })
            .await?;

        Ok((customer_id, cart))
    }

    #[tokio::test]
    async fn checkout_clears_the_cart_and_records_spend() -> TestResult {
        let ctx = TestContext::new().await;
        let hoodie = ctx.create_product(ctx.shop_uuid, "Hoodie", 5_000).await?;
        let customer_id = ctx.create_customer(ctx.shop_uuid, "bob@example.com").await?;

        let twenty = product_discount(ctx.shop_uuid, hoodie, SimpleDiscount::percentage_off(20))?;
        let twenty_id = twenty.id;

        ctx.discounts.create_discount(ctx.shop_uuid, twenty).await?;

        let cart = ctx
            .carts
            .get_or_create_cart(ctx.shop_uuid, CartOwner::Customer { customer_id })
            .await?;

        ctx.carts
            .add_item(ctx.shop_uuid, cart.id, hoodie, None, 2)
            .await?;

        let outcome = ctx.checkout.checkout(ctx.shop_uuid, cart.id).await?;

        assert_eq!(outcome.order.grand_total, 8_000);
        assert!(outcome.dropped.is_empty());

        let emptied = ctx.carts.get_cart(ctx.shop_uuid, cart.id).await?;

        assert!(emptied.items.is_empty());
        assert_eq!(emptied.grand_total, 0);

        let report = ctx.usage.usage_report(ctx.shop_uuid, twenty_id).await?;

        assert_eq!(
            report
                .customers
                .iter()
                .map(|usage| (usage.customer_id, usage.usage_count, usage.total_spent))
                .collect::<Vec<_>>(),
            vec![(customer_id, 1, 8_000)]
        );

        Ok(())
    }

    #[tokio::test]
    async fn empty_cart_cannot_be_checked_out() -> TestResult {
        let ctx = TestContext::new().await;

        let cart = ctx
            .carts
            .get_or_create_cart(
                ctx.shop_uuid,
                CartOwner::Guest {
                    session_id: "session-1".to_string(),
                },
            )
            .await?;

        let result = ctx.checkout.checkout(ctx.shop_uuid, cart.id).await;

        assert!(
            matches!(
                result,
                Err(CheckoutServiceError::Checkout(CheckoutError::EmptyCart))
            ),
            "expected EmptyCart, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn unknown_cart_is_not_found() {
        let ctx = TestContext::new().await;

        let result = ctx.checkout.checkout(ctx.shop_uuid, CartId::new()).await;

        assert!(
            matches!(result, Err(CheckoutServiceError::NotFound)),
            "expected NotFound, got {result:?}"
        );
    }
}
