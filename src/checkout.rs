//! Checkout
//!
//! Order commit: redeem every discount the priced order uses against the usage
//! ledger, dropping and re-pricing around any discount whose cap was taken by
//! a concurrent order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    cart::{Cart, CartError, CartPricingEngine, engine::PricingRules},
    catalog::Catalog,
    clock::Clock,
    directory::Directory,
    discounts::DiscountStore,
    ids::DiscountId,
    ledger::{UsageLedger, UsageLedgerError},
    money::{self, Amount},
};

/// Checkout errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// Nothing purchasable in the cart.
    #[error("cart is empty")]
    EmptyCart,

    /// Pricing failure.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] UsageLedgerError),
}

/// One discount's use within one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    /// Discount
    pub discount_id: DiscountId,

    /// Sum of the final totals of the lines it priced
    pub amount_spent: u64,

    /// Sum of the savings it gave
    pub savings: u64,
}

/// The redemptions a priced cart implies, one per distinct discount, ordered by
/// discount id.
///
/// # Errors
///
/// Returns [`CartError::Amount`] if a sum overflows.
pub fn redemptions(cart: &Cart) -> Result<Vec<Redemption>, CartError> {
    let currency = cart.iso_currency()?;
    let zero = money::from_minor(0, currency)?;

    let mut grouped: BTreeMap<DiscountId, (Amount, Amount)> = BTreeMap::new();

    for item in cart.items.iter().filter(|item| item.available) {
        let Some(discount_id) = item.applied_discount_id() else {
            continue;
        };

        let (spent, savings) = grouped.entry(discount_id).or_insert((zero, zero));

        *spent = spent.add(money::from_minor(item.final_line_total, currency)?)?;
        *savings = savings.add(money::from_minor(item.discount_amount, currency)?)?;
    }

    grouped
        .into_iter()
        .map(|(discount_id, (spent, savings))| -> Result<Redemption, CartError> {
            Ok(Redemption {
                discount_id,
                amount_spent: money::to_minor(&spent)?,
                savings: money::to_minor(&savings)?,
            })
        })
        .collect()
}

/// A recorded redemption whose spend no longer matches the order.
///
/// Dropping a discount re-prices the order, which can move lines onto a
/// discount whose redemption was already recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendSettlement {
    /// Discount
    pub discount_id: DiscountId,

    /// Spend recorded with the redemption
    pub recorded: u64,

    /// Spend in the final order
    pub settled: u64,
}

/// Result of a completed checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    /// The order as priced after every redemption settled
    pub order: Cart,

    /// Redemptions the ledger accepted
    pub accepted: Vec<Redemption>,

    /// Discounts dropped because their caps were reached at commit time
    pub dropped: Vec<DiscountId>,
}

/// An order commit in progress.
///
/// Drive it with [`pending`](Self::pending), recording each redemption with
/// the ledger, then [`accept`](Self::accept) or
/// [`CartPricingEngine::reject_redemption`], until nothing is pending. Then
/// settle every [`unsettled`](Self::unsettled) spend with the ledger before
/// [`finish`](Self::finish).
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    order: Cart,
    rules: PricingRules,
    recorded: BTreeMap<DiscountId, u64>,
    dropped: Vec<DiscountId>,
}

impl CheckoutSession {
    /// The order as currently priced.
    #[must_use]
    pub fn order(&self) -> &Cart {
        &self.order
    }

    /// The next redemption to record, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Amount`] if a sum overflows.
    pub fn pending(&self) -> Result<Option<Redemption>, CartError> {
        Ok(redemptions(&self.order)?
            .into_iter()
            .find(|redemption| !self.rules.redeemed.contains(&redemption.discount_id)))
    }

    /// Mark a redemption as recorded by the ledger.
    pub fn accept(&mut self, redemption: &Redemption) {
        self.rules.redeemed.insert(redemption.discount_id);
        self.recorded.insert(redemption.discount_id, redemption.amount_spent);
    }

    /// Recorded redemptions whose spend differs from the order as now priced.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Amount`] if a sum overflows.
    pub fn unsettled(&self) -> Result<Vec<SpendSettlement>, CartError> {
        let current: BTreeMap<DiscountId, u64> = redemptions(&self.order)?
            .into_iter()
            .map(|redemption| (redemption.discount_id, redemption.amount_spent))
            .collect();

        Ok(self
            .recorded
            .iter()
            .filter_map(|(&discount_id, &recorded)| {
                let settled = current.get(&discount_id).copied().unwrap_or(0);

                (settled != recorded).then_some(SpendSettlement {
                    discount_id,
                    recorded,
                    settled,
                })
            })
            .collect())
    }

    /// Finish the commit.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Amount`] if a sum overflows.
    pub fn finish(self) -> Result<CheckoutOutcome, CartError> {
        let accepted = redemptions(&self.order)?
            .into_iter()
            .filter(|redemption| self.rules.redeemed.contains(&redemption.discount_id))
            .collect();

        Ok(CheckoutOutcome {
            order: self.order,
            accepted,
            dropped: self.dropped,
        })
    }
}

impl<C, D, S, K> CartPricingEngine<C, D, S, K>
where
    C: Catalog,
    D: Directory,
    S: DiscountStore,
    K: Clock,
{
    /// Price the cart for commit.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::EmptyCart`] when no line can be purchased.
    pub fn begin_checkout(&self, cart: &Cart) -> Result<CheckoutSession, CheckoutError> {
        let mut order = cart.clone();
        let rules = PricingRules::default();

        self.reprice(&mut order, &rules)?;

        if !order.has_available_items() {
            return Err(CheckoutError::EmptyCart);
        }

        Ok(CheckoutSession {
            order,
            rules,
            recorded: BTreeMap::new(),
            dropped: Vec::new(),
        })
    }

    /// Drop a discount the ledger refused and re-price the order without it.
    ///
    /// # Errors
    ///
    /// Returns an error if re-pricing fails.
    pub fn reject_redemption(
        &self,
        session: &mut CheckoutSession,
        discount_id: DiscountId,
    ) -> Result<(), CheckoutError> {
        warn!(
            cart_id = %session.order.id,
            discount_id = %discount_id,
            "discount usage limit reached at checkout, dropping it from the order"
        );

        session.rules.excluded.insert(discount_id);

        if !session.dropped.contains(&discount_id) {
            session.dropped.push(discount_id);
        }

        self.reprice(&mut session.order, &session.rules)?;

        Ok(())
    }

    /// Commit the cart against `ledger` and clear it.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::EmptyCart`] for an empty cart, or the first
    /// pricing or ledger failure. The cart is only cleared on success.
    pub fn checkout<L: UsageLedger>(
        &self,
        cart: &mut Cart,
        ledger: &L,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let mut session = self.begin_checkout(cart)?;
        let customer_id = cart.customer_id();

        while let Some(redemption) = session.pending()? {
            if ledger.try_record_usage(
                redemption.discount_id,
                customer_id,
                redemption.amount_spent,
            )? {
                session.accept(&redemption);
            } else {
                self.reject_redemption(&mut session, redemption.discount_id)?;
            }
        }

        if let Some(customer_id) = customer_id {
            for settlement in session.unsettled()? {
                ledger.settle_spend(
                    settlement.discount_id,
                    customer_id,
                    settlement.recorded,
                    settlement.settled,
                )?;
            }
        }

        let outcome = session.finish()?;

        self.clear_cart(cart)?;

        info!(
            cart_id = %outcome.order.id,
            grand_total = outcome.order.grand_total,
            redemptions = outcome.accepted.len(),
            dropped = outcome.dropped.len(),
            "checked out cart"
        );

        Ok(outcome)
    }
}
