//! Cart pricing engine

use std::collections::BTreeSet;

use rusty_money::iso::Currency;
use tracing::{debug, error, warn};

use crate::{
    cart::{Cart, CartError, CartItem, ValidationError},
    catalog::{Catalog, CatalogError, CatalogProduct},
    clock::{Clock, SystemClock},
    directory::Directory,
    discounts::{DiscountStore, DiscountStoreError, normalize_coupon_code},
    eligibility::{EligibilityContext, IneligibilityReason, evaluate},
    ids::{DiscountId, ProductId, ShopId, VariantId},
    money,
    reporting::{CandidateEvaluation, CartWithDiscountDetails},
    selection::select_best,
};

/// Extra constraints on a pricing pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct PricingRules {
    /// Discounts that may not be selected.
    pub(crate) excluded: BTreeSet<DiscountId>,

    /// Discounts this order already holds a redemption for; their caps no
    /// longer apply to it.
    pub(crate) redeemed: BTreeSet<DiscountId>,
}

impl PricingRules {
    fn allows(&self, evaluation: &CandidateEvaluation) -> bool {
        let id = evaluation.discount.id();

        if self.excluded.contains(&id) {
            return false;
        }

        evaluation.result.usable
            || (self.redeemed.contains(&id)
                && matches!(
                    evaluation.result.reason,
                    Some(IneligibilityReason::TotalLimitHit | IneligibilityReason::CustomerLimitHit)
                ))
    }
}

/// Prices carts against live catalog prices and the shop's discounts.
///
/// Every operation works on a copy of the cart and only replaces the caller's
/// cart once the copy has been fully re-priced, so a failed operation leaves
/// the cart as it was.
#[derive(Debug)]
pub struct CartPricingEngine<C, D, S, K = SystemClock> {
    catalog: C,
    directory: D,
    discounts: S,
    clock: K,
}

impl<C, D, S, K> CartPricingEngine<C, D, S, K>
where
    C: Catalog,
    D: Directory,
    S: DiscountStore,
    K: Clock,
{
    /// Assemble an engine from its collaborators.
    pub fn new(catalog: C, directory: D, discounts: S, clock: K) -> Self {
        Self {
            catalog,
            directory,
            discounts,
            clock,
        }
    }

    /// The engine's clock.
    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Add `quantity` units of a product or variant.
    ///
    /// An existing line for the same product and variant is topped up,
    /// otherwise a new line is appended.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero quantity, and
    /// [`CartError::ProductNotFound`] / [`CartError::VariantNotFound`] when the
    /// product is missing or belongs to another shop.
    pub fn add_item(
        &self,
        cart: &mut Cart,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: u32,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(ValidationError::ZeroQuantity.into());
        }

        let product = self.shop_product(cart.shop_id, product_id)?;

        if let Some(variant_id) = variant_id
            && product.variant(variant_id).is_none()
        {
            return Err(CartError::VariantNotFound {
                product_id,
                variant_id,
            });
        }

        let mut next = cart.clone();

        match next
            .items
            .iter_mut()
            .find(|item| item.is_line(product_id, variant_id))
        {
            Some(item) => {
                item.quantity = item.quantity.checked_add(quantity).ok_or_else(|| {
                    ValidationError::QuantityTooLarge(
                        i64::from(item.quantity).saturating_add(i64::from(quantity)),
                    )
                })?;
            }
            None => next
                .items
                .push(CartItem::snapshot(&product, variant_id, quantity)),
        }

        self.commit(cart, next)
    }

    /// Set the quantity of an existing line; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a negative or oversized quantity and
    /// [`CartError::ItemNotFound`] if the line is not in the cart.
    pub fn update_item(
        &self,
        cart: &mut Cart,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: i64,
    ) -> Result<(), CartError> {
        if quantity < 0 {
            return Err(ValidationError::NegativeQuantity(quantity).into());
        }

        let quantity = u32::try_from(quantity)
            .map_err(|_err| ValidationError::QuantityTooLarge(quantity))?;

        let mut next = cart.clone();
        let position = line_position(&next, product_id, variant_id)?;

        if quantity == 0 {
            next.items.remove(position);
        } else if let Some(item) = next.items.get_mut(position) {
            item.quantity = quantity;
        }

        self.commit(cart, next)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ItemNotFound`] if the line is not in the cart.
    pub fn remove_item(
        &self,
        cart: &mut Cart,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Result<(), CartError> {
        let mut next = cart.clone();
        let position = line_position(&next, product_id, variant_id)?;

        next.items.remove(position);

        self.commit(cart, next)
    }

    /// Remove every line, coupon and charge.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn clear_cart(&self, cart: &mut Cart) -> Result<(), CartError> {
        let mut next = cart.clone();

        next.items.clear();
        next.applied_discount_ids.clear();
        next.shipping_cost = 0;
        next.tax_amount = 0;

        self.commit(cart, next)
    }

    /// Enter a coupon code for the whole order.
    ///
    /// Applying the same coupon twice is a no-op. The coupon still has to pass
    /// eligibility on each line before it discounts anything.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::CouponNotFound`] for an unknown code,
    /// [`CartError::CouponShopMismatch`] for another shop's coupon and
    /// [`CartError::CouponInactive`] if it is switched off or out of its
    /// window.
    pub fn apply_coupon(&self, cart: &mut Cart, code: &str) -> Result<DiscountId, CartError> {
        let code = normalize_coupon_code(code).ok_or(ValidationError::EmptyCouponCode)?;

        let discount = match self.discounts.by_coupon_code(cart.shop_id, &code) {
            Ok(discount) => discount,
            Err(DiscountStoreError::CouponNotFound(code)) => {
                return Err(CartError::CouponNotFound(code));
            }
            Err(err) => return Err(err.into()),
        };

        if discount.shop_id() != cart.shop_id {
            return Err(CartError::CouponShopMismatch);
        }

        if !discount.is_usable_at(self.clock.now()) {
            return Err(CartError::CouponInactive(code));
        }

        let mut next = cart.clone();

        if !next.applied_discount_ids.contains(&discount.id()) {
            next.applied_discount_ids.push(discount.id());
        }

        self.commit(cart, next)?;

        Ok(discount.id())
    }

    /// Withdraw a coupon; removing one that was never applied is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if re-pricing fails.
    pub fn remove_coupon(
        &self,
        cart: &mut Cart,
        discount_id: DiscountId,
    ) -> Result<(), CartError> {
        let mut next = cart.clone();

        next.applied_discount_ids.retain(|id| *id != discount_id);

        self.commit(cart, next)
    }

    /// Store externally computed shipping and tax.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Amount`] if the grand total overflows.
    pub fn set_charges(
        &self,
        cart: &mut Cart,
        shipping_cost: u64,
        tax_amount: u64,
    ) -> Result<(), CartError> {
        let mut next = cart.clone();

        next.shipping_cost = shipping_cost;
        next.tax_amount = tax_amount;

        self.commit(cart, next)
    }

    /// Re-price every line and total the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if a collaborator fails (other than a missing product,
    /// which only marks that line unavailable) or a total overflows.
    pub fn recompute(&self, cart: &mut Cart) -> Result<(), CartError> {
        self.reprice(cart, &PricingRules::default()).map(drop)
    }

    /// [`recompute`](Self::recompute), never selecting any of `excluded`.
    ///
    /// # Errors
    ///
    /// Same as [`recompute`](Self::recompute).
    pub fn recompute_excluding(
        &self,
        cart: &mut Cart,
        excluded: &BTreeSet<DiscountId>,
    ) -> Result<(), CartError> {
        let rules = PricingRules {
            excluded: excluded.clone(),
            ..PricingRules::default()
        };

        self.reprice(cart, &rules).map(drop)
    }

    /// Re-price a copy of the cart and explain every candidate discount.
    ///
    /// # Errors
    ///
    /// Same as [`recompute`](Self::recompute).
    pub fn details(&self, cart: &Cart) -> Result<CartWithDiscountDetails, CartError> {
        let mut priced = cart.clone();
        let evaluations = self.reprice(&mut priced, &PricingRules::default())?;

        Ok(CartWithDiscountDetails::new(priced, evaluations))
    }

    fn commit(&self, cart: &mut Cart, mut next: Cart) -> Result<(), CartError> {
        self.reprice(&mut next, &PricingRules::default())?;

        *cart = next;

        Ok(())
    }

    fn shop_product(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
    ) -> Result<CatalogProduct, CartError> {
        match self.catalog.product(product_id) {
            Ok(product) if product.shop_id == shop_id => Ok(product),
            Ok(_) | Err(CatalogError::ProductNotFound(_)) => {
                Err(CartError::ProductNotFound(product_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// One full pricing pass. Returns the evaluated candidates of each line, in
    /// item order.
    pub(crate) fn reprice(
        &self,
        cart: &mut Cart,
        rules: &PricingRules,
    ) -> Result<Vec<Vec<CandidateEvaluation>>, CartError> {
        let now = self.clock.now();

        let segment_ids = match cart.customer_id() {
            Some(customer_id) => self
                .directory
                .customer_segment_ids(cart.shop_id, customer_id)?,
            None => BTreeSet::new(),
        };

        let shop_id = cart.shop_id;
        let customer_id = cart.customer_id();
        let coupons = cart.applied_discount_ids.clone();
        let currency = cart.iso_currency()?;

        let mut evaluations = Vec::with_capacity(cart.items.len());

        for item in &mut cart.items {
            let product = match self.shop_product(shop_id, item.product_id) {
                Ok(product) => product,
                Err(CartError::ProductNotFound(product_id)) => {
                    warn!(
                        cart_id = %cart.id,
                        product_id = %product_id,
                        "product no longer available, skipping cart item"
                    );

                    item.mark_unavailable();
                    evaluations.push(Vec::new());

                    continue;
                }
                Err(err) => return Err(err),
            };

            let Some(unit_price) = product.unit_price(item.variant_id) else {
                warn!(
                    cart_id = %cart.id,
                    product_id = %item.product_id,
                    variant_id = ?item.variant_id,
                    "variant no longer available, skipping cart item"
                );

                item.mark_unavailable();
                evaluations.push(Vec::new());

                continue;
            };

            let line_total = money::from_minor(unit_price, currency)?.mul(item.quantity)?;

            item.available = true;
            item.unit_price = unit_price;
            item.line_total = money::to_minor(&line_total)?;
            item.discount_amount = 0;
            item.applied_discount_ids.clear();

            let collection_ids = self.catalog.collection_ids_for_product(item.product_id)?;

            let context = EligibilityContext {
                customer_id,
                segment_ids: &segment_ids,
                product_id: item.product_id,
                variant_id: item.variant_id,
                collection_ids: &collection_ids,
                now,
            };

            let candidates: Vec<CandidateEvaluation> = self
                .discounts
                .active_candidates(shop_id, item.product_id, item.variant_id, &collection_ids)?
                .into_iter()
                .filter(|discount| {
                    discount.shop_id() == shop_id
                        && discount.category().prices_lines()
                        && (!discount.is_coupon_gated() || coupons.contains(&discount.id()))
                })
                .map(|discount| {
                    let result = evaluate(&discount, &context);

                    CandidateEvaluation { discount, result }
                })
                .collect();

            let usable = candidates
                .iter()
                .filter(|candidate| rules.allows(candidate))
                .map(|candidate| candidate.discount.clone())
                .collect();

            if let Some(selected) = select_best(usable, unit_price, item.quantity, currency)? {
                item.discount_amount = selected.savings.min(item.line_total);
                item.applied_discount_ids.push(selected.discount.id());
            }

            let discount = money::from_minor(item.discount_amount, currency)?;

            item.final_line_total = money::to_minor(&line_total.sub(discount)?).or_else(|err| {
                if err != money::AmountError::Negative {
                    return Err(err);
                }

                error!(
                    cart_id = %cart.id,
                    product_id = %item.product_id,
                    "line discount exceeds line total, clamping to zero"
                );

                Ok(0)
            })?;

            evaluations.push(candidates);
        }

        total(cart, currency)?;

        cart.updated_at = now;

        debug!(
            cart_id = %cart.id,
            subtotal = cart.subtotal,
            total_discounts = cart.total_discounts,
            grand_total = cart.grand_total,
            "recomputed cart"
        );

        Ok(evaluations)
    }
}

fn line_position(
    cart: &Cart,
    product_id: ProductId,
    variant_id: Option<VariantId>,
) -> Result<usize, CartError> {
    cart.items
        .iter()
        .position(|item| item.is_line(product_id, variant_id))
        .ok_or(CartError::ItemNotFound {
            product_id,
            variant_id,
        })
}

fn total(cart: &mut Cart, currency: &'static Currency) -> Result<(), CartError> {
    let zero = money::from_minor(0, currency)?;

    let (subtotal, total_discounts) = cart
        .items
        .iter()
        .filter(|item| item.available)
        .try_fold((zero, zero), |(subtotal, discounts), item| {
            Ok::<_, CartError>((
                subtotal.add(money::from_minor(item.line_total, currency)?)?,
                discounts.add(money::from_minor(item.discount_amount, currency)?)?,
            ))
        })?;

    let net = if total_discounts.gt(&subtotal)? {
        error!(
            cart_id = %cart.id,
            subtotal = %subtotal,
            total_discounts = %total_discounts,
            "discounts exceed subtotal, clamping to zero"
        );

        zero
    } else {
        subtotal.sub(total_discounts)?
    };

    let grand_total = net
        .add(money::from_minor(cart.shipping_cost, currency)?)?
        .add(money::from_minor(cart.tax_amount, currency)?)?;

    cart.subtotal = money::to_minor(&subtotal)?;
    cart.total_discounts = money::to_minor(&total_discounts)?;
    cart.grand_total = money::to_minor(&grand_total)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeMap, BTreeSet},
        sync::Arc,
    };

    use jiff::Timestamp;
    use testresult::TestResult;
    use uuid::Uuid;

    use crate::{
        cart::{CartOwner, CartState},
        catalog::CatalogVariant,
        clock::ManualClock,
        discounts::{
            Discount, DiscountCategory, DiscountTargets, SimpleDiscount, tests::new_discount,
        },
        ids::{CartId, CollectionId, CustomerId},
        memory::MemoryStore,
    };

    use super::*;

    type Engine<'a> =
        CartPricingEngine<&'a MemoryStore, &'a MemoryStore, &'a MemoryStore, Arc<ManualClock>>;

    fn shop() -> ShopId {
        ShopId::from_uuid(Uuid::from_u128(1))
    }

    fn product_id(id: u128) -> ProductId {
        ProductId::from_uuid(Uuid::from_u128(id))
    }

    fn product(id: u128, price: u64) -> CatalogProduct {
        CatalogProduct {
            id: product_id(id),
            shop_id: shop(),
            name: format!("Product {id}"),
            price,
            main_image: Some(format!("/images/{id}.png")),
            variants: Vec::new(),
        }
    }

    fn setup() -> TestResult<(MemoryStore, Arc<ManualClock>)> {
        let clock = Arc::new(ManualClock::new("2026-06-01T00:00:00Z".parse::<Timestamp>()?));
        let store = MemoryStore::with_clock(clock.clone());

        store.insert_product(product(100, 5_000));
        store.insert_product(product(200, 3_000));

        Ok((store, clock))
    }

    fn engine(store: &MemoryStore, clock: Arc<ManualClock>) -> Engine<'_> {
        CartPricingEngine::new(store, store, store, clock)
    }

    fn customer_cart() -> TestResult<Cart> {
        Ok(Cart::new(
            CartId::from_uuid(Uuid::from_u128(9)),
            shop(),
            CartOwner::Customer {
                customer_id: CustomerId::from_uuid(Uuid::from_u128(50)),
            },
            "USD",
            Timestamp::UNIX_EPOCH,
        )?)
    }

    fn product_discount(id: u128, product: u128, value: SimpleDiscount) -> TestResult<Discount> {
        let mut new = new_discount(id)?;
        new.category = DiscountCategory::Product;
        new.discount = value;
        new.targets = DiscountTargets {
            products: BTreeSet::from([product_id(product)]),
            ..DiscountTargets::default()
        };

        Ok(Discount::new(new)?)
    }

    #[test]
    fn prices_the_reference_cart() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        store.insert_discount(product_discount(
            10,
            100,
            SimpleDiscount::percentage_off(20),
        )?);

        engine.add_item(&mut cart, product_id(100), None, 2)?;
        engine.add_item(&mut cart, product_id(200), None, 1)?;

        let first = cart.item(product_id(100), None).ok_or("missing item")?;

        assert_eq!(first.line_total, 10_000);
        assert_eq!(first.discount_amount, 2_000);
        assert_eq!(first.final_line_total, 8_000);

        let second = cart.item(product_id(200), None).ok_or("missing item")?;

        assert_eq!(second.final_line_total, 3_000);
        assert!(second.applied_discount_ids.is_empty());

        assert_eq!(cart.subtotal, 13_000);
        assert_eq!(cart.total_discounts, 2_000);
        assert_eq!(cart.grand_total, 11_000);
        assert_eq!(cart.state(), CartState::Populated);

        Ok(())
    }

    #[test]
    fn adding_the_same_line_tops_it_up() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        engine.add_item(&mut cart, product_id(100), None, 1)?;
        engine.add_item(&mut cart, product_id(100), None, 2)?;

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.subtotal, 15_000);

        Ok(())
    }

    #[test]
    fn variant_price_overrides_the_product_price() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;
        let variant_id = VariantId::from_uuid(Uuid::from_u128(101));

        let mut with_variant = product(300, 2_000);
        with_variant.variants.push(CatalogVariant {
            id: variant_id,
            price: 2_500,
            options: BTreeMap::from([("size".to_string(), "L".to_string())]),
            image: None,
        });
        store.insert_product(with_variant);

        engine.add_item(&mut cart, product_id(300), Some(variant_id), 2)?;

        let item = cart.item(product_id(300), Some(variant_id)).ok_or("missing item")?;

        assert_eq!(item.unit_price, 2_500);
        assert_eq!(item.variant_options.get("size").map(String::as_str), Some("L"));
        assert_eq!(item.image.as_deref(), Some("/images/300.png"));

        let missing = VariantId::from_uuid(Uuid::from_u128(999));

        assert_eq!(
            engine.add_item(&mut cart, product_id(300), Some(missing), 1),
            Err(CartError::VariantNotFound {
                product_id: product_id(300),
                variant_id: missing,
            })
        );

        Ok(())
    }

    #[test]
    fn validation_errors_leave_the_cart_alone() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        engine.add_item(&mut cart, product_id(100), None, 1)?;
        let before = cart.clone();

        assert_eq!(
            engine.add_item(&mut cart, product_id(100), None, 0),
            Err(CartError::Validation(ValidationError::ZeroQuantity))
        );
        assert_eq!(
            engine.update_item(&mut cart, product_id(100), None, -1),
            Err(CartError::Validation(ValidationError::NegativeQuantity(-1)))
        );
        assert_eq!(
            engine.update_item(&mut cart, product_id(200), None, 1),
            Err(CartError::ItemNotFound {
                product_id: product_id(200),
                variant_id: None,
            })
        );
        assert_eq!(
            engine.add_item(&mut cart, product_id(999), None, 1),
            Err(CartError::ProductNotFound(product_id(999)))
        );

        assert_eq!(cart, before);

        Ok(())
    }

    #[test]
    fn products_of_other_shops_are_not_found() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        let mut foreign = product(400, 1_000);
        foreign.shop_id = ShopId::from_uuid(Uuid::from_u128(2));
        store.insert_product(foreign);

        assert_eq!(
            engine.add_item(&mut cart, product_id(400), None, 1),
            Err(CartError::ProductNotFound(product_id(400)))
        );

        Ok(())
    }

    #[test]
    fn update_to_zero_removes_and_clear_empties() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        engine.add_item(&mut cart, product_id(100), None, 1)?;
        engine.add_item(&mut cart, product_id(200), None, 1)?;
        engine.set_charges(&mut cart, 500, 250)?;

        engine.update_item(&mut cart, product_id(100), None, 0)?;

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.grand_total, 3_750);

        engine.clear_cart(&mut cart)?;

        assert_eq!(cart.state(), CartState::Empty);
        assert_eq!(cart.subtotal, 0);
        assert_eq!(cart.total_discounts, 0);
        assert_eq!(cart.grand_total, 0);

        Ok(())
    }

    #[test]
    fn missing_products_are_skipped_on_recompute() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        engine.add_item(&mut cart, product_id(100), None, 1)?;
        engine.add_item(&mut cart, product_id(200), None, 1)?;

        store.remove_product(product_id(100));
        engine.recompute(&mut cart)?;

        let gone = cart.item(product_id(100), None).ok_or("item dropped")?;

        assert!(!gone.available);
        assert_eq!(gone.line_total, 0);
        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.subtotal, 3_000);

        Ok(())
    }

    #[test]
    fn live_prices_win_over_the_snapshot() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        engine.add_item(&mut cart, product_id(100), None, 1)?;
        store.insert_product(product(100, 4_000));
        engine.recompute(&mut cart)?;

        assert_eq!(cart.subtotal, 4_000);

        Ok(())
    }

    #[test]
    fn coupons_gate_their_discount() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        let mut new = new_discount(10)?;
        new.coupon_code = Some("TENOFF".to_string());
        new.discount = SimpleDiscount::AmountOff { amount: 1_000 };
        store.insert_discount(Discount::new(new)?);

        engine.add_item(&mut cart, product_id(100), None, 1)?;

        assert_eq!(cart.total_discounts, 0);

        let applied = engine.apply_coupon(&mut cart, " tenoff ")?;
        engine.apply_coupon(&mut cart, "TENOFF")?;

        assert_eq!(cart.applied_discount_ids, vec![applied]);
        assert_eq!(cart.total_discounts, 1_000);

        engine.remove_coupon(&mut cart, applied)?;

        assert!(cart.applied_discount_ids.is_empty());
        assert_eq!(cart.total_discounts, 0);

        Ok(())
    }

    #[test]
    fn coupons_of_other_shops_are_rejected() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        let mut new = new_discount(10)?;
        new.shop_id = ShopId::from_uuid(Uuid::from_u128(2));
        new.coupon_code = Some("ELSEWHERE".to_string());
        store.insert_discount(Discount::new(new)?);

        let result = engine.apply_coupon(&mut cart, "ELSEWHERE");

        assert_eq!(result, Err(CartError::CouponShopMismatch));
        assert_eq!(
            result.map_err(|err| err.to_string()),
            Err("coupon does not belong to this shop".to_string())
        );

        Ok(())
    }

    #[test]
    fn inactive_and_unknown_coupons_are_rejected() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        let mut new = new_discount(10)?;
        new.coupon_code = Some("OFF".to_string());
        new.active = false;
        store.insert_discount(Discount::new(new)?);

        assert_eq!(
            engine.apply_coupon(&mut cart, "off"),
            Err(CartError::CouponInactive("OFF".to_string()))
        );
        assert_eq!(
            engine.apply_coupon(&mut cart, "nope"),
            Err(CartError::CouponNotFound("NOPE".to_string()))
        );
        assert_eq!(
            engine.apply_coupon(&mut cart, "  "),
            Err(CartError::Validation(ValidationError::EmptyCouponCode))
        );

        Ok(())
    }

    #[test]
    fn shipping_discounts_never_price_lines() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        let mut new = new_discount(10)?;
        new.category = DiscountCategory::Shipping;
        store.insert_discount(Discount::new(new)?);

        engine.add_item(&mut cart, product_id(100), None, 1)?;

        assert_eq!(cart.total_discounts, 0);

        Ok(())
    }

    #[test]
    fn collection_targets_match_through_the_catalog() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;
        let summer = CollectionId::from_uuid(Uuid::from_u128(77));

        store.set_collections(product_id(200), BTreeSet::from([summer]));

        let mut new = new_discount(10)?;
        new.category = DiscountCategory::Product;
        new.discount = SimpleDiscount::percentage_off(50);
        new.targets = DiscountTargets {
            collections: BTreeSet::from([summer]),
            ..DiscountTargets::default()
        };
        store.insert_discount(Discount::new(new)?);

        engine.add_item(&mut cart, product_id(100), None, 1)?;
        engine.add_item(&mut cart, product_id(200), None, 1)?;

        assert_eq!(cart.total_discounts, 1_500);

        Ok(())
    }

    #[test]
    fn recompute_is_idempotent() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        store.insert_discount(product_discount(
            10,
            100,
            SimpleDiscount::percentage_off(15),
        )?);

        engine.add_item(&mut cart, product_id(100), None, 3)?;

        let once = cart.clone();
        engine.recompute(&mut cart)?;

        assert_eq!(cart, once);

        Ok(())
    }

    #[test]
    fn excluded_discounts_are_not_selected() -> TestResult {
        let (store, clock) = setup()?;
        let engine = engine(&store, clock);
        let mut cart = customer_cart()?;

        let best = product_discount(10, 100, SimpleDiscount::percentage_off(50))?;
        let fallback = product_discount(11, 100, SimpleDiscount::AmountOff { amount: 500 })?;
        store.insert_discount(best.clone());
        store.insert_discount(fallback.clone());

        engine.add_item(&mut cart, product_id(100), None, 1)?;

        assert_eq!(
            cart.item(product_id(100), None).and_then(CartItem::applied_discount_id),
            Some(best.id())
        );

        engine.recompute_excluding(&mut cart, &BTreeSet::from([best.id()]))?;

        assert_eq!(
            cart.item(product_id(100), None).and_then(CartItem::applied_discount_id),
            Some(fallback.id())
        );
        assert_eq!(cart.total_discounts, 500);

        Ok(())
    }
}
