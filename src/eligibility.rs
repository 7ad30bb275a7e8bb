//! Eligibility
//!
//! Decides whether one discount may be used by one customer on one line at one
//! instant. Evaluation only reads; counters are moved by the usage ledger.

use std::collections::BTreeSet;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{
    discounts::Discount,
    ids::{CollectionId, CustomerId, ProductId, SegmentId, VariantId},
};

/// Why a discount cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
    /// Switched off.
    Inactive,

    /// Outside the validity window.
    OutOfWindow,

    /// The line is not targeted.
    NoTargetMatch,

    /// The customer is outside the discount's scope.
    NotEligible,

    /// The global cap has been reached.
    TotalLimitHit,

    /// The customer has used up their allowance.
    CustomerLimitHit,
}

impl IneligibilityReason {
    /// Human readable explanation.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Inactive => "discount is not active",
            Self::OutOfWindow => "discount is not valid at this time",
            Self::NoTargetMatch => "discount does not apply to this item",
            Self::NotEligible => "customer is not eligible for this discount",
            Self::TotalLimitHit => "discount usage limit reached",
            Self::CustomerLimitHit => "customer usage limit reached",
        }
    }
}

/// Everything eligibility depends on besides the discount itself.
#[derive(Debug, Clone)]
pub struct EligibilityContext<'a> {
    /// Signed-in customer, `None` for a guest
    pub customer_id: Option<CustomerId>,

    /// The customer's segments
    pub segment_ids: &'a BTreeSet<SegmentId>,

    /// Line product
    pub product_id: ProductId,

    /// Line variant
    pub variant_id: Option<VariantId>,

    /// Collections the product belongs to
    pub collection_ids: &'a BTreeSet<CollectionId>,

    /// Evaluation instant
    pub now: Timestamp,
}

/// Outcome of [`evaluate`], with the usage figures shown to customers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    /// Whether the discount may be applied
    pub usable: bool,

    /// First failed check, when not usable
    pub reason: Option<IneligibilityReason>,

    /// Times this customer has used it
    pub customer_usage: u32,

    /// Per-customer cap
    pub customer_limit: Option<u32>,

    /// Uses left for this customer
    pub remaining_for_customer: Option<u32>,

    /// Uses across all customers
    pub total_usage: u32,

    /// Global cap
    pub total_limit: Option<u32>,

    /// Uses left overall
    pub remaining_total: Option<u32>,
}

/// Evaluate a discount for a line.
///
/// Checks run in a fixed order and stop at the first failure: active flag,
/// window, targets, scope, global cap, per-customer cap. The usage figures are
/// filled in whatever the outcome.
#[must_use]
pub fn evaluate(discount: &Discount, context: &EligibilityContext<'_>) -> EligibilityResult {
    let customer_usage = context
        .customer_id
        .and_then(|customer_id| discount.customer_usage(customer_id))
        .map_or(0, |usage| usage.usage_count);

    let customer_limit = discount.per_customer_limit();
    let reason = first_failure(discount, context, customer_usage);

    EligibilityResult {
        usable: reason.is_none(),
        reason,
        customer_usage,
        customer_limit,
        remaining_for_customer: customer_limit.map(|limit| limit.saturating_sub(customer_usage)),
        total_usage: discount.current_usage(),
        total_limit: discount.usage_limit(),
        remaining_total: discount.remaining_total(),
    }
}

fn first_failure(
    discount: &Discount,
    context: &EligibilityContext<'_>,
    customer_usage: u32,
) -> Option<IneligibilityReason> {
    if !discount.is_active() {
        return Some(IneligibilityReason::Inactive);
    }

    if !discount.is_within_window(context.now) {
        return Some(IneligibilityReason::OutOfWindow);
    }

    if discount.category().uses_targets()
        && !discount.targets().matches(
            context.product_id,
            context.variant_id,
            context.collection_ids,
        )
    {
        return Some(IneligibilityReason::NoTargetMatch);
    }

    if !discount
        .scope()
        .admits(context.customer_id, context.segment_ids)
    {
        return Some(IneligibilityReason::NotEligible);
    }

    if discount
        .usage_limit()
        .is_some_and(|limit| discount.current_usage() >= limit)
    {
        return Some(IneligibilityReason::TotalLimitHit);
    }

    if let Some(limit) = discount.per_customer_limit() {
        // Guests cannot be tracked against a per-customer cap.
        if context.customer_id.is_none() {
            return Some(IneligibilityReason::NotEligible);
        }

        if customer_usage >= limit {
            return Some(IneligibilityReason::CustomerLimitHit);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use testresult::TestResult;
    use uuid::Uuid;

    use crate::discounts::{
        DiscountCategory, DiscountTargets, EligibilityScope, NewDiscount,
        tests::new_discount,
    };

    use super::*;

    struct Line {
        segments: BTreeSet<SegmentId>,
        collections: BTreeSet<CollectionId>,
    }

    impl Line {
        fn new() -> Self {
            Self {
                segments: BTreeSet::new(),
                collections: BTreeSet::new(),
            }
        }

        fn context(&self, customer: Option<u128>, now: Timestamp) -> EligibilityContext<'_> {
            EligibilityContext {
                customer_id: customer.map(|id| CustomerId::from_uuid(Uuid::from_u128(id))),
                segment_ids: &self.segments,
                product_id: ProductId::from_uuid(Uuid::from_u128(100)),
                variant_id: None,
                collection_ids: &self.collections,
                now,
            }
        }
    }

    fn discount(tweak: impl FnOnce(&mut NewDiscount)) -> TestResult<Discount> {
        let mut new = new_discount(1)?;
        tweak(&mut new);

        Ok(Discount::new(new)?)
    }

    #[test]
    fn inactive_is_reported_before_anything_else() -> TestResult {
        let discount = discount(|new| {
            new.active = false;
            new.category = DiscountCategory::Product;
        })?;
        let line = Line::new();

        let result = evaluate(&discount, &line.context(None, discount.start_at()));

        assert!(!result.usable);
        assert_eq!(result.reason, Some(IneligibilityReason::Inactive));

        Ok(())
    }

    #[test]
    fn outside_the_window_is_out_of_window() -> TestResult {
        let discount = discount(|_| {})?;
        let line = Line::new();
        let before = discount.start_at().checked_sub(SignedDuration::from_secs(1))?;

        let result = evaluate(&discount, &line.context(Some(1), before));

        assert_eq!(result.reason, Some(IneligibilityReason::OutOfWindow));

        Ok(())
    }

    #[test]
    fn product_discounts_need_a_target_match() -> TestResult {
        let targeted = discount(|new| {
            new.category = DiscountCategory::Product;
            new.targets = DiscountTargets {
                products: BTreeSet::from([ProductId::from_uuid(Uuid::from_u128(100))]),
                ..DiscountTargets::default()
            };
        })?;
        let untargeted = discount(|new| new.category = DiscountCategory::Product)?;
        let line = Line::new();
        let context = line.context(Some(1), targeted.start_at());

        assert!(evaluate(&targeted, &context).usable);
        assert_eq!(
            evaluate(&untargeted, &context).reason,
            Some(IneligibilityReason::NoTargetMatch)
        );

        Ok(())
    }

    #[test]
    fn order_discounts_skip_the_target_check() -> TestResult {
        let discount = discount(|new| new.category = DiscountCategory::Order)?;
        let line = Line::new();

        assert!(evaluate(&discount, &line.context(None, discount.start_at())).usable);

        Ok(())
    }

    #[test]
    fn customer_scope_excludes_others_and_guests() -> TestResult {
        let discount = discount(|new| {
            new.scope = EligibilityScope::Customers(BTreeSet::from([CustomerId::from_uuid(
                Uuid::from_u128(1),
            )]));
        })?;
        let line = Line::new();
        let now = discount.start_at();

        assert!(evaluate(&discount, &line.context(Some(1), now)).usable);
        assert_eq!(
            evaluate(&discount, &line.context(Some(2), now)).reason,
            Some(IneligibilityReason::NotEligible)
        );
        assert_eq!(
            evaluate(&discount, &line.context(None, now)).reason,
            Some(IneligibilityReason::NotEligible)
        );

        Ok(())
    }

    #[test]
    fn exhausted_global_cap_blocks_everyone() -> TestResult {
        let discount = discount(|new| new.usage_limit = Some(5))?.with_usage(5, Vec::new());
        let line = Line::new();

        let result = evaluate(&discount, &line.context(Some(1), discount.start_at()));

        assert_eq!(result.reason, Some(IneligibilityReason::TotalLimitHit));
        assert_eq!(result.total_usage, 5);
        assert_eq!(result.remaining_total, Some(0));

        Ok(())
    }

    #[test]
    fn per_customer_cap_is_per_customer() -> TestResult {
        let mut discount = discount(|new| new.per_customer_limit = Some(2))?;
        let now = discount.start_at();
        let heavy = CustomerId::from_uuid(Uuid::from_u128(1));

        assert!(discount.record_usage(Some(heavy), 100, now));
        assert!(discount.record_usage(Some(heavy), 100, now));

        let line = Line::new();
        let heavy_result = evaluate(&discount, &line.context(Some(1), now));
        let fresh_result = evaluate(&discount, &line.context(Some(2), now));

        assert_eq!(heavy_result.reason, Some(IneligibilityReason::CustomerLimitHit));
        assert_eq!(heavy_result.customer_usage, 2);
        assert_eq!(heavy_result.remaining_for_customer, Some(0));

        assert!(fresh_result.usable);
        assert_eq!(fresh_result.remaining_for_customer, Some(2));

        Ok(())
    }

    #[test]
    fn guests_cannot_use_per_customer_capped_discounts() -> TestResult {
        let discount = discount(|new| new.per_customer_limit = Some(1))?;
        let line = Line::new();

        let result = evaluate(&discount, &line.context(None, discount.start_at()));

        assert_eq!(result.reason, Some(IneligibilityReason::NotEligible));

        Ok(())
    }

    fn only_customer(id: u128) -> EligibilityScope {
        EligibilityScope::Customers(BTreeSet::from([CustomerId::from_uuid(Uuid::from_u128(id))]))
    }

    fn targeting_elsewhere(new: &mut NewDiscount) {
        new.category = DiscountCategory::Product;
        new.targets = DiscountTargets {
            products: BTreeSet::from([ProductId::from_uuid(Uuid::from_u128(999))]),
            ..DiscountTargets::default()
        };
    }

    #[test]
    fn window_is_checked_before_targets() -> TestResult {
        let discount = discount(targeting_elsewhere)?;
        let line = Line::new();
        let after = discount.end_at().checked_add(SignedDuration::from_secs(1))?;

        assert_eq!(
            evaluate(&discount, &line.context(Some(1), after)).reason,
            Some(IneligibilityReason::OutOfWindow)
        );

        Ok(())
    }

    #[test]
    fn target_mismatch_is_reported_before_scope() -> TestResult {
        let discount = discount(|new| {
            targeting_elsewhere(new);
            new.scope = only_customer(1);
        })?;
        let line = Line::new();

        assert_eq!(
            evaluate(&discount, &line.context(Some(2), discount.start_at())).reason,
            Some(IneligibilityReason::NoTargetMatch)
        );

        Ok(())
    }

    #[test]
    fn scope_is_reported_before_the_global_cap() -> TestResult {
        let discount = discount(|new| {
            new.scope = only_customer(1);
            new.usage_limit = Some(5);
        })?
        .with_usage(5, Vec::new());
        let line = Line::new();

        assert_eq!(
            evaluate(&discount, &line.context(Some(2), discount.start_at())).reason,
            Some(IneligibilityReason::NotEligible)
        );

        Ok(())
    }

    #[test]
    fn global_cap_is_reported_before_the_customer_cap() -> TestResult {
        let mut discount = discount(|new| {
            new.usage_limit = Some(2);
            new.per_customer_limit = Some(1);
        })?;
        let now = discount.start_at();

        assert!(discount.record_usage(Some(CustomerId::from_uuid(Uuid::from_u128(1))), 100, now));
        assert!(discount.record_usage(Some(CustomerId::from_uuid(Uuid::from_u128(2))), 100, now));

        let line = Line::new();
        let result = evaluate(&discount, &line.context(Some(1), now));

        assert_eq!(result.reason, Some(IneligibilityReason::TotalLimitHit));
        assert_eq!(result.remaining_for_customer, Some(0));

        Ok(())
    }
}
