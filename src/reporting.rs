//! Status and reporting
//!
//! Read models built on top of eligibility: why each discount does or does not
//! apply to a line, and who has been redeeming a discount.

use std::cmp::Reverse;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    cart::{Cart, CartItem},
    discounts::{CustomerUsage, Discount, DiscountType},
    eligibility::{EligibilityResult, IneligibilityReason},
    ids::DiscountId,
};

/// One candidate discount evaluated against one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEvaluation {
    /// Candidate
    pub discount: Discount,

    /// Eligibility outcome
    pub result: EligibilityResult,
}

/// Customer-facing state of one candidate discount on one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountStatus {
    /// Discount
    pub discount_id: DiscountId,

    /// Display name
    pub name: String,

    /// Usable on this line right now
    pub available: bool,

    /// Switched off or outside its window, for everyone
    pub disabled: bool,

    /// Why it is not available
    pub reasons: Vec<String>,

    /// Uses by this customer
    pub customer_usage: u32,

    /// Per-customer cap
    pub customer_limit: Option<u32>,

    /// Uses left for this customer
    pub remaining_for_customer: Option<u32>,

    /// Uses overall
    pub total_usage: u32,

    /// Global cap
    pub total_limit: Option<u32>,

    /// Uses left overall
    pub remaining_total: Option<u32>,

    /// Priced into the line
    pub applied: bool,
}

impl DiscountStatus {
    /// Build a status from an evaluation.
    #[must_use]
    pub fn new(evaluation: &CandidateEvaluation, applied: bool) -> Self {
        let result = &evaluation.result;

        Self {
            discount_id: evaluation.discount.id(),
            name: evaluation.discount.name().to_string(),
            available: result.usable,
            disabled: matches!(
                result.reason,
                Some(IneligibilityReason::Inactive | IneligibilityReason::OutOfWindow)
            ),
            reasons: result
                .reason
                .map(|reason| reason.message().to_string())
                .into_iter()
                .collect(),
            customer_usage: result.customer_usage,
            customer_limit: result.customer_limit,
            remaining_for_customer: result.remaining_for_customer,
            total_usage: result.total_usage,
            total_limit: result.total_limit,
            remaining_total: result.remaining_total,
            applied,
        }
    }
}

/// The discount priced into a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscountDetail {
    /// Discount
    pub discount_id: DiscountId,

    /// Display name
    pub name: String,

    /// Fixed or percentage
    #[serde(rename = "type")]
    pub discount_type: DiscountType,

    /// Minor units or percent points
    pub value: Decimal,

    /// Savings on the line
    pub amount: u64,
}

/// A line with its discount explained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemDetails {
    /// The priced line
    #[serde(flatten)]
    pub item: CartItem,

    /// What was applied
    pub applied_discount: Option<AppliedDiscountDetail>,

    /// Every candidate, ordered by id
    pub discounts: Vec<DiscountStatus>,
}

/// A priced cart with every line's discounts explained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartWithDiscountDetails {
    /// The priced cart
    pub cart: Cart,

    /// Lines in cart order
    pub items: Vec<CartItemDetails>,
}

impl CartWithDiscountDetails {
    /// Combine a freshly priced cart with the evaluations of its lines.
    #[must_use]
    pub fn new(cart: Cart, evaluations: Vec<Vec<CandidateEvaluation>>) -> Self {
        let items = cart
            .items
            .iter()
            .zip(evaluations)
            .map(|(item, mut candidates)| {
                candidates.sort_by_key(|candidate| candidate.discount.id());

                let applied_id = item.applied_discount_id();

                let applied_discount = applied_id.and_then(|applied_id| {
                    candidates
                        .iter()
                        .find(|candidate| candidate.discount.id() == applied_id)
                        .map(|candidate| AppliedDiscountDetail {
                            discount_id: applied_id,
                            name: candidate.discount.name().to_string(),
                            discount_type: candidate.discount.discount_type(),
                            value: candidate.discount.discount().value(),
                            amount: item.discount_amount,
                        })
                });

                let discounts = candidates
                    .iter()
                    .map(|candidate| {
                        DiscountStatus::new(candidate, Some(candidate.discount.id()) == applied_id)
                    })
                    .collect();

                CartItemDetails {
                    item: item.clone(),
                    applied_discount,
                    discounts,
                }
            })
            .collect();

        Self { cart, items }
    }
}

/// Redemption summary of one discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountUsageReport {
    /// Discount
    pub discount_id: DiscountId,

    /// Display name
    pub name: String,

    /// Redemptions overall
    pub total_usage: u32,

    /// Global cap
    pub usage_limit: Option<u32>,

    /// Redemptions left overall
    pub remaining: Option<u32>,

    /// Per-customer cap
    pub per_customer_limit: Option<u32>,

    /// Customers, heaviest users first
    pub customers: Vec<CustomerUsage>,
}

impl DiscountUsageReport {
    /// Summarise a discount's counters.
    ///
    /// Customers are ranked by usage count, then total spent (both
    /// descending), then customer id.
    #[must_use]
    pub fn new(discount: &Discount) -> Self {
        let mut customers = discount.usage_tracking().to_vec();

        customers.sort_by_key(|usage| {
            (
                Reverse(usage.usage_count),
                Reverse(usage.total_spent),
                usage.customer_id,
            )
        });

        Self {
            discount_id: discount.id(),
            name: discount.name().to_string(),
            total_usage: discount.current_usage(),
            usage_limit: discount.usage_limit(),
            remaining: discount.remaining_total(),
            per_customer_limit: discount.per_customer_limit(),
            customers,
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;
    use uuid::Uuid;

    use crate::{discounts::tests::new_discount, ids::CustomerId};

    use super::*;

    #[test]
    fn usage_report_ranks_heaviest_users_first() -> TestResult {
        let mut new = new_discount(1)?;
        new.usage_limit = Some(10);

        let mut discount = Discount::new(new)?;
        let now = discount.start_at();
        let customer = |id| Some(CustomerId::from_uuid(Uuid::from_u128(id)));

        assert!(discount.record_usage(customer(3), 100, now));
        assert!(discount.record_usage(customer(2), 500, now));
        assert!(discount.record_usage(customer(1), 500, now));
        assert!(discount.record_usage(customer(3), 100, now));

        let report = DiscountUsageReport::new(&discount);
        let ranked: Vec<_> = report
            .customers
            .iter()
            .map(|usage| Some(usage.customer_id))
            .collect();

        assert_eq!(ranked, vec![customer(3), customer(1), customer(2)]);
        assert_eq!(report.total_usage, 4);
        assert_eq!(report.remaining, Some(6));

        Ok(())
    }

    #[test]
    fn status_explains_the_failed_check() -> TestResult {
        let mut new = new_discount(1)?;
        new.active = false;

        let discount = Discount::new(new)?;
        let evaluation = CandidateEvaluation {
            result: EligibilityResult {
                usable: false,
                reason: Some(IneligibilityReason::Inactive),
                customer_usage: 0,
                customer_limit: None,
                remaining_for_customer: None,
                total_usage: 0,
                total_limit: None,
                remaining_total: None,
            },
            discount,
        };

        let status = DiscountStatus::new(&evaluation, false);

        assert!(status.disabled);
        assert!(!status.available);
        assert_eq!(status.reasons, vec!["discount is not active".to_string()]);

        Ok(())
    }
}
