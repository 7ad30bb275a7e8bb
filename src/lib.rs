//! Bazaar
//!
//! Bazaar is the discount eligibility and cart pricing engine of a multi-tenant
//! storefront. For every cart mutation it works out which promotions apply to
//! each line for the current customer, picks the single best one per line, and
//! re-derives every total from live catalog prices. At order commit the
//! discounts used are redeemed against a usage ledger that enforces global and
//! per-customer caps under concurrency.

pub mod cache;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod clock;
pub mod directory;
pub mod discounts;
pub mod eligibility;
pub mod fixtures;
pub mod ids;
pub mod ledger;
pub mod memory;
pub mod money;
pub mod prelude;
pub mod reporting;
pub mod selection;
