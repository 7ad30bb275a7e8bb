//! Bazaar Domain Concerns

pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod customers;
pub mod discounts;
pub mod shops;
pub mod usage;
