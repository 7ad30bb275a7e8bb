//! Persistence and services for the Bazaar pricing engine.

pub mod config;
pub mod context;
pub mod database;
pub mod domain;
pub mod observability;

#[cfg(test)]
mod test;
