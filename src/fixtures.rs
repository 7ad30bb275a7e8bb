//! Fixtures
//!
//! YAML descriptions of shops, products, customers and discounts, loaded into a
//! [`MemoryStore`]. Entities are referred to by string keys; ids are assigned
//! sequentially in the order entities appear, so discounts listed earlier get
//! lower ids.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use jiff::Timestamp;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use rustc_hash::FxHashMap;
use rusty_money::iso::Currency;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    cart::{Cart, CartOwner, CartPricingEngine, ValidationError},
    catalog::{CatalogProduct, CatalogVariant},
    clock::{Clock, ManualClock},
    discounts::{
        Discount, DiscountCategory, DiscountError, DiscountTargets, EligibilityScope, NewDiscount,
        SimpleDiscount,
    },
    ids::{
        CartId, CollectionId, CustomerId, DiscountId, ProductId, SegmentId, SellerId, ShopId,
        TypedUuid, VariantId,
    },
    memory::MemoryStore,
};

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Price in a currency other than the fixture's
    #[error("Currency mismatch: expected {0}, found {1}")]
    CurrencyMismatch(String, String),

    /// Reference to an entity that was never declared
    #[error("Unknown {kind}: {key}")]
    UnknownKey {
        /// Entity kind
        kind: &'static str,
        /// Missing key
        key: String,
    },

    /// Discount that is neither or both of amount and percentage off
    #[error("Discount {0} must set exactly one of `amount` or `percentage`")]
    AmbiguousValue(String),

    /// Discount scoped to both customers and segments
    #[error("Discount {0} may not be scoped to both customers and segments")]
    AmbiguousScope(String),

    /// Discount failed validation
    #[error("Invalid discount {key}: {source}")]
    Discount {
        /// Discount key
        key: String,
        /// Validation failure
        source: DiscountError,
    },

    /// Cart could not be created
    #[error("Failed to create cart: {0}")]
    Cart(#[from] ValidationError),
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default = "default_now")]
    now: Timestamp,

    #[serde(default = "default_currency")]
    currency: String,

    #[serde(default)]
    shops: Vec<String>,

    #[serde(default)]
    products: BTreeMap<String, ProductFixture>,

    #[serde(default)]
    customers: BTreeMap<String, CustomerFixture>,

    #[serde(default)]
    discounts: Vec<DiscountFixture>,
}

#[derive(Debug, Deserialize)]
struct ProductFixture {
    shop: String,
    name: String,
    price: String,

    #[serde(default)]
    image: Option<String>,

    #[serde(default)]
    collections: Vec<String>,

    #[serde(default)]
    variants: BTreeMap<String, VariantFixture>,
}

#[derive(Debug, Deserialize)]
struct VariantFixture {
    price: String,

    #[serde(default)]
    options: BTreeMap<String, String>,

    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerFixture {
    shop: String,

    #[serde(default)]
    segments: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DiscountFixture {
    key: String,
    shop: String,
    name: String,
    category: DiscountCategory,

    #[serde(default)]
    amount: Option<String>,

    #[serde(default)]
    percentage: Option<Decimal>,

    #[serde(default)]
    products: Vec<String>,

    #[serde(default)]
    variants: Vec<String>,

    #[serde(default)]
    collections: Vec<String>,

    #[serde(default)]
    coupon: Option<String>,

    #[serde(default)]
    customers: Vec<String>,

    #[serde(default)]
    segments: Vec<String>,

    #[serde(default)]
    usage_limit: Option<u32>,

    #[serde(default)]
    per_customer_limit: Option<u32>,

    #[serde(default)]
    current_usage: u32,

    #[serde(default)]
    start_at: Option<Timestamp>,

    #[serde(default)]
    end_at: Option<Timestamp>,

    #[serde(default = "default_active")]
    active: bool,
}

fn default_now() -> Timestamp {
    Timestamp::constant(1_780_272_000, 0)
}

fn default_currency() -> String {
    "USD".to_string()
}

const fn default_active() -> bool {
    true
}

/// Parse a price such as `"50.00"` or `"50.00 USD"` into minor units of
/// `currency`.
///
/// # Errors
///
/// Returns an error if the amount is not a non-negative decimal or names a
/// different currency.
pub fn parse_price(s: &str, currency: &'static Currency) -> Result<u64, FixtureError> {
    let mut parts = s.split_whitespace();

    let amount = parts
        .next()
        .ok_or_else(|| FixtureError::InvalidPrice(s.to_string()))?
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidPrice(s.to_string()))?;

    if let Some(code) = parts.next()
        && code != currency.iso_alpha_code
    {
        return Err(FixtureError::CurrencyMismatch(
            currency.iso_alpha_code.to_string(),
            code.to_string(),
        ));
    }

    if parts.next().is_some() {
        return Err(FixtureError::InvalidPrice(s.to_string()));
    }

    let scale = 10_u64
        .checked_pow(currency.exponent)
        .ok_or_else(|| FixtureError::InvalidPrice(s.to_string()))?;

    amount
        .checked_mul(Decimal::from(scale))
        .and_then(|value| value.round_dp(0).to_u64())
        .ok_or_else(|| FixtureError::InvalidPrice(s.to_string()))
}

/// Engine over a fixture's store.
pub type FixtureEngine<'a> =
    CartPricingEngine<&'a MemoryStore, &'a MemoryStore, &'a MemoryStore, Arc<ManualClock>>;

/// Fixture
#[derive(Debug)]
pub struct Fixture {
    store: MemoryStore,
    clock: Arc<ManualClock>,
    currency: &'static Currency,
    next_id: u128,
    seller: SellerId,
    shops: FxHashMap<String, ShopId>,
    products: FxHashMap<String, ProductId>,
    variants: FxHashMap<String, VariantId>,
    collections: FxHashMap<String, CollectionId>,
    customers: FxHashMap<String, CustomerId>,
    segments: FxHashMap<String, SegmentId>,
    discounts: FxHashMap<String, DiscountId>,
}

impl Fixture {
    /// Load `./fixtures/<name>.yml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_set(name: &str) -> Result<Self, FixtureError> {
        Self::load(PathBuf::from("./fixtures").join(format!("{name}.yml")))
    }

    /// Load a fixture file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    /// Parse a fixture from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed, refers to undeclared keys,
    /// or describes an invalid discount.
    pub fn from_yaml(yaml: &str) -> Result<Self, FixtureError> {
        let file: FixtureFile = serde_norway::from_str(yaml)?;

        let currency = rusty_money::iso::find(&file.currency)
            .ok_or_else(|| FixtureError::UnknownCurrency(file.currency.clone()))?;

        let clock = Arc::new(ManualClock::new(file.now));

        let mut fixture = Self {
            store: MemoryStore::with_clock(clock.clone()),
            clock,
            currency,
            next_id: 1,
            seller: SellerId::from_uuid(Uuid::from_u128(u128::MAX)),
            shops: FxHashMap::default(),
            products: FxHashMap::default(),
            variants: FxHashMap::default(),
            collections: FxHashMap::default(),
            customers: FxHashMap::default(),
            segments: FxHashMap::default(),
            discounts: FxHashMap::default(),
        };

        for shop in file.shops {
            let id = fixture.next_id();
            fixture.shops.insert(shop, id);
        }

        for (key, product) in file.products {
            fixture.load_product(key, product)?;
        }

        for (key, customer) in file.customers {
            fixture.load_customer(key, customer)?;
        }

        for discount in file.discounts {
            fixture.load_discount(discount)?;
        }

        Ok(fixture)
    }

    fn next_id<T>(&mut self) -> TypedUuid<T> {
        let id = TypedUuid::from_uuid(Uuid::from_u128(self.next_id));
        self.next_id += 1;
        id
    }

    fn intern<T>(
        next_id: &mut u128,
        keys: &mut FxHashMap<String, TypedUuid<T>>,
        key: &str,
    ) -> TypedUuid<T> {
        *keys.entry(key.to_string()).or_insert_with(|| {
            let id = TypedUuid::from_uuid(Uuid::from_u128(*next_id));
            *next_id += 1;
            id
        })
    }

    fn load_product(&mut self, key: String, fixture: ProductFixture) -> Result<(), FixtureError> {
        let shop_id = self.shop(&fixture.shop)?;
        let id = self.next_id();

        let mut variants = Vec::with_capacity(fixture.variants.len());

        for (variant_key, variant) in fixture.variants {
            let variant_id = self.next_id();

            variants.push(CatalogVariant {
                id: variant_id,
                price: parse_price(&variant.price, self.currency)?,
                options: variant.options,
                image: variant.image,
            });

            self.variants.insert(variant_key, variant_id);
        }

        let collections = fixture
            .collections
            .iter()
            .map(|collection| Self::intern(&mut self.next_id, &mut self.collections, collection))
            .collect();

        self.store.insert_product(CatalogProduct {
            id,
            shop_id,
            name: fixture.name,
            price: parse_price(&fixture.price, self.currency)?,
            main_image: fixture.image,
            variants,
        });
        self.store.set_collections(id, collections);
        self.products.insert(key, id);

        Ok(())
    }

    fn load_customer(&mut self, key: String, fixture: CustomerFixture) -> Result<(), FixtureError> {
        let shop_id = self.shop(&fixture.shop)?;
        let id = self.next_id();

        let segments = fixture
            .segments
            .iter()
            .map(|segment| Self::intern(&mut self.next_id, &mut self.segments, segment))
            .collect();

        self.store.set_segments(shop_id, id, segments);
        self.customers.insert(key, id);

        Ok(())
    }

    fn load_discount(&mut self, fixture: DiscountFixture) -> Result<(), FixtureError> {
        let shop_id = self.shop(&fixture.shop)?;
        let id = self.next_id();

        let discount = match (&fixture.amount, fixture.percentage) {
            (Some(amount), None) => SimpleDiscount::AmountOff {
                amount: parse_price(amount, self.currency)?,
            },
            (None, Some(percentage)) => SimpleDiscount::percentage_off(percentage),
            _ => return Err(FixtureError::AmbiguousValue(fixture.key)),
        };

        let scope = match (fixture.customers.is_empty(), fixture.segments.is_empty()) {
            (true, true) => EligibilityScope::All,
            (false, true) => EligibilityScope::Customers(lookup_all(
                &self.customers,
                "customer",
                &fixture.customers,
            )?),
            (true, false) => EligibilityScope::Segments(
                fixture
                    .segments
                    .iter()
                    .map(|segment| Self::intern(&mut self.next_id, &mut self.segments, segment))
                    .collect(),
            ),
            (false, false) => return Err(FixtureError::AmbiguousScope(fixture.key)),
        };

        let targets = DiscountTargets {
            products: lookup_all(&self.products, "product", &fixture.products)?,
            variants: lookup_all(&self.variants, "variant", &fixture.variants)?,
            collections: fixture
                .collections
                .iter()
                .map(|collection| {
                    Self::intern(&mut self.next_id, &mut self.collections, collection)
                })
                .collect(),
        };

        let start_at = fixture
            .start_at
            .unwrap_or_else(|| Timestamp::constant(1_767_225_600, 0));
        let end_at = fixture
            .end_at
            .unwrap_or_else(|| Timestamp::constant(1_798_761_599, 0));

        let new = NewDiscount {
            id,
            shop_id,
            seller_id: self.seller,
            name: fixture.name,
            category: fixture.category,
            discount,
            targets,
            coupon_code: fixture.coupon,
            scope,
            usage_limit: fixture.usage_limit,
            per_customer_limit: fixture.per_customer_limit,
            start_at,
            end_at,
            active: fixture.active,
        };

        let discount = Discount::new(new)
            .map_err(|source| FixtureError::Discount {
                key: fixture.key.clone(),
                source,
            })?
            .with_usage(fixture.current_usage, Vec::new());

        self.store.insert_discount(discount);
        self.discounts.insert(fixture.key, id);

        Ok(())
    }

    /// The loaded store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// The fixture's clock, set to its `now`.
    pub fn clock(&self) -> Arc<ManualClock> {
        Arc::clone(&self.clock)
    }

    /// The fixture currency.
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// An engine reading from the fixture store.
    pub fn engine(&self) -> FixtureEngine<'_> {
        CartPricingEngine::new(&self.store, &self.store, &self.store, self.clock())
    }

    /// Get a shop id by its key
    ///
    /// # Errors
    ///
    /// Returns an error if the shop was not declared.
    pub fn shop(&self, key: &str) -> Result<ShopId, FixtureError> {
        lookup(&self.shops, "shop", key)
    }

    /// Get a product id by its key
    ///
    /// # Errors
    ///
    /// Returns an error if the product was not declared.
    pub fn product(&self, key: &str) -> Result<ProductId, FixtureError> {
        lookup(&self.products, "product", key)
    }

    /// Get a variant id by its key
    ///
    /// # Errors
    ///
    /// Returns an error if the variant was not declared.
    pub fn variant(&self, key: &str) -> Result<VariantId, FixtureError> {
        lookup(&self.variants, "variant", key)
    }

    /// Get a customer id by its key
    ///
    /// # Errors
    ///
    /// Returns an error if the customer was not declared.
    pub fn customer(&self, key: &str) -> Result<CustomerId, FixtureError> {
        lookup(&self.customers, "customer", key)
    }

    /// Get a discount id by its key
    ///
    /// # Errors
    ///
    /// Returns an error if the discount was not declared.
    pub fn discount(&self, key: &str) -> Result<DiscountId, FixtureError> {
        lookup(&self.discounts, "discount", key)
    }

    /// An empty cart for a customer of a shop.
    ///
    /// # Errors
    ///
    /// Returns an error if either key was not declared.
    pub fn customer_cart(&self, shop: &str, customer: &str) -> Result<Cart, FixtureError> {
        let owner = CartOwner::Customer {
            customer_id: self.customer(customer)?,
        };

        self.cart(shop, owner)
    }

    /// An empty guest cart for a shop.
    ///
    /// # Errors
    ///
    /// Returns an error if the shop was not declared.
    pub fn guest_cart(&self, shop: &str, session_id: &str) -> Result<Cart, FixtureError> {
        let owner = CartOwner::Guest {
            session_id: session_id.to_string(),
        };

        self.cart(shop, owner)
    }

    fn cart(&self, shop: &str, owner: CartOwner) -> Result<Cart, FixtureError> {
        Ok(Cart::new(
            CartId::new(),
            self.shop(shop)?,
            owner,
            self.currency.iso_alpha_code,
            self.clock.now(),
        )?)
    }
}

fn lookup<T>(
    keys: &FxHashMap<String, TypedUuid<T>>,
    kind: &'static str,
    key: &str,
) -> Result<TypedUuid<T>, FixtureError> {
    keys.get(key).copied().ok_or_else(|| FixtureError::UnknownKey {
        kind,
        key: key.to_string(),
    })
}

fn lookup_all<T>(
    keys: &FxHashMap<String, TypedUuid<T>>,
    kind: &'static str,
    wanted: &[String],
) -> Result<BTreeSet<TypedUuid<T>>, FixtureError> {
    wanted.iter().map(|key| lookup(keys, kind, key)).collect()
}
