//! Discounts Repository

use std::collections::BTreeSet;

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use rustc_hash::FxHashMap;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, query_scalar};
use uuid::Uuid;

use bazaar::{
    discounts::{
        CustomerUsage, Discount, DiscountCategory, DiscountTargets, EligibilityScope, NewDiscount,
        SimpleDiscount,
    },
    ids::{CustomerId, DiscountId, SellerId, ShopId, TypedUuid},
};

use crate::{
    database::{count_to_sql, try_get_amount, try_get_count, try_get_limit},
    domain::discounts::records::DiscountRecord,
};

const CREATE_DISCOUNT_SQL: &str = include_str!("sql/create_discount.sql");
const GET_DISCOUNT_SQL: &str = include_str!("sql/get_discount.sql");
const LOCK_DISCOUNT_SQL: &str = include_str!("sql/lock_discount.sql");
const LIST_DISCOUNTS_SQL: &str = include_str!("sql/list_discounts.sql");
const GET_USAGES_SQL: &str = include_str!("sql/get_usages.sql");
const UPDATE_DISCOUNT_SQL: &str = include_str!("sql/update_discount.sql");
const DELETE_DISCOUNT_SQL: &str = include_str!("sql/delete_discount.sql");
const COUPON_CODE_REGISTERED_SQL: &str = include_str!("sql/coupon_code_registered.sql");

/// Which per-customer usage rows to attach to loaded discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UsageScope {
    /// No per-customer usage
    None,

    /// Every customer's usage
    All,

    /// One customer's usage
    Customer(CustomerId),
}

impl UsageScope {
    /// The usage a cart owner's pricing needs; guests need none.
    pub(crate) fn for_customer(customer: Option<CustomerId>) -> Self {
        customer.map_or(Self::None, Self::Customer)
    }
}

struct DiscountRow {
    new: NewDiscount,
    current_usage: u32,
    created_at: Timestamp,
    updated_at: Timestamp,
}

struct UsageRow {
    discount_uuid: DiscountId,
    usage: CustomerUsage,
}

/// Column values derived from a discount's configuration.
struct DiscountColumns {
    category: &'static str,
    discount_type: &'static str,
    value: Decimal,
    products: Vec<Uuid>,
    variants: Vec<Uuid>,
    collections: Vec<Uuid>,
    eligibility: &'static str,
    eligible_uuids: Vec<Uuid>,
    usage_limit: Option<i32>,
    per_customer_limit: Option<i32>,
}

impl DiscountColumns {
    fn new(discount: &Discount) -> Result<Self, sqlx::Error> {
        let targets = discount.targets();

        let (eligibility, eligible_uuids) = match discount.scope() {
            EligibilityScope::All => ("all", Vec::new()),
            EligibilityScope::Customers(customers) => ("customers", uuids(customers)),
            EligibilityScope::Segments(segments) => ("segments", uuids(segments)),
        };

        Ok(Self {
            category: discount.category().as_str(),
            discount_type: discount.discount_type().as_str(),
            value: discount.discount().value(),
            products: uuids(&targets.products),
            variants: uuids(&targets.variants),
            collections: uuids(&targets.collections),
            eligibility,
            eligible_uuids,
            usage_limit: discount
                .usage_limit()
                .map(|limit| count_to_sql(limit, "usage_limit"))
                .transpose()?,
            per_customer_limit: discount
                .per_customer_limit()
                .map(|limit| count_to_sql(limit, "per_customer_limit"))
                .transpose()?,
        })
    }
}

fn uuids<T>(ids: &BTreeSet<TypedUuid<T>>) -> Vec<Uuid> {
    ids.iter().map(|id| id.into_uuid()).collect()
}

fn typed<T>(uuids: Vec<Uuid>) -> BTreeSet<TypedUuid<T>> {
    uuids.into_iter().map(TypedUuid::from_uuid).collect()
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgDiscountsRepository;

impl PgDiscountsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_discount(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        discount: &Discount,
    ) -> Result<(), sqlx::Error> {
        let columns = DiscountColumns::new(discount)?;

        query(CREATE_DISCOUNT_SQL)
            .bind(discount.id().into_uuid())
            .bind(discount.seller_id().into_uuid())
            .bind(discount.name())
            .bind(columns.category)
            .bind(columns.discount_type)
            .bind(columns.value)
            .bind(columns.products)
            .bind(columns.variants)
            .bind(columns.collections)
            .bind(discount.coupon_code())
            .bind(columns.eligibility)
            .bind(columns.eligible_uuids)
            .bind(columns.usage_limit)
            .bind(columns.per_customer_limit)
            .bind(SqlxTimestamp::from(discount.start_at()))
            .bind(SqlxTimestamp::from(discount.end_at()))
            .bind(discount.is_active())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// A single discount with every customer's usage.
    pub(crate) async fn get_discount(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        discount: DiscountId,
    ) -> Result<DiscountRecord, sqlx::Error> {
        let row = query_as::<Postgres, DiscountRow>(GET_DISCOUNT_SQL)
            .bind(discount.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        self.attach_usage(tx, vec![row], UsageScope::All)
            .await?
            .into_iter()
            .next()
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Like [`get_discount`](Self::get_discount), holding the row lock until
    /// the transaction ends.
    pub(crate) async fn lock_discount(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        discount: DiscountId,
    ) -> Result<DiscountRecord, sqlx::Error> {
        let row = query_as::<Postgres, DiscountRow>(LOCK_DISCOUNT_SQL)
            .bind(discount.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        self.attach_usage(tx, vec![row], UsageScope::All)
            .await?
            .into_iter()
            .next()
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Every live discount of the shop, active or not, ordered by id.
    pub(crate) async fn list_discounts(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        usage: UsageScope,
    ) -> Result<Vec<DiscountRecord>, sqlx::Error> {
        let rows = query_as::<Postgres, DiscountRow>(LIST_DISCOUNTS_SQL)
            .fetch_all(&mut **tx)
            .await?;

        self.attach_usage(tx, rows, usage).await
    }

    async fn attach_usage(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: Vec<DiscountRow>,
        scope: UsageScope,
    ) -> Result<Vec<DiscountRecord>, sqlx::Error> {
        let mut by_discount: FxHashMap<DiscountId, Vec<CustomerUsage>> = FxHashMap::default();

        // `Some(None)` loads every customer's rows.
        let customer = match scope {
            UsageScope::None => None,
            UsageScope::All => Some(None),
            UsageScope::Customer(customer) => Some(Some(customer.into_uuid())),
        };

        if let Some(customer) = customer {
            let discount_uuids: Vec<Uuid> = rows.iter().map(|row| row.new.id.into_uuid()).collect();

            let usages = query_as::<Postgres, UsageRow>(GET_USAGES_SQL)
                .bind(&discount_uuids)
                .bind(customer)
                .fetch_all(&mut **tx)
                .await?;

            for row in usages {
                by_discount
                    .entry(row.discount_uuid)
                    .or_default()
                    .push(row.usage);
            }
        }

        rows.into_iter()
            .map(|row| {
                let tracking = by_discount.remove(&row.new.id).unwrap_or_default();

                let discount = Discount::new(row.new)
                    .map_err(|err| sqlx::Error::Decode(Box::new(err)))?
                    .with_usage(row.current_usage, tracking);

                Ok(DiscountRecord {
                    discount,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }

    /// Write a discount's configuration. Usage counters are left alone.
    pub(crate) async fn update_discount(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        discount: &Discount,
    ) -> Result<u64, sqlx::Error> {
        let columns = DiscountColumns::new(discount)?;

        let rows_affected = query(UPDATE_DISCOUNT_SQL)
            .bind(discount.id().into_uuid())
            .bind(discount.name())
            .bind(columns.category)
            .bind(columns.discount_type)
            .bind(columns.value)
            .bind(columns.products)
            .bind(columns.variants)
            .bind(columns.collections)
            .bind(discount.coupon_code())
            .bind(columns.eligibility)
            .bind(columns.eligible_uuids)
            .bind(columns.usage_limit)
            .bind(columns.per_customer_limit)
            .bind(SqlxTimestamp::from(discount.start_at()))
            .bind(SqlxTimestamp::from(discount.end_at()))
            .bind(discount.is_active())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub(crate) async fn delete_discount(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        discount: DiscountId,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_DISCOUNT_SQL)
            .bind(discount.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    /// Whether any shop has a live discount with this code.
    pub(crate) async fn coupon_code_registered(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        code: &str,
    ) -> Result<bool, sqlx::Error> {
        query_scalar(COUPON_CODE_REGISTERED_SQL)
            .bind(code)
            .fetch_one(&mut **tx)
            .await
    }
}

fn discount_value(discount_type: &str, value: Decimal) -> Result<SimpleDiscount, sqlx::Error> {
    match discount_type {
        "fixed" => value
            .fract()
            .is_zero()
            .then(|| value.to_u64())
            .flatten()
            .map(|amount| SimpleDiscount::AmountOff { amount })
            .ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "value".to_string(),
                source: format!("fixed discount value {value} is not a whole amount").into(),
            }),
        "percentage" => Ok(SimpleDiscount::PercentageOff {
            percentage: value.normalize(),
        }),
        other => Err(sqlx::Error::Decode(
            format!("unknown discount type: {other}").into(),
        )),
    }
}

fn eligibility_scope(eligibility: &str, ids: Vec<Uuid>) -> Result<EligibilityScope, sqlx::Error> {
    match eligibility {
        "all" => Ok(EligibilityScope::All),
        "customers" => Ok(EligibilityScope::Customers(typed(ids))),
        "segments" => Ok(EligibilityScope::Segments(typed(ids))),
        other => Err(sqlx::Error::Decode(
            format!("unknown eligibility: {other}").into(),
        )),
    }
}

impl<'r> FromRow<'r, PgRow> for DiscountRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let category: String = row.try_get("category")?;
        let discount_type: String = row.try_get("discount_type")?;
        let eligibility: String = row.try_get("eligibility")?;

        let new = NewDiscount {
            id: DiscountId::from_uuid(row.try_get("uuid")?),
            shop_id: ShopId::from_uuid(row.try_get("shop_uuid")?),
            seller_id: SellerId::from_uuid(row.try_get("seller_uuid")?),
            name: row.try_get("name")?,
            category: category
                .parse::<DiscountCategory>()
                .map_err(|err| sqlx::Error::Decode(Box::new(err)))?,
            discount: discount_value(&discount_type, row.try_get("value")?)?,
            targets: DiscountTargets {
                products: typed(row.try_get("applies_to_products")?),
                variants: typed(row.try_get("applies_to_variants")?),
                collections: typed(row.try_get("applies_to_collections")?),
            },
            coupon_code: row.try_get("coupon_code")?,
            scope: eligibility_scope(&eligibility, row.try_get("eligible_uuids")?)?,
            usage_limit: try_get_limit(row, "usage_limit")?,
            per_customer_limit: try_get_limit(row, "per_customer_limit")?,
            start_at: row.try_get::<SqlxTimestamp, _>("start_at")?.to_jiff(),
            end_at: row.try_get::<SqlxTimestamp, _>("end_at")?.to_jiff(),
            active: row.try_get("active")?,
        };

        Ok(Self {
            new,
            current_usage: try_get_count(row, "current_usage")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}

impl<'r> FromRow<'r, PgRow> for UsageRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            discount_uuid: DiscountId::from_uuid(row.try_get("discount_uuid")?),
            usage: CustomerUsage {
                customer_id: CustomerId::from_uuid(row.try_get("customer_uuid")?),
                usage_count: try_get_count(row, "usage_count")?,
                last_used_at: row.try_get::<SqlxTimestamp, _>("last_used_at")?.to_jiff(),
                total_spent: try_get_amount(row, "total_spent")?,
            },
        })
    }
}
