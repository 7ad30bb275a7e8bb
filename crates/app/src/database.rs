//! Database connection management

use bazaar::ids::ShopId;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow, query};

/// SQL used to set shop context for row-level security.
pub const SET_SHOP_CONTEXT_SQL: &str = "SELECT set_config('app.current_shop_uuid', $1, true)";

/// Pool wrapper that opens shop-scoped transactions.
#[derive(Debug, Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Wrap a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction and set shop context for RLS policies.
    ///
    /// # Errors
    ///
    /// Returns an error when starting the transaction or setting shop context fails.
    pub async fn begin_shop_transaction(
        &self,
        shop: ShopId,
    ) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        query(SET_SHOP_CONTEXT_SQL)
            .bind(shop.into_uuid().to_string())
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }
}

/// Connect to `PostgreSQL`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPool::connect(database_url).await
}

/// Apply pending migrations.
///
/// # Errors
///
/// Returns an error if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

/// Privileges the services need on each table. Products and discounts are
/// soft-deleted, so only cart items and segment memberships are ever deleted.
/// Locking rows `FOR UPDATE` needs `UPDATE`.
pub const APP_TABLE_PRIVILEGES: &[(&str, &str)] = &[
    ("shops", "SELECT, INSERT"),
    ("products", "SELECT, INSERT, UPDATE"),
    ("product_variants", "SELECT, INSERT"),
    ("collections", "SELECT, INSERT"),
    ("collection_products", "SELECT, INSERT"),
    ("customers", "SELECT, INSERT"),
    ("segments", "SELECT, INSERT"),
    ("segment_customers", "SELECT, INSERT, DELETE"),
    ("discounts", "SELECT, INSERT, UPDATE"),
    ("discount_usages", "SELECT, INSERT, UPDATE"),
    ("carts", "SELECT, INSERT, UPDATE"),
    ("cart_items", "SELECT, INSERT, DELETE"),
];

/// Functions called by the RLS policies and the cross-shop coupon check.
pub const APP_FUNCTIONS: &[&str] = &["current_shop_uuid()", "coupon_code_registered(text)"];

/// Statements giving `role` exactly what the services need in the current
/// database. `role` must already be quoted as an identifier.
///
/// `coupon_code_registered` reads every shop's discounts as its owner, so it
/// is revoked from `PUBLIC` and granted to the app role alone.
#[must_use]
pub fn app_role_grants(role: &str) -> Vec<String> {
    let mut statements = vec![
        format!("GRANT USAGE ON SCHEMA public TO {role}"),
        "REVOKE EXECUTE ON FUNCTION coupon_code_registered(text) FROM PUBLIC".to_string(),
    ];

    statements.extend(
        APP_TABLE_PRIVILEGES
            .iter()
            .map(|(table, privileges)| format!("GRANT {privileges} ON TABLE {table} TO {role}")),
    );

    statements.extend(
        APP_FUNCTIONS
            .iter()
            .map(|function| format!("GRANT EXECUTE ON FUNCTION {function} TO {role}")),
    );

    statements
}

/// Read a non-negative `BIGINT` money column.
pub(crate) fn try_get_amount(row: &PgRow, col: &str) -> Result<u64, sqlx::Error> {
    let amount_i64: i64 = row.try_get(col)?;

    u64::try_from(amount_i64).map_err(|e| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(e),
    })
}

/// Read a non-negative `INTEGER` counter column.
pub(crate) fn try_get_count(row: &PgRow, col: &str) -> Result<u32, sqlx::Error> {
    let count_i32: i32 = row.try_get(col)?;

    u32::try_from(count_i32).map_err(|e| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(e),
    })
}

/// Read a nullable `INTEGER` limit column.
pub(crate) fn try_get_limit(row: &PgRow, col: &str) -> Result<Option<u32>, sqlx::Error> {
    let limit_i32: Option<i32> = row.try_get(col)?;

    limit_i32
        .map(u32::try_from)
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: col.to_string(),
            source: Box::new(e),
        })
}

/// Convert a money amount for binding.
pub(crate) fn amount_to_sql(amount: u64, col: &str) -> Result<i64, sqlx::Error> {
    i64::try_from(amount).map_err(|e| sqlx::Error::Encode(format!("{col}: {e}").into()))
}

/// Convert a counter or limit for binding.
pub(crate) fn count_to_sql(count: u32, col: &str) -> Result<i32, sqlx::Error> {
    i32::try_from(count).map_err(|e| sqlx::Error::Encode(format!("{col}: {e}").into()))
}
