//! Per-test databases in a shared PostgreSQL container

use once_cell::sync::Lazy;
use sqlx::{Connection, PgConnection, PgPool, query, query_scalar};
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres as PostgresImage;
use tokio::sync::{OnceCell, mpsc};
use uuid::Uuid;

use crate::database;

const SUPERUSER: &str = "bazaar_test";
const SUPERUSER_PASSWORD: &str = "bazaar_test_password";
const DATABASE_PREFIX: &str = "bazaar_repo_test_";

/// Only names this harness generates may be created or dropped.
fn validate_database_name(name: &str) -> Result<(), String> {
    let Some(suffix) = name.strip_prefix(DATABASE_PREFIX) else {
        return Err(format!("database name must start with {DATABASE_PREFIX}"));
    };

    if name.len() > 63 {
        return Err("database name must be at most 63 characters".to_string());
    }

    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("database name suffix must be non-empty and alphanumeric".to_string());
    }

    Ok(())
}

async fn init_postgres_container() -> ContainerAsync<PostgresImage> {
    PostgresImage::default()
        .with_user(SUPERUSER)
        .with_password(SUPERUSER_PASSWORD)
        .with_db_name(SUPERUSER)
        .with_env_var("POSTGRES_INITDB_ARGS", "--auth-host=trust")
        .start()
        .await
        .expect("Failed to start PostgreSQL container")
}

/// Started once, reused by every test in the binary.
static POSTGRES_CONTAINER: Lazy<OnceCell<ContainerAsync<PostgresImage>>> = Lazy::new(OnceCell::new);

/// Databases queued for dropping.
static CLEANUP_SENDER: Lazy<OnceCell<mpsc::UnboundedSender<String>>> = Lazy::new(OnceCell::new);

async fn init_cleanup_task() -> mpsc::UnboundedSender<String> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(db_name) = receiver.recv().await {
            if let Err(err) = drop_database(&db_name).await {
                eprintln!("Failed to drop test database '{db_name}': {err}");
            }
        }
    });

    sender
}

async fn server_url(database: &str) -> Option<String> {
    let container = POSTGRES_CONTAINER.get()?;
    let port = container.get_host_port_ipv4(5432).await.ok()?;
    let host =
        std::env::var("TESTCONTAINERS_HOST_OVERRIDE").unwrap_or_else(|_| "localhost".to_string());

    Some(format!(
        "postgresql://{SUPERUSER}:{SUPERUSER_PASSWORD}@{host}:{port}/{database}"
    ))
}

async fn drop_database(db_name: &str) -> Result<(), sqlx::Error> {
    if validate_database_name(db_name).is_err() {
        return Ok(());
    }

    let Some(url) = server_url("postgres").await else {
        return Ok(());
    };

    let mut conn = PgConnection::connect(&url).await?;

    query(&format!("DROP DATABASE IF EXISTS \"{db_name}\""))
        .execute(&mut conn)
        .await?;

    conn.close().await
}

/// A freshly migrated database of its own, dropped in the background once the
/// value goes out of scope.
#[derive(Debug, Clone)]
pub struct TestDb {
    /// Superuser pool; bypasses RLS, so only for setup.
    pub pool: PgPool,

    pub name: String,

    /// Connection string of `pool`; `TestContext` swaps in the app role.
    pub(super) superuser_url: String,
}

impl Drop for TestDb {
    fn drop(&mut self) {
        if let Some(sender) = CLEANUP_SENDER.get() {
            let _ = sender.send(self.name.clone());
        }
    }
}

impl TestDb {
    pub async fn new() -> Self {
        CLEANUP_SENDER.get_or_init(init_cleanup_task).await;
        POSTGRES_CONTAINER
            .get_or_init(init_postgres_container)
            .await;

        let name = format!("{DATABASE_PREFIX}{}", Uuid::now_v7().simple());

        if let Err(error) = validate_database_name(&name) {
            panic!("Invalid database name '{name}': {error}");
        }

        let admin_url = server_url("postgres")
            .await
            .expect("Failed to resolve container address");

        let mut conn = PgConnection::connect(&admin_url)
            .await
            .expect("Failed to connect to postgres database");

        query(&format!("CREATE DATABASE \"{name}\""))
            .execute(&mut conn)
            .await
            .expect("Failed to create test database");

        conn.close()
            .await
            .expect("Failed to close admin connection");

        let superuser_url = server_url(&name)
            .await
            .expect("Failed to resolve container address");

        let pool = PgPool::connect(&superuser_url)
            .await
            .expect("Failed to create pool for test database");

        database::migrate(&pool)
            .await
            .expect("Failed to run migrations on test database");

        Self {
            pool,
            name,
            superuser_url,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_are_accepted() {
        let name = format!("{DATABASE_PREFIX}{}", Uuid::now_v7().simple());

        assert!(validate_database_name(&name).is_ok());
    }

    #[test]
    fn foreign_or_unsafe_names_are_rejected() {
        assert!(validate_database_name("postgres").is_err());
        assert!(validate_database_name(DATABASE_PREFIX).is_err());
        assert!(validate_database_name("bazaar_repo_test_x\"; DROP").is_err());
        assert!(validate_database_name(&format!("{DATABASE_PREFIX}{}", "a".repeat(64))).is_err());
    }

    #[tokio::test]
    async fn migrations_force_row_level_security_on_every_table() {
        let test_db = TestDb::new().await;

        let unprotected: Vec<String> = query_scalar(
            "SELECT relname::text FROM pg_class
             WHERE relkind = 'r'
               AND relnamespace = 'public'::regnamespace
               AND relname <> '_sqlx_migrations'
               AND NOT (relrowsecurity AND relforcerowsecurity)
             ORDER BY relname",
        )
        .fetch_all(test_db.pool())
        .await
        .expect("Failed to inspect tables");

        assert!(unprotected.is_empty(), "tables without forced RLS: {unprotected:?}");
    }

    #[tokio::test]
    async fn shop_context_defaults_to_none() {
        let test_db = TestDb::new().await;

        let shop: Option<Uuid> = query_scalar("SELECT current_shop_uuid()")
            .fetch_one(test_db.pool())
            .await
            .expect("Failed to read shop context");

        assert_eq!(shop, None);
    }
}
