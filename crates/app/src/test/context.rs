//! Test context for service-level integration tests.

use std::sync::Arc;

use sqlx::{Connection, PgConnection, PgPool, query};

use bazaar::{
    clock::SystemClock,
    ids::{CustomerId, ProductId, ShopId},
};

use crate::{
    context::AppContext,
    database::{self, Db},
    domain::{
        carts::CartsService,
        catalog::{CatalogService, CatalogServiceError, data::NewProduct},
        checkout::CheckoutService,
        customers::{CustomersService, CustomersServiceError, data::NewCustomer},
        discounts::DiscountsService,
        shops::{ShopsService, data::NewShop},
        usage::UsageLedgerService,
    },
};

use super::db::TestDb;

/// Name of the non-superuser app role used for RLS testing.
const APP_ROLE: &str = "bazaar_app_test";
const APP_ROLE_PASSWORD: &str = "bazaar_app_test_pass";

pub(crate) struct TestContext {
    pub db: TestDb,
    /// Connections as the app role, as the services see the database.
    pub app_db: Db,
    pub shop_uuid: ShopId,
    pub shops: Arc<dyn ShopsService>,
    pub catalog: Arc<dyn CatalogService>,
    pub customers: Arc<dyn CustomersService>,
    pub discounts: Arc<dyn DiscountsService>,
    pub usage: Arc<dyn UsageLedgerService>,
    pub carts: Arc<dyn CartsService>,
    pub checkout: Arc<dyn CheckoutService>,
}

impl TestContext {
    pub async fn new() -> Self {
        let test_db = TestDb::new().await;

        // Services connect as a non-superuser so RLS policies are enforced.
        let app_pool = Self::setup_app_pool(&test_db).await;
        let app_db = Db::new(app_pool);
        let app = AppContext::new(app_db.clone(), Arc::new(SystemClock));
        let shop_uuid = ShopId::new();

        app.shops
            .create_shop(NewShop {
                uuid: shop_uuid,
                name: "Test Shop".to_string(),
                currency: "USD".to_string(),
            })
            .await
            .expect("Failed to create default test shop");

        Self {
            db: test_db,
            app_db,
            shop_uuid,
            shops: app.shops,
            catalog: app.catalog,
            customers: app.customers,
            discounts: app.discounts,
            usage: app.usage,
            carts: app.carts,
            checkout: app.checkout,
        }
    }

    /// Create an additional shop, useful for RLS isolation tests.
    pub async fn create_shop(&self, name: &str) -> ShopId {
        let uuid = ShopId::new();

        self.shops
            .create_shop(NewShop {
                uuid,
                name: name.to_string(),
                currency: "USD".to_string(),
            })
            .await
            .expect("Failed to create test shop");

        uuid
    }

    pub async fn create_customer(
        &self,
        shop: ShopId,
        email: &str,
    ) -> Result<CustomerId, CustomersServiceError> {
        let record = self
            .customers
            .create_customer(
                shop,
                NewCustomer {
                    uuid: CustomerId::new(),
                    email: email.to_string(),
                },
            )
            .await?;

        Ok(record.uuid)
    }

    /// Create a product without variants.
    pub async fn create_product(
        &self,
        shop: ShopId,
        name: &str,
        price: u64,
    ) -> Result<ProductId, CatalogServiceError> {
        let record = self
            .catalog
            .create_product(
                shop,
                NewProduct {
                    uuid: ProductId::new(),
                    name: name.to_string(),
                    price,
                    main_image: None,
                    variants: Vec::new(),
                },
            )
            .await?;

        Ok(record.product.id)
    }

    /// Create a non-superuser role (once per server) and return a pool connected as it.
    ///
    /// PostgreSQL superusers bypass RLS even with `FORCE ROW LEVEL SECURITY`, so service
    /// tests that exercise isolation must connect via this restricted role.
    async fn setup_app_pool(test_db: &TestDb) -> PgPool {
        // `superuser_url` points at the test database as the superuser.
        let su_url = &test_db.superuser_url;

        // Derive a base URL pointing at the `postgres` maintenance database for
        // server-level DDL (CREATE ROLE is server-scoped, not database-scoped).
        let postgres_url = su_url.rsplit_once('/').map(|x| x.0).unwrap_or(su_url);
        let postgres_url = format!("{postgres_url}/postgres");

        let mut server_conn = PgConnection::connect(&postgres_url)
            .await
            .expect("Failed to connect to postgres database for role setup");

        // Parallel tests race to create the role. "Role already exists" (42710)
        // and the underlying unique violation (23505) both mean it is present.
        let create_result = query(&format!(
            "CREATE ROLE {APP_ROLE} WITH LOGIN PASSWORD '{APP_ROLE_PASSWORD}' \
               NOSUPERUSER NOCREATEDB NOCREATEROLE"
        ))
        .execute(&mut server_conn)
        .await;

        if let Err(sqlx::Error::Database(ref e)) = create_result {
            if !matches!(e.code().as_deref(), Some("42710") | Some("23505")) {
                create_result.expect("Failed to create app role");
            }
        } else {
            create_result.expect("Failed to create app role");
        }

        // Grant CONNECT on the test database.
        query(&format!(
            "GRANT CONNECT ON DATABASE \"{}\" TO {APP_ROLE}",
            test_db.name
        ))
        .execute(&mut server_conn)
        .await
        .expect("Failed to grant CONNECT on test database");

        server_conn
            .close()
            .await
            .expect("Failed to close server connection");

        let mut db_conn = PgConnection::connect(su_url)
            .await
            .expect("Failed to connect to test database for privilege setup");

        // The same privileges `db ensure-app-role` grants in production.
        for stmt in database::app_role_grants(APP_ROLE) {
            query(&stmt)
                .execute(&mut db_conn)
                .await
                .expect("Failed to grant privileges to app role");
        }

        db_conn
            .close()
            .await
            .expect("Failed to close db connection");

        // Connect as the non-superuser role.
        let app_url = su_url.replacen(
            "bazaar_test:bazaar_test_password",
            &format!("{APP_ROLE}:{APP_ROLE_PASSWORD}"),
            1,
        );

        PgPool::connect(&app_url)
            .await
            .expect("Failed to create app pool")
    }
}
