use bazaar_app::{config::DatabaseConfig, database};
use clap::Args;
use sqlx::{Postgres, Transaction, query, query_scalar};

#[derive(Debug, Args)]
pub(crate) struct EnsureAppRoleArgs {
    /// Administrative connection; app credentials cannot manage roles
    #[command(flatten)]
    database: DatabaseConfig,

    /// Role the services connect as
    #[arg(long, default_value = "bazaar_app")]
    role_name: String,

    /// Password for the role
    #[arg(long, env = "APP_DB_PASSWORD", hide_env_values = true)]
    password: String,
}

/// Flags that keep the role subject to every shop's RLS policy.
const ROLE_FLAGS: &str = "NOSUPERUSER NOCREATEDB NOCREATEROLE NOREPLICATION NOBYPASSRLS";

/// Create or update the role the services connect as, then grant it the
/// per-table privileges and RLS functions listed in
/// [`database::APP_TABLE_PRIVILEGES`] and [`database::APP_FUNCTIONS`].
pub(crate) async fn run(args: EnsureAppRoleArgs) -> Result<(), String> {
    if args.role_name.trim().is_empty() {
        return Err("role_name cannot be empty".to_string());
    }

    if args.password.trim().is_empty() {
        return Err("password cannot be empty".to_string());
    }

    let pool = database::connect(&args.database.database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|error| format!("failed to start transaction: {error}"))?;

    // Role names and passwords cannot be bound, so they are quoted server-side.
    let role = quoted(&mut tx, "quote_ident", &args.role_name).await?;
    let password = quoted(&mut tx, "quote_literal", &args.password).await?;

    let role_exists: bool =
        query_scalar("SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)")
            .bind(&args.role_name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|error| format!("failed to check role existence: {error}"))?;

    let verb = if role_exists { "ALTER" } else { "CREATE" };

    execute(
        &mut tx,
        &format!("{verb} ROLE {role} LOGIN PASSWORD {password} {ROLE_FLAGS}"),
        "create or update role",
    )
    .await?;

    let database_name: String = query_scalar("SELECT quote_ident(current_database())")
        .fetch_one(&mut *tx)
        .await
        .map_err(|error| format!("failed to resolve database name: {error}"))?;

    let grants = std::iter::once(format!("GRANT CONNECT ON DATABASE {database_name} TO {role}"))
        .chain(database::app_role_grants(&role));

    for statement in grants {
        execute(&mut tx, &statement, &format!("apply `{statement}`")).await?;
    }

    tx.commit()
        .await
        .map_err(|error| format!("failed to commit changes: {error}"))?;

    println!(
        "ensured app role {} with access to {} tables",
        args.role_name,
        database::APP_TABLE_PRIVILEGES.len()
    );

    Ok(())
}

async fn quoted(
    tx: &mut Transaction<'_, Postgres>,
    function: &str,
    value: &str,
) -> Result<String, String> {
    let sql = format!("SELECT {function}($1)");

    query_scalar(&sql)
        .bind(value)
        .fetch_one(&mut **tx)
        .await
        .map_err(|error| format!("failed to {function}: {error}"))
}

/// Run `statement`, reporting a failure as `what`; `statement` may hold a password.
async fn execute(
    tx: &mut Transaction<'_, Postgres>,
    statement: &str,
    what: &str,
) -> Result<(), String> {
    query(statement)
        .execute(&mut **tx)
        .await
        .map(drop)
        .map_err(|error| format!("failed to {what}: {error}"))
}
