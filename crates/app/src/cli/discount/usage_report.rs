use bazaar::ids::{DiscountId, ShopId};
use bazaar_app::{config::DatabaseConfig, context::AppContext, domain::usage::UsageLedgerService};
use clap::Args;
use uuid::Uuid;

#[derive(Debug, Args)]
pub(crate) struct UsageReportArgs {
    /// Shop owning the discount
    #[arg(long)]
    shop_uuid: Uuid,

    /// Discount to report on
    #[arg(long)]
    discount_uuid: Uuid,

    #[command(flatten)]
    database: DatabaseConfig,
}

pub(crate) async fn run(args: UsageReportArgs) -> Result<(), String> {
    let context = AppContext::from_database_url(&args.database.database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    let report = context
        .usage
        .usage_report(
            ShopId::from_uuid(args.shop_uuid),
            DiscountId::from_uuid(args.discount_uuid),
        )
        .await
        .map_err(|error| format!("failed to build usage report: {error}"))?;

    let json = serde_json::to_string_pretty(&report)
        .map_err(|error| format!("failed to serialise usage report: {error}"))?;

    println!("{json}");

    Ok(())
}
