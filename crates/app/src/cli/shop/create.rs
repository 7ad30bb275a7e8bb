use bazaar::ids::ShopId;
use bazaar_app::{
    config::DatabaseConfig,
    context::AppContext,
    domain::shops::{ShopsService, data::NewShop},
};
use clap::Args;
use uuid::Uuid;

#[derive(Debug, Args)]
pub(crate) struct CreateShopArgs {
    /// Shop display name
    #[arg(long)]
    name: String,

    /// ISO 4217 currency carts of the shop are priced in
    #[arg(long, default_value = "USD")]
    currency: String,

    /// Optional shop UUID; generated when omitted
    #[arg(long)]
    shop_uuid: Option<Uuid>,

    #[command(flatten)]
    database: DatabaseConfig,
}

pub(crate) async fn run(args: CreateShopArgs) -> Result<(), String> {
    let context = AppContext::from_database_url(&args.database.database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    let uuid = args.shop_uuid.map_or_else(ShopId::new, ShopId::from_uuid);

    let shop = context
        .shops
        .create_shop(NewShop {
            uuid,
            name: args.name,
            currency: args.currency,
        })
        .await
        .map_err(|error| format!("failed to create shop: {error}"))?;

    println!("shop_uuid: {}", shop.uuid);
    println!("shop_name: {}", shop.name);
    println!("currency: {}", shop.currency);

    Ok(())
}
