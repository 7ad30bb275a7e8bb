use bazaar_app::{config::LoggingConfig, observability::init_logging};
use clap::{Parser, Subcommand};

mod db;
mod discount;
mod shop;

#[derive(Debug, Parser)]
#[command(name = "bazaar-app", about = "Bazaar CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    logging: LoggingConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Shop(shop::ShopCommand),
    Discount(discount::DiscountCommand),
    Db(db::DbCommand),
}

impl Cli {
    pub(crate) async fn run(self) -> Result<(), String> {
        init_logging(&self.logging).map_err(|error| error.to_string())?;

        match self.command {
            Commands::Shop(command) => shop::run(command).await,
            Commands::Discount(command) => discount::run(command).await,
            Commands::Db(command) => db::run(command).await,
        }
    }
}
