use clap::{Args, Subcommand};

mod usage_report;

#[derive(Debug, Args)]
pub(crate) struct DiscountCommand {
    #[command(subcommand)]
    command: DiscountSubcommand,
}

#[derive(Debug, Subcommand)]
enum DiscountSubcommand {
    UsageReport(usage_report::UsageReportArgs),
}

pub(crate) async fn run(command: DiscountCommand) -> Result<(), String> {
    match command.command {
        DiscountSubcommand::UsageReport(args) => usage_report::run(args).await,
    }
}
