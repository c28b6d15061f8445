use clap::Parser;

/// Library circulation service CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "library-circulation",
    version,
    about = "Loan tracking and circulation service for a small library"
)]
pub struct Cli {
    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL, e.g. sqlite:library.db
    #[arg(long)]
    pub database_url: Option<String>,

    /// Catalog report interval in seconds
    #[arg(long)]
    pub report_interval: Option<u64>,

    /// Webhook URL for scheduled catalog reports
    #[arg(long)]
    pub report_webhook_url: Option<String>,
}
