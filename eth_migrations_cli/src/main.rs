use clap::Parser;
use tracing::level_filters::LevelFilter;

mod command;
mod handle;
mod tracing_setup;

use command::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // secrets such as the mnemonic are usually kept in .env
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    tracing_setup::initialize(&cli.log_filter, LevelFilter::WARN);

    handle::migrate(&cli, &mut std::io::stdout()).await
}
