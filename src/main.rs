use clap::Parser;

use roomsense_lib::config::{Args, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    roomsense_lib::utils::logging::init_logging();
    let args = Args::parse();
    let settings = Settings::from_args(&args)?;
    roomsense_lib::run(settings).await
}
