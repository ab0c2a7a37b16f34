use clap::Parser;
use dotenv::dotenv;
use smartcare::cli::Cli;
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    smartcare::run(Cli::parse()).await
}
