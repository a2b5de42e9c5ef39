use anyhow::Result;
use clap::Parser;
use corpus_loader::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing for the CLI.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("corpus-loader completed successfully"),
        Err(e) => tracing::error!(error = %e, "corpus-loader exited with error"),
    }
    result
}
