use anyhow::Result;
use thinkchat::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
