use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    shadow_cli::main_entry().await
}
