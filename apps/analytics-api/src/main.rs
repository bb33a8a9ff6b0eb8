#[tokio::main]
async fn main() -> eyre::Result<()> {
    analytics_api::run().await
}
