#[tokio::main]
async fn main() -> eyre::Result<()> {
    event_consumer::run().await
}
