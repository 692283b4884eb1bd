#[tokio::main]
async fn main() -> anyhow::Result<()> {
    anomaly_replay::cli::run().await
}
