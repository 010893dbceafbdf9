#[tokio::main]
async fn main() -> anyhow::Result<()> {
    request_tracker_lib::run().await
}
