#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatty_server::run().await
}
