#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    vchat_lib::run().await
}
