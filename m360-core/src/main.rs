#[tokio::main]
async fn main() {
    m360_core::run().await;
}
