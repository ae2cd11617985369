#[tokio::main]
async fn main() {
    storyfeed::start_server().await;
}
