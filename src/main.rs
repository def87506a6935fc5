#[tokio::main]
async fn main() {
    if let Err(err) = wikiracer::app::run().await {
        eprintln!("wikiracer: {err:#}");
        std::process::exit(2);
    }
}
