use std::error::Error;
use std::net::SocketAddr;

use sim::{serve, SimConfig};

// cargo run -p sim -- 3021
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let port = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<u16>()?,
        None => 3021,
    };

    serve(SocketAddr::from(([0, 0, 0, 0], port)), SimConfig::default()).await?;
    Ok(())
}
