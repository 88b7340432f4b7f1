//! leadgen API server
//!
//! Serves the lead report REST API and runs report generation in the
//! background. Configuration comes from the environment (`.env` honored):
//! - LEADGEN_DATA: sled database path (default "leadgen_data")
//! - LEADGEN_BIND: listen address (default "0.0.0.0:8080")
//! - LEADGEN_JWT_SECRET: token signing secret
//! - LEADGEN_AI_URL: per-section generation endpoint
//! - LEADGEN_ENRICH_URL: enrichment endpoint
//!
//! Usage:
//!   cargo run --bin seed_admin   # bootstrap the first admin user
//!   cargo run --bin leadgen      # start the server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use leadgen::pipeline::Pipeline;
use leadgen::providers::{HttpEnrichmentSource, HttpSectionGenerator};
use leadgen::rest::create_router;
use leadgen::storage::Storage;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadgen=info".into()),
        )
        .init();

    let data_path = env_or("LEADGEN_DATA", "leadgen_data");
    let bind_addr: SocketAddr = env_or("LEADGEN_BIND", "0.0.0.0:8080").parse()?;
    let ai_url = env_or("LEADGEN_AI_URL", "http://localhost:9000/generate");
    let enrich_url = env_or("LEADGEN_ENRICH_URL", "http://localhost:9001/enrich");

    println!("🚀 leadgen starting...");
    println!("📦 Storage: Sled at {data_path} | REST (Axum) on {bind_addr}");
    println!("🧪 Run `cargo run --bin seed_admin` first on a fresh database");

    // Storage handle is built once here and injected everywhere
    let storage = Arc::new(Storage::open(&data_path)?);

    let pipeline = Pipeline::new(
        storage.clone(),
        Arc::new(HttpSectionGenerator::new(ai_url)),
        Arc::new(HttpEnrichmentSource::new(enrich_url)),
    );

    let app = create_router(storage, pipeline);

    info!(addr = %bind_addr, "listening");
    let listener = TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
