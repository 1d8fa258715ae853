// Household Budget - Web Server
// REST API + websocket budget warnings with Axum

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use household_budget::{server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Refuse to start on bad config rather than serving half-configured.
    config.validate()?;

    println!("🌐 Household Budget - Web Server v{}", household_budget::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   API:       http://{}/api/health", config.listen);
    println!("   Realtime:  ws://{}/ws", config.listen);
    println!("   Origins:   {}", config.origins().join(", "));
    println!("   Database:  {:?}", config.db_path);
    println!("\n   Press Ctrl+C to stop\n");

    server::run(config).await
}
