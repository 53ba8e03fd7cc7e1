use clap::Parser;
use sakina_core::SakinaConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use sakina_server::AppServices;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "sakina.toml")]
    config: String,

    /// Check the store and adapter configuration, then exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match SakinaConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let services = match AppServices::from_config(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to initialise services: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match services.store.health_check().await {
            Ok(v) => println!("✅ Store ({}) reachable: {}", services.store.name(), v),
            Err(e) => {
                println!("❌ Store ({}) check failed: {}", services.store.name(), e);
                std::process::exit(1);
            }
        }

        let adapters = services.chat.adapter_names();
        if adapters.is_empty() {
            println!("⚠️  No conversational adapter configured");
        } else {
            println!("✅ Conversational adapters: {}", adapters.join(" -> "));
        }

        match &services.classifier {
            Some(c) => println!("✅ Sentiment classifier: {}", c.name()),
            None => println!("⚠️  No sentiment classifier configured"),
        }

        println!("✅ Sakina health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    sakina_server::http::start_http_server(services, config, tx.subscribe()).await?;

    Ok(())
}
