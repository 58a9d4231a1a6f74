// =============================================================================
// Matrixon Sliding Sync Proxy - Main Entry Point
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// =============================================================================

use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

use matrixon_sliding_proxy::{
    clap::{self, Commands},
    commands, Config,
};

fn init_logging(directives: &str) {
    let registry = tracing_subscriber::Registry::default();
    let fmt_layer = tracing_subscriber::fmt::Layer::new();
    let filter_layer = match EnvFilter::try_new(directives) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("It looks like your config is invalid. The following error occurred while parsing it: {e}");
            EnvFilter::new("warn")
        }
    };

    let subscriber = registry.with(filter_layer).with(fmt_layer);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install tracing subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let start_time = Instant::now();
    let args = clap::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("It looks like your config is invalid. The following error occurred: {e}");
            std::process::exit(1);
        }
    };

    init_logging(args.log_level.as_deref().unwrap_or(&config.log));
    info!(
        "🚀 Starting Matrixon Sliding Sync Proxy {} for {}",
        clap::version(),
        config.server_name
    );

    let lines = match &args.command {
        Commands::CheckConfig => {
            info!("🔧 Checking configuration");
            commands::check_config(&config)
        }
        Commands::Inspect { sort, range } => {
            info!("🏠 Inspecting room cache");
            commands::inspect(&config, sort, *range).await?
        }
        Commands::Replay {
            events,
            request,
            user,
        } => {
            info!("🔄 Replaying recorded event batches");
            commands::replay(&config, events, request, user).await.map_err(|e| {
                error!("❌ Replay failed: {e:#}");
                e
            })?
        }
    };

    for line in lines {
        println!("{line}");
    }
    info!("✅ Done in {:?}", start_time.elapsed());
    Ok(())
}
