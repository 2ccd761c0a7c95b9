use std::sync::Arc;

use tracing::{error, info};

use feedmill::feed::{CrawlerRegistry, GatewaySettings, RetentionPolicy, SqliteGateway};
use feedmill::sync::{start_retention_sweeper, start_sync_updater};
use feedmill::{BlacklistFilter, ChannelScheduler, Config, Database, IngestSettings, Ingestor};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load configuration
    let config = match Config::load_with_env(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = feedmill::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        feedmill::logging::init_console_only(&config.logging.level);
    }

    info!("feedmill {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> feedmill::Result<()> {
    config.validate()?;

    let db = Database::open(&config.database).await?;
    let gateway = Arc::new(SqliteGateway::new(
        db.pool().clone(),
        GatewaySettings {
            retention: RetentionPolicy::from(&config.retention),
        },
    ));

    let mut tasks = Vec::new();

    if config.sync.enabled {
        let ingestor = Ingestor::new(
            gateway.clone(),
            CrawlerRegistry::from_config(&config.sync)?,
            BlacklistFilter::from_config(&config.blacklist),
            ChannelScheduler::new(config.sync.default_refresh_interval()),
            IngestSettings::from(&config.sync),
        );
        tasks.push(start_sync_updater(ingestor, config.sync.check_interval_secs));
    } else {
        info!("Sync updater disabled");
    }

    if config.retention.enabled {
        tasks.push(start_retention_sweeper(
            gateway,
            config.retention.sweep_interval_secs,
        ));
    } else {
        info!("Retention sweeper disabled");
    }

    if tasks.is_empty() {
        info!("Nothing to run, exiting");
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    for task in tasks {
        task.abort();
    }
    db.pool().close().await;

    Ok(())
}
