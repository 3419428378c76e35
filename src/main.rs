use clap::Parser;
use std::path::Path;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xemm::cli::{Cli, Commands};
use xemm::config::{AppConfig, LoggingConfig};
use xemm::domain::EngineEvent;
use xemm::error::{Result, XemmError};
use xemm::exchange::build_paper_venues;
use xemm::feed::ReplayFeed;
use xemm::strategy::EngineRunner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config_dir,
            events,
            dry_run,
        } => {
            let mut config = AppConfig::load_from(&config_dir)?;
            if dry_run {
                config.dry_run.enabled = true;
            }
            init_logging(&config.logging);
            run_engine(config, events.as_deref()).await
        }
        Commands::CheckConfig { config_dir } => {
            init_logging_simple();
            let config = AppConfig::load_from(&config_dir)?;
            validated(&config)?;
            println!(
                "Configuration OK: {} quoted on {} and hedged on {}",
                config.pair.symbol(),
                config.quote_venue.name,
                config.reference_venue.name
            );
            println!(
                "  edge {} bps (cancel below {} bps), ttl {}ms, direction {:?}",
                config.strategy.min_edge_bps,
                config.strategy.cancel_edge_bps,
                config.strategy.order_ttl_ms,
                config.strategy.direction_mode
            );
            println!(
                "  reference price {:?}, dry run {}",
                config.market_data.reference_price, config.dry_run.enabled
            );
            Ok(())
        }
    }
}

fn validated(config: &AppConfig) -> Result<()> {
    config.validate().map_err(|problems| {
        for problem in &problems {
            error!("Invalid configuration: {}", problem);
        }
        XemmError::InvalidConfig(problems.join("; "))
    })
}

async fn run_engine(config: AppConfig, events: Option<&Path>) -> Result<()> {
    validated(&config)?;

    info!(
        pair = %config.pair.symbol(),
        quote_venue = %config.quote_venue.name,
        reference_venue = %config.reference_venue.name,
        dry_run = config.dry_run.enabled,
        "starting xemm"
    );

    let venues = build_paper_venues(&config)?;
    let mut runner = EngineRunner::new(
        config.clone(),
        venues.quote_client(),
        venues.reference_client(),
    );

    if let Some(path) = events {
        let feed = ReplayFeed::load(path)?
            .with_venue(venues.quote.clone())
            .with_venue(venues.reference.clone())
            .with_shutdown_at_end(true);
        let sink = runner.sink();
        tokio::spawn(async move {
            feed.run(sink).await;
        });
    } else {
        warn!("No --events file given; the engine waits for market data until Ctrl-C");
    }

    let sink = runner.sink();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = sink.send(EngineEvent::Shutdown);
        }
    });

    if let Err(e) = runner.start().await {
        error!("Engine failed to start: {}", e);
        if let Err(stop_err) = runner.shutdown().await {
            error!("Shutdown after failed start: {}", stop_err);
        }
        return Err(e);
    }

    let stats = runner.run().await?;
    info!(
        placements = stats.placements,
        fills = stats.fills,
        hedges = stats.hedges,
        reconciliations = stats.reconciliations,
        "xemm exited cleanly"
    );
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},xemm=debug", logging.level)));

    // `rolling::daily` panics if it cannot create the first file, so preflight writability.
    let file_layer = logging.dir.as_deref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                log_dir, e
            );
            return None;
        }

        let test_path = Path::new(log_dir).join(".xemm_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(log_dir, "xemm.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Lives for the whole process
                Box::leak(Box::new(guard));

                eprintln!("Logging to: {}/xemm.log", log_dir);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    let (json_layer, text_layer) = if logging.json {
        (
            Some(tracing_subscriber::fmt::layer().json().with_target(true)),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();
}

fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
