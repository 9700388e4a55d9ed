mod aggregation;
mod config;
mod database;
mod decoder;
mod error;
mod gateway;
mod models;
mod persistence;
mod poll;
mod utils;

use log::{error, info, warn};
use time::OffsetDateTime;
use tokio::time::{sleep, Duration};

use config::GatewayConfig;
use database::store_daily_metrics;
use models::MetricReport;
use poll::Poller;
use utils::format_datetime;

/// Hand finalized daily metrics to the database, or log them without one
///
/// Returns whether the reports can be dropped from the saved state.
async fn publish(reports: &[MetricReport], config: &GatewayConfig) -> bool {
    if reports.is_empty() {
        return false;
    }

    for report in reports {
        info!(
            "{} {}: {:.3}",
            format_datetime(&report.period_start),
            report.kind,
            report.value
        );
    }

    match &config.database_url {
        Some(database_url) => match store_daily_metrics(reports, database_url).await {
            Ok(()) => {
                info!("Successfully stored {} daily metrics", reports.len());
                true
            }
            Err(e) => {
                error!(
                    "Failed to store {} daily metrics, keeping them for the next cycle: {}",
                    reports.len(),
                    e
                );
                false
            }
        },
        None => {
            warn!("DATABASE_URL not set, daily metrics were only logged");
            true
        }
    }
}

async fn main_loop(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting weather gateway data collection service");

    let mut poller = Poller::new(config.clone());
    let interval_secs = config.poll_interval.as_secs();

    loop {
        let start_time = OffsetDateTime::now_utc();
        info!("Starting poll cycle at: {}", format_datetime(&start_time));

        let reports = poller.poll().await;
        if publish(&reports, &config).await {
            poller.acknowledge(&reports);
        }

        if let Some(last_error) = poller.last_error() {
            warn!("Last known error: {}", last_error);
        }

        // Wait until next cycle should start
        let elapsed = (OffsetDateTime::now_utc() - start_time).whole_seconds().max(0) as u64;
        let wait_time = interval_secs.saturating_sub(elapsed);
        if wait_time > 0 {
            sleep(Duration::from_secs(wait_time)).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match GatewayConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(config) => {
            match result {
                Ok(_) => info!("Program completed successfully"),
                Err(e) => error!("Fatal error: {}", e),
            }
        }
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Program terminated by user. Exiting gracefully."),
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        }
    }

    Ok(())
}
