/// Database operations for storing finalized daily weather metrics
use crate::database::connection::execute_with_retry;
use crate::models::MetricReport;

/// Store finalized daily metrics in the daily_weather table
///
/// Expects a table shaped like:
/// `daily_weather(metric TEXT, period_start TIMESTAMPTZ, value DOUBLE PRECISION, samples INTEGER)`
///
/// # Arguments
/// * `reports` - Metrics of one or more finalized days
/// * `database_url` - PostgreSQL connection string
///
/// # Returns
/// Result indicating success or failure
pub async fn store_daily_metrics(
    reports: &[MetricReport],
    database_url: &str,
) -> Result<(), String> {
    // Clone data for move into async closure
    let reports = reports.to_vec();

    execute_with_retry(database_url, move |client| {
        let reports = reports.clone();
        async move {
            let mut inserted = 0;
            for report in &reports {
                inserted += client
                    .execute(
                        "INSERT INTO daily_weather(metric, period_start, value, samples)
                         VALUES ($1, $2, $3, $4)",
                        &[
                            &report.kind.as_str(),
                            &report.period_start,
                            &report.value,
                            &(report.samples as i32),
                        ],
                    )
                    .await?;
            }
            Ok(inserted)
        }
    })
    .await
}
