/// One poll cycle: fetch live data, roll the day over, fold, persist
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use time::OffsetDateTime;

use crate::aggregation::AggregationPeriod;
use crate::config::GatewayConfig;
use crate::decoder::{walk, LiveDataPacket, WalkSummary};
use crate::error::{GatewayError, PersistenceError};
use crate::gateway::{connect_or_discover, fetch_live_data, Discovery};
use crate::models::{MetricReport, SolarBasis};
use crate::persistence::{load_or_default, JsonFileStore, StateStore};
use crate::utils::format_datetime;

/// Result of folding one live-data packet
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub rolled_over: bool,
    pub walk: WalkSummary,
    /// State after the packet was folded
    pub period: AggregationPeriod,
    /// Finalized days not yet accepted by the reporting backend
    pub unpublished: Vec<MetricReport>,
}

/// Fold one live-data packet into the persisted daily state
///
/// Loads the saved state (or starts a period at `captured_at`), finalizes
/// the period into the unpublished reports when `captured_at` is on a new
/// UTC day, walks the packet, counts the observation and saves. A failed
/// save is logged and the cycle still completes.
pub fn process_live_data(
    packet: &LiveDataPacket<'_>,
    captured_at: OffsetDateTime,
    store: &dyn StateStore,
    basis: SolarBasis,
) -> CycleSummary {
    let mut state = load_or_default(store, captured_at);
    let rolled_over = state.period.roll_over(captured_at, &mut state.unpublished);
    let period = &mut state.period;

    let walked = walk(packet, period, basis);
    if walked.unknown_records > 0 {
        debug!(
            "{} unknown sensor records; later records in this packet may be misaligned",
            walked.unknown_records
        );
    }
    period.record_observation();

    if let Err(e) = store.save(&state) {
        error!("Unable to save aggregation state: {}", e);
    }

    CycleSummary {
        rolled_over,
        walk: walked,
        period: state.period,
        unpublished: state.unpublished,
    }
}

/// Drop reports the backend has accepted from the saved state
pub fn acknowledge_reports(
    store: &dyn StateStore,
    published: &[MetricReport],
) -> Result<(), PersistenceError> {
    let Some(mut state) = store.load()? else {
        return Ok(());
    };

    let before = state.unpublished.len();
    state.unpublished.retain(|report| !published.contains(report));
    if state.unpublished.len() == before {
        return Ok(());
    }

    debug!(
        "{} reports published, {} still pending",
        before - state.unpublished.len(),
        state.unpublished.len()
    );
    store.save(&state)
}

/// Polls the gateway once per call and tracks the last failure
pub struct Poller {
    config: GatewayConfig,
    store: JsonFileStore,
    discovery: Discovery,
    gateway: Option<SocketAddr>,
    last_error: Option<String>,
}

impl Poller {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_discovery(config, Discovery::default())
    }

    pub fn with_discovery(config: GatewayConfig, discovery: Discovery) -> Self {
        let store = JsonFileStore::new(config.state_file.clone());
        debug!("Aggregation state kept in {}", store.path().display());
        let gateway = config.gateway_addr();
        Self {
            config,
            store,
            discovery,
            gateway,
            last_error: None,
        }
    }

    /// Most recent cycle failure, cleared by the next successful cycle
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Run one cycle and return every finalized metric still awaiting publication
    ///
    /// Reports stay pending across cycles and restarts until passed to
    /// [`Poller::acknowledge`]. Connectivity failures abort the cycle before
    /// any state is touched.
    pub async fn poll(&mut self) -> Vec<MetricReport> {
        match self.try_poll().await {
            Ok(reports) => {
                self.last_error = None;
                reports
            }
            Err(e) => {
                let message = e.to_string();
                error!("Poll cycle failed: {}", message);
                self.last_error = Some(message);
                Vec::new()
            }
        }
    }

    async fn try_poll(&mut self) -> Result<Vec<MetricReport>, GatewayError> {
        let (mut stream, addr) = connect_or_discover(self.gateway, &self.discovery).await?;
        if self.gateway != Some(addr) {
            info!("Using gateway at {}", addr);
            self.gateway = Some(addr);
        }

        let response = fetch_live_data(&mut stream).await?;
        drop(stream);

        let summary = process_live_data(
            &LiveDataPacket::new(&response.bytes),
            response.captured_at,
            &self.store,
            self.config.solar_basis,
        );
        log_summary(&summary);

        Ok(summary.unpublished)
    }

    /// Mark reports as stored so later cycles stop returning them
    pub fn acknowledge(&self, published: &[MetricReport]) {
        if let Err(e) = acknowledge_reports(&self.store, published) {
            error!("Unable to clear published reports from state: {}", e);
        }
    }
}

fn log_summary(summary: &CycleSummary) {
    if summary.rolled_over {
        info!("Started a new daily period");
    }

    let walk = &summary.walk;
    if walk.truncated {
        warn!("Live data ended inside a record after {} bytes", walk.consumed);
    }
    debug!(
        "Decoded {} value, {} ignored and {} unknown records",
        walk.value_records, walk.ignored_records, walk.unknown_records
    );

    let period = &summary.period;
    info!("Summary for {}:", format_datetime(&period.day()));
    if let Some(reports) = period.daily_metrics() {
        for report in reports {
            info!("  {}: {:.3}", report.kind, report.value);
        }
    }
    info!("  Based on {} samples", period.observation_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::client::tests::live_data_frame;
    use crate::models::MetricKind;
    use crate::persistence::SavedState;
    use std::cell::RefCell;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::path::PathBuf;
    use time::macros::datetime;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::Duration;

    /// In-memory store that can be made to fail
    #[derive(Default)]
    struct MemoryStore {
        saved: RefCell<Option<SavedState>>,
        fail_save: bool,
    }

    impl StateStore for MemoryStore {
        fn load(&self) -> Result<Option<SavedState>, PersistenceError> {
            Ok(self.saved.borrow().clone())
        }

        fn save(&self, state: &SavedState) -> Result<(), PersistenceError> {
            if self.fail_save {
                return Err(std::io::Error::other("disk full").into());
            }
            *self.saved.borrow_mut() = Some(state.clone());
            Ok(())
        }
    }

    fn temperature_frame(tenths: i16) -> Vec<u8> {
        let [hi, lo] = tenths.to_be_bytes();
        live_data_frame(&[0x02, hi, lo, 0x07, 0x46, 0x10, 0x00, 0x0A])
    }

    fn run(store: &MemoryStore, frame: &[u8], at: OffsetDateTime) -> (CycleSummary, Vec<MetricReport>) {
        let summary = process_live_data(&LiveDataPacket::new(frame), at, store, SolarBasis::Hourly);
        let reports = summary.unpublished.clone();
        (summary, reports)
    }

    #[test]
    fn first_cycle_starts_a_period() {
        let store = MemoryStore::default();
        let at = datetime!(2024-03-01 10:00 UTC);
        let (summary, reports) = run(&store, &temperature_frame(215), at);

        assert!(!summary.rolled_over);
        assert!(reports.is_empty());
        assert_eq!(summary.period.period_start, at);
        assert_eq!(summary.period.observation_count, 1);
        assert_eq!(summary.period.temperature_sum, 21.5);
        assert_eq!(
            store.saved.borrow().as_ref().map(|state| &state.period),
            Some(&summary.period)
        );
    }

    #[test]
    fn same_day_cycles_accumulate() {
        let store = MemoryStore::default();
        run(&store, &temperature_frame(100), datetime!(2024-03-01 10:00 UTC));
        let (summary, reports) = run(&store, &temperature_frame(200), datetime!(2024-03-01 10:01 UTC));

        assert!(reports.is_empty());
        assert_eq!(summary.period.observation_count, 2);
        assert_eq!(summary.period.max_temperature, 20.0);
        assert_eq!(summary.period.min_temperature, 10.0);
        assert_eq!(summary.period.period_start, datetime!(2024-03-01 10:00 UTC));
    }

    #[test]
    fn new_day_reports_previous_period_only() {
        let store = MemoryStore::default();
        run(&store, &temperature_frame(100), datetime!(2024-03-01 22:00 UTC));
        run(&store, &temperature_frame(300), datetime!(2024-03-01 23:59 UTC));
        let next_day = datetime!(2024-03-02 00:00:30 UTC);
        let (summary, reports) = run(&store, &temperature_frame(-50), next_day);

        assert!(summary.rolled_over);
        // Temperature, humidity and rain; pressure, wind and solar never reported
        assert_eq!(reports.len(), 7);
        assert!(!reports.iter().any(|r| r.kind == MetricKind::PressureMean));
        let value = |kind: MetricKind| reports.iter().find(|r| r.kind == kind).unwrap().value;
        assert_eq!(value(MetricKind::TemperatureMean), 20.0);
        assert_eq!(value(MetricKind::TemperatureMax), 30.0);
        assert_eq!(value(MetricKind::TemperatureMin), 10.0);
        assert_eq!(value(MetricKind::HumidityMean), 70.0);
        assert_eq!(value(MetricKind::RainTotal), 1.0);
        assert!(reports
            .iter()
            .all(|r| r.period_start == datetime!(2024-03-01 00:00 UTC) && r.samples == 2));

        // The post-rollover reading belongs to the new period
        assert_eq!(summary.period.period_start, next_day);
        assert_eq!(summary.period.observation_count, 1);
        assert_eq!(summary.period.temperature_sum, -5.0);
    }

    #[test]
    fn day_without_a_sensor_does_not_report_it() {
        let store = MemoryStore::default();
        let humidity_only = live_data_frame(&[0x07, 0x46]);
        run(&store, &humidity_only, datetime!(2024-03-01 12:00 UTC));
        let (_, reports) = run(&store, &humidity_only, datetime!(2024-03-02 12:00 UTC));

        let kinds: Vec<MetricKind> = reports.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            [
                MetricKind::HumidityMean,
                MetricKind::HumidityMax,
                MetricKind::HumidityMin
            ]
        );
        assert!(reports.iter().all(|r| r.value == 70.0));
    }

    #[test]
    fn finalized_reports_stay_pending_until_acknowledged() {
        let store = MemoryStore::default();
        run(&store, &temperature_frame(100), datetime!(2024-03-01 23:00 UTC));
        let (_, finalized) = run(&store, &temperature_frame(120), datetime!(2024-03-02 00:01 UTC));
        assert_eq!(finalized.len(), 7);

        // Publishing failed; the next cycle hands the same day out again
        let (summary, pending) = run(&store, &temperature_frame(130), datetime!(2024-03-02 00:02 UTC));
        assert!(!summary.rolled_over);
        assert_eq!(pending, finalized);

        acknowledge_reports(&store, &pending).unwrap();
        let (_, pending) = run(&store, &temperature_frame(140), datetime!(2024-03-02 00:03 UTC));
        assert!(pending.is_empty());
        assert_eq!(store.saved.borrow().as_ref().unwrap().period.observation_count, 3);
    }

    #[test]
    fn acknowledge_keeps_reports_that_were_not_published() {
        let store = MemoryStore::default();
        run(&store, &temperature_frame(100), datetime!(2024-03-01 23:00 UTC));
        let (_, finalized) = run(&store, &temperature_frame(120), datetime!(2024-03-02 00:01 UTC));

        acknowledge_reports(&store, &finalized[..2]).unwrap();
        let saved = store.saved.borrow().clone().unwrap();
        assert_eq!(saved.unpublished, finalized[2..]);
    }

    #[test]
    fn acknowledge_without_saved_state_is_a_no_op() {
        let store = MemoryStore::default();
        assert!(acknowledge_reports(&store, &[]).is_ok());
        assert!(store.saved.borrow().is_none());
    }

    #[test]
    fn failed_save_still_completes_cycle() {
        let store = MemoryStore {
            fail_save: true,
            ..Default::default()
        };
        let (summary, _) = run(&store, &temperature_frame(100), datetime!(2024-03-01 10:00 UTC));
        assert_eq!(summary.period.observation_count, 1);
        assert!(store.saved.borrow().is_none());
    }

    fn test_config(state_file: PathBuf, gateway: SocketAddr) -> GatewayConfig {
        GatewayConfig {
            gateway_ip: match gateway {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            },
            gateway_port: gateway.port(),
            state_file,
            poll_interval: std::time::Duration::from_secs(60),
            solar_basis: SolarBasis::Hourly,
            database_url: None,
        }
    }

    fn quiet_discovery() -> Discovery {
        Discovery {
            bind: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0).into(),
            target: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9).into(),
            receive_timeout: Duration::from_millis(50),
            attempts: 1,
        }
    }

    #[tokio::test]
    async fn poll_folds_live_data_into_state_file() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 5];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(&temperature_frame(215)).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("observations.json");
        let mut poller = Poller::with_discovery(test_config(state_file.clone(), addr), quiet_discovery());

        let reports = poller.poll().await;
        assert!(reports.is_empty());
        assert_eq!(poller.last_error(), None);

        let saved = JsonFileStore::new(state_file).load().unwrap().unwrap();
        assert_eq!(saved.period.observation_count, 1);
        assert_eq!(saved.period.temperature_sum, 21.5);
        assert_eq!(saved.period.rain_total, 1.0);
        assert!(saved.unpublished.is_empty());
    }

    #[tokio::test]
    async fn unreachable_gateway_leaves_state_untouched() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("observations.json");
        let mut poller = Poller::with_discovery(test_config(state_file.clone(), addr), quiet_discovery());

        assert!(poller.poll().await.is_empty());
        assert!(poller.last_error().is_some());
        assert!(!state_file.exists());
    }
}
