/// Daily aggregation state and day-boundary rollover
use log::info;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::{MetricKind, MetricReport, Reading};
use crate::utils::{format_datetime, start_of_day_utc};

// Extrema sentinels for an empty period
const MAX_TEMPERATURE_FLOOR: f64 = -100.0;
const MIN_TEMPERATURE_CEILING: f64 = 100.0;
const MAX_HUMIDITY_FLOOR: f64 = 0.0;
const MIN_HUMIDITY_CEILING: f64 = 100.0;

/// Receives finalized daily metrics
pub trait ReportSink {
    fn report(&mut self, report: MetricReport);
}

impl ReportSink for Vec<MetricReport> {
    fn report(&mut self, report: MetricReport) {
        self.push(report);
    }
}

/// Which sensors contributed at least one reading to a period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedSensors {
    pub temperature: bool,
    pub humidity: bool,
    pub pressure: bool,
    pub wind_speed: bool,
    pub rain: bool,
    pub solar_radiation: bool,
}

impl ObservedSensors {
    /// State files written before sensors were tracked reported every metric
    fn all() -> Self {
        Self {
            temperature: true,
            humidity: true,
            pressure: true,
            wind_speed: true,
            rain: true,
            solar_radiation: true,
        }
    }
}

/// Running statistics for the UTC calendar day that contains `period_start`
///
/// Means are kept as sums and divided by `observation_count` only when the
/// period is reported. Rain is a high-water mark because the gateway already
/// accumulates it since midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationPeriod {
    #[serde(with = "time::serde::rfc3339")]
    pub period_start: OffsetDateTime,
    pub observation_count: u32,
    pub temperature_sum: f64,
    pub humidity_sum: f64,
    pub pressure_sum: f64,
    pub wind_speed_sum: f64,
    pub solar_radiation_sum: f64,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub max_humidity: f64,
    pub min_humidity: f64,
    pub rain_total: f64,
    #[serde(default = "ObservedSensors::all")]
    pub observed: ObservedSensors,
}

impl AggregationPeriod {
    /// Fresh, empty period starting at `start`
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            period_start: start,
            observation_count: 0,
            temperature_sum: 0.0,
            humidity_sum: 0.0,
            pressure_sum: 0.0,
            wind_speed_sum: 0.0,
            solar_radiation_sum: 0.0,
            max_temperature: MAX_TEMPERATURE_FLOOR,
            min_temperature: MIN_TEMPERATURE_CEILING,
            max_humidity: MAX_HUMIDITY_FLOOR,
            min_humidity: MIN_HUMIDITY_CEILING,
            rain_total: 0.0,
            observed: ObservedSensors::default(),
        }
    }

    /// Midnight UTC of the day this period covers
    pub fn day(&self) -> OffsetDateTime {
        start_of_day_utc(self.period_start)
    }

    /// Fold one converted reading into the running statistics
    pub fn fold(&mut self, reading: Reading) {
        match reading {
            Reading::Temperature(t) => {
                self.temperature_sum += t;
                self.max_temperature = self.max_temperature.max(t);
                self.min_temperature = self.min_temperature.min(t);
                self.observed.temperature = true;
            }
            Reading::Humidity(rh) => {
                self.humidity_sum += rh;
                self.max_humidity = self.max_humidity.max(rh);
                self.min_humidity = self.min_humidity.min(rh);
                self.observed.humidity = true;
            }
            Reading::Pressure(p) => {
                self.pressure_sum += p;
                self.observed.pressure = true;
            }
            Reading::WindSpeed(w) => {
                self.wind_speed_sum += w;
                self.observed.wind_speed = true;
            }
            Reading::RainDay(r) => {
                self.rain_total = self.rain_total.max(r);
                self.observed.rain = true;
            }
            Reading::SolarRadiation(s) => {
                self.solar_radiation_sum += s;
                self.observed.solar_radiation = true;
            }
        }
    }

    /// Count one fully walked live-data packet
    pub fn record_observation(&mut self) {
        self.observation_count += 1;
    }

    /// Derived values for the daily metrics, or None before the first poll
    ///
    /// Metrics of sensors that sent no reading during the period are left
    /// out rather than reported at their empty-period defaults.
    pub fn daily_metrics(&self) -> Option<Vec<MetricReport>> {
        if self.observation_count == 0 {
            return None;
        }

        let count = self.observation_count as f64;
        let period_start = self.day();
        let seen = self.observed;
        let reports = MetricKind::ALL
            .iter()
            .filter_map(|&kind| {
                let value = match kind {
                    MetricKind::TemperatureMean => {
                        seen.temperature.then(|| self.temperature_sum / count)
                    }
                    MetricKind::TemperatureMax => seen.temperature.then_some(self.max_temperature),
                    MetricKind::TemperatureMin => seen.temperature.then_some(self.min_temperature),
                    MetricKind::HumidityMean => seen.humidity.then(|| self.humidity_sum / count),
                    MetricKind::HumidityMax => seen.humidity.then_some(self.max_humidity),
                    MetricKind::HumidityMin => seen.humidity.then_some(self.min_humidity),
                    MetricKind::PressureMean => seen.pressure.then(|| self.pressure_sum / count),
                    MetricKind::WindMean => seen.wind_speed.then(|| self.wind_speed_sum / count),
                    MetricKind::RainTotal => seen.rain.then_some(self.rain_total),
                    MetricKind::SolarRadiationMean => {
                        seen.solar_radiation.then(|| self.solar_radiation_sum / count)
                    }
                }?;
                Some(MetricReport {
                    kind,
                    period_start,
                    value,
                    samples: self.observation_count,
                })
            })
            .collect();

        Some(reports)
    }

    /// Finalize and reset the period if `now` falls on a different UTC day
    ///
    /// The finished day is reported to `sink` (unless nothing was folded yet)
    /// and the state restarts empty at `now`. Returns whether a rollover
    /// happened.
    pub fn roll_over(&mut self, now: OffsetDateTime, sink: &mut dyn ReportSink) -> bool {
        if start_of_day_utc(now) == self.day() {
            return false;
        }

        info!(
            "Day boundary crossed: finalizing {} ({} samples)",
            format_datetime(&self.day()),
            self.observation_count
        );

        if let Some(reports) = self.daily_metrics() {
            for report in reports {
                sink.report(report);
            }
        }

        *self = AggregationPeriod::new(now);
        true
    }
}
