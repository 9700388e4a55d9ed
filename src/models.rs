use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::ConfigError;

/// A single converted sensor value from one live-data record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// °C
    Temperature(f64),
    /// %
    Humidity(f64),
    /// kPa
    Pressure(f64),
    /// m/s
    WindSpeed(f64),
    /// mm since midnight, cumulative on the device
    RainDay(f64),
    /// MJ/m2 on the configured basis
    SolarRadiation(f64),
}

/// Time basis used when converting W/m2 to MJ/m2
///
/// Hourly (1 W/m2 = 0.0036 MJ/m2/h) is the current behaviour. Daily
/// (0.0864 MJ/m2/d) reproduces the numbers of earlier gateway integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolarBasis {
    #[default]
    Hourly,
    Daily,
}

impl SolarBasis {
    pub const fn joules_factor(self) -> f64 {
        match self {
            SolarBasis::Hourly => 0.0036,
            SolarBasis::Daily => 0.0864,
        }
    }
}

impl FromStr for SolarBasis {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(SolarBasis::Hourly),
            "daily" => Ok(SolarBasis::Daily),
            _ => Err(ConfigError::InvalidValue {
                key: "SOLAR_BASIS",
                value: s.to_string(),
            }),
        }
    }
}

/// Daily metrics handed to the reporting sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    TemperatureMean,
    TemperatureMax,
    TemperatureMin,
    HumidityMean,
    HumidityMax,
    HumidityMin,
    PressureMean,
    WindMean,
    RainTotal,
    SolarRadiationMean,
}

impl MetricKind {
    pub const ALL: [MetricKind; 10] = [
        MetricKind::TemperatureMean,
        MetricKind::TemperatureMax,
        MetricKind::TemperatureMin,
        MetricKind::HumidityMean,
        MetricKind::HumidityMax,
        MetricKind::HumidityMin,
        MetricKind::PressureMean,
        MetricKind::WindMean,
        MetricKind::RainTotal,
        MetricKind::SolarRadiationMean,
    ];

    /// Stable name used as the database metric key
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricKind::TemperatureMean => "temperature_mean",
            MetricKind::TemperatureMax => "temperature_max",
            MetricKind::TemperatureMin => "temperature_min",
            MetricKind::HumidityMean => "humidity_mean",
            MetricKind::HumidityMax => "humidity_max",
            MetricKind::HumidityMin => "humidity_min",
            MetricKind::PressureMean => "pressure_mean",
            MetricKind::WindMean => "wind_mean",
            MetricKind::RainTotal => "rain_total",
            MetricKind::SolarRadiationMean => "solar_radiation_mean",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finalized daily value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub kind: MetricKind,
    /// Midnight UTC of the reported day
    #[serde(with = "time::serde::rfc3339")]
    pub period_start: OffsetDateTime,
    pub value: f64,
    pub samples: u32,
}
