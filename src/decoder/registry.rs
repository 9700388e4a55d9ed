/// Sensor tag registry for the gateway live-data record stream
///
/// Each record in a live-data frame is a one-byte tag followed by a payload
/// whose length is implied by the tag. The table below is the only source of
/// those lengths. Tags missing from it fall back to a 1-byte payload, which
/// desynchronises the rest of the frame whenever the real payload is longer.
/// Unknown tags are logged at debug level and never fail the walk.
use log::debug;

use crate::aggregation::AggregationPeriod;
use crate::decoder::primitive::{read_int, IntWidth};
use crate::error::DecodeError;
use crate::models::{Reading, SolarBasis};

/// Payload length assumed for tags missing from the registry
pub const UNKNOWN_PAYLOAD_SIZE: usize = 1;

/// Lux to W/m2 ratio at the sunlight spectrum
pub const LUX_TO_WATTS_PER_M2: f64 = 0.0079;

/// Sensors whose values feed the daily aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSensor {
    /// Signed tenths of °C
    OutdoorTemperature,
    /// Integer percent
    OutdoorHumidity,
    /// Tenths of hPa, reported in kPa
    RelativeBarometric,
    /// Tenths of m/s
    WindSpeed,
    /// Tenths of mm accumulated since midnight
    RainDay,
    /// Tenths of lux, reported as solar radiation
    Light,
}

impl ValueSensor {
    /// Decode a payload and convert it to the unit the aggregate stores
    pub fn decode(
        self,
        payload: &[u8],
        width: IntWidth,
        basis: SolarBasis,
    ) -> Result<Reading, DecodeError> {
        let raw = read_int(payload, true, width)? as f64;

        let reading = match self {
            ValueSensor::OutdoorTemperature => Reading::Temperature(raw / 10.0),
            ValueSensor::OutdoorHumidity => Reading::Humidity(raw),
            ValueSensor::RelativeBarometric => Reading::Pressure(raw / 100.0),
            ValueSensor::WindSpeed => Reading::WindSpeed(raw / 10.0),
            ValueSensor::RainDay => Reading::RainDay(raw / 10.0),
            ValueSensor::Light => {
                let lux = raw / 10.0;
                Reading::SolarRadiation(lux * LUX_TO_WATTS_PER_M2 * basis.joules_factor())
            }
        };

        Ok(reading)
    }
}

/// Decode behaviour attached to a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Value(ValueSensor),
    Ignored,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSpec {
    pub tag: u8,
    pub name: &'static str,
    pub payload_size: usize,
    pub kind: SensorKind,
}

impl SensorSpec {
    /// Apply this sensor's payload to the aggregation state
    ///
    /// `payload` must be exactly `payload_size` bytes. Ignored and unknown
    /// sensors only log the tag.
    pub fn apply(
        &self,
        payload: &[u8],
        period: &mut AggregationPeriod,
        basis: SolarBasis,
    ) -> Result<(), DecodeError> {
        match self.kind {
            SensorKind::Value(sensor) => {
                let width = IntWidth::try_from(self.payload_size)?;
                let reading = sensor.decode(payload, width, basis)?;
                debug!("Sensor {:02x} ({}): {:?}", self.tag, self.name, reading);
                period.fold(reading);
            }
            SensorKind::Ignored => {
                debug!("Ignoring sensor id: {:02x} ({})", self.tag, self.name);
            }
            SensorKind::Unknown => {
                debug!("Unknown sensor id found: {:02x}", self.tag);
            }
        }
        Ok(())
    }
}

const fn value(tag: u8, name: &'static str, payload_size: usize, sensor: ValueSensor) -> SensorSpec {
    SensorSpec {
        tag,
        name,
        payload_size,
        kind: SensorKind::Value(sensor),
    }
}

const fn ignored(tag: u8, name: &'static str, payload_size: usize) -> SensorSpec {
    SensorSpec {
        tag,
        name,
        payload_size,
        kind: SensorKind::Ignored,
    }
}

/// Known live-data tags, sorted by tag
pub static SENSORS: &[SensorSpec] = &[
    ignored(0x01, "indoor temperature", 2),
    value(0x02, "outdoor temperature", 2, ValueSensor::OutdoorTemperature),
    ignored(0x03, "dew point", 2),
    ignored(0x04, "wind chill", 2),
    ignored(0x05, "heat index", 2),
    ignored(0x06, "indoor humidity", 1),
    value(0x07, "outdoor humidity", 1, ValueSensor::OutdoorHumidity),
    ignored(0x08, "absolute barometric", 2),
    value(0x09, "relative barometric", 2, ValueSensor::RelativeBarometric),
    ignored(0x0A, "wind direction", 2),
    value(0x0B, "wind speed", 2, ValueSensor::WindSpeed),
    ignored(0x0C, "gust speed", 2),
    ignored(0x0D, "rain event", 2),
    ignored(0x0E, "rain rate", 2),
    ignored(0x0F, "rain hour", 2),
    value(0x10, "rain day", 2, ValueSensor::RainDay),
    ignored(0x11, "rain week", 2),
    ignored(0x12, "rain month", 4),
    ignored(0x13, "rain year", 4),
    ignored(0x14, "rain totals", 4),
    value(0x15, "light", 4, ValueSensor::Light),
    ignored(0x16, "uv", 2),
    ignored(0x17, "uv index", 1),
    ignored(0x18, "date and time", 6),
    ignored(0x19, "day max wind", 1),
    ignored(0x1A, "temperature 1", 2),
    ignored(0x1B, "temperature 2", 2),
    ignored(0x1C, "temperature 3", 2),
    ignored(0x1D, "temperature 4", 2),
    ignored(0x1E, "temperature 5", 2),
    ignored(0x1F, "temperature 6", 2),
    ignored(0x20, "temperature 7", 2),
    ignored(0x21, "temperature 8", 2),
    ignored(0x22, "humidity 1", 1),
    ignored(0x23, "humidity 2", 1),
    ignored(0x24, "humidity 3", 1),
    ignored(0x25, "humidity 4", 1),
    ignored(0x26, "humidity 5", 1),
    ignored(0x27, "humidity 6", 1),
    ignored(0x28, "humidity 7", 1),
    ignored(0x29, "humidity 8", 1),
    ignored(0x2A, "pm2.5 ch1", 2),
    ignored(0x2B, "soil temperature 1", 2),
    ignored(0x2C, "soil moisture 1", 1),
    ignored(0x2D, "soil temperature 2", 2),
    ignored(0x2E, "soil moisture 2", 1),
    ignored(0x2F, "soil temperature 3", 2),
    ignored(0x30, "soil moisture 3", 1),
    ignored(0x31, "soil temperature 4", 2),
    ignored(0x32, "soil moisture 4", 1),
    ignored(0x33, "soil temperature 5", 2),
    ignored(0x34, "soil moisture 5", 1),
    ignored(0x35, "soil temperature 6", 2),
    ignored(0x36, "soil moisture 6", 1),
    ignored(0x37, "soil temperature 7", 2),
    ignored(0x38, "soil moisture 7", 1),
    ignored(0x39, "soil temperature 8", 2),
    ignored(0x3A, "soil moisture 8", 1),
    ignored(0x3B, "soil temperature 9", 2),
    ignored(0x3C, "soil moisture 9", 1),
    ignored(0x3D, "soil temperature 10", 2),
    ignored(0x3E, "soil moisture 10", 1),
    ignored(0x3F, "soil temperature 11", 2),
    ignored(0x40, "soil moisture 11", 1),
    ignored(0x41, "soil temperature 12", 2),
    ignored(0x42, "soil moisture 12", 1),
    ignored(0x43, "soil temperature 13", 2),
    ignored(0x44, "soil moisture 13", 1),
    ignored(0x45, "soil temperature 14", 2),
    ignored(0x46, "soil moisture 14", 1),
    ignored(0x47, "soil temperature 15", 2),
    ignored(0x48, "soil moisture 15", 1),
    ignored(0x49, "soil temperature 16", 2),
    ignored(0x4A, "soil moisture 16", 1),
    ignored(0x4C, "all sensor low battery", 16),
    ignored(0x4D, "pm2.5 ch1 24h average", 2),
    ignored(0x4E, "pm2.5 ch2 24h average", 2),
    ignored(0x4F, "pm2.5 ch3 24h average", 2),
    ignored(0x50, "pm2.5 ch4 24h average", 2),
    ignored(0x51, "pm2.5 ch2", 2),
    ignored(0x52, "pm2.5 ch3", 2),
    ignored(0x53, "pm2.5 ch4", 2),
    ignored(0x58, "leak ch1", 1),
    ignored(0x59, "leak ch2", 1),
    ignored(0x5A, "leak ch3", 1),
    ignored(0x5B, "leak ch4", 1),
    ignored(0x60, "lightning distance", 1),
    ignored(0x61, "lightning detected time", 4),
    ignored(0x62, "lightning power time", 4),
];

/// Resolve a tag to its spec, or the unknown fallback
pub fn lookup(tag: u8) -> SensorSpec {
    match SENSORS.binary_search_by_key(&tag, |spec| spec.tag) {
        Ok(index) => SENSORS[index],
        Err(_) => SensorSpec {
            tag,
            name: "unknown",
            payload_size: UNKNOWN_PAYLOAD_SIZE,
            kind: SensorKind::Unknown,
        },
    }
}
