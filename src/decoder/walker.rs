/// Tag-length-value walk over a gateway live-data frame
use log::warn;

use crate::aggregation::AggregationPeriod;
use crate::decoder::primitive::PacketCursor;
use crate::decoder::registry::{lookup, SensorKind};
use crate::error::DecodeError;
use crate::models::SolarBasis;

/// Bytes before the first record: FF FF, command, 2-byte size
pub const HEADER_LEN: usize = 5;
/// Trailing checksum byte
pub const FOOTER_LEN: usize = 1;

/// Raw live-data response as received from the gateway
#[derive(Debug, Clone, Copy)]
pub struct LiveDataPacket<'a> {
    bytes: &'a [u8],
}

impl<'a> LiveDataPacket<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// The record stream between header and checksum
    ///
    /// Frames too short to hold a header and checksum carry no records.
    pub fn records(&self) -> &'a [u8] {
        if self.bytes.len() < HEADER_LEN + FOOTER_LEN {
            return &[];
        }
        &self.bytes[HEADER_LEN..self.bytes.len() - FOOTER_LEN]
    }
}

/// What a walk consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub value_records: usize,
    pub ignored_records: usize,
    pub unknown_records: usize,
    /// Bytes of the record stream consumed by complete records
    pub consumed: usize,
    /// A trailing record ran past the end of the frame and was dropped
    pub truncated: bool,
}

/// Decode every record of `packet` and fold value sensors into `period`
///
/// The cursor advances by one tag byte plus the registry payload size per
/// record. A record whose payload would run past the end stops the walk
/// without being applied.
pub fn walk(
    packet: &LiveDataPacket<'_>,
    period: &mut AggregationPeriod,
    basis: SolarBasis,
) -> WalkSummary {
    let records = packet.records();
    let mut cursor = PacketCursor::new(records);
    let mut summary = WalkSummary::default();

    while let Some(tag) = cursor.peek() {
        let spec = lookup(tag);
        let start = cursor.position();

        let payload = match cursor.take(1 + spec.payload_size) {
            Ok(record) => &record[1..],
            Err(e) => {
                warn!(
                    "Truncated record for sensor {:02x} at offset {}: {}",
                    tag, start, e
                );
                summary.truncated = true;
                break;
            }
        };

        if let Err(e) = spec.apply(payload, period, basis) {
            // Cannot happen for registry sizes; keep walking past the record
            warn!("Failed to decode sensor {:02x}: {}", tag, e);
        }

        match spec.kind {
            SensorKind::Value(_) => summary.value_records += 1,
            SensorKind::Ignored => summary.ignored_records += 1,
            SensorKind::Unknown => summary.unknown_records += 1,
        }
        summary.consumed = cursor.position();
    }

    summary
}

/// Check that a frame is long enough to hold a header and checksum
pub fn ensure_frame(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() < HEADER_LEN + FOOTER_LEN {
        return Err(DecodeError::FrameTooShort(bytes.len()));
    }
    Ok(())
}
