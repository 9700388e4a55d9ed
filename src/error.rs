/// Error types for decoding, device I/O, persistence and configuration
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Failures while reading integers or records out of a received frame
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("read of {len} bytes at offset {offset} exceeds buffer of {available} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },
    #[error("unsupported integer width: {0} bytes")]
    UnsupportedWidth(usize),
    #[error("frame too short: {0} bytes")]
    FrameTooShort(usize),
}

/// Connectivity failures talking to the weather-station gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unable to connect to gateway at {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("gateway I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("unable to find gateway on local network after {attempts} attempts")]
    Discovery { attempts: u32 },
    #[error("unsupported device '{0}', expected a GW gateway")]
    UnsupportedDevice(String),
    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),
}

/// Failures reading or writing the aggregation state file
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state file I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("state file format error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}
