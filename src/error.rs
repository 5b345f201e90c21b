//! Error types.
//!
//! Every variant here is fatal for the run: the engine never retries a failed
//! exchange because the read cursor is no longer trustworthy afterwards.
//! Outcomes that are expected during normal operation (a rejected vehicle
//! insertion, a partial vehicle record) are plain values instead.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not connect to TraCI server at {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },
    #[error("TraCI transport failed: {0}")]
    Transport(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("TraCI server rejected command 0x{command:02x}: \"{description}\"")]
    CommandFailed { command: u8, description: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not connected to a TraCI server")]
    NotConnected,
}

/// The byte stream no longer matches what the protocol says it should be.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("tried to read {needed} bytes with only {remaining} left in the buffer")]
    Underrun { needed: usize, remaining: usize },
    #[error("expected type tag 0x{expected:02x}, found 0x{found:02x}")]
    TypeMismatch { expected: u8, found: u8 },
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("expected response to command 0x{expected:02x}, found 0x{found:02x}")]
    UnexpectedResponse { expected: u8, found: u8 },
    #[error("received unhandled subscription result 0x{0:02x}")]
    UnknownSubscription(u8),
    #[error("received subscription result for unknown {class} \"{id}\"")]
    UnknownObject { class: &'static str, id: String },
    #[error("received unhandled {class} subscription variable 0x{variable:02x}")]
    UnknownVariable { class: &'static str, variable: u8 },
    #[error(
        "TraCI server reported subscribing to variable 0x{variable:02x} not implemented (\"{description}\"). Might need newer version."
    )]
    NotImplemented { variable: u8, description: String },
    #[error("TraCI server reported error subscribing to variable 0x{variable:02x} (\"{description}\")")]
    VariableFailed { variable: u8, description: String },
    #[error("{remaining} bytes left unconsumed after decoding")]
    TrailingBytes { remaining: usize },
    #[error("block declared {declared} bytes but {consumed} were consumed")]
    LengthMismatch { declared: usize, consumed: usize },
    #[error("received bad node position ({x:.2}, {y:.2}), translated to ({world_x:.2}, {world_y:.2})")]
    BadPosition {
        x: f64,
        y: f64,
        world_x: f64,
        world_y: f64,
    },
    #[error("TraCI server reports unsupported API version {0}")]
    UnsupportedApiVersion(i32),
    #[error("unexpected value encoding 0x{0:02x} for network boundaries")]
    UnexpectedBoundary(u8),
}

/// The configuration can not be turned into a working setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parameter \"{parameter}\" is empty")]
    EmptyMapping { parameter: &'static str },
    #[error(
        "parameter \"{parameter}\" includes multiple mappings, but \"{value}\" is not mapped to any vehicle type"
    )]
    UnmappedValue { parameter: &'static str, value: String },
    #[error("invalid syntax for mapping \"{token}\" for parameter \"{parameter}\"")]
    InvalidMapping { parameter: &'static str, token: String },
    #[error("duplicated mapping for vehicle type \"{class}\" for parameter \"{parameter}\"")]
    DuplicateMapping { parameter: &'static str, class: String },
    #[error("keys of mappings of moduleType and {parameter} are not the same")]
    MismatchedKeys { parameter: &'static str },
    #[error("cannot find a {parameter} for vehicle type \"{class}\"")]
    MissingMapping { parameter: &'static str, class: String },
    #[error("module type \"{0}\" not found")]
    UnknownModuleType(String),
    #[error("invalid region of interest rectangle \"{0}\"")]
    InvalidRect(String),
    #[error("first step at {first_step_at} s must come after connecting at {connect_at} s")]
    InvalidTiming { connect_at: f64, first_step_at: f64 },
    #[error("update interval must be positive, got {0}")]
    InvalidInterval(f64),
    #[error("unreadable configuration: {0}")]
    Json(#[from] serde_json::Error),
}
