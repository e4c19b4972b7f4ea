//! Error handling for the inverter polling service.
//!
//! Variants are split by how the caller must react: transient communication
//! failures are retryable, protocol exceptions and per-parameter errors are
//! surfaced immediately, and identification failures are fatal for the
//! device they belong to.

use thiserror::Error;

use crate::catalog::DataType;

/// Inverter service error type
#[derive(Error, Debug, Clone)]
pub enum InvSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient communication errors (socket I/O, timeouts, lost frames).
    /// Retried by the transport retry policy, never surfaced directly.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Device rejected the request at protocol level. Never retried.
    #[error("Modbus exception {code:#04x}: {reason}")]
    ProtocolException { code: u8, reason: &'static str },

    /// Value cannot be encoded for the target register
    #[error("Cannot encode {value} as {dtype:?}: out of range")]
    EncodeRange { value: f64, dtype: DataType },

    /// No encode/decode rule for this data type
    #[error("Unsupported codec type {dtype:?}")]
    UnsupportedCodec { dtype: DataType },

    /// Register words do not match what the data type needs
    #[error("Data error: {0}")]
    Data(String),

    /// Parameter name not present in the resolved parameter set
    #[error("No parameter {name} defined for device {device}")]
    UnknownParameter { device: String, name: String },

    /// Identification register value absent from the model code table
    #[error("Model code {code} not in code table")]
    UnknownModelCode { code: u16 },

    /// Model name resolved but not supported by the profile
    #[error("Model {model} not supported")]
    UnsupportedModel { model: String },

    /// Device did not answer within the bounded retry budget
    #[error("Device {device} unavailable")]
    DeviceUnavailable { device: String },

    /// Lifecycle misuse (operation not permitted in the current state)
    #[error("State error: {0}")]
    State(String),

    /// MQTT publishing/subscription errors
    #[error("MQTT error: {0}")]
    Mqtt(String),
}

/// Result type alias for the inverter service
pub type Result<T> = std::result::Result<T, InvSrvError>;

impl InvSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        InvSrvError::Config(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        InvSrvError::Transport(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        InvSrvError::Data(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        InvSrvError::State(msg.into())
    }

    pub fn mqtt(msg: impl Into<String>) -> Self {
        InvSrvError::Mqtt(msg.into())
    }

    /// Whether the retry policy may try this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, InvSrvError::Transport(_))
    }
}

impl From<std::io::Error> for InvSrvError {
    fn from(err: std::io::Error) -> Self {
        InvSrvError::Transport(err.to_string())
    }
}

impl From<serde_yaml::Error> for InvSrvError {
    fn from(err: serde_yaml::Error) -> Self {
        InvSrvError::Config(format!("YAML: {err}"))
    }
}

impl From<serde_json::Error> for InvSrvError {
    fn from(err: serde_json::Error) -> Self {
        InvSrvError::Data(format!("JSON: {err}"))
    }
}

impl From<rumqttc::ClientError> for InvSrvError {
    fn from(err: rumqttc::ClientError) -> Self {
        InvSrvError::Mqtt(err.to_string())
    }
}

impl From<figment::Error> for InvSrvError {
    fn from(err: figment::Error) -> Self {
        InvSrvError::Config(err.to_string())
    }
}
