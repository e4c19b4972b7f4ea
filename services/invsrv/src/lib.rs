//! Inverter polling service.
//!
//! Identifies field devices over Modbus TCP, polls their registers in
//! planned batches and publishes typed values over MQTT with Home
//! Assistant discovery. See `config.rs` for the configuration surface.

pub mod app;
pub mod catalog;
pub mod config;
pub mod device;
pub mod error;
pub mod modbus;
pub mod mqtt;

pub use error::{InvSrvError, Result};
