//! Shared basics for the inverter bridge services.
//!
//! Provides the functions every binary needs before doing real work:
//! - logging bootstrap (stdout + optional rolling file output)
//! - topic/identifier text helpers

pub mod logging;
pub mod text;

pub use text::slugify;
