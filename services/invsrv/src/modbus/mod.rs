//! Modbus plumbing: wire constants, the register codec, the transport
//! abstraction with its retry policy, the TCP client and the in-memory
//! simulator used by tests.

pub mod codec;
pub mod constants;
pub mod sim;
pub mod tcp;
pub mod transport;

pub use codec::Value;
pub use transport::{RegisterTransport, RetryPolicy, SharedTransport};
