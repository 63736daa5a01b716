pub mod bridge;
pub mod buffer;
pub mod command;
pub mod serial;
pub mod traits;

#[cfg(test)]
pub(crate) mod scripted;

pub use bridge::BridgeConnector;
pub use command::{CommandTransport, Outcome, Response, Transaction};
pub use serial::{SerialConfig, SerialConnector, DEFAULT_BAUD_RATE};
pub use traits::{TransportConnector, TransportStream};
