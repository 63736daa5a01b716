//! Serial transport to a modem wired to a UART or USB serial adapter

use crate::transport::traits::TransportConnector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

/// Baud rate the modem answers on out of reset
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Configuration for the serial connector
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyUSB0" or "/dev/serial0")
    pub path: String,
    /// Line speed, 8N1
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Connector opening a local serial device
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportConnector for SerialConnector {
    type Stream = SerialStream;

    async fn connect(&self) -> Result<SerialStream> {
        tokio_serial::new(&self.config.path, self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .with_context(|| {
                format!(
                    "opening {} at {} baud",
                    self.config.path, self.config.baud_rate
                )
            })
    }

    fn endpoint(&self) -> String {
        format!("serial {} at {} baud", self.config.path, self.config.baud_rate)
    }

    fn line_rate(&self) -> Option<u32> {
        Some(self.config.baud_rate)
    }
}
