//! Modem exposed through a serial-over-TCP bridge (e.g. ser2net)

use crate::transport::traits::TransportConnector;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Time allowed for the bridge to accept the connection
const BRIDGE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector for a bridge listening on `host:port`
pub struct BridgeConnector {
    address: String,
}

impl BridgeConnector {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl TransportConnector for BridgeConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream> {
        let stream = timeout(BRIDGE_CONNECT_TIMEOUT, TcpStream::connect(&self.address))
            .await
            .map_err(|_| anyhow!("Bridge connect to {} timed out", self.address))?
            .with_context(|| format!("connecting to bridge {}", self.address))?;
        // AT lines are short; do not hold them back for coalescing
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn endpoint(&self) -> String {
        format!("bridge {}", self.address)
    }
}
