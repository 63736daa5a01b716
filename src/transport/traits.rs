//! Links that can carry the AT conversation
//!
//! The modem only needs an ordered duplex byte stream. Serial ports and TCP
//! sockets already are one, so they implement [`TransportStream`] as they
//! are; connectors differ only in how the link is opened.

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Duplex byte stream to the modem's command port
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Flush pending writes and close the link
    async fn shutdown(&mut self) -> Result<()> {
        AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}

impl TransportStream for tokio::net::TcpStream {}

impl TransportStream for tokio_serial::SerialStream {}

/// Opens the link to the modem
#[async_trait]
pub trait TransportConnector: Send + Sync {
    type Stream: TransportStream;

    async fn connect(&self) -> Result<Self::Stream>;

    /// Where the link goes, for logs
    fn endpoint(&self) -> String;

    /// Line speed the host end is fixed to, if the link has one.
    ///
    /// A bridge hides the UART behind TCP, so after a baud-rate switch only
    /// the bridge's own configuration can follow the modem.
    fn line_rate(&self) -> Option<u32> {
        None
    }
}
