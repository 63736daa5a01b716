//! Data channel over an established session

use crate::modem::config::ModemConfig;
use crate::transport::{CommandTransport, Outcome, Transaction, TransportStream};
use anyhow::Result;
use bytes::Bytes;
use ntrip_shared::codec::{self, MAX_SEND_LEN, OK_TOKEN, PROMPT_TOKEN, STATUS_CONNECTED_TOKEN};
use ntrip_shared::timing;
use tokio::time::Duration;
use tracing::{debug, warn};

/// Send, receive and status checks once the handshake is done
pub struct DataChannel<'a, S> {
    transport: &'a mut CommandTransport<S>,
    config: &'a ModemConfig,
}

impl<'a, S: TransportStream> DataChannel<'a, S> {
    pub fn new(transport: &'a mut CommandTransport<S>, config: &'a ModemConfig) -> Self {
        Self { transport, config }
    }

    /// Write `payload` to the socket, split into modem-sized chunks.
    ///
    /// Stops at the first chunk the modem refuses. An empty payload sends
    /// nothing and succeeds.
    pub async fn send(&mut self, payload: &[u8]) -> Result<bool> {
        for chunk in payload.chunks(MAX_SEND_LEN) {
            if !self.send_chunk(chunk).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn send_chunk(&mut self, chunk: &[u8]) -> Result<bool> {
        let prompt = Transaction::new(codec::send_length_command(chunk.len())?)
            .until(PROMPT_TOKEN)
            .capacity(timing::PROMPT_RESPONSE_CAPACITY);
        let response = self
            .transport
            .transact_within(&prompt, self.config.timing.prompt_read_attempts)
            .await?;
        if !response.is_matched() {
            warn!("[CHANNEL] No send prompt for {} bytes", chunk.len());
            return Ok(false);
        }

        self.transport.send(chunk).await?;

        let ack = Transaction::new("")
            .until(OK_TOKEN)
            .capacity(timing::SEND_ACK_CAPACITY);
        let response = self
            .transport
            .collect_within(&ack, timing::SEND_ACK_ATTEMPTS)
            .await?;
        match response.outcome {
            Outcome::Matched => {
                debug!("[CHANNEL] Sent {} bytes", chunk.len());
                Ok(true)
            }
            Outcome::Rejected => {
                warn!("[CHANNEL] Modem rejected {} bytes", chunk.len());
                Ok(false)
            }
            Outcome::TimedOut => {
                warn!("[CHANNEL] No acknowledgement for {} bytes", chunk.len());
                Ok(false)
            }
        }
    }

    /// Whatever arrives within one read window, at most `max_len` bytes
    pub async fn read_available(&mut self, max_len: usize) -> Result<Bytes> {
        let buf = self
            .transport
            .read_response(max_len, Duration::from_millis(timing::READ_TIMEOUT_MS))
            .await?;
        if !buf.is_empty() {
            debug!("[CHANNEL] Read {} bytes", buf.len());
        }
        Ok(buf.into_bytes())
    }

    /// Ask the modem whether the socket is still connected
    pub async fn check_connected(&mut self) -> Result<bool> {
        let tx = Transaction::new("AT+CIPSTATUS\r\n").until(STATUS_CONNECTED_TOKEN);
        Ok(self.transport.transact(&tx).await?.is_matched())
    }
}
