//! AT command/response transaction engine
//!
//! Every exchange with the modem goes through [`CommandTransport`]. Replies
//! are accumulated into a bounded [`ResponseBuffer`] and matched by substring.
//! Read timeouts are inactivity windows: the clock restarts whenever bytes
//! arrive, so a reply that keeps trickling in is never cut off.

use crate::transport::buffer::ResponseBuffer;
use crate::transport::traits::TransportStream;
use anyhow::{bail, Context, Result};
use bytes::{Buf, Bytes, BytesMut};
use futures::FutureExt;
use ntrip_shared::codec::ERROR_TOKEN;
use ntrip_shared::timing;
use std::borrow::Cow;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// How a transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A success token was found (or, with no success tokens, any reply arrived)
    Matched,
    /// The failure token was found
    Rejected,
    /// The inactivity window elapsed or the buffer filled without a token
    TimedOut,
}

/// One request and the tokens that settle it
#[derive(Debug, Clone)]
pub struct Transaction {
    request: String,
    success: Vec<&'static str>,
    failure: &'static str,
    timeout: Duration,
    capacity: usize,
}

impl Transaction {
    /// New transaction with the default failure token, window and buffer size
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            success: Vec::new(),
            failure: ERROR_TOKEN,
            timeout: Duration::from_millis(timing::DEFAULT_RESPONSE_TIMEOUT_MS),
            capacity: timing::DEFAULT_RESPONSE_CAPACITY,
        }
    }

    /// Add an acceptable success token
    pub fn until(mut self, token: &'static str) -> Self {
        self.success.push(token);
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    fn classify(&self, buf: &ResponseBuffer) -> Option<Outcome> {
        if self.success.iter().any(|t| buf.contains(t)) {
            return Some(Outcome::Matched);
        }
        if buf.contains(self.failure) {
            return Some(Outcome::Rejected);
        }
        None
    }

    fn settle(&self, buf: &ResponseBuffer) -> Outcome {
        match self.classify(buf) {
            Some(outcome) => outcome,
            None if self.success.is_empty() && !buf.is_empty() => Outcome::Matched,
            None => Outcome::TimedOut,
        }
    }
}

/// The modem's reply to one transaction
#[derive(Debug, Clone)]
pub struct Response {
    pub outcome: Outcome,
    pub body: Bytes,
}

impl Response {
    pub fn is_matched(&self) -> bool {
        self.outcome == Outcome::Matched
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Request/response primitive over the modem byte stream
pub struct CommandTransport<S> {
    stream: S,
    /// Bytes received from the stream but not yet handed to a reader
    pending: BytesMut,
    scratch: Vec<u8>,
}

impl<S: TransportStream> CommandTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            pending: BytesMut::with_capacity(4096),
            scratch: vec![0u8; 1024],
        }
    }

    /// Write raw bytes to the modem without waiting for a reply
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        debug!("[MODEM] -> {:?}", String::from_utf8_lossy(data));
        self.stream
            .write_all(data)
            .await
            .context("writing to modem")?;
        self.stream.flush().await.context("flushing modem link")?;
        Ok(())
    }

    /// Send the request, then collect the reply
    pub async fn transact(&mut self, tx: &Transaction) -> Result<Response> {
        self.send(tx.request.as_bytes()).await?;
        self.collect(tx).await
    }

    /// Collect a reply for `tx` without sending anything
    pub async fn collect(&mut self, tx: &Transaction) -> Result<Response> {
        let mut buf = ResponseBuffer::with_capacity(tx.capacity);
        self.fill_until(&mut buf, tx.timeout, |b| tx.classify(b).is_some())
            .await?;

        let outcome = tx.settle(&buf);
        debug!("[MODEM] <- {:?} ({:?})", buf.text(), outcome);
        Ok(Response {
            outcome,
            body: buf.into_bytes(),
        })
    }

    /// Collect reply windows until one settles on a token, at most `windows` times.
    ///
    /// Used where the modem may stay silent for longer than one inactivity
    /// window before answering (attach steps, send prompts).
    pub async fn collect_within(&mut self, tx: &Transaction, windows: u32) -> Result<Response> {
        let mut last = None;
        for _ in 0..windows.max(1) {
            let response = self.collect(tx).await?;
            if response.outcome != Outcome::TimedOut {
                return Ok(response);
            }
            last = Some(response);
        }
        last.context("no reply window was read")
    }

    /// Send the request, then collect up to `windows` reply windows
    pub async fn transact_within(&mut self, tx: &Transaction, windows: u32) -> Result<Response> {
        self.send(tx.request.as_bytes()).await?;
        self.collect_within(tx, windows).await
    }

    /// Accumulate up to `capacity` bytes, stopping after `idle` without data
    pub async fn read_response(&mut self, capacity: usize, idle: Duration) -> Result<ResponseBuffer> {
        let mut buf = ResponseBuffer::with_capacity(capacity);
        self.fill_until(&mut buf, idle, |_| false).await?;
        Ok(buf)
    }

    /// Number of bytes that can be read right now without waiting
    pub fn readable(&mut self) -> Result<usize> {
        if let Some(result) = self.stream.read(&mut self.scratch).now_or_never() {
            match result.context("polling modem link")? {
                0 => bail!("Modem link closed"),
                n => self.pending.extend_from_slice(&self.scratch[..n]),
            }
        }
        Ok(self.pending.len())
    }

    /// Close the underlying stream
    pub async fn shutdown(&mut self) -> Result<()> {
        TransportStream::shutdown(&mut self.stream).await
    }

    async fn fill_until<F>(&mut self, buf: &mut ResponseBuffer, idle: Duration, mut stop: F) -> Result<()>
    where
        F: FnMut(&ResponseBuffer) -> bool,
    {
        let mut deadline = Instant::now() + idle;

        loop {
            if !self.pending.is_empty() {
                let taken = buf.fill(&self.pending);
                self.pending.advance(taken);
                if buf.is_full() || stop(&*buf) {
                    return Ok(());
                }
            }
            if buf.is_full() {
                return Ok(());
            }

            match timeout_at(deadline, self.stream.read(&mut self.scratch)).await {
                Err(_) => return Ok(()),
                Ok(Ok(0)) => bail!("Modem link closed"),
                Ok(Ok(n)) => {
                    self.pending.extend_from_slice(&self.scratch[..n]);
                    deadline = Instant::now() + idle;
                }
                Ok(Err(e)) => return Err(e).context("reading from modem"),
            }
        }
    }
}
