//! In-memory scripted modem used by the tests
//!
//! Reads CR-LF terminated commands from one end of a duplex pipe and answers
//! them from a rule table. After `AT+CIPSEND=<len>` the next `<len>` bytes are
//! consumed raw; a Ctrl-Z ends a prompt-mode payload.

use crate::transport::traits::TransportStream;
use ntrip_shared::codec::CTRL_Z;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::{sleep, Duration};

/// Log entry recorded for a Ctrl-Z terminator
pub const CTRL_Z_ENTRY: &str = "<CTRL-Z>";

impl TransportStream for DuplexStream {}

/// Polls given to the modem task to catch up with the host
const CATCH_UP_POLLS: usize = 50;

struct Rule {
    pattern: String,
    prefix: bool,
    replies: Vec<Vec<u8>>,
    served: usize,
}

impl Rule {
    fn matches(&self, line: &str) -> bool {
        if self.prefix {
            line.starts_with(&self.pattern)
        } else {
            line == self.pattern
        }
    }

    fn next_reply(&mut self) -> Vec<u8> {
        let idx = self.served.min(self.replies.len().saturating_sub(1));
        self.served += 1;
        self.replies.get(idx).cloned().unwrap_or_default()
    }
}

enum Frame {
    Line(String),
    CtrlZ(String),
    Data(Vec<u8>),
}

/// Everything the modem received, one entry per command line
#[derive(Clone, Default)]
pub struct ScriptLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ScriptLog {
    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.count(entry) > 0
    }

    /// Wait until `entry` was logged `expected` times and return the final count.
    ///
    /// Writes that need no reply complete as soon as they are in the pipe,
    /// before the modem task has parsed them.
    pub async fn settled_count(&self, entry: &str, expected: usize) -> usize {
        for _ in 0..CATCH_UP_POLLS {
            if self.count(entry) >= expected {
                break;
            }
            sleep(Duration::from_millis(1)).await;
        }
        self.count(entry)
    }
}

/// Rule-driven fake modem
#[derive(Default)]
pub struct ScriptedModem {
    rules: Vec<Rule>,
    ctrl_z_reply: Vec<u8>,
    data_reply: Vec<u8>,
    raw_remaining: usize,
    log: ScriptLog,
}

impl ScriptedModem {
    pub fn new() -> Self {
        Self::default()
    }

    /// A modem that answers every bring-up command successfully.
    ///
    /// Rules added afterwards take precedence, so a test can override a
    /// single step.
    pub fn attaching() -> Self {
        Self::new()
            .on("AT", "\r\nOK\r\n")
            .on("AT+CPIN?", "\r\n+CPIN: READY\r\n\r\nOK\r\n")
            .on("AT+CNMP=38", "\r\nOK\r\n")
            .on("AT+CNMP=13", "\r\nOK\r\n")
            .on("AT+CMNB=1", "\r\nOK\r\n")
            .on("AT+CIPSHUT", "\r\nSHUT OK\r\n")
            .on("AT+CSQ", "\r\n+CSQ: 20,0\r\n\r\nOK\r\n")
            .on("AT+CGATT=1", "\r\nOK\r\n")
            .on_prefix("AT+CSTT=", "\r\nOK\r\n")
            .on("AT+CIICR", "\r\nOK\r\n")
            .on("AT+CIFSR", "AT+CIFSR\r\r\n10.64.12.7\r\n")
            .on("AT+CEREG?", "\r\n+CEREG: 0,1\r\n\r\nOK\r\n")
            .on("AT+CGATT?", "\r\n+CGATT: 1\r\n\r\nOK\r\n")
    }

    /// Answer an exact command line
    pub fn on(self, command: &str, reply: &str) -> Self {
        self.on_seq(command, &[reply])
    }

    /// Answer an exact command line with successive replies; the last repeats
    pub fn on_seq(mut self, command: &str, replies: &[&str]) -> Self {
        self.rules.push(Rule {
            pattern: command.to_string(),
            prefix: false,
            replies: replies.iter().map(|r| r.as_bytes().to_vec()).collect(),
            served: 0,
        });
        self
    }

    /// Answer any command line starting with `prefix`
    pub fn on_prefix(mut self, prefix: &str, reply: &str) -> Self {
        self.rules.push(Rule {
            pattern: prefix.to_string(),
            prefix: true,
            replies: vec![reply.as_bytes().to_vec()],
            served: 0,
        });
        self
    }

    /// Reply sent after a Ctrl-Z terminated payload
    pub fn on_ctrl_z(mut self, reply: &[u8]) -> Self {
        self.ctrl_z_reply = reply.to_vec();
        self
    }

    /// Reply sent after a length-declared payload has been received in full
    pub fn on_data(mut self, reply: &str) -> Self {
        self.data_reply = reply.as_bytes().to_vec();
        self
    }

    /// Start the modem task; returns the host end of the pipe and the command log
    pub fn spawn(self) -> (DuplexStream, ScriptLog) {
        let (host, device) = tokio::io::duplex(64 * 1024);
        let log = self.log.clone();
        tokio::spawn(self.run(device));
        (host, log)
    }

    async fn run(mut self, mut io: DuplexStream) {
        let mut pending = Vec::new();
        let mut chunk = [0u8; 1024];

        loop {
            let n = match io.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            pending.extend_from_slice(&chunk[..n]);

            while let Some(frame) = self.next_frame(&mut pending) {
                let reply = self.respond(frame);
                if !reply.is_empty() && io.write_all(&reply).await.is_err() {
                    return;
                }
            }
        }
    }

    fn next_frame(&mut self, pending: &mut Vec<u8>) -> Option<Frame> {
        if self.raw_remaining > 0 {
            if pending.len() < self.raw_remaining {
                return None;
            }
            let data: Vec<u8> = pending.drain(..self.raw_remaining).collect();
            self.raw_remaining = 0;
            return Some(Frame::Data(data));
        }

        let end = pending.iter().position(|&b| b == b'\n' || b == CTRL_Z)?;
        let raw: Vec<u8> = pending.drain(..=end).collect();
        let text = String::from_utf8_lossy(&raw[..end]).trim_end_matches('\r').to_string();

        if raw[end] == CTRL_Z {
            Some(Frame::CtrlZ(text))
        } else {
            Some(Frame::Line(text))
        }
    }

    fn respond(&mut self, frame: Frame) -> Vec<u8> {
        match frame {
            Frame::Line(line) => {
                if line.is_empty() {
                    return Vec::new();
                }
                self.log.push(line.clone());

                // Exact rules before prefix rules; the most recently added wins
                let rule = match self.rules.iter().rposition(|r| !r.prefix && r.matches(&line)) {
                    Some(idx) => Some(idx),
                    None => self.rules.iter().rposition(|r| r.prefix && r.matches(&line)),
                };
                let Some(idx) = rule else {
                    return Vec::new();
                };

                if let Some(len) = line.strip_prefix("AT+CIPSEND=") {
                    self.raw_remaining = len.trim().parse().unwrap_or(0);
                }
                self.rules[idx].next_reply()
            }
            Frame::CtrlZ(text) => {
                if !text.is_empty() {
                    self.log.push(text);
                }
                self.log.push(CTRL_Z_ENTRY.to_string());
                self.ctrl_z_reply.clone()
            }
            Frame::Data(data) => {
                self.log.push(format!("<DATA:{}>", data.len()));
                self.data_reply.clone()
            }
        }
    }
}
