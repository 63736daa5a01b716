//! AT command and NTRIP wire codec
//!
//! Request lines sent to the modem are plain text terminated with CR-LF.
//! Once the modem shows its `>` prompt, raw socket payload follows and a
//! single control byte ends the write:
//! ```text
//! AT+CIPSEND=<len>\r\n   ->   >   ->   <len payload bytes>
//! AT+CIPSEND\r\n         ->   >   ->   <payload> 0x1A
//! ```
//!
//! Responses are never fully parsed; callers look for tokens by substring
//! containment. The few replies whose content matters (IP address,
//! registration status) have dedicated, bounds-checked extractors here.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// End-of-write control byte (Ctrl-Z)
pub const CTRL_Z: u8 = 0x1A;

/// Largest payload the modem accepts in one length-declared send
pub const MAX_SEND_LEN: usize = 1460;

/// Generic failure token in modem replies
pub const ERROR_TOKEN: &str = "ERROR";

/// Generic success token in modem replies
pub const OK_TOKEN: &str = "OK";

/// Prompt shown by the modem when it is ready for socket payload
pub const PROMPT_TOKEN: &str = ">";

/// Reply when the TCP socket opened
pub const CONNECT_OK_TOKEN: &str = "CONNECT OK";

/// Reply when the TCP socket could not be opened
pub const CONNECT_FAIL_TOKEN: &str = "CONNECT FAIL";

/// Socket status reply while connected
pub const STATUS_CONNECTED_TOKEN: &str = "STATE: CONNECT OK";

/// Caster greeting accepting an NTRIP client
pub const GREETING_TOKEN: &str = "ICY 200 OK";

/// User-Agent sent by the pull client
pub const USER_AGENT: &str = "NTRIP NtripModemClient/1.0";

/// Source-Agent sent by the push source
pub const SOURCE_AGENT: &str = "NTRIP NtripModemSource/1.0";

/// Offset of the address in an `AT+CIFSR` reply (past the echoed command)
pub const ADDRESS_OFFSET: usize = 11;

/// Trailing line terminator after the address
const ADDRESS_TRAILER: usize = 2;

/// Baud rates the modem can be switched to
pub const SUPPORTED_BAUD_RATES: [u32; 6] = [1200, 2400, 4800, 9600, 19200, 38400];

/// Token that introduces a registration report
pub const REGISTRATION_TOKEN: &str = "+CEREG:";

/// Errors produced while building requests or extracting reply fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Reply too short: {len} bytes, need more than {needed}")]
    ReplyTooShort { len: usize, needed: usize },

    #[error("Reply carried no address")]
    EmptyAddress,

    #[error("Mount point must not be empty")]
    EmptyMountpoint,

    #[error("Payload too large: {0} bytes (max: {MAX_SEND_LEN})")]
    PayloadTooLarge(usize),

    #[error("Payload must not be empty")]
    EmptyPayload,

    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),
}

/// Whether `needle` occurs anywhere in `haystack`
pub fn contains_token(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// `AT+CSTT="<apn>"`
pub fn apn_command(apn: &str) -> String {
    format!("AT+CSTT=\"{}\"\r\n", apn)
}

/// `AT+CIPSTART="TCP","<host>",<port>`
pub fn socket_open_command(host: &str, port: u16) -> String {
    format!("AT+CIPSTART=\"TCP\",\"{}\",{}\r\n", host, port)
}

/// `AT+CIPSEND=<len>`, validated against the modem's per-send limit
pub fn send_length_command(len: usize) -> Result<String, CodecError> {
    if len == 0 {
        return Err(CodecError::EmptyPayload);
    }
    if len > MAX_SEND_LEN {
        return Err(CodecError::PayloadTooLarge(len));
    }
    Ok(format!("AT+CIPSEND={}\r\n", len))
}

/// `AT+IPR=<rate>`, restricted to the rates the modem supports
pub fn baud_rate_command(rate: u32) -> Result<String, CodecError> {
    if !SUPPORTED_BAUD_RATES.contains(&rate) {
        return Err(CodecError::UnsupportedBaudRate(rate));
    }
    Ok(format!("AT+IPR={}\r\n", rate))
}

/// Base64 of `user:password` for an HTTP Basic Authorization header
pub fn basic_auth(user: &str, password: &str) -> String {
    STANDARD.encode(format!("{}:{}", user, password))
}

/// Build the NTRIP client request for a mount point.
///
/// Without a username the request is anonymous; with one it carries a Basic
/// Authorization header. The request ends with a blank line; the caller
/// appends [`CTRL_Z`] when writing it through the send prompt.
pub fn client_request(
    mountpoint: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<Bytes, CodecError> {
    if mountpoint.is_empty() {
        return Err(CodecError::EmptyMountpoint);
    }

    let mut buf = BytesMut::with_capacity(256);
    buf.put_slice(format!("GET /{} HTTP/1.0\r\n", mountpoint).as_bytes());
    buf.put_slice(format!("User-Agent: {}\r\n", USER_AGENT).as_bytes());

    match username.filter(|u| !u.is_empty()) {
        None => {
            buf.put_slice(b"Accept: */*\r\n");
            buf.put_slice(b"Connection: close\r\n");
        }
        Some(user) => {
            let auth = basic_auth(user, password.unwrap_or_default());
            buf.put_slice(format!("Authorization: Basic {}\r\n", auth).as_bytes());
        }
    }
    buf.put_slice(b"\r\n");

    Ok(buf.freeze())
}

/// Build the NTRIP source (push) request, without the terminating [`CTRL_Z`]
pub fn source_request(password: &str, mountpoint: &str, info: &str) -> Result<Bytes, CodecError> {
    if mountpoint.is_empty() {
        return Err(CodecError::EmptyMountpoint);
    }

    let mut buf = BytesMut::with_capacity(128 + info.len());
    buf.put_slice(format!("SOURCE {} {}\r\n", password, mountpoint).as_bytes());
    buf.put_slice(format!("Source-Agent: {}\r\n", SOURCE_AGENT).as_bytes());
    buf.put_slice(b"STR: \r\n");
    buf.put_slice(info.as_bytes());
    buf.put_slice(b"\r\n");

    Ok(buf.freeze())
}

/// Extract the assigned address from an `AT+CIFSR` reply.
///
/// The address sits at [`ADDRESS_OFFSET`] and runs to the trailing CR-LF. A
/// reply that cannot hold an address is rejected instead of sliced.
pub fn extract_address(reply: &[u8]) -> Result<String, CodecError> {
    let needed = ADDRESS_OFFSET + ADDRESS_TRAILER;
    if reply.len() <= needed {
        return Err(CodecError::ReplyTooShort {
            len: reply.len(),
            needed,
        });
    }

    let raw = &reply[ADDRESS_OFFSET..reply.len() - ADDRESS_TRAILER];
    let address = String::from_utf8_lossy(raw).trim().to_string();
    if address.is_empty() {
        return Err(CodecError::EmptyAddress);
    }
    Ok(address)
}

/// EPS network registration status (`+CEREG: <n>,<stat>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    NotRegistered,
    Home,
    Searching,
    Denied,
    Unknown,
    Roaming,
}

/// What the bring-up should do with a registration status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationVerdict {
    /// Registered; continue the attach
    Proceed,
    /// Still searching; wait and query again
    Retry,
    /// Registration cannot succeed without intervention
    Fatal,
}

impl RegistrationStatus {
    /// Find and decode a registration report in reply text
    pub fn parse(text: &str) -> Option<Self> {
        let start = text.find(REGISTRATION_TOKEN)? + REGISTRATION_TOKEN.len();
        let stat = text[start..].split(',').nth(1)?;
        let code: String = stat
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();

        match code.as_str() {
            "0" => Some(Self::NotRegistered),
            "1" => Some(Self::Home),
            "2" => Some(Self::Searching),
            "3" => Some(Self::Denied),
            "4" => Some(Self::Unknown),
            "5" => Some(Self::Roaming),
            _ => None,
        }
    }

    pub fn verdict(self) -> RegistrationVerdict {
        match self {
            Self::Home | Self::Roaming => RegistrationVerdict::Proceed,
            Self::Searching => RegistrationVerdict::Retry,
            Self::NotRegistered | Self::Denied | Self::Unknown => RegistrationVerdict::Fatal,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::NotRegistered => "not registered to network",
            Self::Home => "registered to home network",
            Self::Searching => "searching for network",
            Self::Denied => "network registration denied",
            Self::Unknown => "registration state unknown",
            Self::Roaming => "registered as roaming",
        }
    }
}
