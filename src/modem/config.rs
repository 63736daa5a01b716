//! Session configuration for the modem

use clap::ValueEnum;
use ntrip_shared::timing;
use std::time::Duration;

/// Which side of the correction stream this device plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Role {
    /// Read corrections from a caster mount point (NTRIP client)
    #[default]
    PullClient,
    /// Publish corrections to a caster mount point (NTRIP server)
    PushSource,
}

/// Preferred radio access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RadioMode {
    /// GSM/GPRS packet radio
    PacketRadio,
    /// LTE-only narrowband mode
    #[default]
    NbIot,
}

impl RadioMode {
    /// `AT+CNMP` selecting the preferred mode
    pub fn preferred_mode_command(self) -> &'static str {
        match self {
            RadioMode::PacketRadio => "AT+CNMP=13\r\n",
            RadioMode::NbIot => "AT+CNMP=38\r\n",
        }
    }
}

/// A loop that sleeps `interval` between checks, optionally giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the condition is met, however long that takes
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    pub fn unbounded(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            max_attempts: None,
        }
    }

    pub fn bounded(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            max_attempts: Some(max_attempts),
        }
    }

    /// Whether another attempt is allowed after `attempts` failed ones
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Delays, windows and retry ceilings for the modem conversation
#[derive(Debug, Clone)]
pub struct Timing {
    /// Boot handshake probes
    pub handshake: PollPolicy,
    /// Signal-quality gate
    pub signal: PollPolicy,
    /// Registration re-queries while the modem is searching
    pub registration: PollPolicy,
    /// Readability checks while the TCP socket opens
    pub socket_open: PollPolicy,
    /// Readability checks while waiting for the caster greeting
    pub greeting: PollPolicy,
    /// Reply windows allowed per attach step
    pub attach_read_attempts: u32,
    /// Reply windows allowed while waiting for the send prompt
    pub prompt_read_attempts: u32,
    /// Transmit the SOURCE request twice before the terminator
    pub duplicate_source_request: bool,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            handshake: PollPolicy::unbounded(timing::HANDSHAKE_INTERVAL_MS),
            signal: PollPolicy::unbounded(timing::SIGNAL_POLL_INTERVAL_MS),
            registration: PollPolicy::unbounded(timing::REGISTRATION_SEARCH_DELAY_MS),
            socket_open: PollPolicy::unbounded(timing::SOCKET_POLL_INTERVAL_MS),
            greeting: PollPolicy::unbounded(timing::SOCKET_POLL_INTERVAL_MS),
            attach_read_attempts: timing::ATTACH_READ_ATTEMPTS,
            prompt_read_attempts: timing::PROMPT_READ_ATTEMPTS,
            duplicate_source_request: true,
        }
    }
}

/// Everything the modem needs to reach a flowing correction stream
#[derive(Debug, Clone)]
pub struct ModemConfig {
    /// Provider access point name
    pub apn: String,
    /// Caster host name or address
    pub host: String,
    /// Caster TCP port
    pub port: u16,
    /// Caster mount point
    pub mountpoint: String,
    /// Caster username; anonymous when absent
    pub username: Option<String>,
    /// Caster password (client Basic auth or source password)
    pub password: Option<String>,
    /// Free-form source description sent by a push source
    pub info: String,
    pub role: Role,
    pub radio_mode: RadioMode,
    pub timing: Timing,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            apn: "internet".into(),
            host: "127.0.0.1".into(),
            port: 2101,
            mountpoint: "RTCM3".into(),
            username: None,
            password: None,
            info: String::new(),
            role: Role::default(),
            radio_mode: RadioMode::default(),
            timing: Timing::default(),
        }
    }
}
