//! ntrip-modem Shared Protocol Types
//!
//! Pure protocol logic used by the modem driver: AT command and NTRIP wire
//! formatting, signal-quality evaluation, and the bring-up/session state
//! machines. Nothing in this crate touches I/O.

pub mod codec;
pub mod signal;
pub mod state_machine;

pub use codec::{CodecError, RegistrationStatus, RegistrationVerdict};
pub use signal::SignalSample;
pub use state_machine::{
    BringupEvent, BringupState, BringupStateMachine, SessionEvent, SessionState,
    SessionStateMachine, TransitionResult,
};

/// Timing parameters for the modem conversation, in milliseconds
pub mod timing {
    /// Default inactivity window for a command/response transaction
    pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;

    /// Default capacity of a transaction response buffer (bytes)
    pub const DEFAULT_RESPONSE_CAPACITY: usize = 100;

    /// Reset line hold time during the power sequence
    pub const RESET_PULSE_MS: u64 = 500;

    /// Power key hold time during the power sequence
    pub const POWER_KEY_PULSE_MS: u64 = 1100;

    /// Time the modem needs to boot after the power key is released
    pub const BOOT_WAIT_MS: u64 = 7000;

    /// Inactivity window for the boot handshake probe
    pub const HANDSHAKE_TIMEOUT_MS: u64 = 100;

    /// Interval between boot handshake probes
    pub const HANDSHAKE_INTERVAL_MS: u64 = 1000;

    /// Attempts for each SIM readiness probe
    pub const SIM_CHECK_ATTEMPTS: u32 = 3;

    /// Delay between SIM readiness probes
    pub const SIM_CHECK_INTERVAL_MS: u64 = 300;

    /// Delay between the preferred-mode and band-selection commands
    pub const MODE_SELECT_SETTLE_MS: u64 = 300;

    /// Inactivity window for the prior-session teardown
    pub const TEARDOWN_TIMEOUT_MS: u64 = 2000;

    /// Interval between signal-quality samples while below threshold
    pub const SIGNAL_POLL_INTERVAL_MS: u64 = 2000;

    /// Minimum quality index to proceed with the attach
    pub const SIGNAL_THRESHOLD: u8 = 2;

    /// Capacity of the signal-quality response buffer
    pub const SIGNAL_RESPONSE_CAPACITY: usize = 26;

    /// Inactivity window for the slower attach steps
    pub const ATTACH_TIMEOUT_MS: u64 = 4000;

    /// Capacity of the attach-step response buffer
    pub const ATTACH_RESPONSE_CAPACITY: usize = 32;

    /// Read windows allowed per attach step before it is declared failed
    pub const ATTACH_READ_ATTEMPTS: u32 = 30;

    /// Delay before re-querying registration while searching
    pub const REGISTRATION_SEARCH_DELAY_MS: u64 = 2000;

    /// Delay before re-querying registration after an unrecognized reply
    pub const REGISTRATION_RETRY_DELAY_MS: u64 = 1000;

    /// Pause after a bring-up step before the next command
    pub const STEP_SETTLE_MS: u64 = 100;

    /// Pause after the prior-session teardown
    pub const TEARDOWN_SETTLE_MS: u64 = 1000;

    /// Pause after each successful attach step
    pub const ATTACH_SETTLE_MS: u64 = 200;

    /// Capacity of the registration query response buffer
    pub const REGISTRATION_RESPONSE_CAPACITY: usize = 64;

    /// Attempts for the baud-rate switch
    pub const BAUD_RATE_ATTEMPTS: u32 = 3;

    /// Delay between baud-rate attempts
    pub const BAUD_RATE_INTERVAL_MS: u64 = 200;

    /// Sleep between readability checks while waiting for the socket to open
    pub const SOCKET_POLL_INTERVAL_MS: u64 = 100;

    /// Capacity of the socket-open response buffer
    pub const SOCKET_RESPONSE_CAPACITY: usize = 1024;

    /// Capacity of the send-prompt response buffer
    pub const PROMPT_RESPONSE_CAPACITY: usize = 32;

    /// Read windows allowed while waiting for the `>` send prompt
    pub const PROMPT_READ_ATTEMPTS: u32 = 10;

    /// Inactivity window for each read while waiting for the caster greeting
    pub const GREETING_TIMEOUT_MS: u64 = 2000;

    /// Capacity of the caster greeting buffer
    pub const GREETING_RESPONSE_CAPACITY: usize = 20_000;

    /// Pause between the two SOURCE request transmissions
    pub const SOURCE_REPEAT_DELAY_MS: u64 = 25;

    /// Inactivity window for a data-channel read
    pub const READ_TIMEOUT_MS: u64 = 500;

    /// Capacity of the send acknowledgement buffer
    pub const SEND_ACK_CAPACITY: usize = 20;

    /// Read windows allowed while waiting for a send acknowledgement
    pub const SEND_ACK_ATTEMPTS: u32 = 10;
}
