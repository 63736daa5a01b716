//! Network bring-up
//!
//! Walks the modem from power-on to an attached packet-data service:
//! power sequence, boot handshake, SIM check, radio mode, prior-session
//! teardown, signal gate and service attach. Radio mode and teardown are
//! soft steps; SIM and attach failures end in FatalHalt, which is reported
//! back to the caller and never left again.

use crate::modem::config::{ModemConfig, PollPolicy};
use crate::power::{power_on, PowerControl};
use crate::transport::{CommandTransport, Outcome, Response, Transaction, TransportStream};
use anyhow::{bail, Result};
use ntrip_shared::codec::{self, CodecError, OK_TOKEN};
use ntrip_shared::{
    timing, BringupEvent, BringupState, BringupStateMachine, RegistrationStatus,
    RegistrationVerdict, SignalSample, TransitionResult,
};
use std::fmt;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Why the bring-up halted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalReason {
    /// Handshake ceiling reached without an answer
    HandshakeExhausted { attempts: u32 },
    /// Modem stopped answering `AT` during the SIM check
    ModemUnresponsive,
    /// SIM never reported READY
    SimNotReady,
    /// Signal gate ceiling reached below threshold
    SignalExhausted { attempts: u32 },
    /// An attach command was rejected or never answered
    Attach { step: &'static str, detail: String },
    /// Network refused or lost the registration
    Registration(RegistrationStatus),
    /// `AT+CIFSR` reply carried no usable address
    AddressUnreadable(CodecError),
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::HandshakeExhausted { attempts } => {
                write!(f, "modem did not answer after {} handshake probes", attempts)
            }
            FatalReason::ModemUnresponsive => write!(f, "modem stopped responding"),
            FatalReason::SimNotReady => write!(f, "SIM card not ready"),
            FatalReason::SignalExhausted { attempts } => {
                write!(f, "signal below threshold after {} samples", attempts)
            }
            FatalReason::Attach { step, detail } => write!(f, "{} failed: {}", step, detail),
            FatalReason::Registration(status) => write!(f, "{}", status.describe()),
            FatalReason::AddressUnreadable(e) => write!(f, "no IP address: {}", e),
        }
    }
}

/// What the bring-up reached
#[derive(Debug, Clone)]
pub struct BringupReport {
    pub state: BringupState,
    /// Address assigned by the provider
    pub address: Option<String>,
    /// Sample that passed the signal gate
    pub signal: Option<SignalSample>,
    /// Set when `state` is FatalHalt
    pub fatal: Option<FatalReason>,
}

impl BringupReport {
    #[cfg(test)]
    pub fn is_attached(&self) -> bool {
        self.state == BringupState::Attached
    }
}

/// A step either fails the bring-up or hits an I/O error on the link
enum StepError {
    Fatal(FatalReason),
    Io(anyhow::Error),
}

impl From<anyhow::Error> for StepError {
    fn from(e: anyhow::Error) -> Self {
        StepError::Io(e)
    }
}

type StepResult<T> = std::result::Result<T, StepError>;

/// Runs the bring-up sequence over a borrowed transport
pub struct NetworkBringup<'a, S> {
    transport: &'a mut CommandTransport<S>,
    config: &'a ModemConfig,
    fsm: &'a mut BringupStateMachine,
}

impl<'a, S: TransportStream> NetworkBringup<'a, S> {
    pub fn new(
        transport: &'a mut CommandTransport<S>,
        config: &'a ModemConfig,
        fsm: &'a mut BringupStateMachine,
    ) -> Self {
        Self {
            transport,
            config,
            fsm,
        }
    }

    /// Run every step in order.
    ///
    /// Fatal failures are returned inside the report; only link I/O errors
    /// come back as `Err`.
    pub async fn run<P: PowerControl + ?Sized>(&mut self, power: &mut P) -> Result<BringupReport> {
        if self.fsm.state() != BringupState::PoweredOff {
            bail!("Bring-up already ran (state: {})", self.fsm.state());
        }

        let mut report = BringupReport {
            state: self.fsm.state(),
            address: None,
            signal: None,
            fatal: None,
        };

        match self.sequence(power, &mut report).await {
            Ok(()) => info!("[BRINGUP] Attached, address {}", report.address.as_deref().unwrap_or("?")),
            Err(StepError::Fatal(reason)) => {
                error!("[BRINGUP] Halting: {}", reason);
                self.advance(BringupEvent::Fatal);
                report.fatal = Some(reason);
            }
            Err(StepError::Io(e)) => return Err(e),
        }

        report.state = self.fsm.state();
        Ok(report)
    }

    async fn sequence<P: PowerControl + ?Sized>(
        &mut self,
        power: &mut P,
        report: &mut BringupReport,
    ) -> StepResult<()> {
        if power.is_switchable() {
            power_on(power).await?;
            self.advance(BringupEvent::PoweredOn);
        } else {
            info!("[BRINGUP] Modem powered externally, skipping power sequence");
        }

        self.await_handshake().await?;
        self.check_sim().await?;

        if !self.set_radio_mode().await? {
            warn!("[BRINGUP] Failed to set radio mode {:?}, continuing", self.config.radio_mode);
        }
        self.advance(BringupEvent::ModeStepDone);
        sleep(Duration::from_millis(timing::STEP_SETTLE_MS)).await;

        if !self.close_prior_sessions().await? {
            warn!("[BRINGUP] Failed to close prior sessions, continuing");
        }
        self.advance(BringupEvent::TeardownDone);
        sleep(Duration::from_millis(timing::TEARDOWN_SETTLE_MS)).await;

        report.signal = Some(self.await_signal().await?);
        report.address = Some(self.attach().await?);
        self.advance(BringupEvent::ServiceAttached);
        Ok(())
    }

    /// One boot probe: `AT` with a short window
    pub async fn handshake(&mut self) -> Result<bool> {
        let tx = Transaction::new("AT\r\n")
            .until(OK_TOKEN)
            .timeout_ms(timing::HANDSHAKE_TIMEOUT_MS);
        Ok(self.transport.transact(&tx).await?.is_matched())
    }

    async fn await_handshake(&mut self) -> StepResult<()> {
        let policy = self.config.timing.handshake;
        let mut attempts = 0;

        loop {
            if self.handshake().await? {
                info!("[BRINGUP] Modem answered");
                self.advance(BringupEvent::HandshakeAcknowledged);
                return Ok(());
            }
            attempts += 1;
            if !policy.allows(attempts) {
                return Err(StepError::Fatal(FatalReason::HandshakeExhausted { attempts }));
            }
            debug!("[BRINGUP] Waiting for modem to boot ({} probes)", attempts);
            sleep(policy.interval).await;
        }
    }

    async fn check_sim(&mut self) -> StepResult<()> {
        let attempts = timing::SIM_CHECK_ATTEMPTS;
        let interval = timing::SIM_CHECK_INTERVAL_MS;

        let alive = Transaction::new("AT\r\n").until(OK_TOKEN);
        if !self.retry(&alive, attempts, interval).await? {
            return Err(StepError::Fatal(FatalReason::ModemUnresponsive));
        }

        let ready = Transaction::new("AT+CPIN?\r\n").until("READY");
        if !self.retry(&ready, attempts, interval).await? {
            return Err(StepError::Fatal(FatalReason::SimNotReady));
        }

        info!("[BRINGUP] SIM card is ready");
        self.advance(BringupEvent::SimReady);
        Ok(())
    }

    /// Select the configured preferred mode, then the band
    pub async fn set_radio_mode(&mut self) -> Result<bool> {
        let mode = self.config.radio_mode;
        let preferred = Transaction::new(mode.preferred_mode_command()).until(OK_TOKEN);
        if !self.transport.transact(&preferred).await?.is_matched() {
            return Ok(false);
        }
        sleep(Duration::from_millis(timing::MODE_SELECT_SETTLE_MS)).await;

        let band = Transaction::new("AT+CMNB=1\r\n").until(OK_TOKEN);
        let matched = self.transport.transact(&band).await?.is_matched();
        if matched {
            info!("[BRINGUP] Radio mode set to {:?}", mode);
        }
        Ok(matched)
    }

    /// Deactivate any packet contexts left over from an earlier run
    pub async fn close_prior_sessions(&mut self) -> Result<bool> {
        let tx = Transaction::new("AT+CIPSHUT\r\n")
            .until(OK_TOKEN)
            .timeout_ms(timing::TEARDOWN_TIMEOUT_MS);
        Ok(self.transport.transact(&tx).await?.is_matched())
    }

    /// Take one signal-quality reading
    pub async fn sample_signal(&mut self) -> Result<SignalSample> {
        let tx = Transaction::new("AT+CSQ\r\n")
            .until(OK_TOKEN)
            .capacity(timing::SIGNAL_RESPONSE_CAPACITY);
        let response = self.transport.transact(&tx).await?;
        Ok(SignalSample::from_response(&response.text()))
    }

    async fn await_signal(&mut self) -> StepResult<SignalSample> {
        let policy = self.config.timing.signal;
        let mut attempts = 0;

        loop {
            let sample = self.sample_signal().await?;
            info!("[BRINGUP] Signal {}", sample);
            if sample.quality >= timing::SIGNAL_THRESHOLD {
                self.advance(BringupEvent::SignalAdequate);
                return Ok(sample);
            }
            attempts += 1;
            if !policy.allows(attempts) {
                return Err(StepError::Fatal(FatalReason::SignalExhausted { attempts }));
            }
            sleep(policy.interval).await;
        }
    }

    /// Switch the modem's serial rate; unsupported rates never reach the wire
    pub async fn set_baud_rate(&mut self, rate: u32) -> Result<bool> {
        let tx = Transaction::new(codec::baud_rate_command(rate)?).until(OK_TOKEN);
        let switched = self
            .retry(&tx, timing::BAUD_RATE_ATTEMPTS, timing::BAUD_RATE_INTERVAL_MS)
            .await?;
        if switched {
            info!("[BRINGUP] Modem baud rate set to {}", rate);
        } else {
            warn!("[BRINGUP] Modem did not accept baud rate {}", rate);
        }
        Ok(switched)
    }

    async fn attach(&mut self) -> StepResult<String> {
        info!("[BRINGUP] Attaching to packet service");
        let settle = Duration::from_millis(timing::ATTACH_SETTLE_MS);

        self.attach_step("attach", Transaction::new("AT+CGATT=1\r\n").until(OK_TOKEN))
            .await?;
        sleep(Duration::from_millis(timing::STEP_SETTLE_MS)).await;

        let apn = Transaction::new(codec::apn_command(&self.config.apn)).until(OK_TOKEN);
        self.attach_step("APN", apn).await?;
        info!("[BRINGUP] Provider APN set to {}", self.config.apn);
        sleep(settle).await;

        let bearer = Transaction::new("AT+CIICR\r\n")
            .until(OK_TOKEN)
            .timeout_ms(timing::ATTACH_TIMEOUT_MS);
        self.attach_step("bearer", bearer).await?;
        info!("[BRINGUP] Wireless connection opened");
        sleep(settle).await;

        // Any non-error reply carries the address
        let query = Transaction::new("AT+CIFSR\r\n")
            .timeout_ms(timing::ATTACH_TIMEOUT_MS)
            .capacity(timing::ATTACH_RESPONSE_CAPACITY);
        let response = self.attach_step("address", query).await?;
        let address = codec::extract_address(&response.body)
            .map_err(|e| StepError::Fatal(FatalReason::AddressUnreadable(e)))?;
        info!("[BRINGUP] IP address is {}", address);
        sleep(settle).await;

        self.await_registration().await?;

        let status = Transaction::new("AT+CGATT?\r\n")
            .until(OK_TOKEN)
            .timeout_ms(timing::ATTACH_TIMEOUT_MS)
            .capacity(timing::ATTACH_RESPONSE_CAPACITY);
        self.attach_step("attach status", status).await?;
        info!("[BRINGUP] Attached to packet service");
        sleep(settle).await;

        Ok(address)
    }

    async fn await_registration(&mut self) -> StepResult<()> {
        let policy = self.config.timing.registration;
        let tx = Transaction::new("AT+CEREG?\r\n")
            .until(OK_TOKEN)
            .timeout_ms(timing::ATTACH_TIMEOUT_MS)
            .capacity(timing::REGISTRATION_RESPONSE_CAPACITY);
        let mut attempts = 0;

        loop {
            let response = self.attach_step("registration", tx.clone()).await?;
            let delay = match RegistrationStatus::parse(&response.text()) {
                Some(status) => match status.verdict() {
                    RegistrationVerdict::Proceed => {
                        info!("[BRINGUP] {}", status.describe());
                        return Ok(());
                    }
                    RegistrationVerdict::Fatal => {
                        warn!("[BRINGUP] {}", status.describe());
                        sleep(Duration::from_millis(timing::REGISTRATION_SEARCH_DELAY_MS)).await;
                        return Err(StepError::Fatal(FatalReason::Registration(status)));
                    }
                    RegistrationVerdict::Retry => {
                        info!("[BRINGUP] {}", status.describe());
                        Duration::from_millis(timing::REGISTRATION_SEARCH_DELAY_MS)
                    }
                },
                None => {
                    debug!("[BRINGUP] No registration status in {:?}", response.text());
                    Duration::from_millis(timing::REGISTRATION_RETRY_DELAY_MS)
                }
            };

            attempts += 1;
            if !policy.allows(attempts) {
                return Err(StepError::Fatal(FatalReason::Attach {
                    step: "registration",
                    detail: format!("not registered after {} queries", attempts),
                }));
            }
            sleep(delay).await;
        }
    }

    async fn attach_step(&mut self, step: &'static str, tx: Transaction) -> StepResult<Response> {
        let windows = self.config.timing.attach_read_attempts;
        let response = self.transport.transact_within(&tx, windows).await?;
        let detail = match response.outcome {
            Outcome::Matched => return Ok(response),
            Outcome::Rejected => "modem replied ERROR".to_string(),
            Outcome::TimedOut => format!("no reply to {}", tx.request().trim_end()),
        };
        Err(StepError::Fatal(FatalReason::Attach { step, detail }))
    }

    /// Repeat `tx` until it matches, at most `attempts` times
    async fn retry(&mut self, tx: &Transaction, attempts: u32, interval_ms: u64) -> Result<bool> {
        let policy = PollPolicy::bounded(interval_ms, attempts);
        let mut failed = 0;

        loop {
            if self.transport.transact(tx).await?.is_matched() {
                return Ok(true);
            }
            failed += 1;
            if !policy.allows(failed) {
                return Ok(false);
            }
            sleep(policy.interval).await;
        }
    }

    fn advance(&mut self, event: BringupEvent) {
        match self.fsm.process_event(event) {
            TransitionResult::Success(state) => debug!("[BRINGUP] -> {}", state),
            TransitionResult::Invalid { from, event } => {
                warn!("[BRINGUP] Ignoring {:?} in state {}", event, from)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::config::Timing;
    use crate::power::tests::RecordingPower;
    use crate::power::NoPowerControl;
    use crate::transport::scripted::{ScriptLog, ScriptedModem};
    use tokio::time::Instant;

    const OK: &str = "\r\nOK\r\n";
    const ERROR: &str = "\r\nERROR\r\n";

    async fn bring_up(modem: ScriptedModem, config: ModemConfig) -> (BringupReport, ScriptLog) {
        let (stream, log) = modem.spawn();
        let mut transport = CommandTransport::new(stream);
        let mut fsm = BringupStateMachine::new();
        let report = NetworkBringup::new(&mut transport, &config, &mut fsm)
            .run(&mut NoPowerControl)
            .await
            .unwrap();
        assert_eq!(report.state, fsm.state());
        (report, log)
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_reaches_attached() {
        let (stream, log) = ScriptedModem::attaching().spawn();
        let mut transport = CommandTransport::new(stream);
        let mut fsm = BringupStateMachine::new();
        let mut power = RecordingPower::default();
        let config = ModemConfig::default();

        let report = NetworkBringup::new(&mut transport, &config, &mut fsm)
            .run(&mut power)
            .await
            .unwrap();

        assert!(report.is_attached());
        assert_eq!(report.address.as_deref(), Some("10.64.12.7"));
        assert_eq!(report.signal.map(|s| s.quality), Some(20));
        assert_eq!(report.fatal, None);
        assert_eq!(power.events.len(), 4);

        let order: Vec<String> = log.entries().into_iter().filter(|e| e != "AT").collect();
        assert_eq!(
            order,
            vec![
                "AT+CPIN?",
                "AT+CNMP=38",
                "AT+CMNB=1",
                "AT+CIPSHUT",
                "AT+CSQ",
                "AT+CGATT=1",
                "AT+CSTT=\"internet\"",
                "AT+CIICR",
                "AT+CIFSR",
                "AT+CEREG?",
                "AT+CGATT?",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_packet_radio_mode_command() {
        let config = ModemConfig {
            radio_mode: crate::modem::config::RadioMode::PacketRadio,
            ..Default::default()
        };
        let (report, log) = bring_up(ScriptedModem::attaching(), config).await;
        assert!(report.is_attached());
        assert!(log.contains("AT+CNMP=13"));
        assert!(!log.contains("AT+CNMP=38"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sim_not_ready_halts() {
        let modem = ScriptedModem::attaching().on("AT+CPIN?", "\r\n+CPIN: SIM PIN\r\n\r\nOK\r\n");
        let start = Instant::now();
        let (report, log) = bring_up(modem, ModemConfig::default()).await;

        assert_eq!(report.state, BringupState::FatalHalt);
        assert_eq!(report.fatal, Some(FatalReason::SimNotReady));
        assert_eq!(log.count("AT+CPIN?"), 3);
        // Three full reply windows separated by two check intervals
        let spacing = Duration::from_millis(
            3 * timing::DEFAULT_RESPONSE_TIMEOUT_MS + 2 * timing::SIM_CHECK_INTERVAL_MS,
        );
        assert!(start.elapsed() >= spacing);
        assert!(start.elapsed() < spacing + Duration::from_millis(timing::SIM_CHECK_INTERVAL_MS));
        assert!(!log.contains("AT+CNMP=38"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_failures_do_not_stop_bringup() {
        let modem = ScriptedModem::attaching()
            .on("AT+CNMP=38", ERROR)
            .on("AT+CIPSHUT", ERROR);
        let (report, log) = bring_up(modem, ModemConfig::default()).await;

        assert!(report.is_attached());
        // Band selection is skipped once the preferred mode fails
        assert!(!log.contains("AT+CMNB=1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_gate_waits_for_threshold() {
        let modem = ScriptedModem::attaching().on_seq(
            "AT+CSQ",
            &[
                "\r\n+CSQ: 99,99\r\n\r\nOK\r\n",
                "\r\n+CSQ: 1,0\r\n\r\nOK\r\n",
                "\r\n+CSQ: 15,0\r\n\r\nOK\r\n",
            ],
        );
        let (report, log) = bring_up(modem, ModemConfig::default()).await;

        assert!(report.is_attached());
        assert_eq!(log.count("AT+CSQ"), 3);
        assert_eq!(report.signal.map(|s| s.quality), Some(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_signal_gate_halts() {
        let modem = ScriptedModem::attaching().on("AT+CSQ", "\r\n+CSQ: 0,0\r\n\r\nOK\r\n");
        let config = ModemConfig {
            timing: Timing {
                signal: PollPolicy::bounded(2000, 3),
                ..Default::default()
            },
            ..Default::default()
        };
        let (report, log) = bring_up(modem, config).await;

        assert_eq!(report.state, BringupState::FatalHalt);
        assert_eq!(report.fatal, Some(FatalReason::SignalExhausted { attempts: 3 }));
        assert_eq!(log.count("AT+CSQ"), 3);
        assert!(!log.contains("AT+CGATT=1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_denied_halts() {
        let modem = ScriptedModem::attaching().on("AT+CEREG?", "\r\n+CEREG: 0,3\r\n\r\nOK\r\n");
        let (report, log) = bring_up(modem, ModemConfig::default()).await;

        assert_eq!(
            report.fatal,
            Some(FatalReason::Registration(RegistrationStatus::Denied))
        );
        assert!(!log.contains("AT+CGATT?"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_registered_waits_before_halting() {
        let (stream, log) = ScriptedModem::new()
            .on("AT+CEREG?", "\r\n+CEREG: 0,0\r\n\r\nOK\r\n")
            .spawn();
        let mut transport = CommandTransport::new(stream);
        let mut fsm = BringupStateMachine::new();
        let config = ModemConfig::default();
        let mut bringup = NetworkBringup::new(&mut transport, &config, &mut fsm);

        let start = Instant::now();
        let result = bringup.await_registration().await;

        assert!(matches!(
            result,
            Err(StepError::Fatal(FatalReason::Registration(
                RegistrationStatus::NotRegistered
            )))
        ));
        assert!(start.elapsed() >= Duration::from_millis(timing::REGISTRATION_SEARCH_DELAY_MS));
        assert_eq!(log.count("AT+CEREG?"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_searching_requeries() {
        let modem = ScriptedModem::attaching().on_seq(
            "AT+CEREG?",
            &[
                "\r\n+CEREG: 0,2\r\n\r\nOK\r\n",
                "\r\n+CEREG: 0,2\r\n\r\nOK\r\n",
                "\r\n+CEREG: 0,5\r\n\r\nOK\r\n",
            ],
        );
        let (report, log) = bring_up(modem, ModemConfig::default()).await;

        assert!(report.is_attached());
        assert_eq!(log.count("AT+CEREG?"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_address_reply_halts() {
        let modem = ScriptedModem::attaching().on("AT+CIFSR", "AT\r\n");
        let (report, _log) = bring_up(modem, ModemConfig::default()).await;

        assert_eq!(report.state, BringupState::FatalHalt);
        assert_eq!(
            report.fatal,
            Some(FatalReason::AddressUnreadable(CodecError::ReplyTooShort {
                len: 4,
                needed: 13
            }))
        );
        assert_eq!(report.address, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_error_halts() {
        let modem = ScriptedModem::attaching().on("AT+CGATT=1", ERROR);
        let (report, log) = bring_up(modem, ModemConfig::default()).await;

        assert!(matches!(
            report.fatal,
            Some(FatalReason::Attach { step: "attach", .. })
        ));
        assert!(!log.contains("AT+CSTT=\"internet\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_retries_until_answered() {
        let modem = ScriptedModem::attaching().on_seq("AT", &["", "", OK]);
        let (report, log) = bring_up(modem, ModemConfig::default()).await;

        assert!(report.is_attached());
        // Three boot probes plus the aliveness probe of the SIM check
        assert_eq!(log.count("AT"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_handshake_halts() {
        let modem = ScriptedModem::attaching().on("AT", "");
        let config = ModemConfig {
            timing: Timing {
                handshake: PollPolicy::bounded(1000, 5),
                ..Default::default()
            },
            ..Default::default()
        };
        let (report, log) = bring_up(modem, config).await;

        assert_eq!(report.fatal, Some(FatalReason::HandshakeExhausted { attempts: 5 }));
        assert_eq!(log.count("AT"), 5);
        assert!(!log.contains("AT+CPIN?"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bringup_runs_once() {
        let (stream, _log) = ScriptedModem::attaching().spawn();
        let mut transport = CommandTransport::new(stream);
        let mut fsm = BringupStateMachine::new();
        let config = ModemConfig::default();

        let mut bringup = NetworkBringup::new(&mut transport, &config, &mut fsm);
        assert!(bringup.run(&mut NoPowerControl).await.unwrap().is_attached());
        assert!(bringup.run(&mut NoPowerControl).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_baud_rate() {
        let (stream, log) = ScriptedModem::new().on("AT+IPR=19200", OK).spawn();
        let mut transport = CommandTransport::new(stream);
        let mut fsm = BringupStateMachine::new();
        let config = ModemConfig::default();
        let mut bringup = NetworkBringup::new(&mut transport, &config, &mut fsm);

        assert!(bringup.set_baud_rate(19200).await.unwrap());
        assert!(bringup.set_baud_rate(115200).await.is_err());
        assert_eq!(log.entries(), vec!["AT+IPR=19200"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_baud_rate_gives_up_after_three_attempts() {
        let (stream, log) = ScriptedModem::new().on("AT+IPR=9600", ERROR).spawn();
        let mut transport = CommandTransport::new(stream);
        let mut fsm = BringupStateMachine::new();
        let config = ModemConfig::default();

        let switched = NetworkBringup::new(&mut transport, &config, &mut fsm)
            .set_baud_rate(9600)
            .await
            .unwrap();
        assert!(!switched);
        assert_eq!(log.count("AT+IPR=9600"), 3);
    }
}
