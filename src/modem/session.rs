//! Socket session establishment
//!
//! Opens the raw TCP socket through the modem, then runs the handshake for
//! the configured role:
//! - pull client: HTTP-style GET for the mount point, accepted on `ICY 200 OK`
//! - push source: SOURCE request, accepted as soon as it is written
//!
//! The socket-open and greeting waits poll `readable()` with a sleep between
//! idle checks and are unbounded unless the timing block sets a ceiling.

use crate::modem::config::{ModemConfig, PollPolicy, Role};
use crate::transport::{CommandTransport, Outcome, Transaction, TransportStream};
use anyhow::{bail, Result};
use ntrip_shared::codec::{
    self, CONNECT_FAIL_TOKEN, CONNECT_OK_TOKEN, CTRL_Z, ERROR_TOKEN, GREETING_TOKEN, PROMPT_TOKEN,
};
use ntrip_shared::{timing, SessionEvent, SessionState, SessionStateMachine, TransitionResult};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Drives one session attempt over a borrowed transport
pub struct SessionEstablisher<'a, S> {
    transport: &'a mut CommandTransport<S>,
    config: &'a ModemConfig,
    fsm: &'a mut SessionStateMachine,
}

impl<'a, S: TransportStream> SessionEstablisher<'a, S> {
    pub fn new(
        transport: &'a mut CommandTransport<S>,
        config: &'a ModemConfig,
        fsm: &'a mut SessionStateMachine,
    ) -> Self {
        Self {
            transport,
            config,
            fsm,
        }
    }

    /// Open the socket and run the role's handshake.
    ///
    /// Returns SessionEstablished or HandshakeFailed; `Err` is reserved for
    /// link I/O failures and unusable configuration.
    pub async fn establish(&mut self) -> Result<SessionState> {
        if self.fsm.state() != SessionState::SocketClosed {
            bail!("Session already in progress (state: {})", self.fsm.state());
        }

        info!(
            "[SESSION] Opening TCP connection to {}:{}",
            self.config.host, self.config.port
        );
        if !self.open_socket().await? {
            warn!("[SESSION] Connection rejected");
            self.advance(SessionEvent::Rejected);
            return Ok(self.fsm.state());
        }
        self.advance(SessionEvent::SocketConnected);

        if !self.request_prompt().await? {
            warn!("[SESSION] Modem refused to enter send mode");
            self.advance(SessionEvent::Rejected);
            return Ok(self.fsm.state());
        }
        sleep(Duration::from_millis(timing::STEP_SETTLE_MS)).await;

        let accepted = match self.config.role {
            Role::PullClient => self.pull_handshake().await?,
            Role::PushSource => self.push_handshake().await?,
        };

        if accepted {
            info!("[SESSION] Session established ({:?})", self.config.role);
            self.advance(SessionEvent::Accepted);
        } else {
            self.advance(SessionEvent::Rejected);
        }
        Ok(self.fsm.state())
    }

    async fn open_socket(&mut self) -> Result<bool> {
        let command = codec::socket_open_command(&self.config.host, self.config.port);
        self.transport.send(command.as_bytes()).await?;

        let policy = self.config.timing.socket_open;
        let window = Duration::from_millis(timing::DEFAULT_RESPONSE_TIMEOUT_MS);
        let mut polls = 0;

        loop {
            if self.transport.readable()? > 0 {
                let reply = self
                    .transport
                    .read_response(timing::SOCKET_RESPONSE_CAPACITY, window)
                    .await?;
                if reply.contains(CONNECT_OK_TOKEN) {
                    info!("[SESSION] TCP connection open");
                    return Ok(true);
                }
                if reply.contains(ERROR_TOKEN) || reply.contains(CONNECT_FAIL_TOKEN) {
                    debug!("[SESSION] Socket refused: {:?}", reply.text());
                    return Ok(false);
                }
            }

            polls += 1;
            if !wait(&policy, polls).await {
                warn!("[SESSION] No connection after {} checks", polls);
                return Ok(false);
            }
        }
    }

    /// `AT+CIPSEND` without a length; payload is ended by Ctrl-Z
    async fn request_prompt(&mut self) -> Result<bool> {
        let tx = Transaction::new("AT+CIPSEND\r\n")
            .until(PROMPT_TOKEN)
            .capacity(timing::PROMPT_RESPONSE_CAPACITY);
        let response = self
            .transport
            .transact_within(&tx, self.config.timing.prompt_read_attempts)
            .await?;
        Ok(response.is_matched())
    }

    async fn pull_handshake(&mut self) -> Result<bool> {
        let request = codec::client_request(
            &self.config.mountpoint,
            self.config.username.as_deref(),
            self.config.password.as_deref(),
        )?;

        info!("[SESSION] Requesting mount point {}", self.config.mountpoint);
        self.transport.send(&request).await?;
        self.transport.send(&[CTRL_Z]).await?;
        self.advance(SessionEvent::HandshakeWritten);

        self.await_greeting().await
    }

    /// Wait for the caster's answer to the GET request.
    ///
    /// Replies carrying neither the greeting nor an error (a source table for
    /// an unknown mount point, say) keep the loop going.
    async fn await_greeting(&mut self) -> Result<bool> {
        let policy = self.config.timing.greeting;
        let tx = Transaction::new("")
            .until(GREETING_TOKEN)
            .timeout_ms(timing::GREETING_TIMEOUT_MS)
            .capacity(timing::GREETING_RESPONSE_CAPACITY);
        let mut polls = 0;

        loop {
            if self.transport.readable()? > 0 {
                let response = self.transport.collect(&tx).await?;
                match response.outcome {
                    Outcome::Matched => {
                        info!("[SESSION] Caster accepted the request");
                        return Ok(true);
                    }
                    Outcome::Rejected => {
                        warn!("[SESSION] Caster rejected the request");
                        return Ok(false);
                    }
                    Outcome::TimedOut => {
                        debug!("[SESSION] Unexpected caster reply: {:?}", response.text());
                    }
                }
            }

            polls += 1;
            if !wait(&policy, polls).await {
                warn!("[SESSION] No caster greeting after {} checks", polls);
                return Ok(false);
            }
        }
    }

    async fn push_handshake(&mut self) -> Result<bool> {
        let password = self.config.password.as_deref().unwrap_or_default();
        let request = codec::source_request(password, &self.config.mountpoint, &self.config.info)?;

        info!("[SESSION] Publishing to mount point {}", self.config.mountpoint);
        self.transport.send(&request).await?;
        if self.config.timing.duplicate_source_request {
            sleep(Duration::from_millis(timing::SOURCE_REPEAT_DELAY_MS)).await;
            self.transport.send(&request).await?;
        }
        self.transport.send(&[CTRL_Z]).await?;
        self.advance(SessionEvent::HandshakeWritten);

        // Casters send nothing back to a source before data flows
        Ok(true)
    }

    fn advance(&mut self, event: SessionEvent) {
        match self.fsm.process_event(event) {
            TransitionResult::Success(state) => debug!("[SESSION] -> {}", state),
            TransitionResult::Invalid { from, event } => {
                warn!("[SESSION] Ignoring {:?} in state {}", event, from)
            }
        }
    }
}

/// Sleep before the next check unless the policy is used up
async fn wait(policy: &PollPolicy, polls: u32) -> bool {
    if !policy.allows(polls) {
        return false;
    }
    sleep(policy.interval).await;
    true
}
