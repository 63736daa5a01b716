//! Cellular modem driver
//!
//! [`Modem`] owns the single command transport and the two state machines.
//! Each component borrows the transport mutably for the duration of its
//! work, so two transactions can never be in flight at once.

mod bringup;
mod channel;
mod config;
mod session;

pub use bringup::{BringupReport, NetworkBringup};
pub use channel::DataChannel;
pub use config::{ModemConfig, PollPolicy, RadioMode, Role, Timing};
pub use session::SessionEstablisher;

use crate::power::PowerControl;
use crate::transport::{CommandTransport, Transaction, TransportStream};
use anyhow::{bail, Result};
use ntrip_shared::{
    BringupState, BringupStateMachine, SessionEvent, SessionState, SessionStateMachine,
};
use tracing::info;

/// A SIM7000-class modem reached over one byte stream
pub struct Modem<S> {
    transport: CommandTransport<S>,
    config: ModemConfig,
    bringup: BringupStateMachine,
    session: SessionStateMachine,
}

impl<S: TransportStream> Modem<S> {
    pub fn new(stream: S, config: ModemConfig) -> Self {
        Self {
            transport: CommandTransport::new(stream),
            config,
            bringup: BringupStateMachine::new(),
            session: SessionStateMachine::new(),
        }
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn bringup_state(&self) -> BringupState {
        self.bringup.state()
    }

    #[cfg(test)]
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Power the modem up and attach it to the packet service
    pub async fn bring_up<P: PowerControl + ?Sized>(&mut self, power: &mut P) -> Result<BringupReport> {
        self.network().run(power).await
    }

    /// Individual bring-up steps, for maintenance commands
    pub fn network(&mut self) -> NetworkBringup<'_, S> {
        NetworkBringup::new(&mut self.transport, &self.config, &mut self.bringup)
    }

    /// Open the socket and complete the role's handshake
    pub async fn establish_session(&mut self) -> Result<SessionState> {
        if self.bringup.state() != BringupState::Attached {
            bail!("Modem not attached (state: {})", self.bringup.state());
        }
        SessionEstablisher::new(&mut self.transport, &self.config, &mut self.session)
            .establish()
            .await
    }

    /// Data operations; only available on an established session
    pub fn data_channel(&mut self) -> Result<DataChannel<'_, S>> {
        if !self.session.is_established() {
            bail!("No session established (state: {})", self.session.state());
        }
        Ok(DataChannel::new(&mut self.transport, &self.config))
    }

    /// Close whatever is left of the socket so a new session can be opened
    pub async fn reset_session(&mut self) -> Result<()> {
        // The socket may already be gone; the reply does not matter
        let close = Transaction::new("AT+CIPCLOSE\r\n").until("CLOSE OK");
        self.transport.transact(&close).await?;

        self.session.process_event(SessionEvent::Reset);
        info!("[SESSION] Session reset");
        Ok(())
    }

    /// Release the underlying stream
    pub async fn shutdown(&mut self) -> Result<()> {
        self.transport.shutdown().await
    }
}
