//! Modem State Machines
//!
//! Defines valid bring-up and session transitions. Bring-up only moves
//! forward; FatalHalt is terminal and needs an external restart.

use std::fmt;

/// Bring-up progress of the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringupState {
    PoweredOff,
    AwaitingHandshake,
    SimChecked,
    ModeSelected,
    PriorSessionClosed,
    SignalAdequate,
    Attached,
    FatalHalt,
}

impl fmt::Display for BringupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BringupState::PoweredOff => "powered off",
            BringupState::AwaitingHandshake => "awaiting handshake",
            BringupState::SimChecked => "SIM checked",
            BringupState::ModeSelected => "mode selected",
            BringupState::PriorSessionClosed => "prior session closed",
            BringupState::SignalAdequate => "signal adequate",
            BringupState::Attached => "attached",
            BringupState::FatalHalt => "fatal halt",
        };
        f.write_str(name)
    }
}

/// Events that drive the bring-up forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BringupEvent {
    /// Power sequence finished, modem is booting
    PoweredOn,
    /// Modem answered the handshake probe
    HandshakeAcknowledged,
    /// SIM reported ready
    SimReady,
    /// Radio mode step finished (successfully or not)
    ModeStepDone,
    /// Teardown step finished (successfully or not)
    TeardownDone,
    /// Signal quality reached the threshold
    SignalAdequate,
    /// Packet service attached and registered
    ServiceAttached,
    /// A fatal step failed
    Fatal,
}

/// Result of a transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult<S, E> {
    /// Transition was valid and state changed
    Success(S),
    /// Transition was invalid from current state
    Invalid { from: S, event: E },
}

/// Forward-only bring-up state machine
#[derive(Debug)]
pub struct BringupStateMachine {
    current_state: BringupState,
}

impl Default for BringupStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl BringupStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: BringupState::PoweredOff,
        }
    }

    pub fn state(&self) -> BringupState {
        self.current_state
    }

    pub fn is_halted(&self) -> bool {
        self.current_state == BringupState::FatalHalt
    }

    /// Process an event and return the transition result
    pub fn process_event(
        &mut self,
        event: BringupEvent,
    ) -> TransitionResult<BringupState, BringupEvent> {
        match self.get_next_state(&event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn get_next_state(&self, event: &BringupEvent) -> Option<BringupState> {
        use BringupEvent::*;
        use BringupState::*;

        match (self.current_state, event) {
            // Nothing leaves FatalHalt
            (FatalHalt, _) => None,

            (_, Fatal) => Some(FatalHalt),

            (PoweredOff, PoweredOn) => Some(AwaitingHandshake),
            // Modem already powered: the handshake alone is enough
            (PoweredOff | AwaitingHandshake, HandshakeAcknowledged) => Some(AwaitingHandshake),
            (AwaitingHandshake, SimReady) => Some(SimChecked),
            (SimChecked, ModeStepDone) => Some(ModeSelected),
            (ModeSelected, TeardownDone) => Some(PriorSessionClosed),
            (PriorSessionClosed, BringupEvent::SignalAdequate) => {
                Some(BringupState::SignalAdequate)
            }
            (BringupState::SignalAdequate, ServiceAttached) => Some(Attached),

            _ => None,
        }
    }
}

/// Progress of the raw socket session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    SocketClosed,
    SocketOpen,
    HandshakeSent,
    SessionEstablished,
    HandshakeFailed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::SocketClosed => "socket closed",
            SessionState::SocketOpen => "socket open",
            SessionState::HandshakeSent => "handshake sent",
            SessionState::SessionEstablished => "session established",
            SessionState::HandshakeFailed => "handshake failed",
        };
        f.write_str(name)
    }
}

/// Events that drive the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Modem reported the TCP socket connected
    SocketConnected,
    /// Handshake payload written to the socket
    HandshakeWritten,
    /// Caster accepted the handshake (or none is expected)
    Accepted,
    /// Modem or caster rejected the attempt
    Rejected,
    /// Socket dropped or caller starts over
    Reset,
}

/// Session state machine shared by both roles
#[derive(Debug)]
pub struct SessionStateMachine {
    current_state: SessionState,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: SessionState::SocketClosed,
        }
    }

    pub fn state(&self) -> SessionState {
        self.current_state
    }

    pub fn is_established(&self) -> bool {
        self.current_state == SessionState::SessionEstablished
    }

    /// Process an event and return the transition result
    pub fn process_event(
        &mut self,
        event: SessionEvent,
    ) -> TransitionResult<SessionState, SessionEvent> {
        match self.get_next_state(&event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn get_next_state(&self, event: &SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self.current_state, event) {
            (_, Reset) => Some(SocketClosed),

            (SocketClosed, SocketConnected) => Some(SocketOpen),
            (SocketOpen, HandshakeWritten) => Some(HandshakeSent),
            (HandshakeSent, Accepted) => Some(SessionEstablished),

            (SocketClosed | SocketOpen | HandshakeSent, Rejected) => Some(HandshakeFailed),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance_to_attached(fsm: &mut BringupStateMachine) {
        for event in [
            BringupEvent::PoweredOn,
            BringupEvent::HandshakeAcknowledged,
            BringupEvent::SimReady,
            BringupEvent::ModeStepDone,
            BringupEvent::TeardownDone,
            BringupEvent::SignalAdequate,
            BringupEvent::ServiceAttached,
        ] {
            assert!(matches!(fsm.process_event(event), TransitionResult::Success(_)));
        }
    }

    #[test]
    fn test_initial_state() {
        let fsm = BringupStateMachine::new();
        assert_eq!(fsm.state(), BringupState::PoweredOff);
        assert!(!fsm.is_halted());
    }

    #[test]
    fn test_full_bringup_flow() {
        let mut fsm = BringupStateMachine::new();
        advance_to_attached(&mut fsm);
        assert_eq!(fsm.state(), BringupState::Attached);
    }

    #[test]
    fn test_skipping_steps_is_invalid() {
        let mut fsm = BringupStateMachine::new();
        fsm.process_event(BringupEvent::PoweredOn);

        // Can't attach before the SIM is checked
        let result = fsm.process_event(BringupEvent::ServiceAttached);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), BringupState::AwaitingHandshake);
    }

    #[test]
    fn test_fatal_is_terminal() {
        let mut fsm = BringupStateMachine::new();
        fsm.process_event(BringupEvent::PoweredOn);

        let result = fsm.process_event(BringupEvent::Fatal);
        assert_eq!(result, TransitionResult::Success(BringupState::FatalHalt));
        assert!(fsm.is_halted());

        for event in [BringupEvent::PoweredOn, BringupEvent::SimReady, BringupEvent::Fatal] {
            let result = fsm.process_event(event);
            assert!(matches!(result, TransitionResult::Invalid { .. }));
            assert_eq!(fsm.state(), BringupState::FatalHalt);
        }
    }

    #[test]
    fn test_already_powered_modem() {
        let mut fsm = BringupStateMachine::new();
        let result = fsm.process_event(BringupEvent::HandshakeAcknowledged);
        assert_eq!(result, TransitionResult::Success(BringupState::AwaitingHandshake));
        let result = fsm.process_event(BringupEvent::SimReady);
        assert_eq!(result, TransitionResult::Success(BringupState::SimChecked));
    }

    #[test]
    fn test_attached_cannot_attach_again() {
        let mut fsm = BringupStateMachine::new();
        advance_to_attached(&mut fsm);
        let result = fsm.process_event(BringupEvent::ServiceAttached);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
    }

    #[test]
    fn test_session_pull_flow() {
        let mut fsm = SessionStateMachine::new();
        fsm.process_event(SessionEvent::SocketConnected);
        fsm.process_event(SessionEvent::HandshakeWritten);
        assert_eq!(fsm.state(), SessionState::HandshakeSent);

        let result = fsm.process_event(SessionEvent::Accepted);
        assert_eq!(result, TransitionResult::Success(SessionState::SessionEstablished));
        assert!(fsm.is_established());
    }

    #[test]
    fn test_session_rejection_and_reset() {
        let mut fsm = SessionStateMachine::new();
        fsm.process_event(SessionEvent::SocketConnected);
        fsm.process_event(SessionEvent::Rejected);
        assert_eq!(fsm.state(), SessionState::HandshakeFailed);

        // Failed sessions only leave through a reset
        let result = fsm.process_event(SessionEvent::SocketConnected);
        assert!(matches!(result, TransitionResult::Invalid { .. }));

        fsm.process_event(SessionEvent::Reset);
        assert_eq!(fsm.state(), SessionState::SocketClosed);
    }

    #[test]
    fn test_session_cannot_accept_before_handshake() {
        let mut fsm = SessionStateMachine::new();
        fsm.process_event(SessionEvent::SocketConnected);
        let result = fsm.process_event(SessionEvent::Accepted);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), SessionState::SocketOpen);
    }
}
