//! MTU Negotiation State Machine
//!
//! Pure transition logic for one probe session. The machine never touches a
//! transport; it returns the [`Effect`]s the driver has to carry out, so every
//! scenario can be exercised without Bluetooth hardware.
//!
//! ```text
//! Idle ──Start──▶ Connecting ──Connected──▶ ServiceDiscovery ──▶ NegotiatingMtu
//!                     │                           │                   │
//!                     └───────────── Failed ◀─────┴───────────────────┤
//!                                                                     ▼
//!                                                                 Succeeded
//! ```

use std::fmt;

/// Default first candidate, large enough to probe capability in one step
pub const DEFAULT_INITIAL_MTU: u16 = 512;

/// Why a session ended without an accepted MTU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Unsupported,
    RequestRejected,
    NegotiationExhausted,
    ConnectionLost,
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unsupported => "Check failed, your device is probably not supported",
            Self::RequestRejected => "Check failed, the MTU request was rejected",
            Self::NegotiationExhausted => "Check failed, the peer rejected every MTU down to 1",
            Self::ConnectionLost => "Check failed, connection lost",
            Self::Cancelled => "Check cancelled",
        };
        f.write_str(text)
    }
}

/// Terminal result handed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Succeeded { mtu: u16 },
    Failed(FailureReason),
}

impl ProbeOutcome {
    /// Cancellation resets the UI rather than showing an error
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            Self::Succeeded { .. } | Self::Failed(FailureReason::Cancelled)
        )
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { mtu } => write!(f, "Bluetooth MTU max size: {}", mtu),
            Self::Failed(reason) => reason.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Connecting,
    ServiceDiscovery,
    NegotiatingMtu,
    Succeeded { mtu: u16 },
    Failed(FailureReason),
}

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed(_))
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::ServiceDiscovery => write!(f, "service discovery"),
            Self::NegotiatingMtu => write!(f, "negotiating MTU"),
            Self::Succeeded { mtu } => write!(f, "succeeded ({})", mtu),
            Self::Failed(reason) => write!(f, "failed ({:?})", reason),
        }
    }
}

/// Inputs to the machine, already decoded from transport notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationEvent {
    /// Connect request was handed to the transport
    Start,
    /// Transport refused the connect call synchronously
    ConnectFailed,
    Connected,
    Disconnected,
    ServicesDiscovered { success: bool },
    /// Transport refused the last MTU request synchronously
    MtuRequestRejected,
    MtuChanged { mtu: u16, success: bool },
    Cancel,
}

/// Work the driver performs after a transition, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    RequestMtu(u16),
    DiscoverServices,
    Close,
    Finish(ProbeOutcome),
}

/// Output of one transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub status: String,
    pub effects: Vec<Effect>,
    /// False when the event was ignored (late notification, terminal state)
    pub applied: bool,
}

impl Transition {
    fn applied(status: impl Into<String>, effects: Vec<Effect>) -> Self {
        Self {
            status: status.into(),
            effects,
            applied: true,
        }
    }

    fn ignored(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            effects: Vec::new(),
            applied: false,
        }
    }
}

/// State machine for a single probe
#[derive(Debug, Clone)]
pub struct Negotiator {
    state: NegotiationState,
    initial_mtu: u16,
    requested_mtu: Option<u16>,
    accepted_mtu: Option<u16>,
    backoff_steps: u32,
}

impl Negotiator {
    pub fn new(initial_mtu: u16) -> Self {
        Self {
            state: NegotiationState::Idle,
            initial_mtu: initial_mtu.max(1),
            requested_mtu: None,
            accepted_mtu: None,
            backoff_steps: 0,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn requested_mtu(&self) -> Option<u16> {
        self.requested_mtu
    }

    pub fn accepted_mtu(&self) -> Option<u16> {
        self.accepted_mtu
    }

    /// Number of halvings performed so far
    pub fn backoff_steps(&self) -> u32 {
        self.backoff_steps
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply one event and return the resulting effects.
    pub fn handle(&mut self, event: NegotiationEvent) -> Transition {
        use NegotiationEvent as E;
        use NegotiationState as S;

        if self.state.is_terminal() {
            return Transition::ignored(format!(
                "Session already finished ({}), ignoring {:?}",
                self.state, event
            ));
        }

        match (self.state, event) {
            (S::Idle, E::Start) => {
                self.state = S::Connecting;
                Transition::applied("Connecting to device...", Vec::new())
            }
            (S::Idle, E::Cancel) => self.fail_without_connection(FailureReason::Cancelled),
            (S::Idle, _) => Transition::ignored(format!("Not started, ignoring {:?}", event)),

            (S::Connecting, E::ConnectFailed) => {
                self.fail_without_connection(FailureReason::Unsupported)
            }
            (S::Connecting, E::Connected) => {
                self.state = S::ServiceDiscovery;
                self.requested_mtu = Some(self.initial_mtu);
                Transition::applied(
                    format!("Connected, requesting MTU {}", self.initial_mtu),
                    vec![Effect::RequestMtu(self.initial_mtu), Effect::DiscoverServices],
                )
            }

            (_, E::Cancel) => self.fail(FailureReason::Cancelled),
            (_, E::Disconnected) => self.fail(FailureReason::ConnectionLost),

            (S::ServiceDiscovery | S::NegotiatingMtu, E::MtuRequestRejected) => {
                self.fail(FailureReason::RequestRejected)
            }
            (S::ServiceDiscovery | S::NegotiatingMtu, E::ServicesDiscovered { success }) => {
                self.state = S::NegotiatingMtu;
                if success {
                    Transition::applied("Services discovered", Vec::new())
                } else {
                    Transition::applied(
                        "Service discovery failed, continuing MTU negotiation",
                        Vec::new(),
                    )
                }
            }
            (S::ServiceDiscovery | S::NegotiatingMtu, E::MtuChanged { mtu, success }) => {
                self.state = S::NegotiatingMtu;
                if success {
                    self.accept(mtu)
                } else {
                    self.back_off(mtu)
                }
            }

            (state, event) => Transition::ignored(format!("Ignoring {:?} while {}", event, state)),
        }
    }

    fn accept(&mut self, mtu: u16) -> Transition {
        let outcome = ProbeOutcome::Succeeded { mtu };
        self.accepted_mtu = Some(mtu);
        self.state = NegotiationState::Succeeded { mtu };
        Transition::applied(
            outcome.to_string(),
            vec![Effect::Close, Effect::Finish(outcome)],
        )
    }

    fn back_off(&mut self, reported: u16) -> Transition {
        let previous = self.requested_mtu.unwrap_or(self.initial_mtu);
        let next = previous / 2;
        self.backoff_steps += 1;

        if next == 0 {
            let mut transition = self.fail(FailureReason::NegotiationExhausted);
            transition.status = format!(
                "MTU {} rejected (peer reported {}), no smaller candidate left. {}",
                previous, reported, transition.status
            );
            return transition;
        }

        self.requested_mtu = Some(next);
        Transition::applied(
            format!("MTU {} rejected, retrying with {}", previous, next),
            vec![Effect::RequestMtu(next)],
        )
    }

    fn fail(&mut self, reason: FailureReason) -> Transition {
        let outcome = ProbeOutcome::Failed(reason);
        self.state = NegotiationState::Failed(reason);
        Transition::applied(
            outcome.to_string(),
            vec![Effect::Close, Effect::Finish(outcome)],
        )
    }

    fn fail_without_connection(&mut self, reason: FailureReason) -> Transition {
        let outcome = ProbeOutcome::Failed(reason);
        self.state = NegotiationState::Failed(reason);
        Transition::applied(outcome.to_string(), vec![Effect::Finish(outcome)])
    }
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_MTU)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NegotiationEvent as E;

    fn connected() -> Negotiator {
        let mut negotiator = Negotiator::default();
        negotiator.handle(E::Start);
        let transition = negotiator.handle(E::Connected);
        assert_eq!(
            transition.effects,
            vec![Effect::RequestMtu(512), Effect::DiscoverServices]
        );
        negotiator
    }

    fn rejected(mtu: u16) -> NegotiationEvent {
        E::MtuChanged {
            mtu,
            success: false,
        }
    }

    #[test]
    fn test_backoff_until_accepted() {
        let mut negotiator = connected();

        let t = negotiator.handle(rejected(512));
        assert_eq!(t.effects, vec![Effect::RequestMtu(256)]);
        let t = negotiator.handle(rejected(256));
        assert_eq!(t.effects, vec![Effect::RequestMtu(128)]);
        let t = negotiator.handle(E::MtuChanged {
            mtu: 128,
            success: true,
        });

        assert_eq!(
            t.effects,
            vec![
                Effect::Close,
                Effect::Finish(ProbeOutcome::Succeeded { mtu: 128 })
            ]
        );
        assert_eq!(negotiator.state(), NegotiationState::Succeeded { mtu: 128 });
        assert_eq!(negotiator.accepted_mtu(), Some(128));
        assert_eq!(negotiator.backoff_steps(), 2);
    }

    #[test]
    fn test_backoff_exhausted() {
        let mut negotiator = connected();
        let mut requested = vec![512];

        loop {
            let current = negotiator.requested_mtu().unwrap();
            let t = negotiator.handle(rejected(current));
            match t.effects.as_slice() {
                [Effect::RequestMtu(next)] => requested.push(*next),
                [Effect::Close, Effect::Finish(outcome)] => {
                    assert_eq!(
                        *outcome,
                        ProbeOutcome::Failed(FailureReason::NegotiationExhausted)
                    );
                    break;
                }
                other => panic!("unexpected effects {:?}", other),
            }
        }

        assert_eq!(requested, vec![512, 256, 128, 64, 32, 16, 8, 4, 2, 1]);
        assert!(negotiator.backoff_steps() <= 10);
        assert!(negotiator.is_terminal());
    }

    #[test]
    fn test_backoff_halves_requested_not_reported() {
        let mut negotiator = connected();
        let t = negotiator.handle(rejected(23));
        assert_eq!(t.effects, vec![Effect::RequestMtu(256)]);
    }

    #[test]
    fn test_disconnect_while_negotiating() {
        let mut negotiator = connected();
        negotiator.handle(E::ServicesDiscovered { success: true });
        assert_eq!(negotiator.state(), NegotiationState::NegotiatingMtu);

        let t = negotiator.handle(E::Disconnected);
        assert_eq!(
            t.effects,
            vec![
                Effect::Close,
                Effect::Finish(ProbeOutcome::Failed(FailureReason::ConnectionLost))
            ]
        );

        let late = negotiator.handle(E::MtuChanged {
            mtu: 256,
            success: true,
        });
        assert!(!late.applied);
        assert!(late.effects.is_empty());
        assert_eq!(
            negotiator.state(),
            NegotiationState::Failed(FailureReason::ConnectionLost)
        );
    }

    #[test]
    fn test_disconnect_before_connected() {
        let mut negotiator = Negotiator::default();
        negotiator.handle(E::Start);
        let t = negotiator.handle(E::Disconnected);
        assert_eq!(
            t.effects.last(),
            Some(&Effect::Finish(ProbeOutcome::Failed(
                FailureReason::ConnectionLost
            )))
        );
    }

    #[test]
    fn test_connect_refused_has_nothing_to_close() {
        let mut negotiator = Negotiator::default();
        negotiator.handle(E::Start);
        let t = negotiator.handle(E::ConnectFailed);
        assert_eq!(
            t.effects,
            vec![Effect::Finish(ProbeOutcome::Failed(
                FailureReason::Unsupported
            ))]
        );
    }

    #[test]
    fn test_initial_request_rejected() {
        let mut negotiator = connected();
        let t = negotiator.handle(E::MtuRequestRejected);
        assert_eq!(
            t.effects,
            vec![
                Effect::Close,
                Effect::Finish(ProbeOutcome::Failed(FailureReason::RequestRejected))
            ]
        );
    }

    #[test]
    fn test_discovery_failure_is_not_fatal() {
        let mut negotiator = connected();
        let t = negotiator.handle(E::ServicesDiscovered { success: false });
        assert!(t.effects.is_empty());
        assert_eq!(negotiator.state(), NegotiationState::NegotiatingMtu);

        let t = negotiator.handle(E::MtuChanged {
            mtu: 512,
            success: true,
        });
        assert_eq!(
            t.effects.last(),
            Some(&Effect::Finish(ProbeOutcome::Succeeded { mtu: 512 }))
        );
    }

    #[test]
    fn test_cancel_is_terminal() {
        let mut negotiator = connected();
        let t = negotiator.handle(E::Cancel);
        assert_eq!(t.effects[0], Effect::Close);
        assert_eq!(
            negotiator.state(),
            NegotiationState::Failed(FailureReason::Cancelled)
        );
        assert!(negotiator.handle(E::Cancel).effects.is_empty());
    }

    #[test]
    fn test_mtu_result_before_connect_is_ignored() {
        let mut negotiator = Negotiator::default();
        negotiator.handle(E::Start);
        let t = negotiator.handle(E::MtuChanged {
            mtu: 512,
            success: true,
        });
        assert!(!t.applied);
        assert_eq!(negotiator.state(), NegotiationState::Connecting);
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(
            ProbeOutcome::Succeeded { mtu: 247 }.to_string(),
            "Bluetooth MTU max size: 247"
        );
        assert!(!ProbeOutcome::Failed(FailureReason::Cancelled).is_error());
        assert!(ProbeOutcome::Failed(FailureReason::ConnectionLost).is_error());
    }
}
