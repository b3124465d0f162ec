//! Probe Session Driver
//!
//! Owns one [`Negotiator`] and the connection handle it controls. Transport
//! notifications and host cancellation both go through the same mutex, so
//! transitions are applied one at a time no matter which thread delivers them.

use crate::domain::address::BluetoothAddress;
use crate::domain::error::ProbeError;
use crate::domain::models::{AppEvent, MessageSeverity, StatusMessage};
use crate::domain::negotiation::{
    Effect, NegotiationEvent, NegotiationState, Negotiator, ProbeOutcome,
};
use crate::infrastructure::bluetooth::{
    ConnectionHandle, GattTransport, LinkState, TransportKind, TransportNotification,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

struct SessionInner {
    address: BluetoothAddress,
    negotiator: Negotiator,
    handle: Option<ConnectionHandle>,
    transport: Arc<dyn GattTransport>,
    events: mpsc::UnboundedSender<AppEvent>,
    outcome: Option<ProbeOutcome>,
}

/// A running (or finished) MTU probe against one device
#[derive(Clone)]
pub struct ProbeSession {
    inner: Arc<Mutex<SessionInner>>,
    finished: Arc<Notify>,
}

impl ProbeSession {
    /// Parse `address` and ask the transport for an LE connection.
    ///
    /// A malformed address fails without creating a session. A transport
    /// that refuses the connect call yields a session that is already
    /// `Failed`. The returned receiver must be handed to [`ProbeSession::run`].
    pub fn start(
        address: &str,
        initial_mtu: u16,
        transport: Arc<dyn GattTransport>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportNotification>), ProbeError> {
        let address: BluetoothAddress = address.parse()?;
        let (sink, notifications) = mpsc::unbounded_channel();

        let session = Self {
            inner: Arc::new(Mutex::new(SessionInner {
                address,
                negotiator: Negotiator::new(initial_mtu),
                handle: None,
                transport: transport.clone(),
                events,
                outcome: None,
            })),
            finished: Arc::new(Notify::new()),
        };

        {
            let mut inner = session.lock();
            session.apply(&mut inner, NegotiationEvent::Start);

            info!("Connecting to {} over LE", address);
            match transport.connect(address, TransportKind::LowEnergy, sink) {
                Ok(handle) => {
                    debug!("Transport allocated connection {}", handle);
                    inner.handle = Some(handle);
                }
                Err(e) => {
                    warn!("Connect to {} refused: {}", address, e);
                    session.apply(&mut inner, NegotiationEvent::ConnectFailed);
                }
            }
        }

        Ok((session, notifications))
    }

    /// Pump transport notifications into the session until it finishes.
    pub async fn run(self, mut notifications: mpsc::UnboundedReceiver<TransportNotification>) {
        loop {
            if self.is_terminal() {
                break;
            }
            tokio::select! {
                notification = notifications.recv() => match notification {
                    Some(notification) => self.handle_notification(notification),
                    None => {
                        warn!("Transport dropped the notification channel");
                        self.dispatch(NegotiationEvent::Disconnected);
                        break;
                    }
                },
                _ = self.finished.notified() => break,
            }
        }
        debug!("Probe session pump stopped ({})", self.state());
    }

    pub fn handle_notification(&self, notification: TransportNotification) {
        let event = match notification {
            TransportNotification::ConnectionStateChanged { state, status } => {
                debug!("Connection state {:?} (status {:?})", state, status);
                match state {
                    LinkState::Connected => NegotiationEvent::Connected,
                    LinkState::Disconnected => NegotiationEvent::Disconnected,
                }
            }
            TransportNotification::ServicesDiscovered { status } => {
                if !status.is_success() {
                    warn!("Service discovery returned status {:?}", status);
                }
                NegotiationEvent::ServicesDiscovered {
                    success: status.is_success(),
                }
            }
            TransportNotification::MtuChanged { mtu, status } => {
                info!("MTU result {} (status {:?})", mtu, status);
                NegotiationEvent::MtuChanged {
                    mtu,
                    success: status.is_success(),
                }
            }
            TransportNotification::CharacteristicRead { status } => {
                debug!("Characteristic read: {:?}", status);
                return;
            }
            TransportNotification::CharacteristicWrite { status } => {
                debug!("Characteristic write: {:?}", status);
                return;
            }
        };

        self.dispatch(event);
    }

    /// Abort the probe. Takes effect before this returns; anything the
    /// transport still delivers for this session is discarded.
    pub fn cancel(&self) {
        self.dispatch(NegotiationEvent::Cancel);
    }

    pub fn address(&self) -> BluetoothAddress {
        self.lock().address
    }

    pub fn state(&self) -> NegotiationState {
        self.lock().negotiator.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn requested_mtu(&self) -> Option<u16> {
        self.lock().negotiator.requested_mtu()
    }

    pub fn accepted_mtu(&self) -> Option<u16> {
        self.lock().negotiator.accepted_mtu()
    }

    pub fn backoff_steps(&self) -> u32 {
        self.lock().negotiator.backoff_steps()
    }

    pub fn outcome(&self) -> Option<ProbeOutcome> {
        self.lock().outcome
    }

    fn dispatch(&self, event: NegotiationEvent) {
        let mut inner = self.lock();
        self.apply(&mut inner, event);
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the machine and carry out its effects. Synchronous MTU request
    /// refusals are fed back in as further events.
    fn apply(&self, inner: &mut SessionInner, event: NegotiationEvent) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let transition = inner.negotiator.handle(event);
            if !transition.applied {
                debug!("{}", transition.status);
                continue;
            }

            let state = inner.negotiator.state();
            info!("[{}] {}", inner.address, transition.status);
            let _ = inner.events.send(AppEvent::SessionState(state));

            for effect in transition.effects {
                match effect {
                    Effect::RequestMtu(mtu) => {
                        let accepted = inner
                            .handle
                            .map(|handle| inner.transport.request_mtu(handle, mtu))
                            .unwrap_or(false);
                        if !accepted {
                            warn!("Request for MTU {} was rejected", mtu);
                            pending.push_back(NegotiationEvent::MtuRequestRejected);
                            break;
                        }
                    }
                    Effect::DiscoverServices => {
                        let started = inner
                            .handle
                            .map(|handle| inner.transport.discover_services(handle))
                            .unwrap_or(false);
                        info!("Attempting to start service discovery: {}", started);
                    }
                    Effect::Close => {
                        if let Some(handle) = inner.handle.take() {
                            debug!("Closing connection {}", handle);
                            inner.transport.close(handle);
                        }
                    }
                    Effect::Finish(outcome) => {
                        inner.outcome = Some(outcome);
                        let severity = MessageSeverity::from(&outcome);
                        let _ = inner.events.send(AppEvent::LogMessage(StatusMessage::new(
                            outcome.to_string(),
                            severity,
                        )));
                        let _ = inner.events.send(AppEvent::ProbeFinished(outcome));
                        self.finished.notify_one();
                    }
                }
            }

            if !state.is_terminal() {
                let _ = inner.events.send(AppEvent::LogMessage(StatusMessage::new(
                    transition.status,
                    MessageSeverity::Info,
                )));
            }
        }
    }
}
