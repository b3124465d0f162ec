//! MTU answers for platforms that run the ATT MTU exchange on their own.
//!
//! Such a platform only exposes the negotiated PDU size of the link, and that
//! value is meaningless until the exchange has finished. Requests arriving
//! before then are parked until the platform reports a new size or the settle
//! timeout fires. Every request is answered with the value the link actually
//! carries, capped at the candidate: `min(candidate, negotiated)`.

use crate::infrastructure::bluetooth::{GattStatus, NotificationSink, TransportNotification};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// ATT MTU every LE link starts with before an exchange
pub const ATT_DEFAULT_MTU: u16 = 23;

/// How long to wait for the platform's exchange before trusting the current size
pub const PDU_SETTLE_TIMEOUT: Duration = Duration::from_secs(3);

struct ExchangeState {
    max_pdu: u16,
    settled: bool,
    pending: Option<u16>,
}

/// Per-link bridge between MTU requests and platform PDU size updates
pub struct PduExchange {
    sink: NotificationSink,
    state: Mutex<ExchangeState>,
}

impl PduExchange {
    /// A size above the ATT default means the exchange already happened.
    pub fn new(sink: NotificationSink, current_max_pdu: u16) -> Self {
        Self {
            sink,
            state: Mutex::new(ExchangeState {
                max_pdu: current_max_pdu,
                settled: current_max_pdu > ATT_DEFAULT_MTU,
                pending: None,
            }),
        }
    }

    /// Answer `candidate` now if the exchange is done, otherwise park it.
    /// Returns whether the answer was sent right away.
    pub fn request(&self, candidate: u16) -> bool {
        let mut state = self.lock();
        if state.settled {
            self.answer(candidate, state.max_pdu);
            true
        } else {
            debug!("MTU {} parked until the PDU size settles", candidate);
            state.pending = Some(candidate);
            false
        }
    }

    /// Platform reported a new negotiated PDU size.
    pub fn size_changed(&self, max_pdu: u16) {
        let mut state = self.lock();
        debug!("PDU size changed {} -> {}", state.max_pdu, max_pdu);
        state.max_pdu = max_pdu;
        state.settled = true;
        if let Some(candidate) = state.pending.take() {
            self.answer(candidate, max_pdu);
        }
    }

    /// No size change arrived in time; the current size is final.
    pub fn settle(&self, current_max_pdu: u16) {
        let mut state = self.lock();
        if state.settled && state.pending.is_none() {
            return;
        }
        state.max_pdu = current_max_pdu;
        state.settled = true;
        if let Some(candidate) = state.pending.take() {
            debug!("No PDU size change, settling on {}", current_max_pdu);
            self.answer(candidate, current_max_pdu);
        }
    }

    pub fn is_settled(&self) -> bool {
        self.lock().settled
    }

    fn answer(&self, candidate: u16, max_pdu: u16) {
        let _ = self.sink.send(TransportNotification::MtuChanged {
            mtu: candidate.min(max_pdu),
            status: GattStatus::SUCCESS,
        });
    }

    fn lock(&self) -> MutexGuard<'_, ExchangeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::address::BluetoothAddress;
    use crate::domain::error::TransportError;
    use crate::domain::negotiation::{NegotiationState, ProbeOutcome};
    use crate::infrastructure::bluetooth::{
        ConnectionHandle, GattTransport, LinkState, ProbeSession, TransportKind,
    };
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Transport whose link reports a fixed PDU size, answered through [`PduExchange`]
    struct PduSizeTransport {
        initial_pdu: u16,
        exchange: Mutex<Option<Arc<PduExchange>>>,
        requested: Mutex<Vec<u16>>,
    }

    impl PduSizeTransport {
        fn new(initial_pdu: u16) -> Self {
            Self {
                initial_pdu,
                exchange: Mutex::new(None),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn exchange(&self) -> Arc<PduExchange> {
            self.exchange.lock().unwrap().clone().unwrap()
        }
    }

    impl GattTransport for PduSizeTransport {
        fn connect(
            &self,
            _address: BluetoothAddress,
            _kind: TransportKind,
            notifications: NotificationSink,
        ) -> Result<ConnectionHandle, TransportError> {
            *self.exchange.lock().unwrap() =
                Some(Arc::new(PduExchange::new(notifications, self.initial_pdu)));
            Ok(ConnectionHandle(1))
        }

        fn request_mtu(&self, _handle: ConnectionHandle, mtu: u16) -> bool {
            self.requested.lock().unwrap().push(mtu);
            self.exchange().request(mtu);
            true
        }

        fn discover_services(&self, _handle: ConnectionHandle) -> bool {
            true
        }

        fn close(&self, _handle: ConnectionHandle) {}
    }

    struct Link {
        session: ProbeSession,
        transport: Arc<PduSizeTransport>,
        notifications: mpsc::UnboundedReceiver<TransportNotification>,
    }

    impl Link {
        fn connect(initial_mtu: u16, initial_pdu: u16) -> Self {
            let transport = Arc::new(PduSizeTransport::new(initial_pdu));
            let (events, _) = mpsc::unbounded_channel();
            let (session, notifications) = ProbeSession::start(
                "AA:BB:CC:DD:EE:FF",
                initial_mtu,
                transport.clone(),
                events,
            )
            .unwrap();
            session.handle_notification(TransportNotification::ConnectionStateChanged {
                state: LinkState::Connected,
                status: GattStatus::SUCCESS,
            });
            Self {
                session,
                transport,
                notifications,
            }
        }

        fn deliver(&mut self) {
            while let Ok(notification) = self.notifications.try_recv() {
                self.session.handle_notification(notification);
            }
        }
    }

    #[test]
    fn test_reports_negotiated_size_not_candidate() {
        for pdu in [247, 185, 517] {
            let mut link = Link::connect(512, pdu);
            link.deliver();

            assert_eq!(
                link.session.outcome(),
                Some(ProbeOutcome::Succeeded { mtu: pdu.min(512) })
            );
            assert_eq!(*link.transport.requested.lock().unwrap(), vec![512]);
        }
    }

    #[test]
    fn test_small_candidate_is_not_inflated() {
        let mut link = Link::connect(100, 247);
        link.deliver();
        assert_eq!(link.session.state(), NegotiationState::Succeeded { mtu: 100 });
    }

    #[test]
    fn test_waits_for_exchange_before_answering() {
        let mut link = Link::connect(512, ATT_DEFAULT_MTU);
        link.deliver();

        // Default size alone must not end the session
        assert!(!link.session.is_terminal());
        assert!(!link.transport.exchange().is_settled());

        link.transport.exchange().size_changed(247);
        link.deliver();

        assert_eq!(link.session.state(), NegotiationState::Succeeded { mtu: 247 });
        assert_eq!(*link.transport.requested.lock().unwrap(), vec![512]);
    }

    #[test]
    fn test_settle_without_exchange_reports_att_default() {
        let mut link = Link::connect(512, ATT_DEFAULT_MTU);
        link.deliver();

        link.transport.exchange().settle(ATT_DEFAULT_MTU);
        link.deliver();

        assert_eq!(
            link.session.state(),
            NegotiationState::Succeeded {
                mtu: ATT_DEFAULT_MTU
            }
        );
    }

    #[test]
    fn test_settle_after_answer_is_noop() {
        let (sink, mut rx) = mpsc::unbounded_channel();
        let exchange = PduExchange::new(sink, 247);

        assert!(exchange.request(512));
        exchange.settle(23);

        assert_eq!(
            rx.try_recv().unwrap(),
            TransportNotification::MtuChanged {
                mtu: 247,
                status: GattStatus::SUCCESS
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
