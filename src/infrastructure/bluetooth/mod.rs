//! Bluetooth Module
//!
//! Collaborator surface for the MTU probe and the session driver on top of it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      ProbeService                        │
//! │   (pre-flight checks, scan/discoverable windows)         │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌──────────────┐ ┌────────────┐ ┌──────────────┐
//! │AdapterControl│ │ProbeSession│ │ GattTransport│
//! │              │ │            │ │              │
//! │ - radio state│ │ - Negotiator│ │ - connect    │
//! │ - scan       │ │   behind a │ │ - request MTU│
//! │ - advertise  │ │   mutex    │ │ - close      │
//! └──────────────┘ └────────────┘ └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`pdu_exchange`] - MTU answers from a platform-negotiated PDU size
//! - [`probe`] - Session driver serializing notifications into the negotiator
//! - [`service`] - Probe coordinator used by the worker thread
//! - `winrt` - Windows implementation of both collaborator traits
//! - [`unsupported`] - Fallback for platforms without a backend

pub mod pdu_exchange;
pub mod probe;
pub mod service;
pub mod unsupported;

#[cfg(windows)]
pub mod scanner;
#[cfg(windows)]
pub mod winrt;

#[cfg(test)]
pub mod testing;

use crate::domain::address::BluetoothAddress;
use crate::domain::error::TransportError;
use crate::domain::models::AppEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub use probe::ProbeSession;
pub use service::ProbeService;

/// Opaque id of one open GATT link, allocated by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u64);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Link type requested from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    LowEnergy,
}

/// ATT status code carried by notifications, `0` is success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattStatus(pub u8);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0);
    pub const FAILURE: GattStatus = GattStatus(0x85);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Asynchronous notifications raised by the transport for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportNotification {
    ConnectionStateChanged { state: LinkState, status: GattStatus },
    ServicesDiscovered { status: GattStatus },
    MtuChanged { mtu: u16, status: GattStatus },
    CharacteristicRead { status: GattStatus },
    CharacteristicWrite { status: GattStatus },
}

pub type NotificationSink = mpsc::UnboundedSender<TransportNotification>;

/// GATT client transport.
///
/// Calls are synchronous and cheap so they can run under the session lock;
/// results arrive later on the [`NotificationSink`] passed to `connect`.
pub trait GattTransport: Send + Sync {
    fn connect(
        &self,
        address: BluetoothAddress,
        kind: TransportKind,
        notifications: NotificationSink,
    ) -> std::result::Result<ConnectionHandle, TransportError>;

    /// Whether the request was accepted for sending. The negotiated value is
    /// reported through [`TransportNotification::MtuChanged`].
    fn request_mtu(&self, handle: ConnectionHandle, mtu: u16) -> bool;

    fn discover_services(&self, handle: ConnectionHandle) -> bool;

    /// Must tolerate unknown or already closed handles.
    fn close(&self, handle: ConnectionHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// No Bluetooth hardware
    Unavailable,
    Disabled,
    Enabled,
}

/// Local adapter control used around a probe
#[async_trait]
pub trait AdapterControl: Send + Sync {
    async fn state(&self) -> AdapterState;

    /// Ask the platform to turn the radio on. `Ok(true)` once it is on.
    async fn request_enable(&self) -> Result<bool>;

    /// Make this device visible to peers for `duration`.
    async fn request_discoverable(&self, duration: Duration) -> Result<()>;

    /// Scan for LE advertisements for `window`, reporting each device found.
    async fn start_scan(
        &self,
        window: Duration,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;
}

/// The pair of collaborators the probe runs against
#[derive(Clone)]
pub struct BluetoothBackend {
    pub adapter: Arc<dyn AdapterControl>,
    pub transport: Arc<dyn GattTransport>,
}

impl BluetoothBackend {
    /// Backend for the current platform.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn platform_default() -> Self {
        #[cfg(windows)]
        {
            let runtime = tokio::runtime::Handle::current();
            Self {
                adapter: Arc::new(winrt::WinRtAdapter::new(runtime.clone())),
                transport: Arc::new(winrt::WinRtTransport::new(runtime)),
            }
        }
        #[cfg(not(windows))]
        {
            Self {
                adapter: Arc::new(unsupported::NoAdapter),
                transport: Arc::new(unsupported::NoTransport),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gatt_status() {
        assert!(GattStatus::SUCCESS.is_success());
        assert!(!GattStatus::FAILURE.is_success());
        assert!(!GattStatus(0x01).is_success());
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(ConnectionHandle(7).to_string(), "#7");
    }
}
