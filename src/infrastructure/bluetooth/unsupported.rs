//! Fallback collaborators for platforms without a Bluetooth backend.
//!
//! The adapter reports itself unavailable, so the host stops at the
//! pre-flight check and tells the user Bluetooth is not supported.

use crate::domain::address::BluetoothAddress;
use crate::domain::error::TransportError;
use crate::domain::models::AppEvent;
use crate::infrastructure::bluetooth::{
    AdapterControl, AdapterState, ConnectionHandle, GattTransport, NotificationSink,
    TransportKind,
};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct NoAdapter;

#[async_trait]
impl AdapterControl for NoAdapter {
    async fn state(&self) -> AdapterState {
        AdapterState::Unavailable
    }

    async fn request_enable(&self) -> Result<bool> {
        Ok(false)
    }

    async fn request_discoverable(&self, _duration: Duration) -> Result<()> {
        anyhow::bail!("No Bluetooth backend on this platform")
    }

    async fn start_scan(
        &self,
        _window: Duration,
        _events: mpsc::UnboundedSender<AppEvent>,
    ) -> Result<()> {
        anyhow::bail!("No Bluetooth backend on this platform")
    }

    async fn stop_scan(&self) -> Result<()> {
        Ok(())
    }
}

pub struct NoTransport;

impl GattTransport for NoTransport {
    fn connect(
        &self,
        address: BluetoothAddress,
        _kind: TransportKind,
        _notifications: NotificationSink,
    ) -> Result<ConnectionHandle, TransportError> {
        Err(TransportError::ConnectRefused(format!(
            "no Bluetooth backend to reach {}",
            address
        )))
    }

    fn request_mtu(&self, _handle: ConnectionHandle, _mtu: u16) -> bool {
        false
    }

    fn discover_services(&self, _handle: ConnectionHandle) -> bool {
        false
    }

    fn close(&self, _handle: ConnectionHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_adapter_is_unavailable() {
        assert_eq!(NoAdapter.state().await, AdapterState::Unavailable);
        assert!(!NoAdapter.request_enable().await.unwrap());
    }

    #[test]
    fn test_no_transport_refuses_connect() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let address = BluetoothAddress::from_u64(0x0011_2233_4455);
        assert!(NoTransport
            .connect(address, TransportKind::LowEnergy, tx)
            .is_err());
    }
}
