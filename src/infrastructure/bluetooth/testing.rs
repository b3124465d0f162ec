//! Test doubles for the Bluetooth collaborators

use crate::domain::address::BluetoothAddress;
use crate::domain::error::TransportError;
use crate::domain::models::{AppEvent, ScannedDevice};
use crate::infrastructure::bluetooth::{
    AdapterControl, AdapterState, ConnectionHandle, GattTransport, NotificationSink,
    TransportKind, TransportNotification,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(BluetoothAddress),
    RequestMtu(u16),
    DiscoverServices,
    Close(ConnectionHandle),
}

/// Records every call and answers MTU requests from a script (default: accept)
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    mtu_answers: Mutex<VecDeque<bool>>,
    sink: Mutex<Option<NotificationSink>>,
    refuse_connect: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing_connect() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }

    pub fn with_mtu_answers(self, answers: impl IntoIterator<Item = bool>) -> Self {
        *self.mtu_answers.lock().unwrap() = answers.into_iter().collect();
        self
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requested_mtus(&self) -> Vec<u16> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::RequestMtu(mtu) => Some(mtu),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, TransportCall::Close(_)))
            .count()
    }

    /// Deliver a notification as the platform would
    pub fn notify(&self, notification: TransportNotification) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            let _ = sink.send(notification);
        }
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl GattTransport for RecordingTransport {
    fn connect(
        &self,
        address: BluetoothAddress,
        _kind: TransportKind,
        notifications: NotificationSink,
    ) -> std::result::Result<ConnectionHandle, TransportError> {
        self.record(TransportCall::Connect(address));
        if self.refuse_connect {
            return Err(TransportError::ConnectRefused("scripted".into()));
        }
        *self.sink.lock().unwrap() = Some(notifications);
        Ok(ConnectionHandle(1))
    }

    fn request_mtu(&self, _handle: ConnectionHandle, mtu: u16) -> bool {
        self.record(TransportCall::RequestMtu(mtu));
        self.mtu_answers.lock().unwrap().pop_front().unwrap_or(true)
    }

    fn discover_services(&self, _handle: ConnectionHandle) -> bool {
        self.record(TransportCall::DiscoverServices);
        true
    }

    fn close(&self, handle: ConnectionHandle) {
        self.record(TransportCall::Close(handle));
    }
}

/// Adapter with a fixed radio state that records what it was asked to do
pub struct ScriptedAdapter {
    state: Mutex<AdapterState>,
    enable_succeeds: bool,
    pub found: Vec<ScannedDevice>,
    requests: Mutex<Vec<&'static str>>,
}

impl ScriptedAdapter {
    pub fn new(state: AdapterState) -> Self {
        Self {
            state: Mutex::new(state),
            enable_succeeds: true,
            found: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing_enable(mut self) -> Self {
        self.enable_succeeds = false;
        self
    }

    pub fn requests(&self) -> Vec<&'static str> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdapterControl for ScriptedAdapter {
    async fn state(&self) -> AdapterState {
        self.requests.lock().unwrap().push("state");
        *self.state.lock().unwrap()
    }

    async fn request_enable(&self) -> Result<bool> {
        self.requests.lock().unwrap().push("enable");
        if self.enable_succeeds {
            *self.state.lock().unwrap() = AdapterState::Enabled;
        }
        Ok(self.enable_succeeds)
    }

    async fn request_discoverable(&self, _duration: Duration) -> Result<()> {
        self.requests.lock().unwrap().push("discoverable");
        Ok(())
    }

    async fn start_scan(
        &self,
        _window: Duration,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Result<()> {
        self.requests.lock().unwrap().push("scan");
        for device in &self.found {
            let _ = events.send(AppEvent::DeviceFound(device.clone()));
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.requests.lock().unwrap().push("stop_scan");
        Ok(())
    }
}
