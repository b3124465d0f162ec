use crate::domain::address::BluetoothAddress;
use crate::domain::negotiation::{NegotiationState, ProbeOutcome};
use crate::domain::settings::ProbeConfig;

/// Commands from the UI thread to the Bluetooth worker
#[derive(Debug, Clone)]
pub enum ProbeCommand {
    Probe(BluetoothAddress),
    Cancel,
    StartScan,
    StopScan,
    UpdateConfig(ProbeConfig),
}

/// Events from the Bluetooth worker back to the UI thread
#[derive(Debug, Clone)]
pub enum AppEvent {
    SessionState(NegotiationState),
    ProbeFinished(ProbeOutcome),
    /// Pre-flight check stopped the probe before a session existed
    ProbeAborted(StatusMessage),
    DeviceFound(ScannedDevice),
    ScanFinished,
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDevice {
    pub name: String,
    pub address: BluetoothAddress,
    pub signal_strength: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

impl From<&ProbeOutcome> for MessageSeverity {
    fn from(outcome: &ProbeOutcome) -> Self {
        match outcome {
            ProbeOutcome::Succeeded { .. } => MessageSeverity::Success,
            outcome if outcome.is_error() => MessageSeverity::Error,
            _ => MessageSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Probe,
    Settings,
}
