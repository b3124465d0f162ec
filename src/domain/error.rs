//! Error types for the probe flow
//!
//! Terminal negotiation results are not errors, see
//! [`crate::domain::negotiation::FailureReason`]. These cover everything that
//! stops a probe before a session exists.

use thiserror::Error;

/// Errors raised while preparing or starting a probe
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Address is not a complete `XX:XX:XX:XX:XX:XX` value
    #[error("Invalid device address: {0:?}")]
    InvalidAddress(String),

    /// No Bluetooth hardware on this machine
    #[error("Your device doesn't support Bluetooth :(")]
    AdapterUnavailable,

    /// Adapter exists but the radio is off
    #[error("Please enable Bluetooth")]
    AdapterDisabled,

    /// A previous probe has not reached a terminal state yet
    #[error("A probe is already running")]
    SessionBusy,

    /// Settings could not be read or written
    #[error("Settings error: {0}")]
    Settings(String),
}

/// Errors reported synchronously by a GATT transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connect call itself was refused
    #[error("Connection request refused: {0}")]
    ConnectRefused(String),

    /// Underlying platform API failed
    #[error("Platform Bluetooth error: {0}")]
    Platform(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            ProbeError::AdapterUnavailable.to_string(),
            "Your device doesn't support Bluetooth :("
        );
        assert_eq!(
            ProbeError::AdapterDisabled.to_string(),
            "Please enable Bluetooth"
        );
    }

    #[test]
    fn test_transport_error_messages() {
        assert_eq!(
            TransportError::ConnectRefused("busy".into()).to_string(),
            "Connection request refused: busy"
        );
        assert_eq!(
            TransportError::Platform("E_ACCESSDENIED".into()).to_string(),
            "Platform Bluetooth error: E_ACCESSDENIED"
        );
    }
}
