//! Probe Service Module
//!
//! Runs on the Bluetooth worker thread. Checks the adapter before a probe,
//! opens the scan and discoverable windows, starts the [`ProbeSession`] and
//! arms the wall-clock ceiling that cancels it.

use crate::domain::address::BluetoothAddress;
use crate::domain::error::ProbeError;
use crate::domain::models::{AppEvent, MessageSeverity, ProbeCommand, StatusMessage};
use crate::domain::settings::ProbeConfig;
use crate::infrastructure::bluetooth::{AdapterState, BluetoothBackend, ProbeSession};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Coordinates adapter checks and the single live probe session
pub struct ProbeService {
    backend: BluetoothBackend,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    config: ProbeConfig,
    current: Option<ProbeSession>,
}

impl ProbeService {
    pub fn new(
        backend: BluetoothBackend,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            backend,
            event_sender,
            config,
            current: None,
        }
    }

    /// Process commands until the UI side hangs up
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ProbeCommand>) {
        while let Some(cmd) = commands.recv().await {
            match cmd {
                ProbeCommand::Probe(address) => {
                    if let Err(e) = self.probe(address).await {
                        error!("Probe of {} not started: {}", address, e);
                        let severity = match e {
                            ProbeError::AdapterDisabled | ProbeError::SessionBusy => {
                                MessageSeverity::Warning
                            }
                            _ => MessageSeverity::Error,
                        };
                        let _ = self
                            .event_sender
                            .send(AppEvent::ProbeAborted(StatusMessage::new(
                                e.to_string(),
                                severity,
                            )));
                    }
                }
                ProbeCommand::Cancel => self.cancel(),
                ProbeCommand::StartScan => {
                    if let Err(e) = self.start_scan().await {
                        error!("Failed to start scan: {}", e);
                        self.send_log(format!("Scan failed: {}", e), MessageSeverity::Error);
                        let _ = self.event_sender.send(AppEvent::ScanFinished);
                    }
                }
                ProbeCommand::StopScan => {
                    if let Err(e) = self.backend.adapter.stop_scan().await {
                        error!("Failed to stop scan: {}", e);
                    }
                }
                ProbeCommand::UpdateConfig(config) => {
                    info!("Probe configuration updated: {:?}", config);
                    self.config = config;
                }
            }
        }
        info!("Command channel closed, Bluetooth worker stopping");
    }

    /// Start a probe against `address`.
    ///
    /// Fails if the adapter is missing or stays off, or if the previous
    /// session has not finished yet.
    pub async fn probe(&mut self, address: BluetoothAddress) -> Result<ProbeSession, ProbeError> {
        if self.is_busy() {
            return Err(ProbeError::SessionBusy);
        }

        self.check_adapter().await?;

        // Neither window gates the negotiation
        if let Err(e) = self
            .backend
            .adapter
            .start_scan(self.config.scan_window, self.event_sender.clone())
            .await
        {
            warn!("LE scan could not be started: {}", e);
        }
        if let Some(window) = self.config.discoverable_window {
            if let Err(e) = self.backend.adapter.request_discoverable(window).await {
                warn!("Discoverable request failed: {}", e);
            }
        }

        let (session, notifications) = ProbeSession::start(
            &address.to_string(),
            self.config.initial_mtu,
            self.backend.transport.clone(),
            self.event_sender.clone(),
        )?;

        tokio::spawn(session.clone().run(notifications));
        self.arm_ceiling(&session);
        self.current = Some(session.clone());

        Ok(session)
    }

    pub fn cancel(&mut self) {
        if let Some(session) = &self.current {
            if !session.is_terminal() {
                info!("Cancelling probe of {}", session.address());
                session.cancel();
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current
            .as_ref()
            .map(|session| !session.is_terminal())
            .unwrap_or(false)
    }

    pub async fn start_scan(&self) -> anyhow::Result<()> {
        self.check_adapter().await?;
        self.backend
            .adapter
            .start_scan(self.config.scan_window, self.event_sender.clone())
            .await
    }

    async fn check_adapter(&self) -> Result<(), ProbeError> {
        match self.backend.adapter.state().await {
            AdapterState::Enabled => Ok(()),
            AdapterState::Unavailable => Err(ProbeError::AdapterUnavailable),
            AdapterState::Disabled => {
                self.send_log("Please enable Bluetooth", MessageSeverity::Warning);
                match self.backend.adapter.request_enable().await {
                    Ok(true) => {
                        info!("Bluetooth enabled, restarting the check");
                        // Whole flow again, without a second prompt
                        match self.backend.adapter.state().await {
                            AdapterState::Enabled => Ok(()),
                            _ => Err(ProbeError::AdapterDisabled),
                        }
                    }
                    Ok(false) => Err(ProbeError::AdapterDisabled),
                    Err(e) => {
                        warn!("Enable request failed: {}", e);
                        Err(ProbeError::AdapterDisabled)
                    }
                }
            }
        }
    }

    fn arm_ceiling(&self, session: &ProbeSession) {
        let session = session.clone();
        let ceiling = self.config.probe_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;
            if !session.is_terminal() {
                warn!("Probe still running after {:?}, cancelling", ceiling);
                session.cancel();
            }
        });
    }

    fn send_log(&self, message: impl Into<String>, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

impl Drop for ProbeService {
    fn drop(&mut self) {
        self.cancel();
    }
}
