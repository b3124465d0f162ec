use crate::domain::address::EditState;
use crate::domain::error::ProbeError;
use crate::domain::models::{
    AppEvent, MessageSeverity, ProbeCommand, ScannedDevice, StatusMessage, Tab,
};
use crate::domain::negotiation::{NegotiationState, ProbeOutcome};
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::{BluetoothBackend, ProbeService};
use crate::infrastructure::logging::{init_logger, LoggingGuard};
use eframe::egui;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub struct ProbeApp {
    pub(crate) settings: SettingsService,

    // Bluetooth worker
    pub(crate) command_tx: mpsc::UnboundedSender<ProbeCommand>,
    pub(crate) event_rx: mpsc::UnboundedReceiver<AppEvent>,

    // Probe
    pub(crate) address: EditState,
    pub(crate) is_probing: bool,
    pub(crate) session_state: Option<NegotiationState>,
    pub(crate) outcome: Option<ProbeOutcome>,
    pub(crate) status_message: Option<StatusMessage>,

    // Scanning
    pub(crate) is_scanning: bool,
    pub(crate) scanned_devices: Vec<ScannedDevice>,

    // UI
    pub(crate) selected_tab: Tab,
    pub(crate) is_dark_mode: bool,

    pub(crate) _logging_guard: Option<LoggingGuard>,
}

impl ProbeApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        crate::presentation::theme::configure_neubrutalism(&cc.egui_ctx, false);

        let settings = SettingsService::new().unwrap_or_else(|e| {
            eprintln!("No config directory ({}), using ./settings.json", e);
            SettingsService::with_path(PathBuf::from("settings.json"))
        });

        let logging_guard = init_logger(&settings.get().log_settings)
            .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
            .ok();

        info!("Starting BLE MTU Probe");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let config = settings.get().probe_config();

        std::thread::Builder::new()
            .name("bluetooth".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create tokio runtime for Bluetooth: {}", e);
                        let _ = event_tx.send(AppEvent::LogMessage(StatusMessage::new(
                            format!("Bluetooth worker failed to start: {}", e),
                            MessageSeverity::Error,
                        )));
                        return;
                    }
                };

                rt.block_on(async move {
                    let backend = BluetoothBackend::platform_default();
                    ProbeService::new(backend, event_tx, config)
                        .run(command_rx)
                        .await;
                });
            })
            .map_err(|e| error!("Failed to spawn Bluetooth worker: {}", e))
            .ok();

        let mut app = Self::from_parts(settings, command_tx, event_rx);
        app._logging_guard = logging_guard;
        app
    }

    /// App state around already wired channels
    pub(crate) fn from_parts(
        settings: SettingsService,
        command_tx: mpsc::UnboundedSender<ProbeCommand>,
        event_rx: mpsc::UnboundedReceiver<AppEvent>,
    ) -> Self {
        let address = settings
            .get()
            .last_address
            .as_deref()
            .map(EditState::with_text)
            .unwrap_or_default();

        Self {
            settings,
            command_tx,
            event_rx,
            address,
            is_probing: false,
            session_state: None,
            outcome: None,
            status_message: None,
            is_scanning: false,
            scanned_devices: Vec::new(),
            selected_tab: Tab::Probe,
            is_dark_mode: false,
            _logging_guard: None,
        }
    }

    pub(crate) fn can_probe(&self) -> bool {
        self.address.is_complete && !self.is_probing
    }

    /// Hand the current address to the worker
    pub(crate) fn start_probe(&mut self) {
        let Some(address) = self.address.address() else {
            return;
        };
        if self.is_probing {
            return;
        }

        if self.command_tx.send(ProbeCommand::Probe(address)).is_err() {
            self.status_message = Some(StatusMessage::new(
                "Bluetooth worker is not running",
                MessageSeverity::Error,
            ));
            return;
        }

        self.is_probing = true;
        self.outcome = None;
        self.session_state = Some(NegotiationState::Idle);
        self.status_message = Some(StatusMessage::new(
            format!("Checking {}...", address),
            MessageSeverity::Info,
        ));

        if let Err(e) = self.settings.remember_address(&address.to_string()) {
            warn!("Could not remember address: {}", e);
        }
    }

    pub(crate) fn cancel_probe(&mut self) {
        let _ = self.command_tx.send(ProbeCommand::Cancel);
    }

    pub(crate) fn start_scan(&mut self) {
        self.scanned_devices.clear();
        if self.command_tx.send(ProbeCommand::StartScan).is_ok() {
            self.is_scanning = true;
        }
    }

    pub(crate) fn stop_scan(&mut self) {
        self.is_scanning = false;
        let _ = self.command_tx.send(ProbeCommand::StopScan);
    }

    /// Put a scanned address into the field as if it had been typed
    pub(crate) fn pick_device(&mut self, device: &ScannedDevice) {
        let text = device.address.to_string();
        self.address.apply(&text, text.chars().count());
    }

    /// Push edited settings to the worker and to disk
    pub(crate) fn save_settings(&mut self) {
        let config = self.settings.get().probe_config();
        let _ = self.command_tx.send(ProbeCommand::UpdateConfig(config));

        self.status_message = Some(match self.settings.save() {
            Ok(()) => StatusMessage::new("Settings saved", MessageSeverity::Success),
            Err(e) => {
                let err = ProbeError::Settings(format!(
                    "{} ({})",
                    e,
                    self.settings.path().display()
                ));
                error!("{}", err);
                StatusMessage::new(err.to_string(), MessageSeverity::Error)
            }
        });
    }

    pub(crate) fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::SessionState(state) => self.session_state = Some(state),
            AppEvent::ProbeFinished(outcome) => {
                self.is_probing = false;
                self.status_message = Some(StatusMessage::new(
                    outcome.to_string(),
                    MessageSeverity::from(&outcome),
                ));
                self.outcome = Some(outcome);
            }
            AppEvent::ProbeAborted(msg) => {
                self.is_probing = false;
                self.session_state = None;
                self.status_message = Some(msg);
            }
            AppEvent::DeviceFound(device) => {
                if let Some(existing) = self
                    .scanned_devices
                    .iter_mut()
                    .find(|d| d.address == device.address)
                {
                    existing.signal_strength = device.signal_strength;
                    if existing.name == "Unknown" {
                        existing.name = device.name;
                    }
                } else {
                    self.scanned_devices.push(device);
                }
            }
            AppEvent::ScanFinished => self.is_scanning = false,
            AppEvent::LogMessage(msg) => {
                // Keep the result visible once a probe has finished
                if self.is_probing || self.outcome.is_none() {
                    self.status_message = Some(msg);
                }
            }
        }
    }
}

impl eframe::App for ProbeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
        }

        if self.is_probing || self.is_scanning {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(std::time::Duration::from_millis(250));
        }

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.selectable_value(&mut self.selected_tab, Tab::Probe, "Probe");
                ui.selectable_value(&mut self.selected_tab, Tab::Settings, "Settings");

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let switch_icon = if self.is_dark_mode {
                        "☀ Light"
                    } else {
                        "🌙 Dark"
                    };
                    if ui.button(switch_icon).clicked() {
                        self.is_dark_mode = !self.is_dark_mode;
                        crate::presentation::theme::configure_neubrutalism(ctx, self.is_dark_mode);
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.set_max_width(640.0);
                    ui.add_space(20.0);

                    use crate::presentation::tabs;
                    match self.selected_tab {
                        Tab::Probe => tabs::probe::render(self, ui),
                        Tab::Settings => tabs::settings::render(self, ui),
                    }

                    ui.add_space(50.0);
                });
            });
        });
    }
}
