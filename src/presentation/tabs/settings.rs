use crate::presentation::app::ProbeApp;
use crate::presentation::components::Components;
use eframe::egui;

pub fn render(app: &mut ProbeApp, ui: &mut egui::Ui) {
    Components::heading(ui, "Settings");
    ui.add_space(20.0);

    let mut save_requested = false;
    let mut toggle_theme = false;
    let is_dark_mode = app.is_dark_mode;
    let settings_path = app.settings.path().display().to_string();
    let settings_mut = app.settings.get_mut();

    Components::card(ui, "Negotiation", None, |ui| {
        egui::Grid::new("negotiation_grid")
            .spacing([20.0, 10.0])
            .show(ui, |ui| {
                ui.label("First MTU candidate:");
                ui.add(egui::DragValue::new(&mut settings_mut.initial_mtu).range(1..=517));
                ui.end_row();

                ui.label("Give up after (s):");
                ui.add(
                    egui::DragValue::new(&mut settings_mut.probe_timeout_secs).range(5..=600),
                );
                ui.end_row();
            });
        ui.label(
            egui::RichText::new("Rejected candidates are halved until the peer accepts one.")
                .italics()
                .size(12.0),
        );
    });

    ui.add_space(10.0);

    Components::card(ui, "Host Adapter", None, |ui| {
        ui.horizontal(|ui| {
            ui.label("Scan window (s):");
            ui.add(egui::DragValue::new(&mut settings_mut.scan_window_secs).range(1..=120));
        });
        ui.checkbox(
            &mut settings_mut.request_discoverable,
            "Advertise while probing",
        );
        if settings_mut.request_discoverable {
            ui.indent("discoverable_indent", |ui| {
                ui.horizontal(|ui| {
                    ui.label("Advertise for (s):");
                    ui.add(
                        egui::DragValue::new(&mut settings_mut.discoverable_secs).range(1..=300),
                    );
                });
            });
        }
    });

    ui.add_space(10.0);

    Components::card(ui, "Logging", None, |ui| {
        let log_settings = &mut settings_mut.log_settings;
        ui.horizontal(|ui| {
            ui.label("Verbosity Level:");
            egui::ComboBox::from_id_salt("log_level")
                .selected_text(&log_settings.level)
                .show_ui(ui, |ui| {
                    for level in ["trace", "debug", "info", "warn", "error"] {
                        ui.selectable_value(&mut log_settings.level, level.to_string(), level);
                    }
                });
        });

        ui.checkbox(&mut log_settings.console_logging_enabled, "Console Logs");
        ui.checkbox(&mut log_settings.file_logging_enabled, "File Logs");

        if log_settings.file_logging_enabled {
            ui.separator();
            Components::sub_heading(ui, "File Output");
            ui.indent("file_logs", |ui| {
                ui.horizontal(|ui| {
                    ui.label("Directory:");
                    ui.text_edit_singleline(&mut log_settings.log_dir);
                });
                ui.horizontal(|ui| {
                    ui.label("Rotation:");
                    egui::ComboBox::from_id_salt("log_rotation")
                        .selected_text(&log_settings.rotation)
                        .show_ui(ui, |ui| {
                            for rotation in ["daily", "hourly", "minutely", "never"] {
                                ui.selectable_value(
                                    &mut log_settings.rotation,
                                    rotation.to_string(),
                                    rotation,
                                );
                            }
                        });
                });
            });
        }
        ui.label(
            egui::RichText::new("Restart required for log changes.")
                .italics()
                .size(12.0),
        );
    });

    ui.add_space(10.0);

    Components::card(ui, "Appearance", None, |ui| {
        let mut dark = is_dark_mode;
        if ui.checkbox(&mut dark, "Dark theme").changed() {
            toggle_theme = true;
        }
    });

    ui.add_space(10.0);

    ui.horizontal(|ui| {
        if ui.button("Save Settings").clicked() {
            save_requested = true;
        }
        ui.label(egui::RichText::new(settings_path).size(12.0));
    });

    if toggle_theme {
        app.is_dark_mode = !app.is_dark_mode;
        crate::presentation::theme::configure_neubrutalism(ui.ctx(), app.is_dark_mode);
    }
    if save_requested {
        app.save_settings();
    }
}
