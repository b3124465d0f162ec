use crate::presentation::app::ProbeApp;
use crate::presentation::components::Components;
use crate::presentation::theme::BrutalistPalette;
use eframe::egui;
use egui::text::{CCursor, CCursorRange};

pub fn render(app: &mut ProbeApp, ui: &mut egui::Ui) {
    Components::heading(ui, "BLE MTU Probe");
    ui.add_space(20.0);

    ui_probe_panel(app, ui);
    ui.add_space(15.0);

    ui_status_panel(app, ui);
    ui.add_space(15.0);

    ui_scan_panel(app, ui);
}

fn ui_probe_panel(app: &mut ProbeApp, ui: &mut egui::Ui) {
    let palette = BrutalistPalette::new(app.is_dark_mode);

    let target = app.address.address().map(|address| address.to_string());

    Components::card(ui, "MTU Check", target.as_deref(), |ui| {
        Components::state_banner(ui, &palette, app.session_state);

        ui.add_space(10.0);

        ui.horizontal(|ui| {
            ui.label("Address:");
            address_field(app, ui);
            if app.address.is_complete {
                ui.label(egui::RichText::new("✔").color(palette.accent_green));
            }
        });

        ui.horizontal(|ui| {
            if ui
                .add_enabled(app.can_probe(), egui::Button::new("Check MTU"))
                .clicked()
            {
                app.start_probe();
            }

            if app.is_probing {
                if ui.button("Cancel").clicked() {
                    app.cancel_probe();
                }
                ui.spinner();
            }
        });
    });
}

/// Single-line field whose content and caret come from the address formatter
fn address_field(app: &mut ProbeApp, ui: &mut egui::Ui) {
    let mut text = app.address.formatted.clone();
    let output = egui::TextEdit::singleline(&mut text)
        .id_salt("address_input")
        .hint_text("00:11:22:AA:BB:CC")
        .font(egui::TextStyle::Monospace)
        .desired_width(200.0)
        .interactive(!app.is_probing)
        .show(ui);

    if !output.response.changed() {
        return;
    }

    let cursor = output
        .cursor_range
        .map(|range| range.primary.ccursor.index)
        .unwrap_or_else(|| text.chars().count());
    app.address.apply(&text, cursor);

    let mut state = output.state;
    state
        .cursor
        .set_char_range(Some(CCursorRange::one(CCursor::new(app.address.cursor))));
    state.store(ui.ctx(), output.response.id);
}

fn ui_status_panel(app: &mut ProbeApp, ui: &mut egui::Ui) {
    let Some(msg) = app.status_message.clone() else {
        return;
    };
    let palette = BrutalistPalette::new(app.is_dark_mode);

    Components::card(ui, "Status", None, |ui| {
        ui.label(
            egui::RichText::new(&msg.message)
                .color(palette.severity_color(msg.severity))
                .strong(),
        );

        let failed = app.outcome.map_or(false, |outcome| outcome.is_error());
        if failed && cfg!(windows) {
            ui.add_space(10.0);
            if ui.button("Bluetooth Settings").clicked() {
                let _ = std::process::Command::new("explorer")
                    .arg("ms-settings:bluetooth")
                    .spawn();
            }
        }
    });
}

fn ui_scan_panel(app: &mut ProbeApp, ui: &mut egui::Ui) {
    let found = match app.scanned_devices.len() {
        0 => None,
        n => Some(format!("{} found", n)),
    };

    Components::card(ui, "Nearby Devices", found.as_deref(), |ui| {
        ui.horizontal(|ui| {
            if app.is_scanning {
                if ui.button("Stop Scan").clicked() {
                    app.stop_scan();
                }
                ui.spinner();
            } else if ui.button("Scan nearby").clicked() {
                app.start_scan();
            }
        });

        if app.scanned_devices.is_empty() {
            return;
        }

        ui.separator();
        let mut picked = None;
        egui::ScrollArea::vertical()
            .id_salt("scan_results")
            .max_height(160.0)
            .show(ui, |ui| {
                for device in &app.scanned_devices {
                    ui.horizontal(|ui| {
                        ui.monospace(device.address.to_string());
                        ui.label(format!("{} ({} dBm)", device.name, device.signal_strength));
                        if ui
                            .add_enabled(!app.is_probing, egui::Button::new("Pick"))
                            .clicked()
                        {
                            picked = Some(device.clone());
                        }
                    });
                }
            });

        if let Some(device) = picked {
            app.pick_device(&device);
        }
    });
}
