mod domain;
mod infrastructure;
mod presentation;

use eframe::egui;
use presentation::app::ProbeApp;

fn main() -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 640.0])
            .with_min_inner_size([480.0, 420.0])
            .with_title("BLE MTU Probe"),
        ..Default::default()
    };

    eframe::run_native(
        "BLE MTU Probe",
        options,
        Box::new(|cc| Ok(Box::new(ProbeApp::new(cc)))),
    )
}
