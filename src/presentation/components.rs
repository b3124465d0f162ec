use crate::domain::negotiation::NegotiationState;
use crate::presentation::theme::BrutalistPalette;
use eframe::egui;

pub struct Components;

impl Components {
    pub fn heading(ui: &mut egui::Ui, text: &str) {
        ui.label(egui::RichText::new(text).heading().strong());
    }

    pub fn sub_heading(ui: &mut egui::Ui, text: &str) {
        ui.label(egui::RichText::new(text).strong().size(16.0));
    }

    /// Framed section. `tag` is drawn monospace at the right of the title row,
    /// e.g. the target address or the number of devices found.
    pub fn card<R>(
        ui: &mut egui::Ui,
        title: &str,
        tag: Option<&str>,
        add_contents: impl FnOnce(&mut egui::Ui) -> R,
    ) -> R {
        let visuals = &ui.style().visuals.widgets.noninteractive;
        let frame = egui::Frame::none()
            .inner_margin(egui::Margin::same(15.0))
            .stroke(visuals.bg_stroke)
            .fill(visuals.bg_fill);

        frame
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(title).strong().size(18.0));
                    if let Some(tag) = tag {
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            ui.label(egui::RichText::new(tag).monospace().strong());
                        });
                    }
                });
                ui.add_space(8.0);
                add_contents(ui)
            })
            .inner
    }

    /// Full-width banner for the negotiation state, `None` before any probe
    pub fn state_banner(
        ui: &mut egui::Ui,
        palette: &BrutalistPalette,
        state: Option<NegotiationState>,
    ) {
        let (label, bg, fg) = palette.session_banner(state);
        let text = egui::RichText::new(label)
            .color(fg)
            .background_color(bg)
            .size(16.0)
            .strong();
        let label = egui::Label::new(text).wrap_mode(egui::TextWrapMode::Extend);
        ui.add_sized([ui.available_width(), 35.0], label);
    }
}
