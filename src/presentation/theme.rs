use crate::domain::models::MessageSeverity;
use crate::domain::negotiation::{FailureReason, NegotiationState};
use eframe::egui::{self, Color32, Rounding, Stroke};

/// Flat high-contrast colors, one set per theme
pub struct BrutalistPalette {
    pub bg: Color32,
    pub fg: Color32,
    pub stroke: Color32,
    pub accent_yellow: Color32,
    pub accent_green: Color32,
    pub accent_cyan: Color32,
    pub accent_red: Color32,
    pub muted: Color32,
}

impl BrutalistPalette {
    pub fn new(is_dark: bool) -> Self {
        if is_dark {
            Self {
                bg: Color32::from_rgb(25, 25, 25),
                fg: Color32::WHITE,
                stroke: Color32::WHITE,
                accent_yellow: Color32::from_rgb(255, 200, 0),
                accent_green: Color32::from_rgb(0, 255, 127),
                accent_cyan: Color32::from_rgb(0, 255, 255),
                accent_red: Color32::from_rgb(255, 80, 80),
                muted: Color32::from_gray(90),
            }
        } else {
            Self {
                bg: Color32::from_rgb(245, 245, 245),
                fg: Color32::BLACK,
                stroke: Color32::BLACK,
                accent_yellow: Color32::from_rgb(255, 220, 0),
                accent_green: Color32::from_rgb(0, 220, 100),
                accent_cyan: Color32::from_rgb(0, 200, 255),
                accent_red: Color32::from_rgb(255, 50, 50),
                muted: Color32::from_gray(110),
            }
        }
    }

    /// Banner label and (background, text) colors for a session state.
    /// `None` means no probe has run yet.
    pub fn session_banner(&self, state: Option<NegotiationState>) -> (String, Color32, Color32) {
        match state {
            None | Some(NegotiationState::Idle) => {
                ("READY".to_string(), self.muted, Color32::WHITE)
            }
            Some(NegotiationState::Connecting) => {
                ("CONNECTING...".to_string(), self.accent_yellow, Color32::BLACK)
            }
            Some(NegotiationState::ServiceDiscovery) => (
                "DISCOVERING SERVICES...".to_string(),
                self.accent_yellow,
                Color32::BLACK,
            ),
            Some(NegotiationState::NegotiatingMtu) => (
                "NEGOTIATING MTU...".to_string(),
                self.accent_cyan,
                Color32::BLACK,
            ),
            Some(NegotiationState::Succeeded { mtu }) => {
                (format!("MTU {}", mtu), self.accent_green, Color32::BLACK)
            }
            Some(NegotiationState::Failed(FailureReason::Cancelled)) => {
                ("CANCELLED".to_string(), self.muted, Color32::WHITE)
            }
            Some(NegotiationState::Failed(reason)) => {
                let label = match reason {
                    FailureReason::Unsupported => "NOT SUPPORTED",
                    FailureReason::RequestRejected => "REQUEST REJECTED",
                    FailureReason::NegotiationExhausted => "NO MTU ACCEPTED",
                    FailureReason::ConnectionLost => "CONNECTION LOST",
                    FailureReason::Cancelled => "CANCELLED",
                };
                (label.to_string(), self.accent_red, Color32::WHITE)
            }
        }
    }

    pub fn severity_color(&self, severity: MessageSeverity) -> Color32 {
        match severity {
            MessageSeverity::Info => self.fg,
            MessageSeverity::Success => Color32::from_rgb(0, 150, 0),
            MessageSeverity::Warning => Color32::from_rgb(200, 150, 0),
            MessageSeverity::Error => self.accent_red,
        }
    }
}

fn flat(widget: &mut egui::style::WidgetVisuals, stroke: Stroke, fill: Color32, fg: Color32) {
    widget.bg_stroke = stroke;
    widget.rounding = Rounding::ZERO;
    widget.bg_fill = fill;
    widget.fg_stroke = Stroke::new(1.0, fg);
}

pub fn configure_neubrutalism(ctx: &egui::Context, is_dark: bool) {
    let mut style = (*ctx.style()).clone();
    let palette = BrutalistPalette::new(is_dark);

    for (text_style, font_id) in style.text_styles.iter_mut() {
        font_id.size = match text_style {
            egui::TextStyle::Heading => 26.0,
            egui::TextStyle::Body | egui::TextStyle::Button => 15.0,
            egui::TextStyle::Monospace => 16.0,
            _ => font_id.size,
        };
    }

    style.spacing.item_spacing = egui::vec2(12.0, 12.0);
    style.spacing.button_padding = egui::vec2(16.0, 10.0);

    let widgets = &mut style.visuals.widgets;
    let field = if is_dark {
        Color32::from_gray(30)
    } else {
        Color32::WHITE
    };
    flat(
        &mut widgets.noninteractive,
        Stroke::new(2.0, palette.stroke),
        palette.bg,
        palette.fg,
    );
    flat(
        &mut widgets.inactive,
        Stroke::new(2.0, palette.stroke),
        field,
        palette.fg,
    );
    flat(
        &mut widgets.hovered,
        Stroke::new(2.5, palette.stroke),
        palette.accent_yellow,
        Color32::BLACK,
    );
    widgets.hovered.expansion = 2.0;
    flat(
        &mut widgets.active,
        Stroke::new(3.0, palette.stroke),
        palette.accent_green,
        Color32::BLACK,
    );

    style.visuals.selection.stroke = Stroke::new(1.0, palette.stroke);
    style.visuals.selection.bg_fill = palette.accent_cyan;

    style.visuals.window_rounding = Rounding::ZERO;
    style.visuals.window_stroke = Stroke::new(2.0, palette.stroke);
    style.visuals.window_shadow = egui::Shadow {
        offset: egui::vec2(8.0, 8.0),
        blur: 0.0,
        spread: 0.0,
        color: palette.stroke,
    };
    style.visuals.window_fill = palette.bg;
    style.visuals.panel_fill = palette.bg;
    style.visuals.override_text_color = Some(palette.fg);

    ctx.set_style(style);
}
