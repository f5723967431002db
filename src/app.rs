//! Floating overlay widget (egui/eframe).
//!
//! # Architecture
//!
//! [`OverlayApp`] is the top-level [`eframe::App`].  It never decides
//! anything about sessions: it renders the [`SharedOverlay`] written by the
//! presenter and sends [`OrchestratorEvent`]s for the two buttons that act
//! (cancel, reload settings).
//!
//! # Widget states
//!
//! | Indicator | Visual |
//! |-----------|--------|
//! | `Hidden` | Hotkey hint, or the chat panel while it is visible |
//! | `Recording` | Mode label + elapsed timer in the accent colour |
//! | `Processing` | Spinner + mode label |
//! | `Speaking` | "Speaking..." + stop button |
//!
//! The last error, when there is one, is shown under the indicator until
//! the next recording starts.

use std::sync::Arc;
use std::time::Duration;

use eframe::egui::{self, Color32};
use tokio::sync::mpsc;

use crate::backend::Role;
use crate::config::{AppConfig, ModeConfig};
use crate::history::AnswerHistory;
use crate::orchestrator::OrchestratorEvent;
use crate::present::{Indicator, OverlayState, SharedOverlay};

// ---------------------------------------------------------------------------
// Colour schemes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScheme {
    pub name: &'static str,
    pub background: Color32,
    pub surface: Color32,
    pub accent: Color32,
    pub text: Color32,
}

const fn scheme(
    name: &'static str,
    background: [u8; 3],
    surface: [u8; 3],
    accent: [u8; 3],
    text: [u8; 3],
) -> ColorScheme {
    ColorScheme {
        name,
        background: Color32::from_rgb(background[0], background[1], background[2]),
        surface: Color32::from_rgb(surface[0], surface[1], surface[2]),
        accent: Color32::from_rgb(accent[0], accent[1], accent[2]),
        text: Color32::from_rgb(text[0], text[1], text[2]),
    }
}

/// Palettes selectable through `ui.color_scheme`.  The first is the default.
pub const COLOR_SCHEMES: &[ColorScheme] = &[
    scheme("Oceanic Zen", [18, 28, 38], [30, 46, 60], [86, 182, 194], [220, 232, 238]),
    scheme("Midnight", [20, 20, 28], [34, 34, 46], [130, 120, 255], [225, 225, 235]),
    scheme("Forest", [22, 30, 24], [36, 50, 40], [120, 200, 120], [220, 235, 220]),
    scheme("Ember", [32, 22, 20], [52, 34, 30], [255, 128, 64], [240, 225, 215]),
    scheme("Rose", [34, 24, 30], [54, 38, 48], [240, 120, 170], [240, 225, 232]),
    scheme("Slate", [30, 32, 36], [46, 50, 56], [150, 170, 190], [225, 228, 232]),
    scheme("Solar", [0, 43, 54], [7, 54, 66], [181, 137, 0], [238, 232, 213]),
    scheme("Mono", [24, 24, 24], [40, 40, 40], [200, 200, 200], [235, 235, 235]),
    scheme("Paper", [244, 241, 234], [230, 226, 216], [60, 110, 180], [40, 40, 40]),
];

/// Case-insensitive lookup; unknown names get the default palette.
pub fn scheme_by_name(name: &str) -> &'static ColorScheme {
    COLOR_SCHEMES
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
        .unwrap_or(&COLOR_SCHEMES[0])
}

const ERROR_COLOR: Color32 = Color32::from_rgb(255, 136, 68);
const RECORDING_COLOR: Color32 = Color32::from_rgb(255, 80, 80);

// ---------------------------------------------------------------------------
// OverlayApp
// ---------------------------------------------------------------------------

pub struct OverlayApp {
    overlay: SharedOverlay,
    history: Arc<AnswerHistory>,
    events: mpsc::Sender<OrchestratorEvent>,
    config: AppConfig,
    scheme: &'static ColorScheme,

    // ── UI state ─────────────────────────────────────────────────────────
    show_history: bool,
    /// Spinner animation phase (increases each frame).
    spinner_phase: f32,
}

impl OverlayApp {
    pub fn new(
        overlay: SharedOverlay,
        history: Arc<AnswerHistory>,
        events: mpsc::Sender<OrchestratorEvent>,
        config: AppConfig,
    ) -> Self {
        Self {
            overlay,
            history,
            events,
            scheme: scheme_by_name(&config.ui.color_scheme),
            config,
            show_history: false,
            spinner_phase: 0.0,
        }
    }

    fn auto_hide(&self) -> Duration {
        Duration::from_secs(self.config.ui.chat_auto_hide_secs)
    }

    fn send(&self, event: OrchestratorEvent) {
        if let Err(e) = self.events.try_send(event) {
            log::warn!("overlay could not reach the orchestrator: {e}");
        }
    }

    /// Re-read `settings.toml` and hand the result to the orchestrator.
    fn reload_settings(&mut self) {
        match AppConfig::load() {
            Ok(config) => {
                self.scheme = scheme_by_name(&config.ui.color_scheme);
                self.send(OrchestratorEvent::UpdateSettings(ModeConfig::from_app(&config)));
                self.config = config;
                log::info!("settings reloaded");
            }
            Err(e) => {
                log::warn!("settings reload failed: {e:#}");
                self.overlay
                    .update(|s| s.last_error = Some("Settings file is invalid".into()));
            }
        }
    }

    // ── Window sizing ────────────────────────────────────────────────────

    fn update_window_size(&self, ctx: &egui::Context, state: &OverlayState) {
        let height = if self.show_history {
            260.0
        } else if state.chat_visible(self.auto_hide()) {
            220.0
        } else if state.last_error.is_some() {
            80.0
        } else {
            match state.indicator {
                Indicator::Hidden => 50.0,
                _ => 70.0,
            }
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(egui::vec2(320.0, height)));
    }

    // ── Custom title bar ─────────────────────────────────────────────────

    fn draw_title_bar(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, state: &OverlayState) {
        ui.horizontal(|ui| {
            let dot = match state.indicator {
                Indicator::Recording { .. } => RECORDING_COLOR,
                Indicator::Hidden => self.scheme.surface,
                _ => self.scheme.accent,
            };
            ui.label(egui::RichText::new("●").color(dot));

            let title_resp = ui.label(
                egui::RichText::new("Voice Assistant")
                    .color(self.scheme.text)
                    .size(13.0),
            );
            if title_resp.is_pointer_button_down_on() {
                if let Some(outer_rect) = ctx.input(|i| i.viewport().outer_rect) {
                    let delta = ctx.input(|i| i.pointer.delta());
                    ctx.send_viewport_cmd(egui::ViewportCommand::OuterPosition(
                        outer_rect.min + delta,
                    ));
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if title_button(ui, "x", Color32::from_rgb(200, 100, 100)).clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
                if title_button(ui, "-", self.scheme.text).clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(true));
                }
                if title_button(ui, "↻", self.scheme.text)
                    .on_hover_text("Reload settings")
                    .clicked()
                {
                    self.reload_settings();
                }
                if title_button(ui, "≡", self.scheme.text)
                    .on_hover_text("Recent answers")
                    .clicked()
                {
                    self.show_history = !self.show_history;
                }
                let flags = format!(
                    "{}{}",
                    if state.pinned { "📌" } else { "" },
                    if state.tts_enabled { "🔊" } else { "" }
                );
                ui.label(egui::RichText::new(flags).size(11.0));
            });
        });
    }

    // ── Panels ───────────────────────────────────────────────────────────

    fn draw_indicator(&mut self, ui: &mut egui::Ui, state: &OverlayState) {
        match state.indicator {
            Indicator::Hidden => {
                if !state.chat_visible(self.auto_hide()) {
                    ui.label(
                        egui::RichText::new(format!(
                            "{} dictate · {} ask · {} rewrite · {} look",
                            self.config.hotkey.dictation,
                            self.config.hotkey.chat,
                            self.config.hotkey.rewrite,
                            self.config.hotkey.vision
                        ))
                        .color(self.scheme.text.gamma_multiply(0.6))
                        .size(11.0),
                    );
                }
            }
            Indicator::Recording { mode, since } => {
                ui.horizontal(|ui| {
                    ui.label(
                        egui::RichText::new(mode.label())
                            .color(RECORDING_COLOR)
                            .size(13.0),
                    );
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("Cancel").clicked() {
                            self.send(OrchestratorEvent::Cancel);
                        }
                        ui.label(
                            egui::RichText::new(format_elapsed(since.elapsed()))
                                .color(self.scheme.text)
                                .size(12.0),
                        );
                    });
                });
            }
            Indicator::Processing(mode) => {
                ui.horizontal(|ui| {
                    ui.label(
                        egui::RichText::new(format!("{} {}", self.spinner_char(), mode.label()))
                            .color(self.scheme.accent)
                            .size(13.0),
                    );
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("Cancel").clicked() {
                            self.send(OrchestratorEvent::Cancel);
                        }
                    });
                });
            }
            Indicator::Speaking => {
                ui.horizontal(|ui| {
                    ui.label(
                        egui::RichText::new("Speaking...")
                            .color(self.scheme.accent)
                            .size(13.0),
                    );
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("Stop").clicked() {
                            self.send(OrchestratorEvent::Cancel);
                        }
                    });
                });
            }
        }

        if let Some(error) = &state.last_error {
            ui.label(egui::RichText::new(error).color(ERROR_COLOR).size(12.0));
        }
    }

    fn draw_chat(&self, ui: &mut egui::Ui, state: &OverlayState) {
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .max_height(150.0)
            .show(ui, |ui| {
                for line in &state.messages {
                    let (prefix, color) = match line.role {
                        Role::User => ("You", self.scheme.text.gamma_multiply(0.7)),
                        _ => ("AI", self.scheme.text),
                    };
                    egui::Frame::new()
                        .fill(self.scheme.surface)
                        .corner_radius(egui::CornerRadius::same(4))
                        .inner_margin(egui::Margin::same(4))
                        .show(ui, |ui| {
                            ui.label(
                                egui::RichText::new(format!("{prefix}: {}", line.text))
                                    .color(color)
                                    .size(12.0),
                            );
                        });
                    ui.add_space(2.0);
                }
            });
    }

    fn draw_history(&self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let entries = self.history.recent();
        if entries.is_empty() {
            ui.label(
                egui::RichText::new("No answers yet")
                    .color(self.scheme.text.gamma_multiply(0.6))
                    .size(12.0),
            );
            return;
        }
        egui::ScrollArea::vertical().max_height(200.0).show(ui, |ui| {
            for entry in entries {
                ui.horizontal(|ui| {
                    ui.label(
                        egui::RichText::new(entry.timestamp.format("%H:%M").to_string())
                            .color(self.scheme.accent)
                            .size(11.0),
                    );
                    let resp = ui.add(
                        egui::Label::new(
                            egui::RichText::new(&entry.output)
                                .color(self.scheme.text)
                                .size(12.0),
                        )
                        .truncate()
                        .sense(egui::Sense::click()),
                    );
                    if resp.on_hover_text("Click to copy").clicked() {
                        ctx.copy_text(entry.output.clone());
                    }
                });
            }
        });
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn spinner_char(&self) -> char {
        let chars = ['|', '/', '-', '\\'];
        chars[(self.spinner_phase as usize) % chars.len()]
    }
}

fn title_button(ui: &mut egui::Ui, text: &str, color: Color32) -> egui::Response {
    ui.add(egui::Button::new(egui::RichText::new(text).color(color).size(12.0)).frame(false))
}

/// `mm:ss`, or `s.s s` under a minute.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f32();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let whole = elapsed.as_secs();
        format!("{}:{:02}", whole / 60, whole % 60)
    }
}

/// Borderless, transparent, optionally always-on-top overlay window.
pub fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let mut vp = egui::ViewportBuilder::default()
        .with_decorations(false)
        .with_transparent(true)
        .with_inner_size([320.0, 50.0])
        .with_min_inner_size([250.0, 50.0])
        .with_resizable(false);

    if config.ui.always_on_top {
        vp = vp.with_always_on_top();
    }

    if let Some((x, y)) = config.ui.window_position {
        vp = vp.with_position(egui::pos2(x, y));
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for OverlayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let state = self.overlay.snapshot();

        self.spinner_phase += 0.08;
        if self.spinner_phase >= 4.0 {
            self.spinner_phase = 0.0;
        }

        // The overlay is written from other threads, so keep polling.
        match state.indicator {
            Indicator::Recording { .. } => ctx.request_repaint_after(Duration::from_millis(100)),
            Indicator::Processing(_) => ctx.request_repaint_after(Duration::from_millis(66)),
            _ => ctx.request_repaint_after(Duration::from_millis(250)),
        }

        self.update_window_size(ctx, &state);

        let [r, g, b, _] = self.scheme.background.to_array();
        let frame = egui::Frame::new()
            .fill(Color32::from_rgba_unmultiplied(r, g, b, 225))
            .corner_radius(egui::CornerRadius::same(8))
            .inner_margin(egui::Margin::same(8));

        egui::CentralPanel::default().frame(frame).show(ctx, |ui| {
            self.draw_title_bar(ui, ctx, &state);
            ui.separator();

            if self.show_history {
                self.draw_history(ui, ctx);
                return;
            }

            self.draw_indicator(ui, &state);
            if state.chat_visible(self.auto_hide()) {
                ui.add_space(4.0);
                self.draw_chat(ui, &state);
            }
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        log::info!("overlay closing");
        self.send(OrchestratorEvent::Shutdown);
    }
}
