use eframe::egui;

use crate::state::AppState;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct PvAdjusterApp {
    pub state: AppState,
}

impl PvAdjusterApp {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl eframe::App for PvAdjusterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: controls ----
        egui::SidePanel::left("control_panel")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Bottom panel: adjustment log ----
        egui::TopBottomPanel::bottom("log_panel")
            .default_height(220.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::log_panel(ui, &mut self.state);
            });

        // ---- Central panel: plot ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::forecast_plot(ui, &self.state);
        });

        // Run whatever the widgets queued this frame.
        self.state.tick();
    }
}
