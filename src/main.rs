mod app;
mod color;
mod state;
mod ui;

use std::path::{Path, PathBuf};

use anyhow::Context;
use app::PvAdjusterApp;
use eframe::egui;
use pv_adjuster::config::AppConfig;
use state::AppState;

/// Build the initial state from an optional argument: a `.json` config
/// naming the forecast file, or the forecast CSV itself.
fn initial_state(arg: Option<PathBuf>) -> AppState {
    let mut state = AppState::default();
    let Some(arg) = arg else {
        return state;
    };

    let is_config = arg
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let opened = if is_config {
        open_from_config(&mut state, &arg)
    } else {
        let settings = state.settings();
        state.open(&arg, settings)
    };
    if let Err(e) = opened {
        log::error!("{e:#}");
        state.status_message = Some(format!("Error: {e:#}"));
    }
    state
}

fn open_from_config(state: &mut AppState, config_path: &Path) -> anyhow::Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let dataset = config.dataset_path(config_path);
    log::info!("Opening {} from configuration", dataset.display());
    state.open(&dataset, config.settings())
}

fn main() -> eframe::Result {
    env_logger::init();

    let state = initial_state(std::env::args_os().nth(1).map(PathBuf::from));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "PV Estimate Adjuster",
        options,
        Box::new(|_cc| Ok(Box::new(PvAdjusterApp::new(state)))),
    )
}
