use std::ops::RangeInclusive;

use chrono::DateTime;
use eframe::egui::Ui;
use egui_plot::{GridMark, Legend, Line, Plot};

use pv_adjuster::data::model::{adjusted_column_name, TimeSeriesDataset};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Forecast plot (central panel)
// ---------------------------------------------------------------------------

/// Render the selected column and its adjusted counterpart over time.
pub fn forecast_plot(ui: &mut Ui, state: &AppState) {
    let session = match &state.session {
        Some(s) => s,
        None => {
            ui.centered_and_justified(|ui: &mut Ui| {
                ui.heading("Open a forecast file to start  (File → Open…)");
            });
            return;
        }
    };

    let Some(column) = session.column() else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("No numeric column to adjust in this file");
        });
        return;
    };
    let adjusted_name = adjusted_column_name(column);

    Plot::new("forecast_plot")
        .legend(Legend::default())
        .x_axis_label("Period End (UTC)")
        .y_axis_label(column)
        .x_axis_formatter(format_time_mark)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            if let Some(points) = series(session.original(), column) {
                plot_ui.line(
                    Line::new(points)
                        .name(column)
                        .color(state.colors.color_for(column))
                        .width(1.5),
                );
            }

            if let Some(adjustment) = session.adjusted() {
                if let Some(points) = series(&adjustment.dataset, &adjusted_name) {
                    plot_ui.line(
                        Line::new(points)
                            .name(&adjusted_name)
                            .color(state.colors.color_for(&adjusted_name))
                            .width(1.5),
                    );
                }
            }
        });
}

/// `[time, value]` pairs for a numeric column. Missing readings are skipped.
fn series(dataset: &TimeSeriesDataset, name: &str) -> Option<Vec<[f64; 2]>> {
    let values = dataset.numeric(name)?;
    let points = dataset
        .timestamps()
        .iter()
        .zip(values)
        .filter_map(|(ts, reading)| Some([ts.epoch_seconds(), reading.as_f64()?]))
        .collect();
    Some(points)
}

fn format_time_mark(mark: GridMark, _range: &RangeInclusive<f64>) -> String {
    match DateTime::from_timestamp(mark.value as i64, 0) {
        Some(t) => t.format("%m-%d %H:%M").to_string(),
        None => String::new(),
    }
}
