use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::{Column, TableBuilder};

use pv_adjuster::adjust::{AZIMUTH_RANGE, MULTIPLIER_RANGE, TILT_RANGE};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – adjustment controls
// ---------------------------------------------------------------------------

/// Render the left control panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Adjustment");
    ui.separator();

    let Some(session) = &state.session else {
        ui.label("No dataset loaded.");
        return;
    };
    let columns = session.adjustable_columns();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            // ---- Sliders ----
            let mut multiplier = state.params.multiplier;
            ui.strong("Multiplier");
            if ui
                .add(egui::Slider::new(&mut multiplier, MULTIPLIER_RANGE).fixed_decimals(2))
                .changed()
            {
                state.set_multiplier(multiplier);
            }

            let mut azimuth = state.params.azimuth;
            ui.strong("Azimuth");
            if ui
                .add(
                    egui::Slider::new(&mut azimuth, AZIMUTH_RANGE)
                        .fixed_decimals(2)
                        .suffix("°"),
                )
                .changed()
            {
                state.set_azimuth(azimuth);
            }

            let mut tilt = state.params.tilt;
            ui.strong("Tilt");
            if ui
                .add(
                    egui::Slider::new(&mut tilt, TILT_RANGE)
                        .fixed_decimals(2)
                        .suffix("°"),
                )
                .changed()
            {
                state.set_tilt(tilt);
            }
            ui.separator();

            // ---- Column selector ----
            ui.strong("Column to adjust");
            let current = state.column.clone().unwrap_or_default();
            egui::ComboBox::from_id_salt("adjust_column")
                .selected_text(&current)
                .show_ui(ui, |ui: &mut Ui| {
                    for col in &columns {
                        if ui.selectable_label(current == *col, col).clicked() {
                            state.set_column(col.clone());
                        }
                    }
                });
            ui.separator();

            // ---- Persistence options ----
            let mut toggled = ui
                .checkbox(&mut state.overwrite_source, "Overwrite source file")
                .changed();
            toggled |= ui
                .checkbox(&mut state.compound, "Accumulate on previous adjustment")
                .changed();
            if toggled {
                state.apply_toggles();
            }

            if ui.button("Reload from disk").clicked() {
                state.request_reload();
            }
        });
}

// ---------------------------------------------------------------------------
// Bottom panel – adjustment log
// ---------------------------------------------------------------------------

/// Render the per-row log of the last run next to the audit trail.
pub fn log_panel(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui: &mut Ui| {
        ui.heading("Adjustment log");
        if ui.small_button("Clear").clicked() {
            state.clear_log();
        }
    });
    ui.separator();

    ui.columns(2, |cols| {
        let rows = &state.log_rows;
        TableBuilder::new(&mut cols[0])
            .id_salt("adjustment_rows")
            .striped(true)
            .column(Column::auto().at_least(60.0))
            .column(Column::auto().at_least(120.0))
            .column(Column::remainder())
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("Row");
                });
                header.col(|ui| {
                    ui.strong("Original");
                });
                header.col(|ui| {
                    ui.strong("Adjusted");
                });
            })
            .body(|body| {
                body.rows(18.0, rows.len(), |mut row| {
                    let entry = &rows[row.index()];
                    row.col(|ui| {
                        ui.label(entry.row_index.to_string());
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.4}", entry.original_value));
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.4}", entry.adjusted_value));
                    });
                });
            });

        ScrollArea::vertical()
            .id_salt("audit_lines")
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(&mut cols[1], |ui: &mut Ui| {
                for line in &state.audit_lines {
                    ui.monospace(line);
                }
            });
    });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            if ui
                .add_enabled(state.session.is_some(), egui::Button::new("Save copy as…"))
                .clicked()
            {
                save_file_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        if let Some(session) = &state.session {
            ui.label(format!(
                "{} rows from {}",
                session.original().len(),
                session.source_path().display()
            ));
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            let color = if msg.starts_with("Error") {
                Color32::RED
            } else {
                Color32::GRAY
            };
            ui.label(RichText::new(msg).color(color));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open forecast data")
        .add_filter("CSV", &["csv"])
        .pick_file();

    if let Some(path) = file {
        state.open_with_current_settings(&path);
        if let Some(session) = &state.session {
            log::info!(
                "Loaded {} rows with columns {:?}",
                session.original().len(),
                session.original().column_names().collect::<Vec<_>>()
            );
        }
    }
}

pub fn save_file_dialog(state: &mut AppState) {
    let mut dialog = rfd::FileDialog::new()
        .set_title("Save adjusted copy")
        .add_filter("CSV", &["csv"]);
    if let Some(suggested) = state.suggested_copy_path() {
        if let Some(dir) = suggested.parent() {
            dialog = dialog.set_directory(dir);
        }
        if let Some(name) = suggested.file_name().and_then(|n| n.to_str()) {
            dialog = dialog.set_file_name(name);
        }
    }

    if let Some(path) = dialog.save_file() {
        if let Err(e) = state.save_copy(&path) {
            log::error!("Failed to save copy: {e:#}");
            state.status_message = Some(format!("Error: {e:#}"));
        }
    }
}
