use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use pv_adjuster::adjust::{AdjustMode, AdjustmentLogEntry, AdjustmentParameters, PanelModel};
use pv_adjuster::audit::{LogSink, MemorySink, Tee};
use pv_adjuster::control::{
    Baseline, ControlSettings, CycleError, CycleReport, LiveControlLoop, Trigger, WriteTarget,
};
use pv_adjuster::data::writer::{fresh_output_path, PersistenceCoordinator};

use crate::color::SeriesColors;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering. Widgets only edit the
/// control values and call the `set_*` methods, which turn edits into loop
/// triggers.
pub struct AppState {
    /// Open dataset and its control loop (None until a file is opened).
    pub session: Option<LiveControlLoop<PanelModel>>,

    /// Slider values as currently shown.
    pub params: AdjustmentParameters,

    /// Column selected in the combo box.
    pub column: Option<String>,

    /// Write each cycle back to the source file (otherwise a new file).
    pub overwrite_source: bool,

    /// Let successive changes accumulate on the last adjusted values.
    pub compound: bool,

    /// How the adjustment function is called; carried over when another
    /// file is opened.
    pub mode: AdjustMode,

    /// Rows of the most recent adjustment, shown in the log table.
    pub log_rows: Vec<AdjustmentLogEntry>,

    /// Audit lines, newest last. Cleared by the user.
    pub audit_lines: Vec<String>,

    /// Colours per column name.
    pub colors: SeriesColors,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,

    audit: MemorySink,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            session: None,
            params: AdjustmentParameters::default(),
            column: None,
            overwrite_source: true,
            compound: false,
            mode: AdjustMode::default(),
            log_rows: Vec::new(),
            audit_lines: Vec::new(),
            colors: SeriesColors::default(),
            status_message: None,
            audit: MemorySink::new(),
        }
    }
}

impl AppState {
    /// Open a forecast file and start a control loop on it.
    pub fn open(&mut self, path: &Path, settings: ControlSettings) -> Result<()> {
        let sink = Tee(LogSink, self.audit.clone());
        let session = LiveControlLoop::open(path, PanelModel, settings, Box::new(sink))
            .with_context(|| format!("opening {}", path.display()))?;

        self.params = session.params();
        self.column = session.column().map(str::to_string);
        self.overwrite_source = session.write_target() == WriteTarget::Overwrite;
        self.compound = session.baseline() == Baseline::Compound;
        self.mode = session.mode();
        self.log_rows = session.last_log().to_vec();
        self.colors = SeriesColors::new(session.original().column_names());
        self.session = Some(session);
        self.status_message = None;
        self.collect_audit();
        Ok(())
    }

    /// Open with the current toggle values, reporting failures in the status line.
    /// The column is chosen afresh for the new file.
    pub fn open_with_current_settings(&mut self, path: &Path) {
        let settings = ControlSettings {
            column: None,
            ..self.settings()
        };
        if let Err(e) = self.open(path, settings) {
            log::error!("Failed to load file: {e:#}");
            self.status_message = Some(format!("Error: {e:#}"));
        }
    }

    pub fn settings(&self) -> ControlSettings {
        ControlSettings {
            column: self.column.clone(),
            params: self.params,
            write: if self.overwrite_source {
                WriteTarget::Overwrite
            } else {
                WriteTarget::NewFile
            },
            baseline: if self.compound {
                Baseline::Compound
            } else {
                Baseline::Pristine
            },
            mode: self.mode,
        }
    }

    pub fn set_multiplier(&mut self, value: f64) {
        self.params.multiplier = value;
        self.submit(Trigger::Multiplier(value));
    }

    pub fn set_azimuth(&mut self, value: f64) {
        self.params.azimuth = value;
        self.submit(Trigger::Azimuth(value));
    }

    pub fn set_tilt(&mut self, value: f64) {
        self.params.tilt = value;
        self.submit(Trigger::Tilt(value));
    }

    pub fn set_column(&mut self, column: String) {
        self.column = Some(column.clone());
        self.submit(Trigger::Column(column));
    }

    pub fn request_reload(&mut self) {
        self.submit(Trigger::Reload);
    }

    /// Push the toggle values into the running loop.
    pub fn apply_toggles(&mut self) {
        let settings = self.settings();
        if let Some(session) = &mut self.session {
            session.set_write_target(settings.write);
            session.set_baseline(settings.baseline);
        }
    }

    fn submit(&mut self, trigger: Trigger) {
        if let Some(session) = &mut self.session {
            session.submit(trigger);
        }
    }

    /// Run at most one queued cycle. Called once per frame, so a slider
    /// dragged across many values produces one write per frame.
    pub fn tick(&mut self) {
        let Some(session) = &mut self.session else {
            return;
        };
        let Some(result) = session.tick() else {
            return;
        };
        self.finish_cycle(result);
    }

    fn finish_cycle(&mut self, result: std::result::Result<CycleReport, CycleError>) {
        match result {
            Ok(report) => {
                self.log_rows = report.log;
                self.status_message = report
                    .written
                    .map(|p| format!("Saved {}", p.display()));
            }
            Err(e) => {
                self.status_message = Some(format!("Error: {e}"));
            }
        }
        // Keep the controls showing what the loop actually applied.
        if let Some(session) = &self.session {
            self.params = session.params();
            self.column = session.column().map(str::to_string);
            self.colors = SeriesColors::new(session.original().column_names());
        }
        self.collect_audit();
    }

    /// Write the current adjusted view to `path` without touching the
    /// loop's source file.
    pub fn save_copy(&mut self, path: &Path) -> Result<PathBuf> {
        let session = self.session.as_ref().context("no dataset loaded")?;
        let adjusted = session.adjusted().context("no adjusted data to save")?;
        let written = PersistenceCoordinator::new()
            .save(&adjusted.dataset, Some(path))
            .context("saving adjusted copy")?;
        self.status_message = Some(format!("Saved copy to {}", written.display()));
        Ok(written)
    }

    /// Default file name offered by the "save copy" dialog.
    pub fn suggested_copy_path(&self) -> Option<PathBuf> {
        let session = self.session.as_ref()?;
        Some(fresh_output_path(session.source_path(), Local::now()))
    }

    pub fn clear_log(&mut self) {
        self.log_rows.clear();
        self.audit_lines.clear();
    }

    fn collect_audit(&mut self) {
        self.audit_lines
            .extend(self.audit.drain().into_iter().map(|e| e.to_string()));
    }
}
