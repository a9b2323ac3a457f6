//! The live adjust → persist → reload cycle behind the controls.
//!
//! ```text
//!   Idle ──trigger──▶ Adjusting ──▶ Persisting ──▶ Reloading ──▶ Idle
//!     ▲                   │             │              │
//!     └───────── any failure (nothing in memory changes) ┘
//! ```
//!
//! Triggers are queued and coalesced; one call to [`LiveControlLoop::tick`]
//! runs at most one cycle, so two cycles never interleave.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use chrono::Local;
use thiserror::Error;

use crate::adjust::{
    AdjustError, AdjustMode, Adjustment, AdjustmentEngine, AdjustmentFunction,
    AdjustmentLogEntry, AdjustmentParameters,
};
use crate::audit::{AuditEvent, AuditSink};
use crate::data::loader::{self, LoadError};
use crate::data::model::{adjusted_column_name, TimeSeriesDataset};
use crate::data::select;
use crate::data::writer::{fresh_output_path, PersistenceCoordinator, WriteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Adjusting,
    Persisting,
    Reloading,
}

/// Where each cycle writes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteTarget {
    /// Replace the file the dataset was loaded from.
    #[default]
    Overwrite,
    /// Write a fresh timestamped file next to the source.
    NewFile,
}

/// Which values a cycle adjusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Baseline {
    /// Always adjust the source column as it was when the file was opened
    /// (or last explicitly reloaded). Repeated changes do not accumulate.
    #[default]
    Pristine,
    /// Adjust the last persisted `Adjusted_<column>`, so every change is
    /// applied on top of the previous one.
    Compound,
}

#[derive(Debug, Clone, Default)]
pub struct ControlSettings {
    /// Column to adjust; `None` picks the default adjustable column.
    pub column: Option<String>,
    pub params: AdjustmentParameters,
    pub write: WriteTarget,
    pub baseline: Baseline,
    pub mode: AdjustMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Multiplier(f64),
    Azimuth(f64),
    Tilt(f64),
    Column(String),
    Reload,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("no column selected for adjustment")]
    NoColumn,
    #[error(transparent)]
    Adjust(#[from] AdjustError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// What a successful cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub params: AdjustmentParameters,
    pub column: Option<String>,
    /// File written by the cycle; `None` for a plain reload.
    pub written: Option<PathBuf>,
    pub log: Vec<AdjustmentLogEntry>,
}

/// Cloneable handle for queueing triggers from other threads.
#[derive(Debug, Clone)]
pub struct TriggerSender(Sender<Trigger>);

impl TriggerSender {
    /// Returns `false` once the loop has been dropped.
    pub fn send(&self, trigger: Trigger) -> bool {
        self.0.send(trigger).is_ok()
    }
}

/// Triggers received since the last cycle, last write wins per field.
#[derive(Debug, Default)]
struct Pending {
    multiplier: Option<f64>,
    azimuth: Option<f64>,
    tilt: Option<f64>,
    column: Option<String>,
    reload: bool,
}

impl Pending {
    fn fold(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Multiplier(v) => self.multiplier = Some(v),
            Trigger::Azimuth(v) => self.azimuth = Some(v),
            Trigger::Tilt(v) => self.tilt = Some(v),
            Trigger::Column(c) => self.column = Some(c),
            Trigger::Reload => self.reload = true,
        }
    }

    fn changes_parameters(&self) -> bool {
        self.multiplier.is_some()
            || self.azimuth.is_some()
            || self.tilt.is_some()
            || self.column.is_some()
    }

    fn is_empty(&self) -> bool {
        !self.changes_parameters() && !self.reload
    }
}

// ---------------------------------------------------------------------------
// LiveControlLoop
// ---------------------------------------------------------------------------

pub struct LiveControlLoop<F> {
    engine: AdjustmentEngine<F>,
    persistence: PersistenceCoordinator,
    sink: Box<dyn AuditSink>,

    source: PathBuf,
    /// Dataset as opened or explicitly reloaded; adjust cycles never replace it.
    pristine: TimeSeriesDataset,
    /// Dataset as last loaded from disk.
    original: TimeSeriesDataset,
    /// In-memory adjusted view matching what was last persisted.
    adjusted: Option<Adjustment>,
    last_log: Vec<AdjustmentLogEntry>,

    /// Parameters and column of the last successful cycle.
    params: AdjustmentParameters,
    column: Option<String>,
    write: WriteTarget,
    baseline: Baseline,

    state: LoopState,
    pending: Pending,
    tx: Sender<Trigger>,
    rx: Receiver<Trigger>,
}

impl<F: AdjustmentFunction> LiveControlLoop<F> {
    /// Load `path` and prepare an in-memory adjusted view for the chosen
    /// column. Nothing is written until the first trigger.
    pub fn open(
        path: &Path,
        function: F,
        settings: ControlSettings,
        mut sink: Box<dyn AuditSink>,
    ) -> Result<Self, LoadError> {
        let dataset = match loader::load(path) {
            Ok(ds) => ds,
            Err(e) => {
                sink.record(AuditEvent::Failed {
                    stage: LoopState::Reloading,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        sink.record(AuditEvent::Loaded {
            path: path.to_path_buf(),
            rows: dataset.len(),
        });

        // A configured column is kept even when the file lacks it; the
        // initial adjustment then reports it as not found.
        let column = settings
            .column
            .or_else(|| select::default_column(&dataset));

        let (tx, rx) = mpsc::channel();
        let mut this = LiveControlLoop {
            engine: AdjustmentEngine::new(function).with_mode(settings.mode),
            persistence: PersistenceCoordinator::new(),
            sink,
            source: path.to_path_buf(),
            pristine: dataset.clone(),
            original: dataset,
            adjusted: None,
            last_log: Vec::new(),
            params: settings.params,
            column,
            write: settings.write,
            baseline: settings.baseline,
            state: LoopState::Idle,
            pending: Pending::default(),
            tx,
            rx,
        };

        if let Some(column) = this.column.clone() {
            match this.view_of(&this.original, &column, &this.params) {
                Ok(view) => {
                    this.last_log = view.as_ref().map(|v| v.log.clone()).unwrap_or_default();
                    this.adjusted = view;
                }
                Err(e) => {
                    log::warn!("Initial adjustment of '{column}' failed: {e}");
                    this.sink.record(AuditEvent::Failed {
                        stage: LoopState::Adjusting,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(this)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn params(&self) -> AdjustmentParameters {
        self.params
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn source_path(&self) -> &Path {
        &self.source
    }

    pub fn pristine(&self) -> &TimeSeriesDataset {
        &self.pristine
    }

    pub fn original(&self) -> &TimeSeriesDataset {
        &self.original
    }

    pub fn adjusted(&self) -> Option<&Adjustment> {
        self.adjusted.as_ref()
    }

    /// Per-row trail of the last successful adjustment.
    pub fn last_log(&self) -> &[AdjustmentLogEntry] {
        &self.last_log
    }

    pub fn adjustable_columns(&self) -> Vec<String> {
        select::adjustable_columns(&self.original)
    }

    pub fn write_target(&self) -> WriteTarget {
        self.write
    }

    pub fn set_write_target(&mut self, write: WriteTarget) {
        self.write = write;
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    pub fn set_baseline(&mut self, baseline: Baseline) {
        self.baseline = baseline;
    }

    pub fn mode(&self) -> AdjustMode {
        self.engine.mode()
    }

    pub fn set_mode(&mut self, mode: AdjustMode) {
        self.engine.set_mode(mode);
    }

    pub fn sender(&self) -> TriggerSender {
        TriggerSender(self.tx.clone())
    }

    /// Queue a trigger; it takes effect on the next [`tick`](Self::tick).
    pub fn submit(&mut self, trigger: Trigger) {
        self.pending.fold(trigger);
    }

    /// Queue a trigger and run the resulting cycle immediately.
    pub fn submit_and_run(&mut self, trigger: Trigger) -> Result<CycleReport, CycleError> {
        self.drain_channel();
        self.submit(trigger);
        let pending = std::mem::take(&mut self.pending);
        self.run(pending)
    }

    /// Coalesce everything queued so far and run at most one cycle.
    /// Returns `None` when there was nothing to do.
    pub fn tick(&mut self) -> Option<Result<CycleReport, CycleError>> {
        self.drain_channel();
        if self.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);
        Some(self.run(pending))
    }

    fn drain_channel(&mut self) {
        while let Ok(trigger) = self.rx.try_recv() {
            self.pending.fold(trigger);
        }
    }

    /// A reload queued together with parameter changes is applied first, so
    /// the adjustment works on what is on disk now.
    fn run(&mut self, pending: Pending) -> Result<CycleReport, CycleError> {
        if !pending.changes_parameters() {
            return self.guarded(|this| this.reload_cycle());
        }
        self.guarded(|this| {
            if pending.reload {
                this.reload_cycle()?;
            }
            let params = AdjustmentParameters {
                multiplier: pending.multiplier.unwrap_or(this.params.multiplier),
                azimuth: pending.azimuth.unwrap_or(this.params.azimuth),
                tilt: pending.tilt.unwrap_or(this.params.tilt),
            };
            let column = pending.column.or_else(|| this.column.clone());
            this.adjust_cycle(params, column)
        })
    }

    fn guarded(
        &mut self,
        cycle: impl FnOnce(&mut Self) -> Result<CycleReport, CycleError>,
    ) -> Result<CycleReport, CycleError> {
        let result = cycle(self);
        if let Err(e) = &result {
            log::error!("Cycle failed while {:?}: {e}", self.state);
            self.sink.record(AuditEvent::Failed {
                stage: self.state,
                message: e.to_string(),
            });
        }
        self.enter(LoopState::Idle);
        result
    }

    fn enter(&mut self, to: LoopState) {
        if self.state != to {
            self.sink.record(AuditEvent::Transition {
                from: self.state,
                to,
            });
            self.state = to;
        }
    }

    /// Adjusting → Persisting → Reloading. `self` only changes once every
    /// stage has succeeded.
    fn adjust_cycle(
        &mut self,
        params: AdjustmentParameters,
        column: Option<String>,
    ) -> Result<CycleReport, CycleError> {
        let column = column.ok_or(CycleError::NoColumn)?;
        let output = adjusted_column_name(&column);

        self.enter(LoopState::Adjusting);
        let adjustment = match self.baseline {
            Baseline::Pristine => self.engine.adjust(&self.pristine, &column, &params)?,
            Baseline::Compound => {
                let input = if self.original.has_column(&output) {
                    output.as_str()
                } else {
                    column.as_str()
                };
                self.engine
                    .adjust_into(&self.original, input, &output, &params)?
            }
        };
        self.sink.record(AuditEvent::Adjusted {
            column: adjustment.column.clone(),
            params,
            entries: adjustment.log.len(),
        });

        self.enter(LoopState::Persisting);
        let written = match self.write {
            WriteTarget::Overwrite => self
                .persistence
                .save_overwrite(&adjustment.dataset, &self.source)?,
            WriteTarget::NewFile => {
                let destination = fresh_output_path(&self.source, Local::now());
                self.persistence
                    .save(&adjustment.dataset, Some(&destination))?
            }
        };
        self.sink.record(AuditEvent::Saved {
            path: written.clone(),
        });

        self.enter(LoopState::Reloading);
        let reloaded = loader::load(&written)?;
        self.sink.record(AuditEvent::Loaded {
            path: written.clone(),
            rows: reloaded.len(),
        });
        let view = self.view_of(&reloaded, &column, &params)?;
        if let Some(view) = &view {
            if view.dataset.numeric(&output) != adjustment.dataset.numeric(&output) {
                log::warn!("Reloaded '{output}' differs from the values just written");
            }
        }

        self.original = reloaded;
        self.adjusted = view;
        self.last_log = adjustment.log.clone();
        self.params = params;
        self.column = Some(column.clone());

        Ok(CycleReport {
            params,
            column: Some(column),
            written: Some(written),
            log: adjustment.log,
        })
    }

    /// Reloading only: re-read the source, refresh the pristine copy and
    /// rebuild the adjusted view without writing anything.
    fn reload_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.enter(LoopState::Reloading);
        let reloaded = loader::load(&self.source)?;
        self.sink.record(AuditEvent::Loaded {
            path: self.source.clone(),
            rows: reloaded.len(),
        });

        let column = self
            .column
            .clone()
            .or_else(|| select::default_column(&reloaded));
        let view = match &column {
            Some(c) if !reloaded.has_column(c) => {
                log::warn!("Column '{c}' is no longer in {}", self.source.display());
                self.sink.record(AuditEvent::Failed {
                    stage: LoopState::Reloading,
                    message: AdjustError::ColumnNotFound { column: c.clone() }.to_string(),
                });
                None
            }
            Some(c) => self.view_of(&reloaded, c, &self.params)?,
            None => None,
        };
        let log = view.as_ref().map(|v| v.log.clone()).unwrap_or_default();

        self.pristine = reloaded.clone();
        self.original = reloaded;
        self.adjusted = view;
        self.last_log = log.clone();
        self.column = column.clone();

        Ok(CycleReport {
            params: self.params,
            column,
            written: None,
            log,
        })
    }

    /// Adjusted view of freshly loaded data. In compound mode the loaded
    /// file already carries the persisted adjustment, so it is used as-is;
    /// adjusting again would apply the parameters twice.
    fn view_of(
        &self,
        loaded: &TimeSeriesDataset,
        column: &str,
        params: &AdjustmentParameters,
    ) -> Result<Option<Adjustment>, AdjustError> {
        match self.baseline {
            Baseline::Pristine => self.engine.adjust(loaded, column, params).map(Some),
            Baseline::Compound => {
                let output = adjusted_column_name(column);
                Ok(loaded.has_column(&output).then(|| Adjustment {
                    dataset: loaded.clone(),
                    column: output,
                    log: Vec::new(),
                }))
            }
        }
    }
}
