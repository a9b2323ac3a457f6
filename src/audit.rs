//! Operation-scoped audit trail.
//!
//! The control loop is handed an [`AuditSink`] instead of logging through a
//! process-wide logger, so each loop reports to whoever created it.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::adjust::AdjustmentParameters;
use crate::control::LoopState;

#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    Loaded {
        path: PathBuf,
        rows: usize,
    },
    Adjusted {
        column: String,
        params: AdjustmentParameters,
        entries: usize,
    },
    Saved {
        path: PathBuf,
    },
    Transition {
        from: LoopState,
        to: LoopState,
    },
    Failed {
        stage: LoopState,
        message: String,
    },
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEvent::Loaded { path, rows } => {
                write!(f, "loaded {rows} rows from {}", path.display())
            }
            AuditEvent::Adjusted {
                column,
                params,
                entries,
            } => write!(f, "adjusted {entries} rows into '{column}' ({params})"),
            AuditEvent::Saved { path } => write!(f, "saved {}", path.display()),
            AuditEvent::Transition { from, to } => write!(f, "{from:?} -> {to:?}"),
            AuditEvent::Failed { stage, message } => write!(f, "failed while {stage:?}: {message}"),
        }
    }
}

pub trait AuditSink: Send {
    fn record(&mut self, event: AuditEvent);
}

/// Forwards every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AuditSink for LogSink {
    fn record(&mut self, event: AuditEvent) {
        match &event {
            AuditEvent::Failed { .. } => log::error!(target: "pv_adjuster::audit", "{event}"),
            AuditEvent::Transition { .. } => log::trace!(target: "pv_adjuster::audit", "{event}"),
            _ => log::info!(target: "pv_adjuster::audit", "{event}"),
        }
    }
}

/// Keeps events in memory. Clones share the same buffer, so one handle can
/// be given to the loop while another is read elsewhere.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl AuditSink for MemorySink {
    fn record(&mut self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Sends every event to two sinks.
pub struct Tee<A, B>(pub A, pub B);

impl<A: AuditSink, B: AuditSink> AuditSink for Tee<A, B> {
    fn record(&mut self, event: AuditEvent) {
        self.0.record(event.clone());
        self.1.record(event);
    }
}
