//! Adjust PV power forecasts and keep the adjusted series on disk in step
//! with the controls that drive it.
//!
//! ```text
//!  loader ──▶ adjust (AdjustmentEngine) ──▶ writer ──▶ loader (reload)
//!                      ▲                                   │
//!                      └──────── control (LiveControlLoop) ┘
//! ```

pub mod adjust;
pub mod audit;
pub mod config;
pub mod control;
pub mod data;

pub use adjust::{AdjustmentEngine, AdjustmentFunction, AdjustmentParameters, PanelModel};
pub use control::{LiveControlLoop, Trigger};
pub use data::model::TimeSeriesDataset;
