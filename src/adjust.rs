//! Per-row adjustment of a forecast column.
//!
//! The physical model is a pluggable [`AdjustmentFunction`]; the engine only
//! walks rows, skips missing readings and collects an audit trail. A run is
//! all-or-nothing: one failing row discards the whole adjusted column.

use std::fmt;
use std::ops::RangeInclusive;

use thiserror::Error;

use crate::data::model::{adjusted_column_name, ColumnData, Reading, TimeSeriesDataset};

/// Orientation at which [`PanelModel`] leaves a value unchanged.
pub const REFERENCE_AZIMUTH: f64 = 180.0;
pub const REFERENCE_TILT: f64 = 30.0;

pub const MULTIPLIER_RANGE: RangeInclusive<f64> = 0.5..=2.0;
pub const AZIMUTH_RANGE: RangeInclusive<f64> = 0.0..=360.0;
pub const TILT_RANGE: RangeInclusive<f64> = 0.0..=90.0;

// ---------------------------------------------------------------------------
// AdjustmentFunction – the external capability
// ---------------------------------------------------------------------------

/// Error raised by an [`AdjustmentFunction`] for a single value.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct AdjustmentFault(pub String);

/// Maps a raw estimate to an adjusted one. Implementations must be
/// deterministic and free of side effects visible to the engine.
pub trait AdjustmentFunction {
    fn adjust(
        &self,
        value: f64,
        multiplier: f64,
        azimuth: f64,
        tilt: f64,
    ) -> Result<f64, AdjustmentFault>;

    /// Reduced form for a value that was already multiplied by the caller.
    fn adjust_scaled(&self, value: f64) -> Result<f64, AdjustmentFault> {
        self.adjust(value, 1.0, REFERENCE_AZIMUTH, REFERENCE_TILT)
    }
}

impl<F> AdjustmentFunction for F
where
    F: Fn(f64, f64, f64, f64) -> Result<f64, AdjustmentFault>,
{
    fn adjust(
        &self,
        value: f64,
        multiplier: f64,
        azimuth: f64,
        tilt: f64,
    ) -> Result<f64, AdjustmentFault> {
        self(value, multiplier, azimuth, tilt)
    }
}

/// Reference panel-orientation model.
///
/// Efficiency drops 0.5% per degree of azimuth away from due south (floored
/// at 50%) and 0.3% per degree of tilt away from 30° (floored at 60%).
#[derive(Debug, Clone, Copy, Default)]
pub struct PanelModel;

impl PanelModel {
    pub fn azimuth_factor(azimuth: f64) -> f64 {
        (1.0 - 0.005 * (azimuth - REFERENCE_AZIMUTH).abs()).max(0.5)
    }

    pub fn tilt_factor(tilt: f64) -> f64 {
        (1.0 - 0.003 * (tilt - REFERENCE_TILT).abs()).max(0.6)
    }
}

impl AdjustmentFunction for PanelModel {
    fn adjust(
        &self,
        value: f64,
        multiplier: f64,
        azimuth: f64,
        tilt: f64,
    ) -> Result<f64, AdjustmentFault> {
        let azimuth_factor = Self::azimuth_factor(azimuth);
        let tilt_factor = Self::tilt_factor(tilt);
        let adjusted = value * multiplier * azimuth_factor * tilt_factor;
        log::trace!(
            "input={value} multiplier={multiplier} azimuth={azimuth} ({azimuth_factor}) \
             tilt={tilt} ({tilt_factor}) -> {adjusted}"
        );
        Ok(adjusted)
    }

    fn adjust_scaled(&self, value: f64) -> Result<f64, AdjustmentFault> {
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("{name} must be a finite number, got {value}")]
    NotFinite { name: &'static str, value: f64 },
    #[error("multiplier must be greater than zero, got {0}")]
    NonPositiveMultiplier(f64),
    #[error("{name} {value} is outside {min}..={max}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Snapshot of the user's controls at the moment a run starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentParameters {
    pub multiplier: f64,
    pub azimuth: f64,
    pub tilt: f64,
}

impl Default for AdjustmentParameters {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            azimuth: REFERENCE_AZIMUTH,
            tilt: REFERENCE_TILT,
        }
    }
}

impl AdjustmentParameters {
    /// The multiplier is only required to be positive; the UI narrows it to
    /// [`MULTIPLIER_RANGE`].
    pub fn validate(&self) -> Result<(), ParamError> {
        for (name, value) in [
            ("multiplier", self.multiplier),
            ("azimuth", self.azimuth),
            ("tilt", self.tilt),
        ] {
            if !value.is_finite() {
                return Err(ParamError::NotFinite { name, value });
            }
        }
        if self.multiplier <= 0.0 {
            return Err(ParamError::NonPositiveMultiplier(self.multiplier));
        }
        for (name, value, range) in [
            ("azimuth", self.azimuth, AZIMUTH_RANGE),
            ("tilt", self.tilt, TILT_RANGE),
        ] {
            if !range.contains(&value) {
                return Err(ParamError::OutOfRange {
                    name,
                    value,
                    min: *range.start(),
                    max: *range.end(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for AdjustmentParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "multiplier={:.2}, azimuth={:.2}°, tilt={:.2}°",
            self.multiplier, self.azimuth, self.tilt
        )
    }
}

/// How the engine calls the adjustment function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdjustMode {
    /// `f(value, multiplier, azimuth, tilt)`.
    #[default]
    Oriented,
    /// `f(value × multiplier)`; orientation is ignored.
    MultiplierOnly,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AdjustError {
    #[error("column '{column}' not found")]
    ColumnNotFound { column: String },

    #[error("column '{column}' is not numeric")]
    NotNumeric { column: String },

    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ParamError),

    #[error("adjusting '{column}' failed at row {row_index}: {cause}")]
    Failed {
        column: String,
        row_index: usize,
        cause: AdjustmentFault,
    },
}

/// One adjusted row. Produced in row order; rows with a missing source
/// reading have no entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentLogEntry {
    pub row_index: usize,
    pub original_value: f64,
    pub adjusted_value: f64,
}

/// Result of a successful run: a deep copy of the input with the adjusted
/// column set, plus the per-row trail.
#[derive(Debug, Clone)]
pub struct Adjustment {
    pub dataset: TimeSeriesDataset,
    /// Name of the column that was written.
    pub column: String,
    pub log: Vec<AdjustmentLogEntry>,
}

pub struct AdjustmentEngine<F> {
    function: F,
    mode: AdjustMode,
}

impl<F: AdjustmentFunction> AdjustmentEngine<F> {
    pub fn new(function: F) -> Self {
        Self {
            function,
            mode: AdjustMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: AdjustMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> AdjustMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AdjustMode) {
        self.mode = mode;
    }

    /// Adjust `column` into `Adjusted_<column>`. The input dataset is never
    /// modified.
    pub fn adjust(
        &self,
        dataset: &TimeSeriesDataset,
        column: &str,
        params: &AdjustmentParameters,
    ) -> Result<Adjustment, AdjustError> {
        self.adjust_into(dataset, column, &adjusted_column_name(column), params)
    }

    /// Read `input` and write the result to `output`, replacing `output` if it
    /// already exists.
    pub fn adjust_into(
        &self,
        dataset: &TimeSeriesDataset,
        input: &str,
        output: &str,
        params: &AdjustmentParameters,
    ) -> Result<Adjustment, AdjustError> {
        params.validate()?;
        let readings = match dataset.column(input).map(|c| &c.data) {
            None => {
                return Err(AdjustError::ColumnNotFound {
                    column: input.to_string(),
                })
            }
            Some(ColumnData::Numeric(v)) => v,
            Some(_) => {
                return Err(AdjustError::NotNumeric {
                    column: input.to_string(),
                })
            }
        };

        log::debug!("Adjusting '{input}' into '{output}' with {params}");

        let mut adjusted = Vec::with_capacity(readings.len());
        let mut log = Vec::new();
        for (row_index, reading) in readings.iter().enumerate() {
            let Reading::Value(original_value) = *reading else {
                adjusted.push(Reading::Missing);
                continue;
            };
            let fail = |cause: AdjustmentFault| AdjustError::Failed {
                column: input.to_string(),
                row_index,
                cause,
            };
            let adjusted_value = self.apply(original_value, params).map_err(fail)?;
            if !adjusted_value.is_finite() {
                return Err(fail(AdjustmentFault(format!(
                    "non-finite result {adjusted_value} for input {original_value}"
                ))));
            }
            adjusted.push(Reading::Value(adjusted_value));
            log.push(AdjustmentLogEntry {
                row_index,
                original_value,
                adjusted_value,
            });
        }

        let mut result = dataset.clone();
        result
            .set_numeric(output, adjusted)
            .map_err(|reason| AdjustError::Failed {
                column: input.to_string(),
                row_index: 0,
                cause: AdjustmentFault(reason),
            })?;

        log::debug!("Adjusted {} of {} rows", log.len(), dataset.len());
        Ok(Adjustment {
            dataset: result,
            column: output.to_string(),
            log,
        })
    }

    fn apply(&self, value: f64, p: &AdjustmentParameters) -> Result<f64, AdjustmentFault> {
        match self.mode {
            AdjustMode::Oriented => self.function.adjust(value, p.multiplier, p.azimuth, p.tilt),
            AdjustMode::MultiplierOnly => self.function.adjust_scaled(value * p.multiplier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Column, Timestamp, TIMESTAMP_COLUMN};

    fn dataset(values: &[Reading]) -> TimeSeriesDataset {
        let stamps = (0..values.len())
            .map(|i| Timestamp::parse(&format!("2024-06-01T{:02}:00:00Z", i % 24)).unwrap())
            .collect();
        TimeSeriesDataset::new(vec![
            Column {
                name: TIMESTAMP_COLUMN.into(),
                data: ColumnData::Timestamp(stamps),
            },
            Column {
                name: "PV Estimate".into(),
                data: ColumnData::Numeric(values.to_vec()),
            },
            Column {
                name: "Site".into(),
                data: ColumnData::Text(vec!["roof".into(); values.len()]),
            },
        ])
        .unwrap()
    }

    fn params(multiplier: f64, azimuth: f64, tilt: f64) -> AdjustmentParameters {
        AdjustmentParameters {
            multiplier,
            azimuth,
            tilt,
        }
    }

    #[test]
    fn panel_model_is_identity_at_reference_orientation() {
        assert_eq!(PanelModel.adjust(100.0, 1.0, 180.0, 30.0).unwrap(), 100.0);
        assert_eq!(PanelModel.adjust_scaled(42.0).unwrap(), 42.0);
    }

    #[test]
    fn panel_model_factors_are_floored() {
        assert_eq!(PanelModel::azimuth_factor(0.0), 0.5);
        assert_eq!(PanelModel::azimuth_factor(360.0), 0.5);
        assert!((PanelModel::azimuth_factor(170.0) - 0.95).abs() < 1e-12);
        assert!((PanelModel::tilt_factor(90.0) - 0.82).abs() < 1e-12);
        assert!((PanelModel::tilt_factor(0.0) - 0.91).abs() < 1e-12);
    }

    #[test]
    fn missing_rows_stay_missing_and_are_not_logged() {
        let ds = dataset(&[Reading::Value(100.0), Reading::Missing]);
        let p = params(1.0, 180.0, 30.0);
        let out = AdjustmentEngine::new(PanelModel).adjust(&ds, "PV Estimate", &p).unwrap();

        let expected = PanelModel.adjust(100.0, 1.0, 180.0, 30.0).unwrap();
        assert_eq!(
            out.dataset.numeric("Adjusted_PV Estimate").unwrap(),
            &[Reading::Value(expected), Reading::Missing]
        );
        assert_eq!(
            out.log,
            vec![AdjustmentLogEntry {
                row_index: 0,
                original_value: 100.0,
                adjusted_value: expected,
            }]
        );
        assert_eq!(out.column, "Adjusted_PV Estimate");
    }

    #[test]
    fn output_keeps_rows_and_adds_exactly_one_column() {
        let values: Vec<Reading> = (0..10).map(|i| Reading::Value(i as f64)).collect();
        let ds = dataset(&values);
        let out = AdjustmentEngine::new(PanelModel)
            .adjust(&ds, "PV Estimate", &params(2.0, 90.0, 10.0))
            .unwrap();

        assert_eq!(out.dataset.len(), ds.len());
        assert_eq!(out.dataset.columns().len(), ds.columns().len() + 1);
        assert_eq!(out.dataset.numeric("PV Estimate"), ds.numeric("PV Estimate"));
        assert_eq!(out.dataset.timestamps(), ds.timestamps());
        let rows: Vec<usize> = out.log.iter().map(|e| e.row_index).collect();
        assert_eq!(rows, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn rerun_replaces_existing_adjusted_column() {
        let ds = dataset(&[Reading::Value(10.0)]);
        let engine = AdjustmentEngine::new(PanelModel);
        let first = engine.adjust(&ds, "PV Estimate", &params(2.0, 180.0, 30.0)).unwrap();
        let second = engine
            .adjust(&first.dataset, "PV Estimate", &params(0.5, 180.0, 30.0))
            .unwrap();
        assert_eq!(second.dataset.columns().len(), first.dataset.columns().len());
        assert_eq!(
            second.dataset.numeric("Adjusted_PV Estimate").unwrap(),
            &[Reading::Value(5.0)]
        );
    }

    #[test]
    fn adjust_is_deterministic() {
        let ds = dataset(&[Reading::Value(3.3), Reading::Missing, Reading::Value(0.7)]);
        let engine = AdjustmentEngine::new(PanelModel);
        let p = params(1.37, 211.0, 47.5);
        let a = engine.adjust(&ds, "PV Estimate", &p).unwrap();
        let b = engine.adjust(&ds, "PV Estimate", &p).unwrap();
        assert_eq!(a.dataset, b.dataset);
        assert_eq!(a.log, b.log);
    }

    #[test]
    fn unknown_or_text_column_is_rejected_without_mutation() {
        let ds = dataset(&[Reading::Value(1.0)]);
        let before = ds.clone();
        let engine = AdjustmentEngine::new(PanelModel);
        let p = AdjustmentParameters::default();

        assert!(matches!(
            engine.adjust(&ds, "Nope", &p),
            Err(AdjustError::ColumnNotFound { column }) if column == "Nope"
        ));
        assert!(matches!(
            engine.adjust(&ds, "Site", &p),
            Err(AdjustError::NotNumeric { .. })
        ));
        assert_eq!(ds, before);
    }

    #[test]
    fn failure_on_one_row_returns_no_column() {
        let values: Vec<Reading> = (0..10).map(|i| Reading::Value(i as f64)).collect();
        let ds = dataset(&values);
        let fails_on_three = |v: f64, m: f64, _a: f64, _t: f64| {
            if v == 3.0 {
                Err(AdjustmentFault("boom".into()))
            } else {
                Ok(v * m)
            }
        };
        let err = AdjustmentEngine::new(fails_on_three)
            .adjust(&ds, "PV Estimate", &AdjustmentParameters::default())
            .unwrap_err();
        match err {
            AdjustError::Failed {
                column, row_index, ..
            } => {
                assert_eq!(column, "PV Estimate");
                assert_eq!(row_index, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!ds.has_column("Adjusted_PV Estimate"));
    }

    #[test]
    fn non_finite_result_is_a_failure() {
        let ds = dataset(&[Reading::Value(1.0)]);
        let nan = |_v: f64, _m: f64, _a: f64, _t: f64| -> Result<f64, AdjustmentFault> {
            Ok(f64::NAN)
        };
        let err = AdjustmentEngine::new(nan)
            .adjust(&ds, "PV Estimate", &AdjustmentParameters::default())
            .unwrap_err();
        assert!(matches!(err, AdjustError::Failed { row_index: 0, .. }));
    }

    #[test]
    fn multiplier_only_premultiplies_and_uses_reduced_form() {
        let ds = dataset(&[Reading::Value(10.0)]);
        let out = AdjustmentEngine::new(PanelModel)
            .with_mode(AdjustMode::MultiplierOnly)
            .adjust(&ds, "PV Estimate", &params(1.5, 0.0, 90.0))
            .unwrap();
        assert_eq!(
            out.dataset.numeric("Adjusted_PV Estimate").unwrap(),
            &[Reading::Value(15.0)]
        );
    }

    #[test]
    fn boundary_parameters_are_accepted() {
        let ds = dataset(&[Reading::Value(50.0)]);
        let engine = AdjustmentEngine::new(PanelModel);
        for m in [*MULTIPLIER_RANGE.start(), *MULTIPLIER_RANGE.end()] {
            for a in [*AZIMUTH_RANGE.start(), *AZIMUTH_RANGE.end()] {
                for t in [*TILT_RANGE.start(), *TILT_RANGE.end()] {
                    engine.adjust(&ds, "PV Estimate", &params(m, a, t)).unwrap();
                }
            }
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let p = |m, a, t| params(m, a, t).validate();
        assert_eq!(p(0.0, 180.0, 30.0), Err(ParamError::NonPositiveMultiplier(0.0)));
        assert!(matches!(p(1.0, 361.0, 30.0), Err(ParamError::OutOfRange { name: "azimuth", .. })));
        assert!(matches!(p(1.0, 180.0, -1.0), Err(ParamError::OutOfRange { name: "tilt", .. })));
        assert!(matches!(p(f64::NAN, 180.0, 30.0), Err(ParamError::NotFinite { .. })));
        assert!(p(5.0, 180.0, 30.0).is_ok());
    }
}
