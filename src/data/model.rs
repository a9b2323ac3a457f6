use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Name of the column every forecast row is keyed by.
pub const TIMESTAMP_COLUMN: &str = "Period End";

/// Prefix of a derived column produced by an adjustment run.
pub const ADJUSTED_PREFIX: &str = "Adjusted_";

/// Columns that are always coerced to numbers on load.
pub const NUMERIC_COLUMNS: [&str; 9] = [
    "PV Estimate",
    "GHI",
    "DNI",
    "DHI",
    "Temperature (C)",
    "Humidity (%)",
    "Wind Speed (m/s)",
    "Wind Direction (deg)",
    "Cloud Cover (%)",
];

/// Literal marker the forecast export uses for absent values.
pub const MISSING_MARKER: &str = "N/A";

/// Name of the column an adjustment of `column` is written to.
pub fn adjusted_column_name(column: &str) -> String {
    format!("{ADJUSTED_PREFIX}{column}")
}

/// Whether `name` should be loaded as a numeric column.
pub fn is_numeric_column(name: &str) -> bool {
    NUMERIC_COLUMNS.contains(&name) || name.starts_with(ADJUSTED_PREFIX)
}

// ---------------------------------------------------------------------------
// Reading – a single numeric cell
// ---------------------------------------------------------------------------

/// A numeric cell. `Value` always holds a finite number; anything absent or
/// unparseable is `Missing`, which is distinct from zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Value(f64),
    Missing,
}

impl Reading {
    /// Build a reading from a raw float, mapping non-finite values to `Missing`.
    pub fn from_f64(v: f64) -> Self {
        if v.is_finite() {
            Reading::Value(v)
        } else {
            Reading::Missing
        }
    }

    /// Parse a cell of an allow-listed numeric column. Never fails.
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() || cell == MISSING_MARKER {
            return Reading::Missing;
        }
        cell.parse::<f64>()
            .map(Reading::from_f64)
            .unwrap_or(Reading::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Reading::Value(v) => Some(*v),
            Reading::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Reading::Missing)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(v) => write!(f, "{v}"),
            Reading::Missing => write!(f, "<missing>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamp – one `Period End` cell
// ---------------------------------------------------------------------------

/// A parsed `Period End` value. The original text is kept so that writing a
/// dataset back never reformats the time column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub text: String,
    pub utc: DateTime<Utc>,
}

impl Timestamp {
    /// Parse RFC 3339 or a naive `YYYY-MM-DD HH:MM[:SS]` (taken as UTC).
    pub fn parse(cell: &str) -> Option<Self> {
        let text = cell.trim();
        if text.is_empty() {
            return None;
        }
        let utc = match DateTime::parse_from_rfc3339(text) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(_) => parse_naive(text)?.and_utc(),
        };
        Some(Timestamp {
            text: text.to_string(),
            utc,
        })
    }

    /// Seconds since the Unix epoch, used as the plot x coordinate.
    pub fn epoch_seconds(&self) -> f64 {
        self.utc.timestamp() as f64 + f64::from(self.utc.timestamp_subsec_millis()) / 1000.0
    }
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

// ---------------------------------------------------------------------------
// Column storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Timestamp(Vec<Timestamp>),
    Numeric(Vec<Reading>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the cell at `row` the way it is written to storage.
    pub fn cell_text(&self, row: usize) -> String {
        match self {
            ColumnData::Timestamp(v) => v[row].text.clone(),
            ColumnData::Numeric(v) => match v[row] {
                Reading::Value(x) => x.to_string(),
                Reading::Missing => String::new(),
            },
            ColumnData::Text(v) => v[row].clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

// ---------------------------------------------------------------------------
// TimeSeriesDataset – the complete loaded table
// ---------------------------------------------------------------------------

/// A forecast table in header order. Cloning is a deep copy, so an
/// "original" and an "adjusted" dataset never share storage.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesDataset {
    columns: Vec<Column>,
    /// Position of the `Period End` column within `columns`.
    time_index: usize,
    /// File the dataset was loaded from, if any.
    source: Option<PathBuf>,
}

impl TimeSeriesDataset {
    /// Assemble a dataset from columns, checking the structural invariants:
    /// a `Period End` column exists, every column has the same length, and
    /// timestamps never decrease.
    pub fn new(columns: Vec<Column>) -> Result<Self, String> {
        let time_index = columns
            .iter()
            .position(|c| c.name == TIMESTAMP_COLUMN)
            .ok_or_else(|| format!("missing '{TIMESTAMP_COLUMN}' column"))?;

        let ColumnData::Timestamp(stamps) = &columns[time_index].data else {
            return Err(format!("'{TIMESTAMP_COLUMN}' is not a timestamp column"));
        };

        if let Some(pos) = stamps.windows(2).position(|w| w[1].utc < w[0].utc) {
            return Err(format!(
                "'{TIMESTAMP_COLUMN}' decreases at row {} ({} after {})",
                pos + 1,
                stamps[pos + 1],
                stamps[pos]
            ));
        }

        let rows = stamps.len();
        if let Some(bad) = columns.iter().find(|c| c.data.len() != rows) {
            return Err(format!(
                "column '{}' has {} rows, expected {rows}",
                bad.name,
                bad.data.len()
            ));
        }

        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(format!("duplicate column '{}'", col.name));
            }
        }

        Ok(TimeSeriesDataset {
            columns,
            time_index,
            source: None,
        })
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        match &self.columns[self.time_index].data {
            ColumnData::Timestamp(v) => v,
            // `new` guarantees the time column holds timestamps.
            _ => &[],
        }
    }

    /// Readings of a numeric column, `None` if absent or not numeric.
    pub fn numeric(&self, name: &str) -> Option<&[Reading]> {
        match &self.column(name)?.data {
            ColumnData::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Insert or replace a numeric column. A new column is appended at the
    /// end of the header; an existing one keeps its position.
    pub fn set_numeric(&mut self, name: &str, values: Vec<Reading>) -> Result<(), String> {
        if values.len() != self.len() {
            return Err(format!(
                "column '{name}' has {} rows, expected {}",
                values.len(),
                self.len()
            ));
        }
        if name == TIMESTAMP_COLUMN {
            return Err(format!("cannot overwrite '{TIMESTAMP_COLUMN}'"));
        }
        let data = ColumnData::Numeric(values);
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.data = data,
            None => self.columns.push(Column {
                name: name.to_string(),
                data,
            }),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn sample() -> TimeSeriesDataset {
        TimeSeriesDataset::new(vec![
            Column {
                name: TIMESTAMP_COLUMN.into(),
                data: ColumnData::Timestamp(vec![
                    ts("2024-06-01T10:00:00Z"),
                    ts("2024-06-01T10:30:00Z"),
                ]),
            },
            Column {
                name: "PV Estimate".into(),
                data: ColumnData::Numeric(vec![Reading::Value(1.5), Reading::Missing]),
            },
        ])
        .unwrap()
    }

    #[test]
    fn reading_parse_maps_markers_to_missing() {
        assert_eq!(Reading::parse("N/A"), Reading::Missing);
        assert_eq!(Reading::parse("  "), Reading::Missing);
        assert_eq!(Reading::parse("abc"), Reading::Missing);
        assert_eq!(Reading::parse("inf"), Reading::Missing);
        assert_eq!(Reading::parse(" 0 "), Reading::Value(0.0));
        assert_eq!(Reading::parse("12.25"), Reading::Value(12.25));
    }

    #[test]
    fn timestamp_accepts_rfc3339_and_naive_forms() {
        let a = ts("2024-06-01T10:30:00+02:00");
        let b = ts("2024-06-01 08:30:00");
        let c = ts("2024-06-01T08:30");
        assert_eq!(a.utc, b.utc);
        assert_eq!(b.utc, c.utc);
        assert_eq!(a.text, "2024-06-01T10:30:00+02:00");
        assert!(Timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn new_rejects_decreasing_timestamps() {
        let err = TimeSeriesDataset::new(vec![Column {
            name: TIMESTAMP_COLUMN.into(),
            data: ColumnData::Timestamp(vec![
                ts("2024-06-01T11:00:00Z"),
                ts("2024-06-01T10:00:00Z"),
            ]),
        }])
        .unwrap_err();
        assert!(err.contains("decreases at row 1"), "{err}");
    }

    #[test]
    fn new_requires_period_end() {
        let err = TimeSeriesDataset::new(vec![Column {
            name: "GHI".into(),
            data: ColumnData::Numeric(vec![]),
        }])
        .unwrap_err();
        assert!(err.contains("Period End"));
    }

    #[test]
    fn set_numeric_replaces_in_place() {
        let mut ds = sample();
        ds.set_numeric("Adjusted_PV Estimate", vec![Reading::Value(1.0), Reading::Missing])
            .unwrap();
        ds.set_numeric("Adjusted_PV Estimate", vec![Reading::Value(2.0), Reading::Missing])
            .unwrap();
        assert_eq!(ds.columns().len(), 3);
        assert_eq!(
            ds.numeric("Adjusted_PV Estimate").unwrap()[0],
            Reading::Value(2.0)
        );
        assert!(ds.set_numeric("x", vec![Reading::Missing]).is_err());
    }

    #[test]
    fn clone_is_independent() {
        let original = sample();
        let mut copy = original.clone();
        copy.set_numeric("PV Estimate", vec![Reading::Value(9.0), Reading::Value(9.0)])
            .unwrap();
        assert_eq!(original.numeric("PV Estimate").unwrap()[0], Reading::Value(1.5));
    }

    #[test]
    fn numeric_cells_are_written_shortest_round_trip() {
        let data = ColumnData::Numeric(vec![Reading::Value(0.1 + 0.2), Reading::Missing]);
        assert_eq!(data.cell_text(0).parse::<f64>().unwrap(), 0.1 + 0.2);
        assert_eq!(data.cell_text(1), "");
    }
}
