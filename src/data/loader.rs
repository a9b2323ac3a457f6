use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::model::{
    is_numeric_column, Column, ColumnData, Reading, TimeSeriesDataset, Timestamp,
    MISSING_MARKER, TIMESTAMP_COLUMN,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a forecast file could not be turned into a dataset. None of these are
/// retried; the caller decides how to report them.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file '{}' does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("file '{}' contains no data rows", path.display())]
    Empty { path: PathBuf },

    #[error("file '{}' is malformed: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("reading '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a forecast CSV into a [`TimeSeriesDataset`].
///
/// * Column names are trimmed.
/// * `Period End` is required and must never decrease.
/// * Allow-listed numeric columns (and any `Adjusted_*` column) are coerced
///   to numbers; `N/A`, empty and unparseable cells become missing instead
///   of failing the load.
/// * Any other column whose present cells all parse as numbers (such as
///   `PV Estimate10`) is numeric too.
/// * Every other column is kept as text.
pub fn load(path: &Path) -> Result<TimeSeriesDataset, LoadError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LoadError::NotFound {
            path: path.to_path_buf(),
        },
        _ => LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let malformed = |reason: String| LoadError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for result in reader.records() {
        let record = result.map_err(|e| csv_error(path, e))?;
        for (col, value) in record.iter().enumerate() {
            cells[col].push(value.to_string());
        }
    }

    let rows = cells.first().map_or(0, Vec::len);
    if rows == 0 {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }

    let mut columns = Vec::with_capacity(headers.len());
    for (name, raw) in headers.into_iter().zip(cells) {
        let data = if name == TIMESTAMP_COLUMN {
            ColumnData::Timestamp(parse_timestamps(&raw).map_err(&malformed)?)
        } else if is_numeric_column(&name) || looks_numeric(&raw) {
            ColumnData::Numeric(raw.iter().map(|c| Reading::parse(c)).collect())
        } else {
            ColumnData::Text(raw)
        };
        columns.push(Column { name, data });
    }

    let dataset = TimeSeriesDataset::new(columns)
        .map_err(malformed)?
        .with_source(path);

    log::debug!(
        "Loaded {} rows with columns {:?} from {}",
        dataset.len(),
        dataset.column_names().collect::<Vec<_>>(),
        path.display()
    );
    Ok(dataset)
}

/// A column outside the allow-list is numeric when it has at least one value
/// and every non-missing cell parses as a number.
fn looks_numeric(raw: &[String]) -> bool {
    let mut present = raw
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty() && *c != MISSING_MARKER)
        .peekable();
    present.peek().is_some() && present.all(|c| c.parse::<f64>().is_ok())
}

fn parse_timestamps(raw: &[String]) -> Result<Vec<Timestamp>, String> {
    raw.iter()
        .enumerate()
        .map(|(row, cell)| {
            Timestamp::parse(cell)
                .ok_or_else(|| format!("row {row}: '{cell}' is not a valid {TIMESTAMP_COLUMN}"))
        })
        .collect()
}

fn csv_error(path: &Path, e: csv::Error) -> LoadError {
    let path = path.to_path_buf();
    match e.into_kind() {
        csv::ErrorKind::Io(source) => LoadError::Io { path, source },
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => {
            let line = pos.map_or_else(|| "?".to_string(), |p| p.line().to_string());
            LoadError::Malformed {
                path,
                reason: format!("line {line} has {len} fields, expected {expected_len}"),
            }
        }
        other => LoadError::Malformed {
            path,
            reason: format!("{other:?}"),
        },
    }
}
