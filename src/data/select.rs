use super::model::{ColumnData, TimeSeriesDataset, ADJUSTED_PREFIX};

/// Column offered by default when the file has it.
pub const DEFAULT_COLUMN: &str = "PV Estimate";

/// Numeric columns a user may adjust, in header order. Derived
/// `Adjusted_*` columns are never offered as a source.
pub fn adjustable_columns(dataset: &TimeSeriesDataset) -> Vec<String> {
    dataset
        .columns()
        .iter()
        .filter(|c| matches!(c.data, ColumnData::Numeric(_)))
        .filter(|c| !c.name.starts_with(ADJUSTED_PREFIX))
        .map(|c| c.name.clone())
        .collect()
}

/// `PV Estimate` if present, otherwise the first adjustable column.
pub fn default_column(dataset: &TimeSeriesDataset) -> Option<String> {
    let columns = adjustable_columns(dataset);
    if columns.iter().any(|c| c == DEFAULT_COLUMN) {
        return Some(DEFAULT_COLUMN.to_string());
    }
    columns.into_iter().next()
}
