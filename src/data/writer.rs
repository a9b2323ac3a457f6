use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use super::model::TimeSeriesDataset;

/// A dataset could not be written. Fatal to the operation that triggered
/// it; nothing retries automatically.
#[derive(Debug, Error)]
#[error("failed to write '{}': {cause}", path.display())]
pub struct WriteError {
    pub path: PathBuf,
    pub cause: String,
}

impl WriteError {
    fn new(path: &Path, cause: impl ToString) -> Self {
        WriteError {
            path: path.to_path_buf(),
            cause: cause.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output naming
// ---------------------------------------------------------------------------

/// `adjusted_<stem>_<YYYYmmddHHMMSS><.ext>` next to `source`. If that name is
/// already taken, `_1`, `_2`, ... is appended until it is not.
pub fn fresh_output_path(source: &Path, at: DateTime<Local>) -> PathBuf {
    let dir = source.parent().unwrap_or_else(|| Path::new(""));
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset");
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let base = format!("adjusted_{stem}_{}", at.format("%Y%m%d%H%M%S"));

    let mut candidate = dir.join(format!("{base}{ext}"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{base}_{n}{ext}"));
        n += 1;
    }
    candidate
}

// ---------------------------------------------------------------------------
// PersistenceCoordinator
// ---------------------------------------------------------------------------

/// Owns the on-disk representation of datasets: where a write goes and how
/// it gets there.
#[derive(Debug, Clone, Default)]
pub struct PersistenceCoordinator;

impl PersistenceCoordinator {
    pub fn new() -> Self {
        PersistenceCoordinator
    }

    /// Write `dataset` to `destination`, or to a fresh timestamped path next
    /// to the dataset's source file when no destination is given.
    pub fn save(
        &self,
        dataset: &TimeSeriesDataset,
        destination: Option<&Path>,
    ) -> Result<PathBuf, WriteError> {
        let path = match destination {
            Some(p) => p.to_path_buf(),
            None => {
                let source = dataset.source().ok_or_else(|| {
                    WriteError::new(Path::new(""), "no destination given and dataset has no source file")
                })?;
                fresh_output_path(source, Local::now())
            }
        };
        write_atomic(dataset, &path)?;
        log::info!("Saved {} rows to {}", dataset.len(), path.display());
        Ok(path)
    }

    /// Replace the file at `source` with `dataset`. Whatever is written here
    /// is what the next load of `source` sees.
    pub fn save_overwrite(
        &self,
        dataset: &TimeSeriesDataset,
        source: &Path,
    ) -> Result<PathBuf, WriteError> {
        write_atomic(dataset, source)?;
        log::info!(
            "Overwrote {} with {} rows",
            source.display(),
            dataset.len()
        );
        Ok(source.to_path_buf())
    }
}

// ---------------------------------------------------------------------------
// Atomic CSV write
// ---------------------------------------------------------------------------

/// Removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Serialize to `<path>.tmp`, sync, then rename over `path`, so readers see
/// either the old file or the complete new one.
fn write_atomic(dataset: &TimeSeriesDataset, path: &Path) -> Result<(), WriteError> {
    if path.as_os_str().is_empty() {
        return Err(WriteError::new(path, "empty path"));
    }
    let tmp_path = temp_path_for(path);
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let file = File::create(&tmp_path).map_err(|e| WriteError::new(path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        write_records(&mut writer, dataset).map_err(|e| WriteError::new(path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| WriteError::new(path, e.error()))?;
        file.sync_all().map_err(|e| WriteError::new(path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| WriteError::new(path, e))?;
    guard.disarm();
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_records<W: io::Write>(
    writer: &mut csv::Writer<W>,
    dataset: &TimeSeriesDataset,
) -> csv::Result<()> {
    writer.write_record(dataset.column_names())?;
    let columns = dataset.columns();
    for row in 0..dataset.len() {
        writer.write_record(columns.iter().map(|c| c.data.cell_text(row)))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader;
    use chrono::TimeZone;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const CSV: &str = "Period End,PV Estimate,GHI,Site\n\
        2024-06-01T10:00:00Z,0.30000000000000004,N/A,roof\n\
        2024-06-01T10:30:00Z,N/A,512.5,\"roof, east\"\n";

    fn fixture(tmp: &TempDir) -> Result<TimeSeriesDataset, Box<dyn std::error::Error>> {
        let path = tmp.path().join("solar_forecasts.csv");
        fs::write(&path, CSV)?;
        Ok(loader::load(&path)?)
    }

    #[test]
    fn save_then_load_round_trips_numeric_columns() -> TestResult {
        let tmp = TempDir::new()?;
        let ds = fixture(&tmp)?;
        let out = tmp.path().join("copy.csv");

        let written = PersistenceCoordinator::new().save(&ds, Some(&out))?;
        assert_eq!(written, out);

        let back = loader::load(&out)?;
        assert_eq!(back.numeric("PV Estimate"), ds.numeric("PV Estimate"));
        assert_eq!(back.numeric("GHI"), ds.numeric("GHI"));
        assert_eq!(back.timestamps(), ds.timestamps());
        assert_eq!(back.column("Site"), ds.column("Site"));
        Ok(())
    }

    #[test]
    fn save_without_destination_never_touches_source() -> TestResult {
        let tmp = TempDir::new()?;
        let ds = fixture(&tmp)?;
        let coordinator = PersistenceCoordinator::new();

        let first = coordinator.save(&ds, None)?;
        let second = coordinator.save(&ds, None)?;

        assert_ne!(first, second);
        assert_ne!(first, tmp.path().join("solar_forecasts.csv"));
        assert_eq!(fs::read_to_string(tmp.path().join("solar_forecasts.csv"))?, CSV);
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("adjusted_solar_forecasts_"), "{name}");
        assert!(name.ends_with(".csv"), "{name}");
        Ok(())
    }

    #[test]
    fn fresh_output_path_appends_counter_on_collision() -> TestResult {
        let tmp = TempDir::new()?;
        let source = tmp.path().join("solar_forecasts.csv");
        let at = Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let first = fresh_output_path(&source, at);
        assert_eq!(first, tmp.path().join("adjusted_solar_forecasts_20240601120000.csv"));

        fs::write(&first, "x")?;
        let second = fresh_output_path(&source, at);
        assert_eq!(second, tmp.path().join("adjusted_solar_forecasts_20240601120000_1.csv"));
        Ok(())
    }

    #[test]
    fn save_overwrite_replaces_source_and_leaves_no_temp_file() -> TestResult {
        let tmp = TempDir::new()?;
        let mut ds = fixture(&tmp)?;
        let source = ds.source().unwrap().to_path_buf();
        ds.set_numeric(
            "Adjusted_PV Estimate",
            vec![crate::data::model::Reading::Value(7.5), crate::data::model::Reading::Missing],
        )?;

        let written = PersistenceCoordinator::new().save_overwrite(&ds, &source)?;
        assert_eq!(written, source);

        let back = loader::load(&source)?;
        assert_eq!(back.numeric("Adjusted_PV Estimate"), ds.numeric("Adjusted_PV Estimate"));
        let leftovers: Vec<_> = fs::read_dir(tmp.path())?
            .filter_map(Result::ok)
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn write_into_missing_directory_fails_cleanly() -> TestResult {
        let tmp = TempDir::new()?;
        let ds = fixture(&tmp)?;
        let target = tmp.path().join("no-such-dir").join("out.csv");

        let err = PersistenceCoordinator::new()
            .save(&ds, Some(&target))
            .unwrap_err();
        assert_eq!(err.path, target);
        assert!(!target.exists());
        Ok(())
    }
}
