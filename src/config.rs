use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::adjust::AdjustMode;
use crate::control::{Baseline, ControlSettings, WriteTarget};
use crate::data::select::DEFAULT_COLUMN;

/// Keys every configuration document must carry.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "SOLCAST_API_KEY",
    "ROOFTOP_SITE_ID",
    "OUTPUT_CSV",
    "LATITUDE",
    "LONGITUDE",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file '{}' not found", path.display())]
    NotFound { path: PathBuf },

    #[error("reading configuration file '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration file '{}' is not valid: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing configuration fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Overwrite,
    NewFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineMode {
    #[default]
    Pristine,
    Compound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionMode {
    #[default]
    Oriented,
    MultiplierOnly,
}

/// Application configuration, read from a JSON document.
///
/// The API key and site id belong to the forecast fetch step; this crate
/// only carries them.
#[derive(Clone, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "SOLCAST_API_KEY")]
    pub solcast_api_key: String,
    #[serde(rename = "ROOFTOP_SITE_ID")]
    pub rooftop_site_id: String,
    #[serde(rename = "OUTPUT_CSV")]
    pub output_csv: PathBuf,
    #[serde(rename = "LATITUDE")]
    pub latitude: f64,
    #[serde(rename = "LONGITUDE")]
    pub longitude: f64,

    #[serde(rename = "ADJUST_COLUMN", default = "default_column")]
    pub adjust_column: String,
    #[serde(rename = "WRITE_MODE", default)]
    pub write_mode: WriteMode,
    #[serde(rename = "BASELINE", default)]
    pub baseline: BaselineMode,
    #[serde(rename = "ADJUST_MODE", default)]
    pub adjust_mode: FunctionMode,
}

fn default_column() -> String {
    DEFAULT_COLUMN.to_string()
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("solcast_api_key", &"<redacted>")
            .field("rooftop_site_id", &self.rooftop_site_id)
            .field("output_csv", &self.output_csv)
            .field("latitude", &self.latitude)
            .field("longitude", &self.longitude)
            .field("adjust_column", &self.adjust_column)
            .field("write_mode", &self.write_mode)
            .field("baseline", &self.baseline)
            .field("adjust_mode", &self.adjust_mode)
            .finish()
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound {
                path: path.to_path_buf(),
            },
            _ => ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        let config = Self::from_json(&text).map_err(|e| match e {
            ConfigError::Invalid { source, .. } => ConfigError::Invalid {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        log::debug!("Loaded configuration {config:?}");
        Ok(config)
    }

    /// Parse a document, reporting every missing required key at once.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let invalid = |source| ConfigError::Invalid {
            path: PathBuf::new(),
            source,
        };
        let root: JsonValue = serde_json::from_str(text).map_err(invalid)?;

        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|key| root.get(**key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing));
        }

        serde_json::from_value(root).map_err(invalid)
    }

    /// Control-loop settings described by this configuration.
    pub fn settings(&self) -> ControlSettings {
        ControlSettings {
            column: Some(self.adjust_column.clone()),
            write: match self.write_mode {
                WriteMode::Overwrite => WriteTarget::Overwrite,
                WriteMode::NewFile => WriteTarget::NewFile,
            },
            baseline: match self.baseline {
                BaselineMode::Pristine => Baseline::Pristine,
                BaselineMode::Compound => Baseline::Compound,
            },
            mode: match self.adjust_mode {
                FunctionMode::Oriented => AdjustMode::Oriented,
                FunctionMode::MultiplierOnly => AdjustMode::MultiplierOnly,
            },
            ..ControlSettings::default()
        }
    }

    /// `OUTPUT_CSV`, resolved against the directory holding the config file
    /// when relative.
    pub fn dataset_path(&self, config_path: &Path) -> PathBuf {
        if self.output_csv.is_absolute() {
            return self.output_csv.clone();
        }
        config_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.output_csv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "SOLCAST_API_KEY": "secret",
        "ROOFTOP_SITE_ID": "abcd-1234",
        "OUTPUT_CSV": "solar_forecasts.csv",
        "LATITUDE": 51.2,
        "LONGITUDE": 3.47
    }"#;

    #[test]
    fn parses_required_fields_and_defaults() {
        let config = AppConfig::from_json(FULL).unwrap();
        assert_eq!(config.rooftop_site_id, "abcd-1234");
        assert_eq!(config.adjust_column, "PV Estimate");
        assert_eq!(config.write_mode, WriteMode::Overwrite);

        let settings = config.settings();
        assert_eq!(settings.write, WriteTarget::Overwrite);
        assert_eq!(settings.baseline, Baseline::Pristine);
        assert_eq!(settings.column.as_deref(), Some("PV Estimate"));
    }

    #[test]
    fn optional_modes_are_read() {
        let text = FULL.replace(
            "\"LONGITUDE\": 3.47",
            "\"LONGITUDE\": 3.47, \"WRITE_MODE\": \"new_file\", \
             \"BASELINE\": \"compound\", \"ADJUST_MODE\": \"multiplier_only\"",
        );
        let settings = AppConfig::from_json(&text).unwrap().settings();
        assert_eq!(settings.write, WriteTarget::NewFile);
        assert_eq!(settings.baseline, Baseline::Compound);
        assert_eq!(settings.mode, AdjustMode::MultiplierOnly);
    }

    #[test]
    fn reports_every_missing_field() {
        let err = AppConfig::from_json(r#"{"SOLCAST_API_KEY": "k", "LATITUDE": 1.0}"#)
            .unwrap_err();
        match err {
            ConfigError::MissingFields(fields) => {
                assert_eq!(fields, ["ROOFTOP_SITE_ID", "OUTPUT_CSV", "LONGITUDE"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            AppConfig::from_json("{not json"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig::from_json(FULL).unwrap();
        let shown = format!("{config:?}");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn relative_dataset_path_resolves_next_to_config() {
        let config = AppConfig::from_json(FULL).unwrap();
        assert_eq!(
            config.dataset_path(Path::new("/etc/pv/config.json")),
            PathBuf::from("/etc/pv/solar_forecasts.csv")
        );
    }
}
