/// Data layer: core types, loading, persistence and column discovery.
///
/// Architecture:
/// ```text
///  solar_forecasts.csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse CSV → TimeSeriesDataset
///   └──────────┘
///        │
///        ▼
///   ┌───────────────────┐
///   │ TimeSeriesDataset  │  columns in header order, Period End index
///   └───────────────────┘
///        │            ▲
///        ▼            │ reload
///   ┌──────────┐      │
///   │  writer   │ ─────┘  atomic CSV write (new file or overwrite)
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod select;
pub mod writer;
