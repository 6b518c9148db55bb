// Floor Sheet Scraper Library
//
// Drives a headless browser through the paginated floor sheet table,
// cleans the rows into a typed dataset and persists one CSV per day.
// The `api` module serves the persisted files read-only.

pub mod api;
pub mod browser;
pub mod collector;
pub mod config;
pub mod error;
pub mod extractor;
pub mod normalizer;
pub mod page;
pub mod paginator;
pub mod pipeline;
pub mod session;
pub mod storage;
pub mod store;
pub mod utils;

// Re-export main types for convenience
pub use collector::{Collection, Collector, CollectorState};
pub use config::{ApiConfig, AppConfig, BrowserSettings, ScraperConfig, StoreBackend, Timeouts};
pub use error::ScrapeError;
pub use extractor::{RawDataset, RawRow, TableExtractor};
pub use normalizer::{CellValue, CleanedDataset, CleanedRow, ColumnNaming, normalize};
pub use pipeline::{Pipeline, RunSummary};
pub use session::{BrowsingSession, Control};
pub use storage::{ArtifactInfo, ArtifactStore};
pub use store::{DocumentStore, GitHubStore, LocalStore};
