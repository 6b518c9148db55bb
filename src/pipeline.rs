use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::path::PathBuf;

use crate::browser::ChromeSession;
use crate::collector::{Collector, CollectorState};
use crate::config::{BrowserSettings, ScraperConfig};
use crate::error::ScrapeError;
use crate::extractor::TableExtractor;
use crate::normalizer::normalize;
use crate::page::PageController;
use crate::paginator::Paginator;
use crate::session::BrowsingSession;
use crate::storage::ArtifactStore;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub pages: usize,
    pub raw_rows: usize,
    pub cleaned_rows: usize,
    /// `None` when the scrape produced no data and nothing was written.
    pub artifact: Option<PathBuf>,
}

pub struct Pipeline {
    config: ScraperConfig,
    collector: Collector,
    store: ArtifactStore,
}

impl Pipeline {
    pub fn new(config: ScraperConfig) -> Self {
        let timeouts = &config.timeouts;
        let collector = Collector {
            controller: PageController::new(timeouts.table_wait()),
            extractor: TableExtractor::new(timeouts.extract_wait()),
            paginator: Paginator::new(timeouts.settle()),
            items_per_page: config.items_per_page,
            max_pages: config.max_pages,
        };
        let store = ArtifactStore::new(config.data_dir.clone(), config.source_name.clone());

        Self {
            config,
            collector,
            store,
        }
    }

    #[cfg(test)]
    fn with_collector(mut self, collector: Collector) -> Self {
        self.collector = collector;
        self
    }

    /// Launches Chrome, scrapes and persists today's artifact. The browser
    /// is closed whatever the outcome.
    pub async fn run(&self, browser: &BrowserSettings) -> Result<RunSummary, ScrapeError> {
        let mut session = ChromeSession::launch(browser, self.config.timeouts.page_load())
            .await
            .map_err(ScrapeError::Browser)?;

        self.run_session(&mut session, Local::now().date_naive()).await
    }

    /// [`Pipeline::run_with`], then closes `session` whatever the outcome.
    pub async fn run_session<S: BrowsingSession>(
        &self,
        session: &mut S,
        date: NaiveDate,
    ) -> Result<RunSummary, ScrapeError> {
        let result = self.run_with(session, date).await;
        session.close().await;
        result
    }

    /// Collect, normalize and persist over an already acquired session. The
    /// session is left open.
    pub async fn run_with<S: BrowsingSession>(
        &self,
        session: &mut S,
        date: NaiveDate,
    ) -> Result<RunSummary, ScrapeError> {
        let started_at = Local::now().to_rfc3339();

        let collection = self.collector.collect(session, &self.config.target_url).await;
        if collection.state == CollectorState::Aborted {
            return Err(ScrapeError::LoadFailure {
                url: self.config.target_url.clone(),
            });
        }

        let raw_rows = collection.rows.len();
        let mut summary = RunSummary {
            started_at,
            pages: collection.pages,
            raw_rows,
            cleaned_rows: 0,
            artifact: None,
        };

        if raw_rows == 0 {
            log::warn!("No data was scraped. Please check the website structure.");
            return Ok(summary);
        }

        let dataset = normalize(collection.rows);
        summary.cleaned_rows = dataset.len();
        if dataset.is_empty() {
            log::warn!("No data remaining after cleaning.");
            return Ok(summary);
        }

        let path = self
            .store
            .write(&dataset, date)
            .map_err(|source| ScrapeError::Persist {
                path: self.store.artifact_path(date),
                source,
            })?;

        log::info!("Total records saved: {}", dataset.len());
        summary.artifact = Some(path);
        Ok(summary)
    }
}
