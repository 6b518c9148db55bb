use serde::Serialize;

use crate::extractor::{RawDataset, TableExtractor};
use crate::page::PageController;
use crate::paginator::Paginator;
use crate::session::BrowsingSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectorState {
    Init,
    Loaded,
    Done,
    Aborted,
}

/// What one pass over the paginated table produced.
#[derive(Debug, Clone)]
pub struct Collection {
    pub state: CollectorState,
    pub rows: RawDataset,
    pub pages: usize,
    pub empty_pages: usize,
}

impl Collection {
    fn aborted() -> Self {
        Self {
            state: CollectorState::Aborted,
            rows: Vec::new(),
            pages: 0,
            empty_pages: 0,
        }
    }
}

/// Drives page load, extraction and pagination over one session, strictly
/// one page at a time.
pub struct Collector {
    pub controller: PageController,
    pub extractor: TableExtractor,
    pub paginator: Paginator,
    pub items_per_page: Option<u32>,
    pub max_pages: Option<usize>,
}

impl Collector {
    pub async fn collect<S: BrowsingSession>(&self, session: &mut S, target_url: &str) -> Collection {
        let mut state = CollectorState::Init;
        log::debug!("Collector state: {:?}", state);

        if !self.controller.load(session, target_url).await {
            log::error!("Failed to load the main page, aborting");
            return Collection::aborted();
        }
        state = CollectorState::Loaded;
        log::debug!("Collector state: {:?}", state);

        if let Some(count) = self.items_per_page {
            self.controller.set_items_per_page(session, count).await;
        }

        let mut rows = RawDataset::new();
        let mut pages = 0;
        let mut empty_pages = 0;

        while state == CollectorState::Loaded {
            pages += 1;
            log::info!("Scraping page {}", pages);

            let page_rows = self.extractor.extract_current_page(session).await;
            if page_rows.is_empty() {
                empty_pages += 1;
                log::warn!("No data found on page {}", pages);
            }
            rows.extend(page_rows);

            if self.max_pages.is_some_and(|max| pages >= max) {
                log::warn!("Reached page limit of {}", pages);
                state = CollectorState::Done;
                continue;
            }

            let advanced = match self.paginator.has_next(session).await {
                Some(control) => self.paginator.advance(session, &control).await,
                None => false,
            };
            if !advanced {
                log::info!("No more pages available or failed to navigate");
                state = CollectorState::Done;
            }
        }

        log::info!("Total pages scraped: {}", pages);
        log::info!("Total rows collected: {}", rows.len());

        Collection {
            state,
            rows,
            pages,
            empty_pages,
        }
    }
}
