use std::time::Duration;
use tokio::time::sleep;

use crate::session::BrowsingSession;

const TABLE_TAG: &str = "table";
const ITEMS_PER_PAGE_FIELD: &str = "items_per_page";
const ITEMS_PER_PAGE_SETTLE: Duration = Duration::from_secs(2);

/// Brings the session to the floor sheet page and confirms the table
/// rendered. Failures are logged and reported as `false`.
pub struct PageController {
    table_wait: Duration,
    dropdown_wait: Duration,
    dropdown_settle: Duration,
}

impl PageController {
    pub fn new(table_wait: Duration) -> Self {
        Self {
            table_wait,
            dropdown_wait: Duration::from_secs(10),
            dropdown_settle: ITEMS_PER_PAGE_SETTLE,
        }
    }

    pub fn with_dropdown_timing(mut self, wait: Duration, settle: Duration) -> Self {
        self.dropdown_wait = wait;
        self.dropdown_settle = settle;
        self
    }

    pub async fn load<S: BrowsingSession>(&self, session: &mut S, target_url: &str) -> bool {
        log::info!("Loading {}", target_url);

        if let Err(e) = session.navigate(target_url).await {
            log::error!("Error loading page: {:#}", e);
            return false;
        }

        match session.wait_for_element(TABLE_TAG, self.table_wait).await {
            Ok(true) => {
                log::info!("Page loaded successfully");
                true
            }
            Ok(false) => {
                log::error!(
                    "Page failed to load within {}s (no <table> rendered)",
                    self.table_wait.as_secs()
                );
                false
            }
            Err(e) => {
                log::error!("Error waiting for table: {:#}", e);
                false
            }
        }
    }

    /// Picks `count` in the items-per-page dropdown. Non-fatal: the scrape
    /// simply continues with the site default when this fails.
    pub async fn set_items_per_page<S: BrowsingSession>(&self, session: &mut S, count: u32) -> bool {
        let selected = session
            .select_option(ITEMS_PER_PAGE_FIELD, &count.to_string(), self.dropdown_wait)
            .await;

        match selected {
            Ok(true) => {
                sleep(self.dropdown_settle).await;
                log::info!("Set items per page to {}", count);
                true
            }
            Ok(false) => {
                log::warn!("Could not set items per page: dropdown not found");
                false
            }
            Err(e) => {
                log::warn!("Could not set items per page: {:#}", e);
                false
            }
        }
    }
}
