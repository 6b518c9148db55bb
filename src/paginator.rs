use std::time::Duration;
use tokio::time::sleep;

use crate::session::{BrowsingSession, Control};

const NEXT_LABEL: &str = "Next";

/// Finds and follows the "Next" pagination control.
///
/// Errors never escape: a failed lookup or click reads as "no next page",
/// which ends the scrape loop normally.
pub struct Paginator {
    settle: Duration,
}

impl Paginator {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// First enabled and displayed "Next" control, in document order.
    pub async fn has_next<S: BrowsingSession>(&self, session: &mut S) -> Option<Control> {
        match session.find_clickable_by_text(NEXT_LABEL).await {
            Ok(controls) => controls.into_iter().find(Control::is_usable),
            Err(e) => {
                log::warn!("Error checking for next page: {:#}", e);
                None
            }
        }
    }

    /// Clicks `control` and waits for the next page to settle. Whether the
    /// page actually changed is left to the next extraction.
    pub async fn advance<S: BrowsingSession>(&self, session: &mut S, control: &Control) -> bool {
        if let Err(e) = session.click(control).await {
            log::warn!("Error navigating to next page: {:#}", e);
            return false;
        }
        sleep(self.settle).await;
        true
    }
}
