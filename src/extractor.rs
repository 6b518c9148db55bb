use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;

use crate::session::BrowsingSession;

/// One table row: trimmed cell texts in source column order.
pub type RawRow = Vec<String>;

/// Rows from every page, in the order they were read.
pub type RawDataset = Vec<RawRow>;

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());

pub struct TableExtractor {
    wait: Duration,
}

impl TableExtractor {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }

    /// Rows of the first table in the session's current document. An empty
    /// result is a valid outcome for a single page, never an error.
    pub async fn extract_current_page<S: BrowsingSession>(&self, session: &mut S) -> Vec<RawRow> {
        match session.wait_for_element("table", self.wait).await {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("No table appeared within {}s", self.wait.as_secs());
                return Vec::new();
            }
            Err(e) => {
                log::warn!("Error waiting for table: {:#}", e);
                return Vec::new();
            }
        }

        let html = match session.current_document_html().await {
            Ok(html) => html,
            Err(e) => {
                log::warn!("Error extracting table data: {:#}", e);
                return Vec::new();
            }
        };

        let rows = parse_first_table(&html);
        if rows.is_empty() {
            log::warn!("No data rows found in table");
        } else {
            log::info!("Extracted {} rows from current page", rows.len());
        }
        rows
    }
}

/// Parses the first `<table>` of `html`. Rows without any `th`/`td` cell are
/// skipped. Later tables are ignored; rows of tables nested inside the
/// first one are read like any other row.
pub fn parse_first_table(html: &str) -> Vec<RawRow> {
    let document = Html::parse_document(html);
    let Some(table) = document.select(&TABLE).next() else {
        return Vec::new();
    };

    table
        .select(&ROW)
        .map(|row| row.select(&CELL).map(cell_text).collect::<RawRow>())
        .filter(|cells| !cells.is_empty())
        .collect()
}

/// Text nodes are concatenated as they appear, whitespace included, and only
/// the ends of the result are trimmed: `<td>1,234 <span>Rs</span></td>`
/// reads as `1,234 Rs`, not `1,234Rs`.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::fake::{FakeSession, table_page, trade_rows};

    #[test]
    fn test_cell_text_keeps_inner_whitespace() {
        let rows = parse_first_table(
            "<table><tr><td> 1,234 <span>Rs</span> </td><td>Nabil <b>Bank</b></td></tr></table>",
        );
        assert_eq!(rows, vec![vec!["1,234 Rs".to_string(), "Nabil Bank".to_string()]]);
    }

    #[test]
    fn test_parse_first_table() {
        let html = r#"
            <html><body>
                <table>
                    <thead><tr><th> SN </th><th>Contract No.</th></tr></thead>
                    <tbody>
                        <tr><td>1</td><td>
                            2025001
                        </td></tr>
                        <tr></tr>
                        <tr><td>2</td><td><span>2025</span>002</td></tr>
                    </tbody>
                </table>
                <table><tr><td>ignored</td></tr></table>
            </body></html>
        "#;

        let rows = parse_first_table(html);
        assert_eq!(
            rows,
            vec![
                vec!["SN".to_string(), "Contract No.".to_string()],
                vec!["1".to_string(), "2025001".to_string()],
                vec!["2".to_string(), "2025002".to_string()],
            ]
        );
    }

    #[test]
    fn test_parse_without_table() {
        assert!(parse_first_table("<html><body><p>No trades</p></body></html>").is_empty());
        assert!(parse_first_table("<table></table>").is_empty());
    }

    #[tokio::test]
    async fn test_extract_current_page() {
        let header = ["SN", "Contract No.", "Stock Symbol"];
        let mut session = FakeSession::with_pages(vec![table_page(Some(&header[..]), &trade_rows(1, 3))]);
        session.loaded = true;

        let rows = TableExtractor::new(Duration::ZERO).extract_current_page(&mut session).await;
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], vec!["SN", "Contract No.", "Stock Symbol"]);
        assert_eq!(rows[1][2], "NABIL");
        assert_eq!(rows[1][6], "1,234.50");
    }

    #[tokio::test]
    async fn test_extract_missing_table_is_empty() {
        let mut session = FakeSession::with_pages(vec!["<html></html>".into()]);
        session.loaded = true;
        let rows = TableExtractor::new(Duration::ZERO).extract_current_page(&mut session).await;
        assert!(rows.is_empty());
    }
}
