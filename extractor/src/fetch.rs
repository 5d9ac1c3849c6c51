use tracing::warn;

use crate::client::{QueryApi, Row};

/// Row cap the query service applies to one run across all pages.
pub const MAX_ROWS: usize = 1_000_000;

const FIRST_PAGE: u32 = 1;

/// All pages of one query run, concatenated in fetch order.
pub struct ResultSet {
    pub rows: Vec<Row>,
    /// Row count reached the service cap; results may be incomplete.
    pub truncated: bool,
    /// At least one page fetch failed and was counted as empty.
    pub had_failures: bool,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

enum PageFetch {
    Rows(Vec<Row>),
    Failed,
}

/// One page of one query run. Any client error is logged together with the
/// query text and reported as a failed page instead of propagating.
async fn fetch_page(api: &dyn QueryApi, sql: &str, page_number: u32) -> PageFetch {
    match api.run(sql, page_number).await {
        Ok(rows) => PageFetch::Rows(rows),
        Err(err) => {
            warn!(page = page_number, error = %err, sql, "query page failed");
            PageFetch::Failed
        }
    }
}

/// Fetches pages starting at 1 while each page comes back full; the first
/// short page (including an empty one) ends the run. A failed page counts
/// as empty but is remembered on the returned set.
pub async fn paginate(api: &dyn QueryApi, sql: &str) -> ResultSet {
    let page_size = api.page_size();
    let mut pages: Vec<Vec<Row>> = Vec::new();
    let mut had_failures = false;
    let mut page_number = FIRST_PAGE;

    loop {
        let fetched = match fetch_page(api, sql, page_number).await {
            PageFetch::Rows(rows) => rows,
            PageFetch::Failed => {
                had_failures = true;
                Vec::new()
            }
        };
        let fetched_len = fetched.len();
        pages.push(fetched);
        if fetched_len < page_size {
            break;
        }
        page_number += 1;
    }

    let rows: Vec<Row> = pages.into_iter().flatten().collect();
    let truncated = rows.len() == MAX_ROWS;
    if truncated {
        warn!(
            rows = rows.len(),
            "query hit the service row cap; results may be incomplete"
        );
    }

    ResultSet {
        rows,
        truncated,
        had_failures,
    }
}
