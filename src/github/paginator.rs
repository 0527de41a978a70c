use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::github::client::GitHubClient;

/// Items requested per page. A page shorter than this is the last one.
pub const PER_PAGE: usize = 100;

pub struct Paginator<'a> {
    client: &'a GitHubClient,
    cancel: &'a CancellationToken,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a GitHubClient, cancel: &'a CancellationToken) -> Self {
        Self { client, cancel }
    }

    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        self.fetch_filtered(endpoint, params, |_| true).await
    }

    /// Walk pages until an empty or short page, keeping items accepted by `keep`.
    ///
    /// A full final page costs one extra request that comes back empty.
    /// Page sizes are judged before filtering. Any error discards what was
    /// collected so far.
    pub async fn fetch_filtered<T, F>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        mut keep: F,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnMut(&T) -> bool,
    {
        let mut all_items = Vec::new();
        let mut page = 1u32;

        loop {
            let mut query = params.to_vec();
            query.push(("page", page.to_string()));
            query.push(("per_page", PER_PAGE.to_string()));

            tracing::debug!("Fetching {} page {}", endpoint, page);
            let items: Vec<T> = self.client.get(endpoint, &query, self.cancel).await?;
            let items_count = items.len();

            if items_count == 0 {
                break;
            }

            all_items.extend(items.into_iter().filter(|item| keep(item)));

            if items_count < PER_PAGE {
                break;
            }

            page += 1;
        }

        Ok(all_items)
    }
}
