use futures::stream::{self, Stream};
use serde_json::Value;
use std::collections::VecDeque;

use super::client::{QueryParams, RemoteApiClient, RemoteApiError, Result};
use super::envelope::extract_records;

/// Lazy page-by-page cursor over a remote list endpoint.
///
/// Stops after a short page, an empty or unrecognised page, or a page
/// request that ultimately failed. Only authentication errors surface.
pub struct RecordPager<'a> {
    client: &'a RemoteApiClient,
    endpoint: String,
    filters: Vec<(String, String)>,
    page_size: u32,
    next_page: u32,
    buffer: VecDeque<Value>,
    exhausted: bool,
    pages_fetched: u32,
}

impl<'a> RecordPager<'a> {
    pub(crate) fn new(
        client: &'a RemoteApiClient,
        endpoint: &str,
        filters: &QueryParams,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            filters: filters
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            page_size: page_size.max(1),
            next_page: 1,
            buffer: VecDeque::new(),
            exhausted: false,
            pages_fetched: 0,
        }
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub async fn next(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_next_page().await?;
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> + 'a {
        stream::try_unfold(self, |mut pager| async move {
            let record = pager.next().await?;
            Ok::<_, RemoteApiError>(record.map(|record| (record, pager)))
        })
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        if self.pages_fetched > 0 && !self.client.config().rate_limit_delay.is_zero() {
            tokio::time::sleep(self.client.config().rate_limit_delay).await;
        }

        let page = self.next_page;
        let mut params = self.filters.clone();
        params.push(("page".to_string(), page.to_string()));
        params.push(("pageSize".to_string(), self.page_size.to_string()));

        let response = self.client.get(&self.endpoint, &params).await?;
        self.pages_fetched += 1;
        self.next_page += 1;

        let Some(response) = response else {
            tracing::warn!(endpoint = %self.endpoint, page, "Page request failed, stopping pagination");
            self.exhausted = true;
            return Ok(());
        };

        let records = match extract_records(&response) {
            Some(records) if !records.is_empty() => records,
            _ => {
                if page == 1 {
                    tracing::info!(endpoint = %self.endpoint, "Remote endpoint returned no records");
                }
                self.exhausted = true;
                return Ok(());
            }
        };

        if records.len() != self.page_size as usize {
            self.exhausted = true;
        }

        self.buffer
            .extend(records.iter().filter(|record| record.is_object()).cloned());

        tracing::debug!(
            endpoint = %self.endpoint,
            page,
            records = records.len(),
            "Fetched remote page"
        );

        Ok(())
    }
}
