//! Phase 1: discover conversation ids in a creation-time window.
//!
//! Pages are requested strictly in cursor order. Cancellation is checked
//! before every page request; a page already in flight always completes.

use std::time::Duration;

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures_util::{pin_mut, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult},
    models::{HarvestStats, HarvestedConversation, SearchResponse, TimeWindow},
    services::{describe_failure, ApiResponse, ConversationStore, HelpdeskService},
    utils::{BackoffPolicy, BatchBackoff},
};

/// One page of harvested ids
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestPage {
    pub conversations: Vec<HarvestedConversation>,
    /// Best-effort total reported by the API
    pub total_count: Option<u64>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl HarvestPage {
    /// Whether pagination stops after this page.
    pub fn is_last(&self) -> bool {
        self.conversations.is_empty() || !self.has_more || self.next_cursor.is_none()
    }
}

impl From<SearchResponse> for HarvestPage {
    fn from(response: SearchResponse) -> Self {
        let next_cursor = response
            .pages
            .and_then(|p| p.next)
            .and_then(|n| n.starting_after)
            .filter(|c| !c.is_empty());

        let conversations = response
            .conversations
            .into_iter()
            .filter_map(|c| {
                let created_at = DateTime::<Utc>::from_timestamp(c.created_at, 0)?;
                Some(HarvestedConversation {
                    id: c.id,
                    created_at,
                })
            })
            .collect();

        Self {
            conversations,
            total_count: response.total_count,
            has_more: next_cursor.is_some(),
            next_cursor,
        }
    }
}

/// Progress events emitted while paging
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestEvent {
    Page(HarvestPage),
    Backoff { delay: Duration },
}

/// Cursor-paginated id discovery
pub struct HarvestService {
    helpdesk: HelpdeskService,
    policy: BackoffPolicy,
}

impl HarvestService {
    pub fn new(helpdesk: HelpdeskService, policy: BackoffPolicy) -> Self {
        Self { helpdesk, policy }
    }

    /// Fetch a single page.
    pub async fn fetch_page(&self, window: &TimeWindow, cursor: Option<&str>) -> ApiResponse<HarvestPage> {
        self.helpdesk
            .search_conversations(window, cursor)
            .await
            .map(HarvestPage::from)
    }

    /// Stream pages in cursor order until the last page or cancellation.
    ///
    /// Rate-limited requests are retried for the same cursor with doubling
    /// backoff; the stream ends with an error once the backoff is exhausted or
    /// on any other failure.
    pub fn pages<'a>(
        &'a self,
        window: TimeWindow,
        cancel: CancellationToken,
    ) -> impl Stream<Item = AppResult<HarvestEvent>> + 'a {
        stream! {
            let mut cursor: Option<String> = None;
            let mut backoff = BatchBackoff::new(self.policy);

            loop {
                if cancel.is_cancelled() {
                    tracing::info!("Harvest stop requested; no further pages");
                    break;
                }

                match self.fetch_page(&window, cursor.as_deref()).await {
                    ApiResponse::Success(page) => {
                        backoff.reset();
                        let last = page.is_last();
                        let next = page.next_cursor.clone();
                        yield Ok(HarvestEvent::Page(page));
                        if last {
                            break;
                        }
                        cursor = next;
                    }
                    ApiResponse::RateLimited { retry_after } => {
                        if backoff.is_exhausted() {
                            yield Err(AppError::ExternalService(
                                "search rate limit retries exhausted".to_string(),
                            ));
                            break;
                        }
                        let delay = backoff.next_delay().max(retry_after.unwrap_or_default());
                        if backoff.is_saturated() {
                            tracing::warn!(
                                saturated_retries = backoff.saturated_retries(),
                                "Harvest backoff at ceiling ({:?})",
                                delay
                            );
                        }
                        yield Ok(HarvestEvent::Backoff { delay });
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    ApiResponse::Failure { status, body } => {
                        yield Err(AppError::ExternalService(format!(
                            "conversation search failed: {}",
                            describe_failure(status, &body)
                        )));
                        break;
                    }
                }
            }
        }
    }

    /// Drain the page stream into the store, page by page.
    ///
    /// Errors end the harvest and are reported in the returned stats.
    pub async fn harvest_into(
        &self,
        window: TimeWindow,
        store: &dyn ConversationStore,
        cancel: CancellationToken,
    ) -> HarvestStats {
        let mut stats = HarvestStats::default();
        let pages = self.pages(window, cancel);
        pin_mut!(pages);

        while let Some(event) = pages.next().await {
            match event {
                Ok(HarvestEvent::Page(page)) => {
                    stats.pages += 1;
                    stats.seen += page.conversations.len() as u64;
                    if stats.total_estimate.is_none() {
                        stats.total_estimate = page.total_count;
                    }

                    match store.insert_harvested(&page.conversations).await {
                        Ok(inserted) => {
                            stats.inserted += inserted;
                            tracing::info!(
                                page = stats.pages,
                                seen = stats.seen,
                                inserted = stats.inserted,
                                total_estimate = ?stats.total_estimate,
                                "Harvested page"
                            );
                        }
                        Err(e) => {
                            tracing::error!("Failed to store harvested page {}: {}", stats.pages, e);
                            stats.error = Some(format!("storing page {}: {e}", stats.pages));
                            break;
                        }
                    }
                }
                Ok(HarvestEvent::Backoff { delay }) => {
                    stats.rate_limited_retries += 1;
                    tracing::info!("Search rate limited; retrying page in {:?}", delay);
                }
                Err(e) => {
                    tracing::error!("Harvest aborted: {}", e);
                    stats.error = Some(e.to_string());
                    break;
                }
            }
        }

        stats
    }
}
