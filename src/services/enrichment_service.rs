//! Phase 2: enrich known conversations in bounded concurrent batches.
//!
//! Every item of a batch runs concurrently and the batch settles as a whole.
//! If any item was rate limited nothing from that batch is written: the
//! shared backoff doubles, the coordinator sleeps, and the same batch runs
//! again from scratch. Progress counters and backoff state are only touched
//! here, after the join, never inside an item future.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::{
    error::AppResult,
    models::{
        CategorizationResult, ContactLocation, EnrichmentPatch, PendingCategorization,
        SyncProgress,
    },
    services::{
        describe_failure, ApiResponse, CategorizationService, ConversationStore, HelpdeskService,
        TranscriptService,
    },
    utils::{BackoffPolicy, BatchBackoff},
};

/// Message recorded for items dropped by the rate-limit circuit breaker
pub const RATE_LIMIT_EXHAUSTED: &str = "rate limit retries exhausted";

/// Settled state of one item before anything is written
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome<P> {
    /// Ready to write. `error` marks a partial result that still counts as failed.
    Ready { patch: P, error: Option<String> },
    RateLimited { retry_after: Option<Duration> },
    Failed(String),
}

/// The per-item work the batch driver runs
#[async_trait]
pub trait ItemPipeline: Send + Sync {
    type Item: Send + Sync;
    type Patch: Send + Sync;

    fn item_id<'a>(&self, item: &'a Self::Item) -> &'a str;

    /// Do all the remote work for one item without persisting anything.
    async fn prepare(&self, item: &Self::Item) -> ItemOutcome<Self::Patch>;

    /// Persist a prepared patch.
    async fn commit(&self, id: &str, patch: &Self::Patch) -> AppResult<()>;
}

/// What a run of the batch driver achieved
#[derive(Debug, Clone)]
pub struct EnrichmentReport {
    pub progress: SyncProgress,
    pub rate_limited_retries: u32,
    pub stopped_early: bool,
}

/// Batch driver with batch-level exponential backoff
#[derive(Debug, Clone)]
pub struct BatchEnricher {
    batch_size: usize,
    policy: BackoffPolicy,
}

impl BatchEnricher {
    pub fn new(batch_size: usize, policy: BackoffPolicy) -> Self {
        Self {
            batch_size: batch_size.max(1),
            policy,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn run<P: ItemPipeline>(
        &self,
        pipeline: &P,
        items: Vec<P::Item>,
        cancel: &CancellationToken,
    ) -> EnrichmentReport {
        let mut progress = SyncProgress::new(items.len());
        let mut backoff = BatchBackoff::new(self.policy);
        let mut rate_limited_retries = 0u32;
        let mut stopped_early = false;
        let batch_count = items.len().div_ceil(self.batch_size);

        'batches: for (index, batch) in items.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                stopped_early = true;
                break;
            }
            let batch_no = index + 1;

            let outcomes = loop {
                let outcomes = join_all(batch.iter().map(|item| pipeline.prepare(item))).await;

                let limited: Vec<Option<Duration>> = outcomes
                    .iter()
                    .filter_map(|o| match o {
                        ItemOutcome::RateLimited { retry_after } => Some(*retry_after),
                        _ => None,
                    })
                    .collect();

                if limited.is_empty() {
                    backoff.reset();
                    break outcomes;
                }

                if backoff.is_exhausted() {
                    tracing::warn!(
                        batch = batch_no,
                        rate_limited = limited.len(),
                        "Backoff saturated {} times; committing batch without rate-limited items",
                        backoff.saturated_retries()
                    );
                    backoff.reset();
                    break outcomes;
                }

                let hint = limited.iter().flatten().max().copied().unwrap_or_default();
                let delay = backoff.next_delay().max(hint);
                rate_limited_retries += 1;

                if backoff.is_saturated() {
                    tracing::warn!(
                        batch = batch_no,
                        saturated_retries = backoff.saturated_retries(),
                        "Backoff at ceiling ({:?}); API is still rate limiting",
                        delay
                    );
                } else {
                    tracing::info!(
                        batch = batch_no,
                        rate_limited = limited.len(),
                        "Batch rate limited; retrying whole batch in {:?}",
                        delay
                    );
                }

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
                if cancel.is_cancelled() {
                    stopped_early = true;
                    break 'batches;
                }
            };

            self.commit_batch(pipeline, batch, outcomes, &mut progress).await;

            tracing::info!(
                batch = batch_no,
                batches = batch_count,
                "{}",
                progress.status_line()
            );
        }

        if stopped_early {
            tracing::info!("Stop requested; {} items left unprocessed", progress.remaining());
        }

        EnrichmentReport {
            progress,
            rate_limited_retries,
            stopped_early,
        }
    }

    async fn commit_batch<P: ItemPipeline>(
        &self,
        pipeline: &P,
        batch: &[P::Item],
        outcomes: Vec<ItemOutcome<P::Patch>>,
        progress: &mut SyncProgress,
    ) {
        let writes = batch.iter().zip(outcomes.iter()).map(|(item, outcome)| async move {
            let id = pipeline.item_id(item);
            let result = match outcome {
                ItemOutcome::Ready { patch, error } => match pipeline.commit(id, patch).await {
                    Ok(()) => match error {
                        Some(message) => Err(message.clone()),
                        None => Ok(()),
                    },
                    Err(e) => Err(format!("write failed: {e}")),
                },
                ItemOutcome::RateLimited { .. } => Err(RATE_LIMIT_EXHAUSTED.to_string()),
                ItemOutcome::Failed(message) => Err(message.clone()),
            };
            (id, result)
        });

        for (id, result) in join_all(writes).await {
            match result {
                Ok(()) => progress.record_success(),
                Err(message) => {
                    tracing::error!(conversation_id = id, "Enrichment failed: {}", message);
                    progress.record_error(id, message);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// Full enrichment: detail, transcript, contact location, categorization
pub struct EnrichPipeline {
    helpdesk: HelpdeskService,
    categorizer: Arc<CategorizationService>,
    store: Arc<dyn ConversationStore>,
}

impl EnrichPipeline {
    pub fn new(
        helpdesk: HelpdeskService,
        categorizer: Arc<CategorizationService>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            helpdesk,
            categorizer,
            store,
        }
    }

    async fn resolve_location(&self, conversation_id: &str, contact_id: Option<&str>) -> ApiResponse<ContactLocation> {
        let Some(contact_id) = contact_id else {
            return ApiResponse::Success(ContactLocation::default());
        };
        match self.helpdesk.get_contact_location(contact_id).await {
            ApiResponse::Failure { status, body } => {
                tracing::warn!(
                    conversation_id,
                    contact_id,
                    "Contact lookup failed, leaving location empty: {}",
                    describe_failure(status, &body)
                );
                ApiResponse::Success(ContactLocation::default())
            }
            other => other,
        }
    }

    /// Whether the stored record already carries a categorization.
    async fn already_categorized(&self, id: &str) -> bool {
        match self.store.get(id).await {
            Ok(record) => record.is_some_and(|r| r.sentiment_start.is_some()),
            Err(e) => {
                tracing::debug!(conversation_id = id, "Stored record lookup failed: {}", e);
                false
            }
        }
    }

    async fn categorize(&self, id: &str, transcript: &str) -> ApiResponse<Option<CategorizationResult>> {
        if self.already_categorized(id).await {
            return ApiResponse::Success(None);
        }
        // Nothing to analyse; store an explicit "no match" so the record settles.
        if transcript.trim().is_empty() {
            return ApiResponse::Success(Some(CategorizationResult::unavailable()));
        }
        self.categorizer
            .categorize(transcript)
            .await
            .map(|outcome| Some(outcome.into_result()))
    }
}

#[async_trait]
impl ItemPipeline for EnrichPipeline {
    type Item = String;
    type Patch = EnrichmentPatch;

    fn item_id<'a>(&self, item: &'a String) -> &'a str {
        item.as_str()
    }

    async fn prepare(&self, id: &String) -> ItemOutcome<EnrichmentPatch> {
        let detail = match self.helpdesk.get_conversation(id).await {
            ApiResponse::Success(detail) => detail,
            ApiResponse::RateLimited { retry_after } => return ItemOutcome::RateLimited { retry_after },
            ApiResponse::Failure { status, body } => {
                return ItemOutcome::Failed(format!(
                    "fetch conversation: {}",
                    describe_failure(status, &body)
                ))
            }
        };

        let transcript = TranscriptService::extract(&detail);

        let (location, categorization) = tokio::join!(
            self.resolve_location(id, detail.contact_id()),
            self.categorize(id, &transcript)
        );

        let location = match location {
            ApiResponse::Success(location) => location,
            ApiResponse::RateLimited { retry_after } => return ItemOutcome::RateLimited { retry_after },
            ApiResponse::Failure { .. } => ContactLocation::default(),
        };

        let (categorization, error) = match categorization {
            ApiResponse::Success(result) => (result, None),
            ApiResponse::RateLimited { retry_after } => return ItemOutcome::RateLimited { retry_after },
            ApiResponse::Failure { status, body } => (
                None,
                Some(format!("categorization: {}", describe_failure(status, &body))),
            ),
        };

        ItemOutcome::Ready {
            patch: EnrichmentPatch {
                location,
                product: detail.product(),
                channel: detail.channel(),
                transcript,
                categorization,
            },
            error,
        }
    }

    async fn commit(&self, id: &str, patch: &EnrichmentPatch) -> AppResult<()> {
        self.store.patch_enrichment(id, patch).await
    }
}

/// Categorization only, over transcripts already stored
pub struct AnalyzePipeline {
    categorizer: Arc<CategorizationService>,
    store: Arc<dyn ConversationStore>,
}

impl AnalyzePipeline {
    pub fn new(categorizer: Arc<CategorizationService>, store: Arc<dyn ConversationStore>) -> Self {
        Self { categorizer, store }
    }
}

#[async_trait]
impl ItemPipeline for AnalyzePipeline {
    type Item = PendingCategorization;
    type Patch = CategorizationResult;

    fn item_id<'a>(&self, item: &'a PendingCategorization) -> &'a str {
        item.id.as_str()
    }

    async fn prepare(&self, item: &PendingCategorization) -> ItemOutcome<CategorizationResult> {
        match self.categorizer.categorize(&item.transcript).await {
            ApiResponse::Success(outcome) => ItemOutcome::Ready {
                patch: outcome.into_result(),
                error: None,
            },
            ApiResponse::RateLimited { retry_after } => ItemOutcome::RateLimited { retry_after },
            ApiResponse::Failure { status, body } => ItemOutcome::Failed(format!(
                "categorization: {}",
                describe_failure(status, &body)
            )),
        }
    }

    async fn commit(&self, id: &str, patch: &CategorizationResult) -> AppResult<()> {
        self.store.patch_categorization(id, patch).await
    }
}
