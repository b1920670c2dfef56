//! Run coordinator: harvest, then enrich, then summarise.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{HarvestStats, RunStatus, RunSummary, TimeWindow},
    services::{
        AnalyzePipeline, BatchEnricher, CategorizationService, ConversationStore,
        EnrichPipeline, HarvestService, HelpdeskService,
    },
    utils::BackoffPolicy,
};

/// What a run does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Harvest ids in the window, then fully enrich everything pending
    Full { window: TimeWindow },
    /// Only categorize stored transcripts; no helpdesk calls
    AnalyzeOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
    pub mode: SyncMode,
    /// Cap on records processed in phase 2
    pub limit: Option<usize>,
}

/// Destructive store maintenance, run instead of a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maintenance {
    /// Null every enrichment field but keep the id rows
    ResetKeepIds,
    /// Delete every row
    Wipe,
}

impl Maintenance {
    pub async fn run(self, store: &dyn ConversationStore) -> AppResult<u64> {
        let affected = match self {
            Maintenance::ResetKeepIds => store.reset_keeping_ids().await?,
            Maintenance::Wipe => store.wipe_all().await?,
        };
        tracing::info!(?self, affected, "Maintenance finished");
        Ok(affected)
    }
}

pub struct SyncService {
    store: Arc<dyn ConversationStore>,
    categorizer: Arc<CategorizationService>,
    helpdesk: Option<HelpdeskService>,
    enricher: BatchEnricher,
    policy: BackoffPolicy,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        categorizer: Arc<CategorizationService>,
        batch_size: usize,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            categorizer,
            helpdesk: None,
            enricher: BatchEnricher::new(batch_size, policy),
            policy,
        }
    }

    /// Attach the helpdesk client; required for full runs.
    pub fn with_helpdesk(mut self, helpdesk: HelpdeskService) -> Self {
        self.helpdesk = Some(helpdesk);
        self
    }

    pub async fn run(&self, request: SyncRequest, cancel: CancellationToken) -> AppResult<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("sync_run", run_id = %run_id);

        async {
            match request.mode {
                SyncMode::Full { window } => self.run_full(&run_id, window, request.limit, cancel).await,
                SyncMode::AnalyzeOnly => self.run_analysis(&run_id, request.limit, cancel).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn run_full(
        &self,
        run_id: &str,
        window: TimeWindow,
        limit: Option<usize>,
        cancel: CancellationToken,
    ) -> AppResult<RunSummary> {
        let helpdesk = self.helpdesk.clone().ok_or_else(|| {
            AppError::Configuration("helpdesk client is required for a full sync".to_string())
        })?;

        tracing::info!(%window, "Phase 1: harvesting conversation ids");
        let harvester = HarvestService::new(helpdesk.clone(), self.policy);
        let harvest = harvester
            .harvest_into(window, self.store.as_ref(), cancel.clone())
            .await;
        let harvest_interrupted = cancel.is_cancelled();
        log_harvest(&harvest);

        let pending = self.store.find_needing_enrichment(limit).await?;
        tracing::info!(pending = pending.len(), "Phase 2: enriching conversations");

        let pipeline = EnrichPipeline::new(helpdesk, self.categorizer.clone(), self.store.clone());
        let report = self.enricher.run(&pipeline, pending, &cancel).await;

        let status = if harvest_interrupted || report.stopped_early {
            RunStatus::StoppedEarly
        } else {
            RunStatus::Completed
        };
        let retries = harvest.rate_limited_retries + report.rate_limited_retries;

        Ok(RunSummary::from_progress(
            run_id,
            status,
            Some(harvest),
            &report.progress,
            retries,
        ))
    }

    async fn run_analysis(
        &self,
        run_id: &str,
        limit: Option<usize>,
        cancel: CancellationToken,
    ) -> AppResult<RunSummary> {
        let pending = self.store.find_uncategorized(limit).await?;
        tracing::info!(pending = pending.len(), "Analyze-only: categorizing stored transcripts");

        let pipeline = AnalyzePipeline::new(self.categorizer.clone(), self.store.clone());
        let report = self.enricher.run(&pipeline, pending, &cancel).await;

        let status = if report.stopped_early {
            RunStatus::StoppedEarly
        } else {
            RunStatus::Completed
        };

        Ok(RunSummary::from_progress(
            run_id,
            status,
            None,
            &report.progress,
            report.rate_limited_retries,
        ))
    }
}

fn log_harvest(stats: &HarvestStats) {
    match &stats.error {
        Some(err) => tracing::warn!(
            pages = stats.pages,
            seen = stats.seen,
            "Harvest ended with an error, continuing with stored ids: {}",
            err
        ),
        None => tracing::info!(
            pages = stats.pages,
            seen = stats.seen,
            inserted = stats.inserted,
            "Harvest finished"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;

    use crate::{
        models::{ConversationRecord, HarvestedConversation},
        services::{ApiClient, MemoryConversationStore, TopicCache},
    };

    fn categorizer(store: Arc<dyn ConversationStore>) -> Arc<CategorizationService> {
        // Points at a closed port; these tests never reach the AI service.
        let client = ApiClient::new(
            "http://127.0.0.1:9/v1",
            SecretString::from("test-key".to_string()),
            Duration::from_millis(200),
        )
        .unwrap();
        let topics = Arc::new(TopicCache::new(store, Duration::from_secs(60)));
        Arc::new(CategorizationService::new(client, "test-model", 256, topics))
    }

    fn service(store: Arc<MemoryConversationStore>) -> SyncService {
        let dyn_store: Arc<dyn ConversationStore> = store;
        SyncService::new(dyn_store.clone(), categorizer(dyn_store), 5, BackoffPolicy::default())
    }

    #[tokio::test]
    async fn test_full_run_without_helpdesk_is_configuration_error() {
        let store = Arc::new(MemoryConversationStore::new());
        let window = TimeWindow {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap(),
        };
        let err = service(store)
            .run(
                SyncRequest {
                    mode: SyncMode::Full { window },
                    limit: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_analysis_with_nothing_pending_completes() {
        let store = Arc::new(MemoryConversationStore::new());
        store
            .insert_harvested(&[HarvestedConversation {
                id: "c1".into(),
                created_at: Utc::now(),
            }])
            .await
            .unwrap();

        let summary = service(store)
            .run(
                SyncRequest {
                    mode: SyncMode::AnalyzeOnly,
                    limit: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.total, 0);
        assert!(summary.harvest.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_analysis_stops_early() {
        let store = Arc::new(MemoryConversationStore::new());
        let mut record = ConversationRecord::harvested("c1", Utc::now());
        record.transcript = Some("USER: hi".into());
        store.put(record).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = service(store)
            .run(
                SyncRequest {
                    mode: SyncMode::AnalyzeOnly,
                    limit: None,
                },
                cancel,
            )
            .await
            .unwrap();
        assert_eq!(summary.status, RunStatus::StoppedEarly);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test]
    async fn test_maintenance_reset_and_wipe() {
        let store = MemoryConversationStore::new();
        let mut record = ConversationRecord::harvested("c1", Utc::now());
        record.transcript = Some("USER: hi".into());
        store.put(record).await;

        assert_eq!(Maintenance::ResetKeepIds.run(&store).await.unwrap(), 1);
        let kept = store.get("c1").await.unwrap().unwrap();
        assert!(kept.transcript.is_none());

        assert_eq!(Maintenance::Wipe.run(&store).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
