//! Persistence sink for conversation records.
//!
//! Phase 1 inserts minimal rows keyed by the helpdesk id; phase 2 patches
//! enrichment fields onto those rows. Bulk maintenance operations work in
//! chunks of [`BULK_CHUNK_SIZE`] ids.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{
        CategorizationResult, ConversationRecord, EnrichmentPatch, HarvestedConversation,
        PendingCategorization, ResolutionOutcome, Sentiment, TopicMapping,
    },
};

/// Upper bound on ids per bulk statement
pub const BULK_CHUNK_SIZE: usize = 500;

/// Keyed record store used by the pipeline
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert minimal rows; existing ids are left untouched. Returns rows inserted.
    async fn insert_harvested(&self, records: &[HarvestedConversation]) -> AppResult<u64>;

    /// Write the enrichment fields of one record. Unknown ids are `NotFound`.
    async fn patch_enrichment(&self, id: &str, patch: &EnrichmentPatch) -> AppResult<()>;

    /// Write only the categorization fields of one record.
    async fn patch_categorization(&self, id: &str, result: &CategorizationResult) -> AppResult<()>;

    async fn get(&self, id: &str) -> AppResult<Option<ConversationRecord>>;

    /// Ids with any of transcript/product/region/sentiment missing, oldest first.
    async fn find_needing_enrichment(&self, limit: Option<usize>) -> AppResult<Vec<String>>;

    /// Records with a transcript but no categorization, oldest first.
    async fn find_uncategorized(&self, limit: Option<usize>) -> AppResult<Vec<PendingCategorization>>;

    async fn list_by_created(&self, limit: usize, offset: usize) -> AppResult<Vec<ConversationRecord>>;

    async fn count(&self) -> AppResult<u64>;

    /// Clear every enrichment field, keeping ids and creation times. Returns rows touched.
    async fn reset_keeping_ids(&self) -> AppResult<u64>;

    /// Delete every record. Returns rows deleted.
    async fn wipe_all(&self) -> AppResult<u64>;

    async fn load_topic_mappings(&self) -> AppResult<Vec<TopicMapping>>;
}

fn not_matched(id: &str) -> AppError {
    AppError::NotFound(format!("no conversation row matched id {id}"))
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: String,
    created_at: DateTime<Utc>,
    country: Option<String>,
    region: Option<String>,
    product: Option<String>,
    channel: Option<String>,
    transcript: Option<String>,
    main_topics: Option<Vec<String>>,
    sub_topics: Option<Vec<String>>,
    sentiment_start: Option<String>,
    sentiment_end: Option<String>,
    resolution_outcome: Option<String>,
    feedbacks: Option<Vec<String>>,
    synced_at: Option<DateTime<Utc>>,
}

impl From<ConversationRow> for ConversationRecord {
    fn from(r: ConversationRow) -> Self {
        Self {
            id: r.id,
            created_at: r.created_at,
            country: r.country,
            region: r.region,
            product: r.product,
            channel: r.channel,
            transcript: r.transcript,
            main_topics: r.main_topics,
            sub_topics: r.sub_topics,
            sentiment_start: r.sentiment_start.as_deref().map(Sentiment::parse),
            sentiment_end: r.sentiment_end.as_deref().map(Sentiment::parse),
            resolution_outcome: r.resolution_outcome.as_deref().map(ResolutionOutcome::parse),
            feedbacks: r.feedbacks,
            synced_at: r.synced_at,
        }
    }
}

const RECORD_COLUMNS: &str = "id, created_at, country, region, product, channel, transcript, \
     main_topics, sub_topics, sentiment_start, sentiment_end, resolution_outcome, feedbacks, synced_at";

fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map(|l| l as i64).unwrap_or(i64::MAX)
}

/// Postgres-backed store
pub struct PgConversationStore {
    db: PgPool,
}

impl PgConversationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }

    async fn all_ids(&self) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM conversations ORDER BY id")
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn insert_harvested(&self, records: &[HarvestedConversation]) -> AppResult<u64> {
        let mut inserted = 0;
        for chunk in records.chunks(BULK_CHUNK_SIZE) {
            let ids: Vec<String> = chunk.iter().map(|r| r.id.clone()).collect();
            let created: Vec<DateTime<Utc>> = chunk.iter().map(|r| r.created_at).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO conversations (id, created_at)
                SELECT * FROM UNNEST($1::text[], $2::timestamptz[])
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&ids)
            .bind(&created)
            .execute(&self.db)
            .await?;

            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn patch_enrichment(&self, id: &str, patch: &EnrichmentPatch) -> AppResult<()> {
        let categorization = patch.categorization.as_ref();

        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET country = COALESCE($2, country),
                region = COALESCE($3, region),
                product = COALESCE($4, product),
                channel = COALESCE($5, channel),
                transcript = $6,
                main_topics = COALESCE($7, main_topics),
                sub_topics = COALESCE($8, sub_topics),
                sentiment_start = COALESCE($9, sentiment_start),
                sentiment_end = COALESCE($10, sentiment_end),
                resolution_outcome = COALESCE($11, resolution_outcome),
                feedbacks = COALESCE($12, feedbacks),
                synced_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&patch.location.country)
        .bind(&patch.location.region)
        .bind(&patch.product)
        .bind(&patch.channel)
        .bind(&patch.transcript)
        .bind(categorization.map(|c| c.main_topics.clone()))
        .bind(categorization.map(|c| c.sub_topics.clone()))
        .bind(categorization.map(|c| c.sentiment_start.as_str()))
        .bind(categorization.map(|c| c.sentiment_end.as_str()))
        .bind(categorization.map(|c| c.resolution_outcome.as_str()))
        .bind(categorization.map(|c| c.feedbacks.clone()))
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_matched(id));
        }
        Ok(())
    }

    async fn patch_categorization(&self, id: &str, result: &CategorizationResult) -> AppResult<()> {
        let outcome = sqlx::query(
            r#"
            UPDATE conversations
            SET main_topics = $2, sub_topics = $3, sentiment_start = $4, sentiment_end = $5,
                resolution_outcome = $6, feedbacks = $7, synced_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&result.main_topics)
        .bind(&result.sub_topics)
        .bind(result.sentiment_start.as_str())
        .bind(result.sentiment_end.as_str())
        .bind(result.resolution_outcome.as_str())
        .bind(&result.feedbacks)
        .execute(&self.db)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(not_matched(id));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<ConversationRecord>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_needing_enrichment(&self, limit: Option<usize>) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM conversations
            WHERE transcript IS NULL OR product IS NULL OR region IS NULL OR sentiment_start IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn find_uncategorized(&self, limit: Option<usize>) -> AppResult<Vec<PendingCategorization>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT id, transcript FROM conversations
            WHERE transcript IS NOT NULL AND btrim(transcript) <> '' AND sentiment_start IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, transcript)| PendingCategorization { id, transcript })
            .collect())
    }

    async fn list_by_created(&self, limit: usize, offset: usize) -> AppResult<Vec<ConversationRecord>> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM conversations ORDER BY created_at ASC, id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> AppResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*)::bigint FROM conversations")
            .fetch_one(&self.db)
            .await?;
        Ok(row.0.max(0) as u64)
    }

    async fn reset_keeping_ids(&self) -> AppResult<u64> {
        let ids = self.all_ids().await?;
        let mut touched = 0;
        for chunk in ids.chunks(BULK_CHUNK_SIZE) {
            let result = sqlx::query(
                r#"
                UPDATE conversations
                SET country = NULL, region = NULL, product = NULL, channel = NULL,
                    transcript = NULL, main_topics = NULL, sub_topics = NULL,
                    sentiment_start = NULL, sentiment_end = NULL, resolution_outcome = NULL,
                    feedbacks = NULL, synced_at = NULL
                WHERE id = ANY($1)
                "#,
            )
            .bind(chunk)
            .execute(&self.db)
            .await?;
            touched += result.rows_affected();
        }
        Ok(touched)
    }

    async fn wipe_all(&self) -> AppResult<u64> {
        let ids = self.all_ids().await?;
        let mut deleted = 0;
        for chunk in ids.chunks(BULK_CHUNK_SIZE) {
            let result = sqlx::query("DELETE FROM conversations WHERE id = ANY($1)")
                .bind(chunk)
                .execute(&self.db)
                .await?;
            deleted += result.rows_affected();
        }
        Ok(deleted)
    }

    async fn load_topic_mappings(&self) -> AppResult<Vec<TopicMapping>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT main_topic, sub_topic FROM topic_mappings ORDER BY main_topic, sub_topic",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(main_topic, sub_topic)| TopicMapping { main_topic, sub_topic })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store with the same semantics as the Postgres one
#[derive(Default)]
pub struct MemoryConversationStore {
    records: RwLock<BTreeMap<String, ConversationRecord>>,
    topics: RwLock<Vec<TopicMapping>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_topic_mappings(&self, mappings: Vec<TopicMapping>) {
        *self.topics.write().await = mappings;
    }

    /// Insert or replace a full record
    pub async fn put(&self, record: ConversationRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    async fn ordered<F>(&self, keep: F) -> Vec<ConversationRecord>
    where
        F: Fn(&ConversationRecord) -> bool,
    {
        let records = self.records.read().await;
        let mut out: Vec<ConversationRecord> = records.values().filter(|&r| keep(r)).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn insert_harvested(&self, records: &[HarvestedConversation]) -> AppResult<u64> {
        let mut store = self.records.write().await;
        let mut inserted = 0;
        for r in records {
            if !store.contains_key(&r.id) {
                store.insert(r.id.clone(), ConversationRecord::harvested(r.id.clone(), r.created_at));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn patch_enrichment(&self, id: &str, patch: &EnrichmentPatch) -> AppResult<()> {
        let mut store = self.records.write().await;
        let record = store.get_mut(id).ok_or_else(|| not_matched(id))?;
        record.apply_enrichment(patch, Utc::now());
        Ok(())
    }

    async fn patch_categorization(&self, id: &str, result: &CategorizationResult) -> AppResult<()> {
        let mut store = self.records.write().await;
        let record = store.get_mut(id).ok_or_else(|| not_matched(id))?;
        record.apply_categorization(result);
        record.synced_at = Some(Utc::now());
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<ConversationRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn find_needing_enrichment(&self, limit: Option<usize>) -> AppResult<Vec<String>> {
        Ok(self
            .ordered(ConversationRecord::needs_enrichment)
            .await
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|r| r.id)
            .collect())
    }

    async fn find_uncategorized(&self, limit: Option<usize>) -> AppResult<Vec<PendingCategorization>> {
        Ok(self
            .ordered(ConversationRecord::needs_categorization)
            .await
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|r| PendingCategorization {
                transcript: r.transcript.unwrap_or_default(),
                id: r.id,
            })
            .collect())
    }

    async fn list_by_created(&self, limit: usize, offset: usize) -> AppResult<Vec<ConversationRecord>> {
        Ok(self
            .ordered(|_| true)
            .await
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.records.read().await.len() as u64)
    }

    async fn reset_keeping_ids(&self) -> AppResult<u64> {
        let mut store = self.records.write().await;
        let ids: Vec<String> = store.keys().cloned().collect();
        let mut touched = 0;
        for chunk in ids.chunks(BULK_CHUNK_SIZE) {
            for id in chunk {
                if let Some(record) = store.get_mut(id) {
                    record.clear_enrichment();
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    async fn wipe_all(&self) -> AppResult<u64> {
        let mut store = self.records.write().await;
        let ids: Vec<String> = store.keys().cloned().collect();
        let mut deleted = 0;
        for chunk in ids.chunks(BULK_CHUNK_SIZE) {
            for id in chunk {
                if store.remove(id).is_some() {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn load_topic_mappings(&self) -> AppResult<Vec<TopicMapping>> {
        Ok(self.topics.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactLocation, LifecycleState};
    use chrono::TimeZone;

    fn harvested(id: &str, day: u32) -> HarvestedConversation {
        HarvestedConversation {
            id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
        }
    }

    fn patch(categorized: bool) -> EnrichmentPatch {
        EnrichmentPatch {
            location: ContactLocation {
                country: Some("Germany".into()),
                region: Some("Bavaria".into()),
            },
            product: Some("Web".into()),
            channel: Some("chat".into()),
            transcript: "USER: hi\nAGENT: hello".into(),
            categorization: categorized.then(|| CategorizationResult {
                main_topics: vec!["Billing".into()],
                sub_topics: vec![],
                sentiment_start: Sentiment::Negative,
                sentiment_end: Sentiment::Positive,
                resolution_outcome: ResolutionOutcome::Yes,
                feedbacks: vec!["More payment options".into()],
            }),
        }
    }

    #[tokio::test]
    async fn test_insert_harvested_is_idempotent() {
        let store = MemoryConversationStore::new();
        let batch = vec![harvested("a", 1), harvested("b", 2)];
        assert_eq!(store.insert_harvested(&batch).await.unwrap(), 2);
        assert_eq!(store.insert_harvested(&batch).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reinsert_does_not_clobber_enrichment() {
        let store = MemoryConversationStore::new();
        store.insert_harvested(&[harvested("a", 1)]).await.unwrap();
        store.patch_enrichment("a", &patch(true)).await.unwrap();
        store.insert_harvested(&[harvested("a", 1)]).await.unwrap();
        let r = store.get("a").await.unwrap().unwrap();
        assert_eq!(r.lifecycle(), LifecycleState::Categorized);
    }

    #[tokio::test]
    async fn test_patch_unknown_id_is_not_found() {
        let store = MemoryConversationStore::new();
        let err = store.patch_enrichment("missing", &patch(false)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = store
            .patch_categorization("missing", &CategorizationResult::unavailable())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_needing_enrichment_is_ordered_and_limited() {
        let store = MemoryConversationStore::new();
        store
            .insert_harvested(&[harvested("c", 3), harvested("a", 1), harvested("b", 2)])
            .await
            .unwrap();
        store.patch_enrichment("a", &patch(true)).await.unwrap();

        assert_eq!(store.find_needing_enrichment(None).await.unwrap(), vec!["b", "c"]);
        assert_eq!(store.find_needing_enrichment(Some(1)).await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_uncategorized_needs_transcript() {
        let store = MemoryConversationStore::new();
        store
            .insert_harvested(&[harvested("a", 1), harvested("b", 2)])
            .await
            .unwrap();
        store.patch_enrichment("a", &patch(false)).await.unwrap();

        let pending = store.find_uncategorized(None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "a");
        assert!(pending[0].transcript.starts_with("USER: hi"));
    }

    #[tokio::test]
    async fn test_reset_keeping_ids_clears_enrichment() {
        let store = MemoryConversationStore::new();
        store
            .insert_harvested(&[harvested("a", 1), harvested("b", 2)])
            .await
            .unwrap();
        store.patch_enrichment("a", &patch(true)).await.unwrap();
        let before = store.get("a").await.unwrap().unwrap().created_at;

        assert_eq!(store.reset_keeping_ids().await.unwrap(), 2);

        let a = store.get("a").await.unwrap().unwrap();
        assert_eq!(a.created_at, before);
        assert!(a.transcript.is_none());
        assert!(a.main_topics.is_none());
        assert!(a.sentiment_end.is_none());
        assert!(a.synced_at.is_none());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_wipe_all_deletes_everything() {
        let store = MemoryConversationStore::new();
        let many: Vec<_> = (0..1_200)
            .map(|i| HarvestedConversation {
                id: format!("id-{i}"),
                created_at: Utc::now(),
            })
            .collect();
        store.insert_harvested(&many).await.unwrap();
        assert_eq!(store.wipe_all().await.unwrap(), 1_200);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_by_created_pages_in_order() {
        let store = MemoryConversationStore::new();
        store
            .insert_harvested(&[harvested("c", 3), harvested("a", 1), harvested("b", 2)])
            .await
            .unwrap();
        let page: Vec<String> = store
            .list_by_created(2, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(page, vec!["b", "c"]);
    }
}
