//! Four-tier memory: short-term turn buffer, long-term relational store,
//! semantic vector index, episodic event log.

pub mod short_term;

use crate::model::{now_ts, EpisodicEvent, Interaction, RetrievedInteraction};
use crate::store::relational::RelationalStore;
use crate::store::vector::{relevance_from_distance, VectorStore};
use std::sync::Arc;
use uuid::Uuid;

pub use short_term::ShortTermBuffer;

const SEMANTIC_COLLECTION: &str = "interactions";
const SEMANTIC_RELEVANCE_THRESHOLD: f32 = 0.35;
const SEMANTIC_TOP_K: usize = 5;

pub struct MemoryManager {
    relational: Arc<RelationalStore>,
    vector: Arc<dyn VectorStore>,
    short_term: short_term::ShortTermBuffer,
}

impl MemoryManager {
    pub fn new(relational: Arc<RelationalStore>, vector: Arc<dyn VectorStore>) -> Self {
        Self { relational, vector, short_term: short_term::ShortTermBuffer::new(20) }
    }

    pub fn short_term(&mut self) -> &mut short_term::ShortTermBuffer {
        &mut self.short_term
    }

    pub fn relational(&self) -> &RelationalStore {
        &self.relational
    }

    /// Records an interaction to long-term storage and indexes it for semantic recall.
    pub async fn remember_interaction(&self, interaction: &Interaction) -> Result<(), crate::error::BoxError> {
        self.relational.insert_interaction(interaction)?;
        let truncated_response: String = interaction.agent_response.chars().take(500).collect();
        let text = format!("User: {}\nAssistant: {}", interaction.user_message, truncated_response);
        let metadata = serde_json::json!({
            "session_id": interaction.session_id,
            "user_message": interaction.user_message.chars().take(500).collect::<String>(),
            "agent_response": truncated_response,
            "domain": interaction.domain,
            "timestamp": interaction.timestamp,
        });
        self.vector.add(SEMANTIC_COLLECTION, &interaction.id, &text, metadata).await?;
        Ok(())
    }

    pub async fn record_event(
        &self,
        session_id: &str,
        event_type: &str,
        domain: &str,
        content: serde_json::Value,
        importance: f32,
    ) -> Result<(), crate::error::BoxError> {
        let event = EpisodicEvent {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            event_type: event_type.to_string(),
            timestamp: now_ts(),
            domain: domain.to_string(),
            content,
            importance,
        };
        self.relational.insert_episodic_event(&event)?;
        Ok(())
    }

    pub fn events_in_range(&self, start: i64, end: i64, limit: u32) -> Result<Vec<EpisodicEvent>, crate::error::BoxError> {
        Ok(self.relational.events_in_range(start, end, limit)?)
    }

    /// Semantic search first; falls back to relational keyword search when the
    /// semantic pass returns nothing above the relevance threshold.
    pub async fn retrieve_context(&self, query: &str, _domain: Option<&str>) -> Result<Vec<RetrievedInteraction>, crate::error::BoxError> {
        let hits = self.vector.search(SEMANTIC_COLLECTION, query, SEMANTIC_TOP_K).await?;
        let relevant: Vec<RetrievedInteraction> = hits
            .into_iter()
            .filter(|h| relevance_from_distance(h.distance) >= SEMANTIC_RELEVANCE_THRESHOLD)
            .filter_map(|h| {
                let session_id = h.metadata.get("session_id")?.as_str()?.to_string();
                let user_message = h.metadata.get("user_message")?.as_str()?.to_string();
                let agent_response = h.metadata.get("agent_response")?.as_str()?.to_string();
                let domain = h.metadata.get("domain")?.as_str()?.to_string();
                let timestamp = h.metadata.get("timestamp")?.as_i64()?;
                Some(RetrievedInteraction {
                    user_message,
                    agent_response,
                    domain,
                    timestamp,
                    relevance: h.relevance,
                    session_id,
                })
            })
            .collect();

        if !relevant.is_empty() {
            return Ok(relevant);
        }

        let fallback = self.relational.keyword_search_interactions(query, SEMANTIC_TOP_K as u32)?;
        Ok(fallback
            .into_iter()
            .map(|i| RetrievedInteraction {
                user_message: i.user_message,
                agent_response: i.agent_response,
                domain: i.domain,
                timestamp: i.timestamp,
                relevance: 0.3,
                session_id: i.session_id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::vector::LocalVectorStore;

    fn test_manager() -> (tempfile::TempDir, MemoryManager) {
        let dir = tempfile::tempdir().unwrap();
        let relational = Arc::new(RelationalStore::new(dir.path().join("psycho.db")).unwrap());
        let vector = Arc::new(LocalVectorStore::open(dir.path().join("vectors")).unwrap());
        relational.insert_session(&crate::model::Session::new("s1".into(), "general")).unwrap();
        (dir, MemoryManager::new(relational, vector))
    }

    #[tokio::test]
    async fn remembered_interaction_is_retrievable_by_semantics() {
        let (_dir, mgr) = test_manager();
        mgr.remember_interaction(&Interaction {
            id: "i1".into(),
            session_id: "s1".into(),
            user_message: "what is ownership in rust".into(),
            agent_response: "ownership tracks a single owner per value at a time".into(),
            domain: "coding".into(),
            timestamp: now_ts(),
            tokens_used: 12,
        })
        .await
        .unwrap();

        let results = mgr.retrieve_context("rust ownership rules", None).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].session_id, "s1");
    }

    #[tokio::test]
    async fn falls_back_to_keyword_search_when_semantic_empty() {
        let (_dir, mgr) = test_manager();
        mgr.relational
            .insert_interaction(&Interaction {
                id: "i2".into(),
                session_id: "s1".into(),
                user_message: "completely unrelated zebra migration patterns".into(),
                agent_response: "zebras migrate seasonally across plains".into(),
                domain: "general".into(),
                timestamp: now_ts(),
                tokens_used: 5,
            })
            .unwrap();
        let results = mgr.retrieve_context("zebra migration", None).await.unwrap();
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn episodic_events_round_trip_through_range_query() {
        let (_dir, mgr) = test_manager();
        let now = now_ts();
        mgr.record_event("s1", "correction", "general", serde_json::json!({"target": "x"}), 0.6)
            .await
            .unwrap();
        let events = mgr.events_in_range(now - 5, now + 5, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "correction");
    }
}
