//! Dual-indexed mistake log: relational row + vector embedding of `user_input`,
//! surfaced as a warnings block ahead of semantic memories in the system prompt.

use crate::model::{now_ts, Mistake};
use crate::store::relational::RelationalStore;
use crate::store::vector::VectorStore;
use std::sync::Arc;
use uuid::Uuid;

const MISTAKES_COLLECTION: &str = "mistakes";
const WARNING_RELEVANCE_THRESHOLD: f32 = 0.55;
const DEFAULT_TOP_K: usize = 3;

pub struct MistakeTracker {
    relational: Arc<RelationalStore>,
    vector: Arc<dyn VectorStore>,
}

impl MistakeTracker {
    pub fn new(relational: Arc<RelationalStore>, vector: Arc<dyn VectorStore>) -> Self {
        Self { relational, vector }
    }

    pub async fn record_mistake(
        &self,
        session_id: &str,
        user_input: &str,
        agent_response: &str,
        correction: &str,
        domain: &str,
        error_pattern: Option<&str>,
    ) -> Result<String, crate::error::BoxError> {
        let mistake = Mistake {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            user_input: user_input.to_string(),
            agent_response: agent_response.to_string(),
            correction: correction.to_string(),
            domain: domain.to_string(),
            error_pattern: error_pattern.map(|s| s.to_string()),
            timestamp: now_ts(),
            similar_count: 0,
        };
        self.relational.insert_mistake(&mistake)?;
        self.vector
            .add(MISTAKES_COLLECTION, &mistake.id, user_input, serde_json::json!({"mistake_id": mistake.id}))
            .await?;
        Ok(mistake.id)
    }

    /// Runs a vector similarity search over past mistakes; returns hits at or
    /// above relevance 0.55, incrementing each returned row's `similar_count`.
    pub async fn get_warnings_for_prompt(&self, query: &str, top_k: Option<usize>) -> Result<String, crate::error::BoxError> {
        let top_k = top_k.unwrap_or(DEFAULT_TOP_K);
        let hits = self.vector.search(MISTAKES_COLLECTION, query, top_k).await?;
        let mut warnings = Vec::new();
        for hit in hits.into_iter().filter(|h| h.relevance >= WARNING_RELEVANCE_THRESHOLD) {
            let Some(mistake_id) = hit.metadata.get("mistake_id").and_then(|v| v.as_str()) else { continue };
            if let Some(mistake) = self.relational.get_mistake(mistake_id)? {
                self.relational.increment_mistake_similar_count(mistake_id)?;
                warnings.push(format!("- previously corrected: \"{}\" -> {}", mistake.user_input, mistake.correction));
            }
        }
        if warnings.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("⚠ PAST MISTAKES TO AVOID:\n{}\n", warnings.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::vector::LocalVectorStore;

    fn test_tracker() -> (tempfile::TempDir, MistakeTracker) {
        let dir = tempfile::tempdir().unwrap();
        let relational = Arc::new(RelationalStore::new(dir.path().join("psycho.db")).unwrap());
        relational.insert_session(&crate::model::Session::new("s1".into(), "general")).unwrap();
        let vector = Arc::new(LocalVectorStore::open(dir.path().join("vectors")).unwrap());
        (dir, MistakeTracker::new(relational, vector))
    }

    #[tokio::test]
    async fn warning_surfaces_for_similar_query() {
        let (_dir, tracker) = test_tracker();
        tracker
            .record_mistake("s1", "rust ownership allows multiple mutable borrows", "that's wrong", "only one mutable borrow at a time", "coding", None)
            .await
            .unwrap();
        let warnings = tracker.get_warnings_for_prompt("rust mutable borrow rules", None).await.unwrap();
        assert!(warnings.contains("mutable borrow"));
    }

    #[tokio::test]
    async fn no_warnings_for_unrelated_query() {
        let (_dir, tracker) = test_tracker();
        tracker
            .record_mistake("s1", "bananas ripen at room temperature", "wrong", "bananas ripen faster near other fruit", "general", None)
            .await
            .unwrap();
        let warnings = tracker.get_warnings_for_prompt("quantum computing algorithms", None).await.unwrap();
        assert!(warnings.is_empty());
    }
}
