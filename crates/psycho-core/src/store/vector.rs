//! Embedding-indexed collections with cosine similarity search.
//!
//! The upstream reference implementation this crate was built against ships two
//! vector store backends that are both non-functional placeholders — their
//! `search`/`index` methods unconditionally return empty results or a
//! fallback error. This implementation actually computes cosine similarity,
//! brute-force, over an in-memory index backed by append-only JSON persistence
//! per collection.

use crate::error::VectorError;
use crate::llm::local::{cosine_similarity, LocalEmbeddingProvider};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
    pub distance: f32,
    pub relevance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VectorStoreStats {
    pub collections: usize,
    pub total_vectors: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(
        &self,
        collection: &str,
        id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<(), VectorError>;

    async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<VectorHit>, VectorError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), VectorError>;

    async fn count(&self, collection: &str) -> Result<usize, VectorError>;

    async fn get_stats(&self) -> Result<VectorStoreStats, VectorError>;
}

/// Cosine-similarity vector store backed by an in-memory index with
/// append-only JSON persistence per collection under `<root>/<collection>.json`.
pub struct LocalVectorStore {
    root: PathBuf,
    collections: Arc<DashMap<String, Vec<VectorRecord>>>,
}

impl LocalVectorStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, VectorError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let collections = DashMap::new();
        if let Ok(entries) = std::fs::read_dir(&root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
                if let Ok(raw) = std::fs::read_to_string(&path) {
                    if let Ok(records) = serde_json::from_str::<Vec<VectorRecord>>(&raw) {
                        collections.insert(stem.to_string(), records);
                    }
                }
            }
        }
        Ok(Self { root, collections: Arc::new(collections) })
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{}.json", collection))
    }

    fn persist(&self, collection: &str) -> Result<(), VectorError> {
        let records = self
            .collections
            .get(collection)
            .map(|r| r.clone())
            .unwrap_or_default();
        let body = serde_json::to_string(&records)?;
        std::fs::write(self.collection_path(collection), body)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn add(
        &self,
        collection: &str,
        id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<(), VectorError> {
        let embedding = LocalEmbeddingProvider::embed(text);
        let record = VectorRecord { id: id.to_string(), text: text.to_string(), embedding, metadata };
        {
            let mut entry = self.collections.entry(collection.to_string()).or_default();
            if let Some(existing) = entry.iter_mut().find(|r| r.id == id) {
                *existing = record;
            } else {
                entry.push(record);
            }
        }
        self.persist(collection)
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<VectorHit>, VectorError> {
        let Some(records) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let query_embedding = LocalEmbeddingProvider::embed(query);
        let mut scored: Vec<VectorHit> = records
            .iter()
            .map(|r| {
                let sim = cosine_similarity(&query_embedding, &r.embedding);
                let distance = 1.0 - sim;
                VectorHit {
                    id: r.id.clone(),
                    text: r.text.clone(),
                    metadata: r.metadata.clone(),
                    distance,
                    relevance: relevance_from_distance(distance),
                }
            })
            .collect();
        scored.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), VectorError> {
        if let Some(mut entry) = self.collections.get_mut(collection) {
            entry.retain(|r| r.id != id);
        }
        self.persist(collection)
    }

    async fn count(&self, collection: &str) -> Result<usize, VectorError> {
        Ok(self.collections.get(collection).map(|r| r.len()).unwrap_or(0))
    }

    async fn get_stats(&self) -> Result<VectorStoreStats, VectorError> {
        let total: usize = self.collections.iter().map(|r| r.len()).sum();
        Ok(VectorStoreStats { collections: self.collections.len(), total_vectors: total })
    }
}

/// Relevance = `1 - distance/2`, in `[0, 1]`.
pub fn relevance_from_distance(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_ranks_closer_text_higher() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).unwrap();
        store.add("facts", "a", "rust is a systems programming language", serde_json::json!({})).await.unwrap();
        store.add("facts", "b", "bananas are a good source of potassium", serde_json::json!({})).await.unwrap();

        let hits = store.search("facts", "systems programming in rust", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].relevance >= hits[1].relevance);
    }

    #[tokio::test]
    async fn relevance_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).unwrap();
        store.add("x", "a", "hello world", serde_json::json!({})).await.unwrap();
        let hits = store.search("x", "hello world", 1).await.unwrap();
        assert!(hits[0].relevance >= 0.0 && hits[0].relevance <= 1.0);
    }

    #[tokio::test]
    async fn empty_collection_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).unwrap();
        let hits = store.search("nope", "anything", 5).await.unwrap();
        assert!(hits.is_empty());
    }
}
