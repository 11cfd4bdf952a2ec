//! Knowledge graph: directed, typed nodes/edges, confidence dynamics, PageRank,
//! merge/deprecate. Single-writer via `tokio::sync::RwLock` — see DESIGN.md for
//! why this was preferred over a dedicated actor task.

pub mod reasoner;

use crate::error::GraphError;
use crate::model::{clamp_confidence, now_ts, EdgeType, KnowledgeEdge, KnowledgeNode, NodeType};
use crate::store::vector::VectorStore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const CONFIDENCE_CONSISTENT: f32 = 0.05;
pub const CONFIDENCE_CONTRADICTS: f32 = -0.10;
pub const CONFIDENCE_USER_CONFIRM: f32 = 0.20;
pub const CONFIDENCE_USER_CORRECT: f32 = -0.40;
pub const CONFIDENCE_USED_IN_RESPONSE: f32 = 0.03;
pub const CONFIDENCE_INFERRED: f32 = 0.4;
pub const NODE_REINFORCE_DELTA: f32 = 0.03;
pub const EDGE_REINFORCE_CONFIDENCE_DELTA: f32 = 0.03;
pub const MAX_EVOLUTION_HISTORY: usize = 200;

const GRAPH_NODES_COLLECTION: &str = "graph_nodes";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphStats {
    pub active_nodes: usize,
    pub total_edges: usize,
    pub average_confidence: f32,
    pub contradictions: usize,
    pub type_histogram: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphOnDisk {
    schema_version: u32,
    saved_at: String,
    nodes: HashMap<String, KnowledgeNode>,
    edges: Vec<KnowledgeEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub counts: GraphStats,
    pub evolution_history: VecDeque<serde_json::Value>,
}

impl Default for GraphMetadata {
    fn default() -> Self {
        Self { counts: GraphStats::default(), evolution_history: VecDeque::new() }
    }
}

struct GraphInner {
    nodes: HashMap<String, KnowledgeNode>,
    edges: Vec<KnowledgeEdge>,
    pagerank: HashMap<String, f32>,
    evolution_history: VecDeque<serde_json::Value>,
    dirty: bool,
}

impl GraphInner {
    fn new() -> Self {
        Self { nodes: HashMap::new(), edges: Vec::new(), pagerank: HashMap::new(), evolution_history: VecDeque::new(), dirty: false }
    }

    fn find_by_label(&self, label: &str, node_type: Option<NodeType>) -> Option<&KnowledgeNode> {
        self.nodes.values().find(|n| {
            !n.deprecated
                && n.label == label
                && node_type.map(|t| t == n.node_type).unwrap_or(true)
        })
    }

    fn find_edge_mut(&mut self, source: &str, target: &str, edge_type: EdgeType) -> Option<&mut KnowledgeEdge> {
        self.edges
            .iter_mut()
            .find(|e| e.source_id == source && e.target_id == target && e.edge_type == edge_type)
    }

    fn record_event(&mut self, event: serde_json::Value) {
        self.evolution_history.push_back(event);
        while self.evolution_history.len() > MAX_EVOLUTION_HISTORY {
            self.evolution_history.pop_front();
        }
    }

    fn edges_from(&self, id: &str) -> Vec<&KnowledgeEdge> {
        self.edges.iter().filter(|e| e.source_id == id).collect()
    }

    fn edges_to(&self, id: &str) -> Vec<&KnowledgeEdge> {
        self.edges.iter().filter(|e| e.target_id == id).collect()
    }

    fn stats(&self) -> GraphStats {
        let active: Vec<&KnowledgeNode> = self.nodes.values().filter(|n| !n.deprecated).collect();
        let mut histogram = HashMap::new();
        let mut contradictions = 0;
        for n in &active {
            *histogram.entry(n.node_type.as_str().to_string()).or_insert(0) += 1;
        }
        for e in &self.edges {
            if e.edge_type == EdgeType::Contradicts {
                contradictions += 1;
            }
        }
        let avg = if active.is_empty() {
            0.0
        } else {
            active.iter().map(|n| n.confidence).sum::<f32>() / active.len() as f32
        };
        GraphStats {
            active_nodes: active.len(),
            total_edges: self.edges.len(),
            average_confidence: avg,
            contradictions,
            type_histogram: histogram,
        }
    }
}

pub struct KnowledgeGraph {
    inner: RwLock<GraphInner>,
    vector_store: Arc<dyn VectorStore>,
    graph_dir: PathBuf,
    merge_similarity_threshold: f32,
    pagerank_weight_confidence: f32,
    pagerank_weight_rank: f32,
    pagerank_weight_recency: f32,
}

impl KnowledgeGraph {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        graph_dir: impl Into<PathBuf>,
        merge_similarity_threshold: f32,
        pagerank_weight_confidence: f32,
        pagerank_weight_rank: f32,
        pagerank_weight_recency: f32,
    ) -> Self {
        Self {
            inner: RwLock::new(GraphInner::new()),
            vector_store,
            graph_dir: graph_dir.into(),
            merge_similarity_threshold,
            pagerank_weight_confidence,
            pagerank_weight_rank,
            pagerank_weight_recency,
        }
    }

    fn graph_path(&self) -> PathBuf {
        self.graph_dir.join("knowledge_graph.json")
    }

    fn metadata_path(&self) -> PathBuf {
        self.graph_dir.join("graph_metadata.json")
    }

    // ── Persistence ──────────────────────────────────────────────

    pub async fn load(&self) -> Result<(), GraphError> {
        let path = self.graph_path();
        if !path.exists() {
            return Ok(());
        }
        let raw = tokio::fs::read_to_string(&path).await?;
        let on_disk: GraphOnDisk = serde_json::from_str(&raw)?;
        let mut inner = self.inner.write().await;
        inner.nodes = on_disk.nodes;
        inner.edges = on_disk.edges;
        drop(inner);
        self.compute_pagerank().await;
        Ok(())
    }

    /// Atomic write: serialize to a sibling `.tmp` file, then rename over the target.
    pub async fn save(&self) -> Result<(), GraphError> {
        let inner = self.inner.read().await;
        let on_disk = GraphOnDisk {
            schema_version: 1,
            saved_at: crate::model::iso_now(),
            nodes: inner.nodes.clone(),
            edges: inner.edges.clone(),
        };
        let metadata = GraphMetadata { counts: inner.stats(), evolution_history: inner.evolution_history.clone() };
        drop(inner);

        tokio::fs::create_dir_all(&self.graph_dir).await?;
        let body = serde_json::to_string_pretty(&on_disk)?;
        let tmp_path = self.graph_path().with_extension("json.tmp");
        tokio::fs::write(&tmp_path, body).await?;
        tokio::fs::rename(&tmp_path, self.graph_path()).await?;

        let meta_body = serde_json::to_string_pretty(&metadata)?;
        tokio::fs::write(self.metadata_path(), meta_body).await?;
        Ok(())
    }

    // ── Node operations ──────────────────────────────────────────

    fn render_for_index(node: &KnowledgeNode) -> String {
        let mut s = format!("{}: {} | domain: {}", node.node_type.as_str(), node.display_label, node.domain);
        for (k, v) in &node.properties {
            s.push_str(&format!(" | {}: {}", k, v));
        }
        s
    }

    async fn index_node(&self, node: &KnowledgeNode) {
        let text = Self::render_for_index(node);
        let metadata = serde_json::json!({
            "node_id": node.id,
            "type": node.node_type.as_str(),
            "domain": node.domain,
        });
        let _ = self.vector_store.add(GRAPH_NODES_COLLECTION, &node.id, &text, metadata).await;
    }

    /// Upsert by `(label, type)`. Existing non-deprecated node reinforces;
    /// otherwise a new node is created. Returns the canonical id.
    pub async fn upsert_node(&self, mut node: KnowledgeNode) -> String {
        let canonical_id;
        {
            let mut inner = self.inner.write().await;
            if let Some(existing) = inner.find_by_label(&node.label, Some(node.node_type)).cloned() {
                let id = existing.id.clone();
                let entry = inner.nodes.get_mut(&id).expect("existing node present");
                entry.update_confidence(NODE_REINFORCE_DELTA);
                for src in &node.sources {
                    if !entry.sources.contains(src) {
                        entry.sources.push(src.clone());
                    }
                }
                for (k, v) in node.properties.drain() {
                    entry.properties.entry(k).or_insert(v);
                }
                canonical_id = id;
            } else {
                canonical_id = node.id.clone();
                inner.nodes.insert(node.id.clone(), node.clone());
            }
            inner.dirty = true;
        }
        let node_snapshot = {
            let inner = self.inner.read().await;
            inner.nodes.get(&canonical_id).cloned()
        };
        if let Some(n) = node_snapshot {
            self.index_node(&n).await;
        }
        canonical_id
    }

    pub async fn get_node(&self, id: &str) -> Option<KnowledgeNode> {
        self.inner.read().await.nodes.get(id).cloned()
    }

    pub async fn find_node_by_label(&self, label: &str, node_type: Option<NodeType>) -> Option<KnowledgeNode> {
        self.inner.read().await.find_by_label(label, node_type).cloned()
    }

    pub async fn update_node_confidence(&self, id: &str, delta: f32) {
        let mut inner = self.inner.write().await;
        if let Some(n) = inner.nodes.get_mut(id) {
            n.update_confidence(delta);
            inner.dirty = true;
        }
    }

    pub async fn annotate_node(&self, id: &str, key: &str, value: &str) {
        let mut inner = self.inner.write().await;
        if let Some(n) = inner.nodes.get_mut(id) {
            n.properties.insert(key.to_string(), value.to_string());
        }
    }

    pub async fn deprecate_node(&self, id: &str, reason: impl Into<String>) {
        let mut inner = self.inner.write().await;
        if let Some(n) = inner.nodes.get_mut(id) {
            n.deprecate(reason);
            inner.dirty = true;
        }
    }

    // ── Edge operations ──────────────────────────────────────────

    /// Both endpoints must exist and be non-deprecated. Duplicate `(source,target,type)`
    /// reinforces instead of duplicating.
    pub async fn upsert_edge(&self, edge: KnowledgeEdge) -> Result<(), GraphError> {
        let mut inner = self.inner.write().await;
        let source_ok = inner.nodes.get(&edge.source_id).map(|n| !n.deprecated).unwrap_or(false);
        let target_ok = inner.nodes.get(&edge.target_id).map(|n| !n.deprecated).unwrap_or(false);
        if !source_ok {
            return Err(GraphError::EdgeEndpointMissing(edge.source_id));
        }
        if !target_ok {
            return Err(GraphError::EdgeEndpointMissing(edge.target_id));
        }
        if let Some(existing) = inner.find_edge_mut(&edge.source_id, &edge.target_id, edge.edge_type) {
            existing.reinforce();
        } else {
            inner.edges.push(edge);
        }
        inner.dirty = true;
        Ok(())
    }

    pub async fn edges_from(&self, id: &str) -> Vec<KnowledgeEdge> {
        self.inner.read().await.edges_from(id).into_iter().cloned().collect()
    }

    pub async fn edges_to(&self, id: &str) -> Vec<KnowledgeEdge> {
        self.inner.read().await.edges_to(id).into_iter().cloned().collect()
    }

    // ── Merge / maintenance ──────────────────────────────────────

    /// Averages confidences, unions sources/properties, redirects edges to `keep`,
    /// adds a `similar_to` audit edge, deprecates `drop`.
    pub async fn merge_nodes(&self, keep_id: &str, drop_id: &str) {
        if keep_id == drop_id {
            return;
        }
        let mut inner = self.inner.write().await;
        let Some(drop_node) = inner.nodes.get(drop_id).cloned() else { return };
        let Some(keep_node) = inner.nodes.get(keep_id).cloned() else { return };

        let merged_confidence = clamp_confidence((keep_node.confidence + drop_node.confidence) / 2.0);
        if let Some(keep_mut) = inner.nodes.get_mut(keep_id) {
            keep_mut.confidence = merged_confidence;
            keep_mut.last_updated = now_ts();
            for src in drop_node.sources.iter() {
                if !keep_mut.sources.contains(src) {
                    keep_mut.sources.push(src.clone());
                }
            }
            for (k, v) in drop_node.properties.iter() {
                keep_mut.properties.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        for e in inner.edges.iter_mut() {
            if e.source_id == drop_id {
                e.source_id = keep_id.to_string();
            }
            if e.target_id == drop_id {
                e.target_id = keep_id.to_string();
            }
        }

        let audit_edge = KnowledgeEdge::new(keep_id.to_string(), drop_id.to_string(), EdgeType::SimilarTo, 0.5);
        inner.edges.push(audit_edge);

        if let Some(drop_mut) = inner.nodes.get_mut(drop_id) {
            drop_mut.deprecate("merged into duplicate");
        }
        inner.dirty = true;
    }

    /// Recomputed lazily (load, after bulk integrations, during maintenance).
    /// Simple power-iteration PageRank over non-deprecated nodes; used only for ranking.
    pub async fn compute_pagerank(&self) {
        let mut inner = self.inner.write().await;
        let ids: Vec<String> = inner.nodes.iter().filter(|(_, n)| !n.deprecated).map(|(id, _)| id.clone()).collect();
        if ids.is_empty() {
            return;
        }
        let n = ids.len() as f32;
        let damping = 0.85;
        let mut rank: HashMap<String, f32> = ids.iter().map(|id| (id.clone(), 1.0 / n)).collect();

        let out_degree: HashMap<String, usize> = ids
            .iter()
            .map(|id| (id.clone(), inner.edges_from(id).len().max(1)))
            .collect();

        for _ in 0..20 {
            let mut next: HashMap<String, f32> = ids.iter().map(|id| (id.clone(), (1.0 - damping) / n)).collect();
            for id in &ids {
                let contribution = rank[id] / out_degree[id] as f32;
                for edge in inner.edges_from(id) {
                    if let Some(slot) = next.get_mut(&edge.target_id) {
                        *slot += damping * contribution;
                    }
                }
            }
            rank = next;
        }
        inner.pagerank = rank;
    }

    pub async fn get_top_nodes(&self, limit: usize) -> Vec<KnowledgeNode> {
        let inner = self.inner.read().await;
        let mut nodes: Vec<&KnowledgeNode> = inner.nodes.values().filter(|n| !n.deprecated).collect();
        nodes.sort_by(|a, b| {
            let ra = inner.pagerank.get(&a.id).copied().unwrap_or(0.0);
            let rb = inner.pagerank.get(&b.id).copied().unwrap_or(0.0);
            rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
        });
        nodes.into_iter().take(limit).cloned().collect()
    }

    pub async fn stats(&self) -> GraphStats {
        self.inner.read().await.stats()
    }

    pub async fn all_active_nodes(&self) -> Vec<KnowledgeNode> {
        self.inner.read().await.nodes.values().filter(|n| !n.deprecated).cloned().collect()
    }

    pub async fn has_edge(&self, source: &str, target: &str) -> bool {
        self.inner.read().await.edges.iter().any(|e| e.source_id == source && e.target_id == target)
    }

    pub async fn record_evolution_event(&self, event: serde_json::Value) {
        let mut inner = self.inner.write().await;
        inner.record_event(event);
    }

    pub async fn is_dirty(&self) -> bool {
        self.inner.read().await.dirty
    }

    // ── Hybrid context retrieval ─────────────────────────────────

    /// 1. Semantic search seeds (<=8). 2. One-hop expansion (both directions).
    /// 3. Score `0.5*confidence + 0.3*min(pagerank*100,1) + 0.2*recency`.
    /// 4. Top-k candidates with outgoing edges (excluding deprecated targets).
    pub async fn get_context_for_query(
        &self,
        query: &str,
        top_k: usize,
    ) -> Vec<(KnowledgeNode, Vec<(KnowledgeNode, KnowledgeEdge)>)> {
        let seeds = self
            .vector_store
            .search(GRAPH_NODES_COLLECTION, query, 8)
            .await
            .unwrap_or_default();

        let inner = self.inner.read().await;
        let mut candidate_ids: Vec<String> = Vec::new();
        for hit in &seeds {
            let Some(node_id) = hit.metadata.get("node_id").and_then(|v| v.as_str()) else { continue };
            if inner.nodes.get(node_id).map(|n| !n.deprecated).unwrap_or(false) {
                candidate_ids.push(node_id.to_string());
            }
        }
        // one-hop expansion, both directions
        let mut expanded = candidate_ids.clone();
        for id in &candidate_ids {
            for e in inner.edges_from(id) {
                if inner.nodes.get(&e.target_id).map(|n| !n.deprecated).unwrap_or(false) {
                    expanded.push(e.target_id.clone());
                }
            }
            for e in inner.edges_to(id) {
                if inner.nodes.get(&e.source_id).map(|n| !n.deprecated).unwrap_or(false) {
                    expanded.push(e.source_id.clone());
                }
            }
        }
        expanded.sort();
        expanded.dedup();

        let now = now_ts();
        let mut scored: Vec<(f32, String)> = expanded
            .into_iter()
            .filter_map(|id| {
                let node = inner.nodes.get(&id)?;
                let rank = inner.pagerank.get(&id).copied().unwrap_or(0.0);
                let idle_days = ((now - node.last_accessed).max(0) as f32) / 86400.0;
                let recency = 2f32.powf(-idle_days / 30.0);
                let score = self.pagerank_weight_confidence * node.confidence
                    + self.pagerank_weight_rank * (rank * 100.0).min(1.0)
                    + self.pagerank_weight_recency * recency;
                Some((score, id))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .filter_map(|(_, id)| {
                let node = inner.nodes.get(&id)?.clone();
                let edges: Vec<(KnowledgeNode, KnowledgeEdge)> = inner
                    .edges_from(&id)
                    .into_iter()
                    .filter_map(|e| {
                        let target = inner.nodes.get(&e.target_id)?;
                        if target.deprecated {
                            return None;
                        }
                        Some((target.clone(), e.clone()))
                    })
                    .collect();
                Some((node, edges))
            })
            .collect()
    }

    pub fn merge_similarity_threshold(&self) -> f32 {
        self.merge_similarity_threshold
    }
}

/// Normalized string similarity on labels (Levenshtein-ratio, matching the
/// `SequenceMatcher.ratio()` semantics this crate was modeled on).
pub fn label_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a == 0 || len_b == 0 {
        return 0.0;
    }
    let distance = levenshtein(a, b) as f32;
    let max_len = len_a.max(len_b) as f32;
    1.0 - (distance / max_len)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::vector::LocalVectorStore;

    async fn test_graph() -> (tempfile::TempDir, KnowledgeGraph) {
        let dir = tempfile::tempdir().unwrap();
        let vs = Arc::new(LocalVectorStore::open(dir.path().join("vectors")).unwrap());
        let graph = KnowledgeGraph::new(vs, dir.path().join("graph"), 0.92, 0.5, 0.3, 0.2);
        (dir, graph)
    }

    #[tokio::test]
    async fn upsert_same_label_reinforces() {
        let (_dir, graph) = test_graph().await;
        let id1 = graph.upsert_node(KnowledgeNode::create(NodeType::Technology, "rust", "coding", 0.5, "s1")).await;
        let first_conf = graph.get_node(&id1).await.unwrap().confidence;
        let id2 = graph.upsert_node(KnowledgeNode::create(NodeType::Technology, "rust", "coding", 0.5, "s2")).await;
        assert_eq!(id1, id2);
        let second_conf = graph.get_node(&id1).await.unwrap().confidence;
        assert!(second_conf > first_conf);
        assert!(second_conf - first_conf >= 0.02);
    }

    #[tokio::test]
    async fn confidence_stays_in_bounds() {
        let (_dir, graph) = test_graph().await;
        let id = graph.upsert_node(KnowledgeNode::create(NodeType::Fact, "x", "general", 0.9, "s1")).await;
        for _ in 0..20 {
            graph.update_node_confidence(&id, CONFIDENCE_USER_CONFIRM).await;
        }
        let node = graph.get_node(&id).await.unwrap();
        assert!(node.confidence <= 0.95);
    }

    #[tokio::test]
    async fn correcting_three_times_drops_below_threshold() {
        let (_dir, graph) = test_graph().await;
        let id = graph.upsert_node(KnowledgeNode::create(NodeType::Fact, "x", "general", 0.9, "s1")).await;
        for _ in 0..3 {
            graph.update_node_confidence(&id, CONFIDENCE_USER_CORRECT).await;
        }
        let node = graph.get_node(&id).await.unwrap();
        assert!(node.confidence < 0.1);
    }

    #[tokio::test]
    async fn edge_requires_existing_endpoints() {
        let (_dir, graph) = test_graph().await;
        let edge = KnowledgeEdge::new("missing-a".into(), "missing-b".into(), EdgeType::RelatesTo, 0.5);
        let result = graph.upsert_edge(edge).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn deprecated_nodes_are_excluded_from_context() {
        let (_dir, graph) = test_graph().await;
        let id = graph.upsert_node(KnowledgeNode::create(NodeType::Fact, "deprecated fact", "general", 0.5, "s1")).await;
        graph.deprecate_node(&id, "test").await;
        let ctx = graph.get_context_for_query("deprecated fact", 5).await;
        assert!(ctx.iter().all(|(n, _)| n.id != id));
    }

    #[tokio::test]
    async fn merge_redirects_edges_without_orphans() {
        let (_dir, graph) = test_graph().await;
        let keep = graph.upsert_node(KnowledgeNode::create(NodeType::Concept, "keep", "general", 0.6, "s1")).await;
        let drop = graph.upsert_node(KnowledgeNode::create(NodeType::Concept, "drop", "general", 0.5, "s1")).await;
        let other = graph.upsert_node(KnowledgeNode::create(NodeType::Concept, "other", "general", 0.5, "s1")).await;
        graph
            .upsert_edge(KnowledgeEdge::new(drop.clone(), other.clone(), EdgeType::RelatesTo, 0.5))
            .await
            .unwrap();
        graph.merge_nodes(&keep, &drop).await;
        let from_keep = graph.edges_from(&keep).await;
        assert!(from_keep.iter().any(|e| e.target_id == other));
        let dropped = graph.get_node(&drop).await.unwrap();
        assert!(dropped.deprecated);
    }

    #[test]
    fn label_similarity_exact_match_is_one() {
        assert_eq!(label_similarity("python", "python"), 1.0);
    }

    #[test]
    fn label_similarity_detects_near_duplicates() {
        let sim = label_similarity("trading bot", "trading-bot");
        assert!(sim >= 0.9, "expected near-duplicate similarity, got {sim}");
    }
}
