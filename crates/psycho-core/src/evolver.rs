//! `GraphEvolver`: the single write path from extractions to the knowledge graph,
//! plus periodic maintenance (decay, pruning, duplicate merge, transitive inference).

use crate::extractor::ExtractionResult;
use crate::graph::{label_similarity, KnowledgeGraph, CONFIDENCE_CONSISTENT, CONFIDENCE_INFERRED, CONFIDENCE_USER_CONFIRM, CONFIDENCE_USER_CORRECT};
use crate::model::{now_ts, EdgeType, KnowledgeEdge, NodeType};

const TIME_DECAY_PER_IDLE_DAY: f32 = 0.001;
const MIN_CONFIDENCE_THRESHOLD: f32 = 0.05;

#[derive(Debug, Clone, Default)]
pub struct IntegrationStats {
    pub nodes_added: u32,
    pub nodes_updated: u32,
    pub edges_added: u32,
    pub facts_added: u32,
    pub preferences_added: u32,
    pub corrections_applied: u32,
}

impl IntegrationStats {
    fn any_nonzero(&self) -> bool {
        self.nodes_added > 0
            || self.nodes_updated > 0
            || self.edges_added > 0
            || self.facts_added > 0
            || self.preferences_added > 0
            || self.corrections_applied > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaintenanceResult {
    pub pruned: u32,
    pub merged: u32,
    pub decayed: u32,
}

pub struct GraphEvolver {
    graph: std::sync::Arc<KnowledgeGraph>,
}

impl GraphEvolver {
    pub fn new(graph: std::sync::Arc<KnowledgeGraph>) -> Self {
        Self { graph }
    }

    /// Entities -> edges -> facts -> preferences -> questions -> corrections, in order.
    pub async fn integrate(&self, result: ExtractionResult) -> IntegrationStats {
        let mut stats = IntegrationStats::default();
        if result.is_empty() {
            return stats;
        }

        let mut label_to_id = std::collections::HashMap::new();

        // 1. entities (with "user" person-node merge special case)
        for node in &result.entities {
            if node.node_type == NodeType::Person && node.label == "user" {
                if let Some(existing) = self.graph.find_node_by_label("user", Some(NodeType::Person)).await {
                    self.graph.update_node_confidence(&existing.id, CONFIDENCE_CONSISTENT).await;
                    for (k, v) in &node.properties {
                        self.graph.annotate_node(&existing.id, k, v).await;
                    }
                    label_to_id.insert(node.label.clone(), existing.id.clone());
                    stats.nodes_updated += 1;
                } else {
                    let id = self.graph.upsert_node(node.clone()).await;
                    label_to_id.insert(node.label.clone(), id);
                    stats.nodes_added += 1;
                }
                continue;
            }

            let existed = self.graph.find_node_by_label(&node.label, Some(node.node_type)).await.is_some();
            let id = self.graph.upsert_node(node.clone()).await;
            label_to_id.insert(node.label.clone(), id);
            if existed {
                stats.nodes_updated += 1;
            } else {
                stats.nodes_added += 1;
            }
        }

        // 2. edges — dropped if either endpoint id didn't survive integration
        // (e.g. the extractor's provisional node merged into an existing one
        // under a different canonical id)
        for edge in &result.edges {
            let source_ok = self.graph.get_node(&edge.source_id).await.is_some();
            let target_ok = self.graph.get_node(&edge.target_id).await.is_some();
            if source_ok && target_ok && self.graph.upsert_edge(edge.clone()).await.is_ok() {
                stats.edges_added += 1;
            }
        }

        // 3. facts
        for fact in &result.facts {
            if let Some(existing) = self.graph.find_node_by_label(&fact.label, None).await {
                self.graph.update_node_confidence(&existing.id, CONFIDENCE_CONSISTENT).await;
            } else {
                self.graph.upsert_node(fact.clone()).await;
                stats.facts_added += 1;
            }
        }

        // 4. preferences
        for pref in &result.preferences {
            if let Some(existing) = self.graph.find_node_by_label(&pref.label, Some(NodeType::Preference)).await {
                self.graph.update_node_confidence(&existing.id, 0.05).await;
            } else {
                self.graph.upsert_node(pref.clone()).await;
                stats.preferences_added += 1;
            }
        }

        // 5. questions
        for q in &result.questions {
            if self.graph.find_node_by_label(&q.label, Some(NodeType::Question)).await.is_none() {
                self.graph.upsert_node(q.clone()).await;
            }
        }

        // 6. corrections
        for correction in &result.corrections {
            let wrong_node = self.graph.find_node_by_label(&correction.wrong, None).await;
            let correct_node = self.graph.find_node_by_label(&correction.correct, None).await;

            if let Some(ref wrong) = wrong_node {
                self.graph.update_node_confidence(&wrong.id, CONFIDENCE_USER_CORRECT).await;
                self.graph.annotate_node(&wrong.id, "correction_note", &correction.explanation).await;
                stats.corrections_applied += 1;
            }

            match (&correct_node, &wrong_node) {
                (Some(correct), Some(wrong)) => {
                    let edge = KnowledgeEdge::new(correct.id.clone(), wrong.id.clone(), EdgeType::Corrects, 0.9);
                    let _ = self.graph.upsert_edge(edge).await;
                }
                (Some(correct), None) => {
                    self.graph.update_node_confidence(&correct.id, CONFIDENCE_USER_CONFIRM).await;
                }
                _ => {}
            }
        }

        if stats.nodes_added > 3 {
            self.graph.compute_pagerank().await;
        }

        let _ = stats.any_nonzero();
        stats
    }

    pub async fn confirm_nodes(&self, node_ids: &[String]) {
        for id in node_ids {
            self.graph.update_node_confidence(id, CONFIDENCE_USER_CONFIRM).await;
        }
    }

    pub async fn correct_node(&self, node_id: &str, note: &str) {
        self.graph.update_node_confidence(node_id, CONFIDENCE_USER_CORRECT).await;
        if !note.is_empty() {
            self.graph.annotate_node(node_id, "correction_note", note).await;
        }
    }

    pub async fn boost_used_nodes(&self, node_ids: &[String]) {
        for id in node_ids {
            self.graph.update_node_confidence(id, crate::graph::CONFIDENCE_USED_IN_RESPONSE).await;
        }
    }

    // ── Maintenance ──────────────────────────────────────────────

    pub async fn apply_time_decay(&self) -> u32 {
        let now = now_ts();
        let mut decayed = 0;
        for node in self.graph.all_active_nodes().await {
            let idle_days = ((now - node.last_accessed).max(0) as f32) / 86400.0;
            if idle_days > 1.0 {
                let decay = TIME_DECAY_PER_IDLE_DAY * idle_days;
                self.graph.update_node_confidence(&node.id, -decay).await;
                decayed += 1;
            }
        }
        decayed
    }

    pub async fn prune_low_confidence(&self) -> u32 {
        let mut pruned = 0;
        for node in self.graph.all_active_nodes().await {
            if node.confidence < MIN_CONFIDENCE_THRESHOLD {
                self.graph
                    .deprecate_node(&node.id, format!("confidence below threshold ({:.3})", node.confidence))
                    .await;
                pruned += 1;
            }
        }
        pruned
    }

    pub async fn find_and_merge_duplicates(&self) -> u32 {
        let threshold = self.graph.merge_similarity_threshold();
        let nodes = self.graph.all_active_nodes().await;
        let mut merged_ids = std::collections::HashSet::new();
        let mut merged = 0;

        for (i, a) in nodes.iter().enumerate() {
            if merged_ids.contains(&a.id) {
                continue;
            }
            for b in nodes.iter().skip(i + 1) {
                if merged_ids.contains(&b.id) || a.node_type != b.node_type {
                    continue;
                }
                let sim = label_similarity(&a.label, &b.label);
                if sim >= threshold {
                    let (keep, drop) = if a.confidence >= b.confidence { (&a.id, &b.id) } else { (&b.id, &a.id) };
                    self.graph.merge_nodes(keep, drop).await;
                    merged_ids.insert(drop.clone());
                    merged += 1;
                }
            }
        }
        merged
    }

    /// Transitive `relates_to` closure: A -relates_to-> N1 -relates_to-> N2
    /// (N2 != A, no existing direct edge A->N2) infers A -relates_to-> N2 at 0.4.
    pub async fn add_inferred_edges(&self, node_ids: &[String]) -> u32 {
        let mut inferred = 0;
        for nid in node_ids {
            let first_hop = self.graph.edges_from(nid).await;
            for e1 in &first_hop {
                let second_hop = self.graph.edges_from(&e1.target_id).await;
                for e2 in &second_hop {
                    if e2.edge_type != EdgeType::RelatesTo {
                        continue;
                    }
                    if &e2.target_id == nid {
                        continue;
                    }
                    if self.graph.has_edge(nid, &e2.target_id).await {
                        continue;
                    }
                    let mut edge = KnowledgeEdge::new(nid.clone(), e2.target_id.clone(), EdgeType::RelatesTo, CONFIDENCE_INFERRED);
                    edge.properties.insert("inferred".into(), "true".into());
                    if self.graph.upsert_edge(edge).await.is_ok() {
                        inferred += 1;
                    }
                }
            }
        }
        inferred
    }

    pub async fn run_full_maintenance(&self) -> MaintenanceResult {
        let pruned = self.prune_low_confidence().await;
        let merged = self.find_and_merge_duplicates().await;
        let decayed = self.apply_time_decay().await;
        self.graph.compute_pagerank().await;
        let _ = self.graph.save().await;

        let result = MaintenanceResult { pruned, merged, decayed };
        self.graph
            .record_evolution_event(serde_json::json!({"type": "maintenance", "result": {
                "pruned": result.pruned, "merged": result.merged, "decayed": result.decayed
            }}))
            .await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KnowledgeNode;
    use crate::store::vector::LocalVectorStore;
    use std::sync::Arc;

    async fn test_setup() -> (tempfile::TempDir, Arc<KnowledgeGraph>, GraphEvolver) {
        let dir = tempfile::tempdir().unwrap();
        let vs = Arc::new(LocalVectorStore::open(dir.path().join("vectors")).unwrap());
        let graph = Arc::new(KnowledgeGraph::new(vs, dir.path().join("graph"), 0.92, 0.5, 0.3, 0.2));
        let evolver = GraphEvolver::new(graph.clone());
        (dir, graph, evolver)
    }

    #[tokio::test]
    async fn integrate_adds_entities_and_edges() {
        let (_dir, graph, evolver) = test_setup().await;
        let a = KnowledgeNode::create(NodeType::Technology, "rust", "coding", 0.5, "s1");
        let b = KnowledgeNode::create(NodeType::Concept, "ownership", "coding", 0.5, "s1");
        let edge = KnowledgeEdge::new(a.id.clone(), b.id.clone(), EdgeType::HasProperty, 0.6);
        let result = ExtractionResult {
            entities: vec![a, b],
            edges: vec![edge],
            source: "s1".into(),
            ..Default::default()
        };
        let stats = evolver.integrate(result).await;
        assert_eq!(stats.nodes_added, 2);
        assert_eq!(stats.edges_added, 1);
        assert_eq!(graph.stats().await.active_nodes, 2);
    }

    #[tokio::test]
    async fn correction_drops_wrong_and_links_correct() {
        let (_dir, graph, evolver) = test_setup().await;
        let wrong = KnowledgeNode::create(NodeType::Fact, "python is slow to compile", "coding", 0.7, "s1");
        let correct = KnowledgeNode::create(NodeType::Fact, "python is interpreted not compiled", "coding", 0.6, "s1");
        let wrong_id = graph.upsert_node(wrong.clone()).await;
        let correct_id = graph.upsert_node(correct.clone()).await;

        let result = ExtractionResult {
            corrections: vec![crate::extractor::Correction {
                wrong: wrong.label.clone(),
                correct: correct.label.clone(),
                explanation: "clarified".into(),
            }],
            source: "s1".into(),
            ..Default::default()
        };
        evolver.integrate(result).await;
        let wrong_after = graph.get_node(&wrong_id).await.unwrap();
        assert!(wrong_after.confidence < wrong.confidence);
        let correct_edges = graph.edges_from(&correct_id).await;
        assert!(correct_edges.iter().any(|e| e.target_id == wrong_id && e.edge_type == EdgeType::Corrects));
    }

    #[tokio::test]
    async fn prune_deprecates_below_threshold() {
        let (_dir, graph, evolver) = test_setup().await;
        let node = KnowledgeNode::create(NodeType::Fact, "low confidence fact", "general", 0.06, "s1");
        let id = graph.upsert_node(node).await;
        graph.update_node_confidence(&id, -0.02).await;
        let pruned = evolver.prune_low_confidence().await;
        assert_eq!(pruned, 1);
        assert!(graph.get_node(&id).await.unwrap().deprecated);
    }

    #[tokio::test]
    async fn merges_near_duplicate_labels() {
        let (_dir, graph, evolver) = test_setup().await;
        graph.upsert_node(KnowledgeNode::create(NodeType::Concept, "trading bot", "coding", 0.6, "s1")).await;
        graph.upsert_node(KnowledgeNode::create(NodeType::Concept, "trading-bot", "coding", 0.5, "s1")).await;
        let merged = evolver.find_and_merge_duplicates().await;
        assert_eq!(merged, 1);
        assert_eq!(graph.stats().await.active_nodes, 1);
    }
}
