//! Renders graph context into the prompt-ready text block the LLM provider sees.
//!
//! Formatting (header, char budget, node/edge line shapes) is grounded in the
//! reference reasoner this crate's knowledge pipeline was modeled on: a bullet
//! per node with its type tag, description and domain suffix, a `└─` line of
//! pipe-joined edges underneath, and a fixed hedge instruction closing the block.

use super::KnowledgeGraph;
use crate::model::{confidence_bar, confidence_label, KnowledgeEdge, KnowledgeNode};

pub const MAX_CONTEXT_CHARS: usize = 2400;
pub const MAX_NODES_IN_CONTEXT: usize = 12;
const MAX_EDGES_PER_NODE: usize = 4;

pub struct GraphReasoner<'a> {
    graph: &'a KnowledgeGraph,
}

impl<'a> GraphReasoner<'a> {
    pub fn new(graph: &'a KnowledgeGraph) -> Self {
        Self { graph }
    }

    /// Header, then one block per node (confidence bar + label + up to 4 edges),
    /// truncated to `MAX_CONTEXT_CHARS` and closed with a hedging instruction.
    pub async fn get_context_for_prompt(&self, query: &str) -> String {
        let nodes = self.graph.get_context_for_query(query, MAX_NODES_IN_CONTEXT).await;
        if nodes.is_empty() {
            return String::new();
        }

        let mut out = format!("─── KNOWLEDGE GRAPH ({} relevant nodes) ───\n", nodes.len());
        for (node, edges) in &nodes {
            out.push_str(&Self::format_node(node));
            let edge_line = Self::format_edges(edges);
            if !edge_line.is_empty() {
                out.push_str(&edge_line);
            }
            if out.len() >= MAX_CONTEXT_CHARS {
                break;
            }
        }
        if out.chars().count() > MAX_CONTEXT_CHARS {
            out = out.chars().take(MAX_CONTEXT_CHARS).collect();
            out.push_str("...\n");
        }
        out.push_str(&"─".repeat(35));
        out.push_str("\nUse this knowledge naturally. Hedge on MEDIUM/LOW confidence items.\n");
        out
    }

    fn format_node(node: &KnowledgeNode) -> String {
        let desc = node.properties.get("description").map(|d| format!(" — {d}")).unwrap_or_default();
        let domain = if node.domain != "general" { format!(" [{}]", node.domain) } else { String::new() };
        format!(
            "• [{}] {}{desc} ({} {} {:.2}){domain}\n",
            node.node_type.as_str().to_uppercase(),
            node.display_label,
            confidence_label(node.confidence),
            confidence_bar(node.confidence, 8),
            node.confidence,
        )
    }

    fn format_edges(edges: &[(KnowledgeNode, KnowledgeEdge)]) -> String {
        if edges.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = edges
            .iter()
            .take(MAX_EDGES_PER_NODE)
            .map(|(target, edge)| format!("{}: {}", edge.edge_type.as_str(), target.display_label))
            .collect();
        format!("  └─ {}\n", parts.join(" | "))
    }

    pub async fn get_relevant_nodes(&self, query: &str, limit: usize) -> Vec<KnowledgeNode> {
        self.graph
            .get_context_for_query(query, limit)
            .await
            .into_iter()
            .map(|(node, _)| node)
            .collect()
    }

    pub async fn format_full_graph_summary(&self) -> String {
        let stats = self.graph.stats().await;
        let top = self.graph.get_top_nodes(20).await;
        let mut out = format!(
            "Graph: {} active nodes, {} edges, avg confidence {:.2}, {} contradictions\n",
            stats.active_nodes, stats.total_edges, stats.average_confidence, stats.contradictions
        );
        for node in top {
            out.push_str(&Self::format_node(&node));
        }
        out
    }

    pub async fn format_node_detail(&self, node_id: &str) -> Option<String> {
        let node = self.graph.get_node(node_id).await?;
        let outgoing = self.graph.edges_from(node_id).await;
        let incoming = self.graph.edges_to(node_id).await;
        let mut out = format!(
            "{} ({}) — confidence {:.2} [{}]\n",
            node.display_label,
            node.node_type.as_str(),
            node.confidence,
            node.confidence_label()
        );
        out.push_str(&format!("domain: {} | sources: {}\n", node.domain, node.sources.join(", ")));
        out.push_str(&format!("outgoing edges: {}\n", outgoing.len()));
        out.push_str(&format!("incoming edges: {}\n", incoming.len()));
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeType, KnowledgeEdge, KnowledgeNode, NodeType};
    use crate::store::vector::LocalVectorStore;
    use std::sync::Arc;

    async fn seeded_graph() -> (tempfile::TempDir, KnowledgeGraph) {
        let dir = tempfile::tempdir().unwrap();
        let vs = Arc::new(LocalVectorStore::open(dir.path().join("vectors")).unwrap());
        let graph = KnowledgeGraph::new(vs, dir.path().join("graph"), 0.92, 0.5, 0.3, 0.2);
        let a = graph
            .upsert_node(KnowledgeNode::create(NodeType::Technology, "rust", "coding", 0.8, "s1"))
            .await;
        let b = graph
            .upsert_node(KnowledgeNode::create(NodeType::Concept, "memory safety", "coding", 0.7, "s1"))
            .await;
        graph
            .upsert_edge(KnowledgeEdge::new(a, b, EdgeType::HasProperty, 0.6))
            .await
            .unwrap();
        (dir, graph)
    }

    #[tokio::test]
    async fn empty_graph_yields_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        let vs = Arc::new(LocalVectorStore::open(dir.path().join("vectors")).unwrap());
        let graph = KnowledgeGraph::new(vs, dir.path().join("graph"), 0.92, 0.5, 0.3, 0.2);
        let reasoner = GraphReasoner::new(&graph);
        let ctx = reasoner.get_context_for_prompt("anything").await;
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn context_includes_header_and_node() {
        let (_dir, graph) = seeded_graph().await;
        let reasoner = GraphReasoner::new(&graph);
        let ctx = reasoner.get_context_for_prompt("rust programming").await;
        assert!(ctx.contains("KNOWLEDGE GRAPH"));
        assert!(ctx.contains("rust"));
    }

    #[tokio::test]
    async fn context_never_exceeds_char_budget_plus_closing_line() {
        let (_dir, graph) = seeded_graph().await;
        let reasoner = GraphReasoner::new(&graph);
        let ctx = reasoner.get_context_for_prompt("rust").await;
        assert!(ctx.chars().count() <= MAX_CONTEXT_CHARS + 200);
    }
}
