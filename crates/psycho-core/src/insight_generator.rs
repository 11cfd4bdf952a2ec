//! Derives non-obvious insight nodes from a session's knowledge-graph context
//! and summary. Kept as its own unit, not inlined into [`crate::reflection`],
//! mirroring the original's standalone insight-generation module.

use crate::graph::KnowledgeGraph;
use crate::llm::{ChatMessage, LlmProvider};
use crate::model::{KnowledgeNode, NodeType};
use std::sync::Arc;

const INSIGHT_NODE_COUNT_MIN: usize = 2;
const INSIGHT_NODE_COUNT_MAX: usize = 5;
const INSIGHT_MIN_CONFIDENCE: f32 = 0.4;
const TOP_NODES_CONSIDERED: usize = 25;

fn default_insight_confidence() -> f32 {
    INSIGHT_MIN_CONFIDENCE
}

#[derive(serde::Deserialize)]
struct InsightsResponse {
    #[serde(default)]
    insights: Vec<Insight>,
}

#[derive(serde::Deserialize)]
struct Insight {
    text: String,
    #[serde(default = "default_insight_confidence")]
    confidence: f32,
}

pub struct InsightGenerator<P: LlmProvider + ?Sized> {
    llm: Arc<P>,
    graph: Arc<KnowledgeGraph>,
}

impl<P: LlmProvider + ?Sized> InsightGenerator<P> {
    pub fn new(llm: Arc<P>, graph: Arc<KnowledgeGraph>) -> Self {
        Self { llm, graph }
    }

    /// Asks the LLM to connect or extend known facts/concepts, then writes
    /// whichever insights clear the confidence floor as `Concept` nodes.
    /// Returns how many nodes were added.
    pub async fn generate(&self, session_id: &str, session_summary: &str) -> usize {
        let top_nodes = self.graph.get_top_nodes(TOP_NODES_CONSIDERED).await;
        let node_labels: String = top_nodes.iter().map(|n| n.display_label.clone()).collect::<Vec<_>>().join(", ");
        let prompt = format!(
            "Given these known facts/concepts: {node_labels}\n\nAnd this session summary: {session_summary}\n\n\
             Derive {INSIGHT_NODE_COUNT_MIN}-{INSIGHT_NODE_COUNT_MAX} non-obvious insights that connect or extend this knowledge. \
             Respond with JSON: {{\"insights\": [{{\"text\": str, \"confidence\": 0-1}}]}}"
        );
        let system = "You derive grounded insights. Output ONLY valid JSON.";
        let Ok(completion) = self.llm.complete(&[ChatMessage::user(prompt)], system, 400, 0.3).await else {
            return 0;
        };

        let Ok(parsed) = serde_json::from_str::<InsightsResponse>(completion.content.trim()) else {
            return 0;
        };
        let mut added = 0;
        for insight in parsed.insights.into_iter().filter(|i| i.confidence >= INSIGHT_MIN_CONFIDENCE) {
            let node = KnowledgeNode::create(NodeType::Concept, insight.text.to_lowercase(), "general", insight.confidence, session_id);
            self.graph.upsert_node(node).await;
            added += 1;
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionResult;
    use crate::store::vector::LocalVectorStore;
    use async_trait::async_trait;

    struct StubLlm(String);

    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _system: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<CompletionResult, crate::error::LlmError> {
            Ok(CompletionResult {
                content: self.0.clone(),
                model: "stub".to_string(),
                input_tokens: 0,
                output_tokens: 0,
                stop_reason: "stop".to_string(),
            })
        }

        async fn stream(
            &self,
            _messages: &[ChatMessage],
            _system: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<crate::llm::ContentStream, crate::error::LlmError> {
            unimplemented!("not exercised in this test")
        }
    }

    async fn test_graph() -> (tempfile::TempDir, Arc<KnowledgeGraph>) {
        let dir = tempfile::tempdir().unwrap();
        let vs = Arc::new(LocalVectorStore::open(dir.path().join("vectors")).unwrap());
        let graph = Arc::new(KnowledgeGraph::new(vs, dir.path().join("graph"), 0.92, 0.5, 0.3, 0.2));
        (dir, graph)
    }

    #[tokio::test]
    async fn adds_only_insights_above_confidence_floor() {
        let (_dir, graph) = test_graph().await;
        let response = r#"{"insights": [{"text": "rust's ownership model eliminates data races", "confidence": 0.8}, {"text": "low confidence guess", "confidence": 0.1}]}"#;
        let llm = Arc::new(StubLlm(response.to_string()));
        let generator = InsightGenerator::new(llm, graph.clone());
        let added = generator.generate("s1", "talked about rust").await;
        assert_eq!(added, 1);
        assert_eq!(graph.stats().await.active_nodes, 1);
    }

    #[tokio::test]
    async fn malformed_response_adds_nothing() {
        let (_dir, graph) = test_graph().await;
        let llm = Arc::new(StubLlm("not json".to_string()));
        let generator = InsightGenerator::new(llm, graph.clone());
        let added = generator.generate("s1", "summary").await;
        assert_eq!(added, 0);
    }
}
