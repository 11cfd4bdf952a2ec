//! Post-session reflection: summarizes the session, adjusts graph confidence
//! from the LLM's judgment, derives a handful of insight nodes, then hands off
//! to the evolver's maintenance pass.

use crate::evolver::GraphEvolver;
use crate::graph::reasoner::GraphReasoner;
use crate::graph::KnowledgeGraph;
use crate::insight_generator::InsightGenerator;
use crate::llm::{ChatMessage, LlmProvider};
use crate::mistake_tracker::MistakeTracker;
use crate::model::{now_ts, KnowledgeNode, NodeType};
use crate::store::relational::RelationalStore;
use std::sync::Arc;

const REFLECTION_INTERACTION_LIMIT: u32 = 25;
const MIN_LEARNING_LEN: usize = 10;

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, Default)]
pub struct ReflectionJudgment {
    #[serde(default)]
    pub session_summary: String,
    #[serde(default)]
    pub quality_score: f32,
    #[serde(default)]
    pub key_learnings: Vec<KeyLearning>,
    #[serde(default)]
    pub corrections_detected: Vec<DetectedCorrection>,
    #[serde(default)]
    pub patterns_observed: Vec<String>,
    #[serde(default)]
    pub knowledge_gaps: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub nodes_to_boost: Vec<String>,
    #[serde(default)]
    pub nodes_to_drop: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct KeyLearning {
    pub text: String,
    #[serde(default = "default_learning_confidence")]
    pub confidence: f32,
}

fn default_learning_confidence() -> f32 {
    0.6
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct DetectedCorrection {
    pub wrong: String,
    pub correct: String,
    #[serde(default)]
    pub explanation: String,
}

pub struct ReflectionReport {
    pub judgment: ReflectionJudgment,
    pub insight_nodes_added: usize,
    pub journal_path: Option<std::path::PathBuf>,
}

pub struct ReflectionEngine<P: LlmProvider + ?Sized> {
    llm: Arc<P>,
    graph: Arc<KnowledgeGraph>,
    relational: Arc<RelationalStore>,
    evolver: Arc<GraphEvolver>,
    mistakes: Arc<MistakeTracker>,
    journals_dir: std::path::PathBuf,
}

impl<P: LlmProvider + ?Sized> ReflectionEngine<P> {
    pub fn new(
        llm: Arc<P>,
        graph: Arc<KnowledgeGraph>,
        relational: Arc<RelationalStore>,
        evolver: Arc<GraphEvolver>,
        mistakes: Arc<MistakeTracker>,
        journals_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self { llm, graph, relational, evolver, mistakes, journals_dir: journals_dir.into() }
    }

    pub async fn reflect(&self, session_id: &str) -> ReflectionReport {
        let interactions = self.relational.last_interactions(session_id, REFLECTION_INTERACTION_LIMIT).unwrap_or_default();

        let first_three: String = interactions
            .iter()
            .take(3)
            .map(|i| i.user_message.clone())
            .collect::<Vec<_>>()
            .join(" ");
        let reasoner = GraphReasoner::new(&self.graph);
        let graph_context = reasoner.get_context_for_prompt(&first_three).await;

        let judgment = self.judge_session(&interactions, &graph_context).await;

        for label in &judgment.nodes_to_boost {
            if let Some(node) = self.graph.find_node_by_label(label, None).await {
                self.evolver.confirm_nodes(&[node.id]).await;
            }
        }
        for label in &judgment.nodes_to_drop {
            if let Some(node) = self.graph.find_node_by_label(label, None).await {
                self.evolver.correct_node(&node.id, "reflection flagged as unreliable").await;
            }
        }

        for learning in &judgment.key_learnings {
            if learning.text.len() >= MIN_LEARNING_LEN {
                let node = KnowledgeNode::create(NodeType::Fact, learning.text.to_lowercase(), "general", learning.confidence, session_id);
                self.graph.upsert_node(node).await;
            }
        }

        for correction in &judgment.corrections_detected {
            let wrong_node = self.graph.find_node_by_label(&correction.wrong, None).await;
            let correct_node = self.graph.find_node_by_label(&correction.correct, None).await;
            if let (Some(wrong), Some(correct)) = (&wrong_node, &correct_node) {
                let edge = crate::model::KnowledgeEdge::new(correct.id.clone(), wrong.id.clone(), crate::model::EdgeType::Corrects, 0.85);
                let _ = self.graph.upsert_edge(edge).await;
            }
            let _ = self
                .mistakes
                .record_mistake(session_id, &correction.wrong, "", &correction.correct, "general", None)
                .await;
        }

        let insight_generator = InsightGenerator::new(self.llm.clone(), self.graph.clone());
        let insight_nodes_added = insight_generator.generate(session_id, &judgment.session_summary).await;

        self.evolver.run_full_maintenance().await;

        let journal_path = self.write_journal(session_id, &judgment).await.ok();

        ReflectionReport { judgment, insight_nodes_added, journal_path }
    }

    async fn judge_session(&self, interactions: &[crate::model::Interaction], graph_context: &str) -> ReflectionJudgment {
        let transcript = interactions
            .iter()
            .map(|i| format!("User: {}\nAssistant: {}", i.user_message, i.agent_response))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Review this session and respond with JSON: {{\"session_summary\": str, \"quality_score\": 0-1, \
             \"key_learnings\": [{{\"text\": str, \"confidence\": 0-1}}], \
             \"corrections_detected\": [{{\"wrong\": str, \"correct\": str, \"explanation\": str}}], \
             \"patterns_observed\": [str], \"knowledge_gaps\": [str], \"insights\": [str], \
             \"nodes_to_boost\": [str], \"nodes_to_drop\": [str]}}\n\n\
             Graph context:\n{graph_context}\n\nTranscript:\n{transcript}"
        );

        let system = "You are a precise session-quality reviewer. Output ONLY valid JSON matching the requested schema.";
        match self.llm.complete(&[ChatMessage::user(prompt)], system, 900, 0.2).await {
            Ok(completion) => serde_json::from_str(completion.content.trim()).unwrap_or_default(),
            Err(_) => ReflectionJudgment::default(),
        }
    }

    async fn write_journal(&self, session_id: &str, judgment: &ReflectionJudgment) -> Result<std::path::PathBuf, crate::error::BoxError> {
        let date = crate::model::from_ts(now_ts()).format("%Y-%m-%d").to_string();
        tokio::fs::create_dir_all(&self.journals_dir).await?;
        let stem = format!("{date}_{session_id}");
        let json_path = self.journals_dir.join(format!("{stem}.json"));
        let md_path = self.journals_dir.join(format!("{stem}.md"));

        let json_body = serde_json::to_string_pretty(judgment)?;
        tokio::fs::write(&json_path, json_body).await?;

        let mut md = format!("# Session journal: {session_id}\n\n{}\n\n", judgment.session_summary);
        md.push_str("## Key learnings\n");
        for l in &judgment.key_learnings {
            md.push_str(&format!("- {}\n", l.text));
        }
        md.push_str("\n## Corrections\n");
        for c in &judgment.corrections_detected {
            md.push_str(&format!("- {} -> {}\n", c.wrong, c.correct));
        }
        md.push_str("\n## Insights\n");
        for i in &judgment.insights {
            md.push_str(&format!("- {i}\n"));
        }
        tokio::fs::write(&md_path, md).await?;

        Ok(json_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judgment_defaults_are_empty() {
        let judgment = ReflectionJudgment::default();
        assert!(judgment.key_learnings.is_empty());
        assert_eq!(judgment.quality_score, 0.0);
    }

    #[test]
    fn key_learning_confidence_defaults_when_absent() {
        let raw = r#"{"text": "rust enforces memory safety at compile time"}"#;
        let learning: KeyLearning = serde_json::from_str(raw).unwrap();
        assert_eq!(learning.confidence, 0.6);
    }
}
