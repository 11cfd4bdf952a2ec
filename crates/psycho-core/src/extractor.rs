//! LLM-powered knowledge extraction: mines entities, relationships, preferences,
//! identity, corrections, facts and open questions from a conversation turn.

use crate::llm::{ChatMessage, LlmProvider};
use crate::model::{now_ts, clamp_confidence, EdgeType, KnowledgeEdge, KnowledgeNode, NodeType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const EXTRACTION_MAX_TOKENS: u32 = 700;
const TRIVIAL_USER_MESSAGE_LEN: usize = 20;
const TRIVIAL_AGENT_RESPONSE_LEN: usize = 50;
const MAX_ENTITIES: usize = 8;
const MAX_PROPERTY_VALUE_LEN: usize = 30;

static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^```(?:json)?\s*").unwrap());
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)\s*```\s*$").unwrap());

#[derive(Debug, Clone)]
pub struct Correction {
    pub wrong: String,
    pub correct: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub entities: Vec<KnowledgeNode>,
    pub edges: Vec<KnowledgeEdge>,
    pub preferences: Vec<KnowledgeNode>,
    pub corrections: Vec<Correction>,
    pub questions: Vec<KnowledgeNode>,
    pub facts: Vec<KnowledgeNode>,
    pub source: String,
}

impl ExtractionResult {
    fn with_source(source: impl Into<String>) -> Self {
        Self { source: source.into(), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.edges.is_empty()
            && self.preferences.is_empty()
            && self.corrections.is_empty()
            && self.questions.is_empty()
            && self.facts.is_empty()
    }
}

fn node_type_from_alias(s: &str) -> NodeType {
    match s.to_ascii_lowercase().as_str() {
        "concept" => NodeType::Concept,
        "entity" => NodeType::Entity,
        "person" => NodeType::Person,
        "technology" | "tool" | "framework" | "language" | "library" => NodeType::Technology,
        "fact" => NodeType::Fact,
        "preference" => NodeType::Preference,
        "skill" => NodeType::Skill,
        "question" => NodeType::Question,
        "event" => NodeType::Event,
        "topic" => NodeType::Topic,
        _ => NodeType::Concept,
    }
}

fn edge_type_from_alias(s: &str) -> EdgeType {
    match s.to_ascii_lowercase().as_str() {
        "is_a" => EdgeType::IsA,
        "has_property" => EdgeType::HasProperty,
        "part_of" => EdgeType::PartOf,
        "depends_on" => EdgeType::DependsOn,
        "used_in" => EdgeType::UsedIn,
        "contradicts" => EdgeType::Contradicts,
        "supports" => EdgeType::Supports,
        "corrects" => EdgeType::Corrects,
        "preferred_by" => EdgeType::PreferredBy,
        "knows" => EdgeType::Knows,
        "mentions" | "mentioned_in" => EdgeType::MentionedIn,
        "similar_to" => EdgeType::SimilarTo,
        _ => EdgeType::RelatesTo,
    }
}

fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Scans backward from `len(raw)-1` to `max(len(raw)-200, 0)`, trying each of
/// `"}}"`, `"]}}"`, `"]}"`, `"}"` as a closing suffix. First candidate that
/// parses into a JSON object wins.
pub fn try_repair_json(raw: &str) -> Option<serde_json::Value> {
    let bytes_len = raw.len();
    let floor = bytes_len.saturating_sub(200);
    let mut end = bytes_len;
    while end > floor {
        end -= 1;
        if !raw.is_char_boundary(end) {
            continue;
        }
        let candidate = &raw[..end];
        for suffix in ["}}", "]}}", "]}", "}"] {
            let attempt = format!("{candidate}{suffix}");
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&attempt) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
    }
    None
}

pub struct KnowledgeExtractor<P: LlmProvider + ?Sized> {
    llm: std::sync::Arc<P>,
}

impl<P: LlmProvider + ?Sized> KnowledgeExtractor<P> {
    pub fn new(llm: std::sync::Arc<P>) -> Self {
        Self { llm }
    }

    pub async fn extract_from_interaction(
        &self,
        user_message: &str,
        agent_response: &str,
        session_id: &str,
        domain: &str,
    ) -> ExtractionResult {
        if user_message.len() < TRIVIAL_USER_MESSAGE_LEN && agent_response.len() < TRIVIAL_AGENT_RESPONSE_LEN {
            return ExtractionResult::with_source(session_id);
        }

        let prompt = conversation_prompt(
            &truncate_chars(user_message, 1000),
            &truncate_chars(agent_response, 1500),
        );
        self.run_extraction(&prompt, session_id, domain).await
    }

    pub async fn extract_from_text(&self, text: &str, source_name: &str, domain: &str) -> ExtractionResult {
        let prompt = text_prompt(source_name, &truncate_chars(text, 3000));
        self.run_extraction(&prompt, source_name, domain).await
    }

    async fn run_extraction(&self, prompt: &str, source: &str, domain: &str) -> ExtractionResult {
        let system = "You are a precise knowledge extraction engine. \
            Output ONLY valid JSON. Never add explanations or markdown. \
            Keep properties short — max 30 chars per value. \
            Limit entities to 8 max. Output must be complete valid JSON.";

        let completion = match self
            .llm
            .complete(&[ChatMessage::user(prompt)], system, EXTRACTION_MAX_TOKENS, 0.1)
            .await
        {
            Ok(c) => c,
            Err(_) => return ExtractionResult::with_source(source),
        };

        let mut raw_text = completion.content.trim().to_string();
        raw_text = FENCE_OPEN.replace_all(&raw_text, "").to_string();
        raw_text = FENCE_CLOSE.replace_all(&raw_text, "").to_string();

        let parsed = match serde_json::from_str::<serde_json::Value>(&raw_text) {
            Ok(v) => v,
            Err(_) => match try_repair_json(&raw_text) {
                Some(v) => v,
                None => return ExtractionResult::with_source(source),
            },
        };

        parse_extraction(&parsed, source, domain)
    }
}

fn conversation_prompt(user_message: &str, agent_response: &str) -> String {
    format!(
        "Extract structured knowledge from this conversation exchange to build a personal knowledge graph.\n\
         Return ONLY a valid JSON object. No explanation, no markdown, just JSON.\n\n\
         User message: {user_message}\n\
         Assistant response: {agent_response}\n\n\
         Extract entities, relationships, user_preferences, user_identity \
         (key: name|occupation|location|current_project|goal|language|framework|tool), \
         corrections, key_facts, open_questions as a JSON object with those array keys."
    )
}

fn text_prompt(source_name: &str, text: &str) -> String {
    format!(
        "Extract structured knowledge from this text chunk.\n\
         Return ONLY a valid JSON object. No explanation, no markdown, just JSON.\n\n\
         Source: {source_name}\n\
         Text: {text}\n\n\
         Extract entities, relationships, and key_facts as a JSON object with those array keys."
    )
}

fn parse_extraction(raw: &serde_json::Value, source: &str, domain: &str) -> ExtractionResult {
    let mut result = ExtractionResult::with_source(source);
    let mut label_to_node: HashMap<String, KnowledgeNode> = HashMap::new();

    if let Some(entities) = raw.get("entities").and_then(|v| v.as_array()) {
        for e in entities.iter().take(MAX_ENTITIES) {
            let label = e.get("label").and_then(|v| v.as_str()).unwrap_or("").trim().to_lowercase();
            if label.chars().count() < 2 {
                continue;
            }
            let node_type = node_type_from_alias(e.get("type").and_then(|v| v.as_str()).unwrap_or("concept"));
            let node_domain = e.get("domain").and_then(|v| v.as_str()).unwrap_or(domain);
            let mut node = KnowledgeNode::create(node_type, label.clone(), node_domain, 0.5, source);
            if let Some(props) = e.get("properties").and_then(|v| v.as_object()) {
                for (k, v) in props {
                    if let Some(s) = v.as_str() {
                        node.properties.insert(k.clone(), truncate_chars(s, MAX_PROPERTY_VALUE_LEN));
                    }
                }
            }
            label_to_node.insert(label, node.clone());
            result.entities.push(node);
        }
    }

    if let Some(rels) = raw.get("relationships").and_then(|v| v.as_array()) {
        for r in rels {
            let from_label = r.get("from_label").and_then(|v| v.as_str()).unwrap_or("").trim().to_lowercase();
            let to_label = r.get("to_label").and_then(|v| v.as_str()).unwrap_or("").trim().to_lowercase();
            let edge_type = edge_type_from_alias(r.get("type").and_then(|v| v.as_str()).unwrap_or("relates_to"));
            if let (Some(from_node), Some(to_node)) = (label_to_node.get(&from_label), label_to_node.get(&to_label)) {
                result.edges.push(KnowledgeEdge::new(from_node.id.clone(), to_node.id.clone(), edge_type, 0.6));
            }
        }
    }

    if let Some(prefs) = raw.get("user_preferences").and_then(|v| v.as_array()) {
        for p in prefs {
            let label = p.get("label").and_then(|v| v.as_str()).unwrap_or("").trim().to_lowercase();
            if label.is_empty() {
                continue;
            }
            let node_domain = p.get("domain").and_then(|v| v.as_str()).unwrap_or(domain);
            result.preferences.push(KnowledgeNode::create(NodeType::Preference, label, node_domain, 0.75, source));
        }
    }

    if let Some(identity) = raw.get("user_identity").and_then(|v| v.as_array()) {
        for item in identity {
            let key = item.get("key").and_then(|v| v.as_str()).unwrap_or("").trim().to_lowercase();
            let value = item.get("value").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            match key.as_str() {
                "name" => {
                    let display_name = title_case(&value);
                    let mut node = KnowledgeNode::create(NodeType::Person, "user", "general", 0.95, source);
                    node.properties.insert("name".into(), display_name.clone());
                    node.properties.insert("role".into(), "user".into());
                    node.display_label = display_name;
                    result.entities.push(node);
                }
                "current_project" | "goal" | "occupation" | "location" => {
                    let pref_label = format!("{key}: {}", value.to_lowercase());
                    let mut node = KnowledgeNode::create(NodeType::Preference, pref_label, domain, 0.8, source);
                    node.properties.insert(key.clone(), value.clone());
                    node.display_label = format!("{}: {value}", title_case(&key.replace('_', " ")));
                    result.preferences.push(node);
                }
                "language" | "framework" | "tool" => {
                    result.entities.push(KnowledgeNode::create(NodeType::Technology, value.to_lowercase(), "coding", 0.75, source));
                }
                _ => {
                    let pref_label = format!("{key}: {}", value.to_lowercase());
                    result.preferences.push(KnowledgeNode::create(NodeType::Preference, pref_label, domain, 0.7, source));
                }
            }
        }
    }

    if let Some(corrections) = raw.get("corrections").and_then(|v| v.as_array()) {
        for c in corrections {
            let wrong = c.get("wrong_label").and_then(|v| v.as_str()).unwrap_or("").trim().to_lowercase();
            let correct = c.get("correct_label").and_then(|v| v.as_str()).unwrap_or("").trim().to_lowercase();
            if !wrong.is_empty() && !correct.is_empty() {
                let explanation = c.get("explanation").and_then(|v| v.as_str()).unwrap_or("").to_string();
                result.corrections.push(Correction { wrong, correct, explanation });
            }
        }
    }

    if let Some(facts) = raw.get("key_facts").and_then(|v| v.as_array()) {
        for f in facts {
            let Some(text) = f.as_str() else { continue };
            if text.len() < 10 {
                continue;
            }
            let mut node = KnowledgeNode::create(NodeType::Fact, truncate_chars(&text.to_lowercase(), 200), domain, 0.6, source);
            node.display_label = truncate_chars(text, 200);
            result.facts.push(node);
        }
    }

    if let Some(questions) = raw.get("open_questions").and_then(|v| v.as_array()) {
        for q in questions {
            let Some(text) = q.as_str() else { continue };
            if text.is_empty() {
                continue;
            }
            let mut node = KnowledgeNode::create(NodeType::Question, truncate_chars(&text.to_lowercase(), 200), domain, 0.5, source);
            node.display_label = truncate_chars(text, 200);
            result.questions.push(node);
        }
    }

    result
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Confidence to apply to the "wrong" side of a resolved correction (step 6 of
/// evolver integration); exposed here since the extractor owns the constant.
pub fn correction_penalty() -> f32 {
    clamp_confidence(-0.4)
}

pub fn stamp_touch_timestamp() -> i64 {
    now_ts()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_truncated_json_object() {
        let truncated = r#"{"entities": [{"label": "rust", "type": "technology""#;
        let repaired = try_repair_json(truncated);
        assert!(repaired.is_some());
    }

    #[test]
    fn repair_returns_none_for_unrecoverable_garbage() {
        let garbage = "not json at all, just words words words";
        assert!(try_repair_json(garbage).is_none());
    }

    #[test]
    fn parses_entities_and_edges() {
        let raw = serde_json::json!({
            "entities": [
                {"label": "rust", "type": "technology", "domain": "coding"},
                {"label": "ownership", "type": "concept", "domain": "coding"}
            ],
            "relationships": [
                {"from_label": "rust", "to_label": "ownership", "type": "has_property"}
            ]
        });
        let result = parse_extraction(&raw, "s1", "coding");
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.edges.len(), 1);
    }

    #[test]
    fn name_identity_produces_person_node_labeled_user() {
        let raw = serde_json::json!({
            "user_identity": [{"key": "name", "value": "ada lovelace"}]
        });
        let result = parse_extraction(&raw, "s1", "general");
        let person = result.entities.iter().find(|n| n.label == "user").unwrap();
        assert_eq!(person.node_type, NodeType::Person);
        assert_eq!(person.display_label, "Ada Lovelace");
        assert!((person.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn short_labels_are_skipped() {
        let raw = serde_json::json!({"entities": [{"label": "a", "type": "concept"}]});
        let result = parse_extraction(&raw, "s1", "general");
        assert!(result.entities.is_empty());
    }

    #[test]
    fn edges_dropped_when_endpoint_unresolved() {
        let raw = serde_json::json!({
            "entities": [{"label": "rust", "type": "technology"}],
            "relationships": [{"from_label": "rust", "to_label": "missing", "type": "relates_to"}]
        });
        let result = parse_extraction(&raw, "s1", "general");
        assert!(result.edges.is_empty());
    }
}
