//! Data model shared by every store and component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MIN_CONFIDENCE: f32 = 0.05;
pub const MAX_CONFIDENCE: f32 = 0.95;

pub fn clamp_confidence(value: f32) -> f32 {
    value.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub message_count: u32,
    pub domain: String,
    pub summary: Option<String>,
}

impl Session {
    pub fn new(id: String, domain: impl Into<String>) -> Self {
        Self {
            id,
            started_at: now_ts(),
            ended_at: None,
            message_count: 0,
            domain: domain.into(),
            summary: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub session_id: String,
    pub user_message: String,
    pub agent_response: String,
    pub domain: String,
    pub timestamp: i64,
    pub tokens_used: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Concept,
    Entity,
    Person,
    Fact,
    Preference,
    Skill,
    Mistake,
    Question,
    Domain,
    Topic,
    File,
    Event,
    Technology,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Concept => "concept",
            NodeType::Entity => "entity",
            NodeType::Person => "person",
            NodeType::Fact => "fact",
            NodeType::Preference => "preference",
            NodeType::Skill => "skill",
            NodeType::Mistake => "mistake",
            NodeType::Question => "question",
            NodeType::Domain => "domain",
            NodeType::Topic => "topic",
            NodeType::File => "file",
            NodeType::Event => "event",
            NodeType::Technology => "technology",
        }
    }

    pub fn from_str_loose(s: &str) -> NodeType {
        match s.to_ascii_lowercase().as_str() {
            "concept" => NodeType::Concept,
            "entity" => NodeType::Entity,
            "person" => NodeType::Person,
            "fact" => NodeType::Fact,
            "preference" => NodeType::Preference,
            "skill" => NodeType::Skill,
            "mistake" => NodeType::Mistake,
            "question" => NodeType::Question,
            "domain" => NodeType::Domain,
            "topic" => NodeType::Topic,
            "file" => NodeType::File,
            "event" => NodeType::Event,
            "technology" | "tool" | "framework" | "language" | "library" => NodeType::Technology,
            _ => NodeType::Concept,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    IsA,
    PartOf,
    RelatesTo,
    HasProperty,
    DependsOn,
    UsedIn,
    Contradicts,
    Supports,
    Corrects,
    PreferredBy,
    Knows,
    Dislikes,
    ExtractedFrom,
    InferredFrom,
    MentionedIn,
    SimilarTo,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::IsA => "is_a",
            EdgeType::PartOf => "part_of",
            EdgeType::RelatesTo => "relates_to",
            EdgeType::HasProperty => "has_property",
            EdgeType::DependsOn => "depends_on",
            EdgeType::UsedIn => "used_in",
            EdgeType::Contradicts => "contradicts",
            EdgeType::Supports => "supports",
            EdgeType::Corrects => "corrects",
            EdgeType::PreferredBy => "preferred_by",
            EdgeType::Knows => "knows",
            EdgeType::Dislikes => "dislikes",
            EdgeType::ExtractedFrom => "extracted_from",
            EdgeType::InferredFrom => "inferred_from",
            EdgeType::MentionedIn => "mentioned_in",
            EdgeType::SimilarTo => "similar_to",
        }
    }

    pub fn from_str_loose(s: &str) -> EdgeType {
        match s.to_ascii_lowercase().as_str() {
            "is_a" => EdgeType::IsA,
            "part_of" => EdgeType::PartOf,
            "has_property" => EdgeType::HasProperty,
            "depends_on" => EdgeType::DependsOn,
            "used_in" => EdgeType::UsedIn,
            "contradicts" => EdgeType::Contradicts,
            "supports" => EdgeType::Supports,
            "corrects" => EdgeType::Corrects,
            "preferred_by" => EdgeType::PreferredBy,
            "knows" => EdgeType::Knows,
            "dislikes" => EdgeType::Dislikes,
            "extracted_from" => EdgeType::ExtractedFrom,
            "inferred_from" => EdgeType::InferredFrom,
            "mentioned_in" | "mentions" => EdgeType::MentionedIn,
            "similar_to" => EdgeType::SimilarTo,
            _ => EdgeType::RelatesTo,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    pub display_label: String,
    pub properties: HashMap<String, String>,
    pub confidence: f32,
    pub created_at: i64,
    pub last_accessed: i64,
    pub last_updated: i64,
    pub access_count: u32,
    pub domain: String,
    pub sources: Vec<String>,
    pub embedding_id: Option<String>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
}

impl KnowledgeNode {
    pub fn create(
        node_type: NodeType,
        label: impl Into<String>,
        domain: impl Into<String>,
        confidence: f32,
        source: impl Into<String>,
    ) -> Self {
        let label = label.into();
        let now = now_ts();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            node_type,
            display_label: label.clone(),
            label,
            properties: HashMap::new(),
            confidence: clamp_confidence(confidence),
            created_at: now,
            last_accessed: now,
            last_updated: now,
            access_count: 0,
            domain: domain.into(),
            sources: vec![source.into()],
            embedding_id: None,
            deprecated: false,
            deprecation_reason: None,
        }
    }

    /// `conf <- clamp(conf + delta, MIN, MAX)`, refreshes `last_updated`.
    pub fn update_confidence(&mut self, delta: f32) {
        self.confidence = clamp_confidence(self.confidence + delta);
        self.last_updated = now_ts();
    }

    pub fn touch_access(&mut self) {
        self.last_accessed = now_ts();
        self.access_count += 1;
    }

    pub fn deprecate(&mut self, reason: impl Into<String>) {
        self.deprecated = true;
        self.deprecation_reason = Some(reason.into());
        self.update_confidence(-0.4);
    }

    pub fn confidence_label(&self) -> &'static str {
        confidence_label(self.confidence)
    }
}

pub fn confidence_label(confidence: f32) -> &'static str {
    if confidence >= 0.7 {
        "HIGH"
    } else if confidence >= 0.4 {
        "MEDIUM"
    } else {
        "LOW"
    }
}

pub fn confidence_bar(confidence: f32, width: usize) -> String {
    let filled = ((confidence.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    let mut bar = String::with_capacity(width);
    for i in 0..width {
        bar.push(if i < filled { '█' } else { '░' });
    }
    bar
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEdge {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub confidence: f32,
    pub weight: f32,
    pub properties: HashMap<String, String>,
    pub created_at: i64,
    pub last_reinforced: i64,
}

impl KnowledgeEdge {
    pub fn new(source_id: String, target_id: String, edge_type: EdgeType, confidence: f32) -> Self {
        let now = now_ts();
        Self {
            source_id,
            target_id,
            edge_type,
            confidence: clamp_confidence(confidence),
            weight: 1.0,
            properties: HashMap::new(),
            created_at: now,
            last_reinforced: now,
        }
    }

    pub fn reinforce(&mut self) {
        self.weight += 0.1;
        self.confidence = clamp_confidence(self.confidence + 0.03);
        self.last_reinforced = now_ts();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    None,
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mistake {
    pub id: String,
    pub session_id: String,
    pub user_input: String,
    pub agent_response: String,
    pub correction: String,
    pub domain: String,
    pub error_pattern: Option<String>,
    pub timestamp: i64,
    pub similar_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub due_timestamp: i64,
    pub recurrence: Recurrence,
    pub priority: Priority,
    pub completed: bool,
    pub snoozed_until: i64,
    pub created_at: i64,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub recurrence: Recurrence,
    pub all_day: bool,
    pub reminder_minutes: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicEvent {
    pub id: String,
    pub session_id: String,
    pub event_type: String,
    pub timestamp: i64,
    pub domain: String,
    pub content: serde_json::Value,
    pub importance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub done: bool,
    pub due_timestamp: Option<i64>,
    pub created_at: i64,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetric {
    pub id: String,
    pub metric: String,
    pub value: f64,
    pub unit: Option<String>,
    pub recorded_at: i64,
    pub session_id: Option<String>,
}

/// A single retrieval hit, shared between semantic memory and graph reasoning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedInteraction {
    pub user_message: String,
    pub agent_response: String,
    pub domain: String,
    pub timestamp: i64,
    pub relevance: f32,
    pub session_id: String,
}

pub fn iso_now() -> String {
    Utc::now().to_rfc3339()
}

pub fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
