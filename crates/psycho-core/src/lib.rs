//! psycho-core: the self-evolving personal-assistant runtime.
//!
//! Four-tier memory (short-term buffer, long-term relational store, semantic
//! vector index, episodic event log), a confidence-weighted knowledge graph,
//! an extraction/integration pipeline that turns conversation into graph
//! state, a regex signal detector, a mistake tracker, a post-session
//! reflection engine, and a proactive reminder/calendar scheduler — wired
//! together by [`interaction_loop::InteractionLoop`].

pub mod config;
pub mod domain;
pub mod error;
pub mod evolver;
pub mod extractor;
pub mod graph;
pub mod insight_generator;
pub mod interaction_loop;
pub mod llm;
pub mod memory;
pub mod mistake_tracker;
pub mod model;
pub mod personality;
pub mod reflection;
pub mod scheduler;
pub mod signal;
pub mod store;
pub mod web_search;

pub use config::{Config, UserConfig};
pub use domain::{DomainArtifacts, DomainContext, DomainHandler, DomainRegistry};
pub use error::BoxError;
pub use evolver::{GraphEvolver, IntegrationStats, MaintenanceResult};
pub use extractor::{Correction, ExtractionResult, KnowledgeExtractor};
pub use graph::reasoner::GraphReasoner;
pub use graph::{GraphStats, KnowledgeGraph};
pub use insight_generator::InsightGenerator;
pub use interaction_loop::{AssembledTurn, InteractionLoop, TurnResult};
pub use llm::local::LocalEmbeddingProvider;
pub use llm::openrouter::OpenRouterProvider;
pub use llm::{ChatMessage, CompletionResult, ContentStream, LlmProvider};
pub use memory::{MemoryManager, ShortTermBuffer};
pub use mistake_tracker::MistakeTracker;
pub use model::{
    CalendarEvent, EdgeType, EpisodicEvent, HealthMetric, Interaction, KnowledgeEdge, KnowledgeNode, Mistake,
    NodeType, Priority, Recurrence, Reminder, RetrievedInteraction, Session, Task,
};
pub use personality::{PersonalityPatch, PersonalityStore, PersonalityTraits};
pub use reflection::{ReflectionEngine, ReflectionJudgment, ReflectionReport};
pub use scheduler::{Notification, NotificationKind, ProactiveScheduler};
pub use signal::{Signal, SignalDetector, SignalType};
pub use store::{LocalVectorStore, RelationalCounts, RelationalStore, VectorHit, VectorStore, VectorStoreStats};
pub use web_search::{SearchResult, WebSearchClient};
