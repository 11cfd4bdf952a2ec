//! The single turn-processing pipeline: classify, retrieve, assemble, call the
//! LLM, persist, and kick off background knowledge work. Three entry points
//! (`process`, `stream_process`, `stream_process_with_image`) share everything
//! up to the LLM call and diverge only in how the response is produced.

use crate::domain::{classify_domain_by_keyword, DomainRegistry};
use crate::evolver::GraphEvolver;
use crate::graph::reasoner::GraphReasoner;
use crate::graph::KnowledgeGraph;
use crate::llm::{ChatMessage, ContentStream, LlmProvider};
use crate::memory::MemoryManager;
use crate::mistake_tracker::MistakeTracker;
use crate::model::{now_ts, Interaction, KnowledgeNode, NodeType};
use crate::signal::{SignalDetector, SignalType};
use crate::web_search::{self, WebSearchClient};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, candid personal assistant with persistent memory \
    of this user across sessions. Use the provided knowledge graph and past-interaction context when \
    relevant, and say when you're uncertain rather than guessing.";
const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.7;
const NAME_ASSIGNMENT_PREFIXES: &[&str] = &["my name is ", "call me ", "i'm ", "i am "];
const AGENT_RENAME_PREFIXES: &[&str] =
    &["your name is ", "call you ", "i'll call you ", "i will call you ", "you are now ", "you're now "];
const AGENT_RENAME_CONFIDENCE: f32 = 0.95;
const AGENT_NAME_LABEL_PREFIX: &str = "agent_name:";

pub struct TurnResult {
    pub response: String,
    pub domain: String,
    pub interaction_id: String,
    pub signal: SignalType,
}

pub struct InteractionLoop<P: LlmProvider + ?Sized> {
    llm: Arc<P>,
    memory: Mutex<MemoryManager>,
    graph: Arc<KnowledgeGraph>,
    evolver: Arc<GraphEvolver>,
    mistakes: Arc<MistakeTracker>,
    domains: DomainRegistry,
    max_context_memories: usize,
    extraction_enabled: bool,
    web_search_enabled: bool,
    web_search_client: WebSearchClient,
}

impl<P: LlmProvider + ?Sized + 'static> InteractionLoop<P> {
    pub fn new(
        llm: Arc<P>,
        memory: MemoryManager,
        graph: Arc<KnowledgeGraph>,
        evolver: Arc<GraphEvolver>,
        mistakes: Arc<MistakeTracker>,
        domains: DomainRegistry,
        max_context_memories: usize,
        extraction_enabled: bool,
        web_search_enabled: bool,
    ) -> Self {
        Self {
            llm,
            memory: Mutex::new(memory),
            graph,
            evolver,
            mistakes,
            domains,
            max_context_memories,
            extraction_enabled,
            web_search_enabled,
            web_search_client: WebSearchClient::new(),
        }
    }

    pub async fn process(&self, session_id: &str, user_message: &str) -> Result<TurnResult, crate::error::BoxError> {
        let assembled = self.assemble_turn(session_id, user_message).await?;
        let completion = self
            .llm
            .complete(&assembled.messages, &assembled.system, MAX_TOKENS, TEMPERATURE)
            .await?;
        let response = completion.content;
        self.finish_turn(session_id, user_message, &response, &assembled).await
    }

    pub async fn stream_process(
        &self,
        session_id: &str,
        user_message: &str,
    ) -> Result<(ContentStream, AssembledTurn), crate::error::BoxError> {
        let assembled = self.assemble_turn(session_id, user_message).await?;
        let stream = self
            .llm
            .stream(&assembled.messages, &assembled.system, MAX_TOKENS, TEMPERATURE)
            .await?;
        Ok((stream, assembled))
    }

    /// Vision turn: the image is described by the provider, and the description
    /// is folded into the ordinary text pipeline below it.
    pub async fn stream_process_with_image(
        &self,
        session_id: &str,
        user_message: &str,
        image_bytes: &[u8],
        media_type: &str,
    ) -> Result<TurnResult, crate::error::BoxError> {
        let assembled = self.assemble_turn(session_id, user_message).await?;
        let description = self
            .llm
            .complete_with_image(image_bytes, media_type, user_message, &assembled.system, MAX_TOKENS)
            .await?;
        self.finish_turn(session_id, user_message, &description, &assembled).await
    }

    /// Steps 1-9: name detection, domain classification, signal handling,
    /// parallel retrieval, graph context, domain context, prompt assembly.
    async fn assemble_turn(&self, session_id: &str, user_message: &str) -> Result<AssembledTurn, crate::error::BoxError> {
        // 1a. the user introducing themselves — folded straight into the corrections
        // path via the signal detector below rather than a separate regex pass, since
        // the original system treats both as "update identity confidently".
        let declared_name = detect_name_assignment(user_message);

        // 1b. the user renaming the agent — written to the graph immediately, before
        // the LLM call, so the rename is honored from this very turn's system prompt.
        if let Some(new_name) = detect_agent_rename(user_message) {
            let mut node = KnowledgeNode::create(
                NodeType::Preference,
                format!("{AGENT_NAME_LABEL_PREFIX}{}", new_name.to_lowercase()),
                "identity",
                AGENT_RENAME_CONFIDENCE,
                "user_directive",
            );
            node.display_label = format!("agent name: {new_name}");
            self.graph.upsert_node(node).await;
        }
        let agent_name = self.current_agent_name().await;

        // 2. domain classification — keyword first
        let domain = classify_domain_by_keyword(user_message).unwrap_or("general").to_string();

        // 3. signal detection + confidence adjustment
        let signal = SignalDetector::detect(user_message);
        self.apply_signal(&signal, user_message).await;

        // 4. parallel retrieval: semantic memories + mistake warnings
        let (memories, warnings) = {
            let memory = self.memory.lock().await;
            let memories_fut = memory.retrieve_context(user_message, Some(&domain));
            let warnings_fut = self.mistakes.get_warnings_for_prompt(user_message, None);
            tokio::join!(memories_fut, warnings_fut)
        };
        let memories = memories.unwrap_or_default();
        let warnings = warnings.unwrap_or_default();

        // 5. graph context
        let reasoner = GraphReasoner::new(&self.graph);
        let graph_context = reasoner.get_context_for_prompt(user_message).await;

        // 6. domain-specific context block
        let domain_context = match self.domains.get(&domain) {
            Some(handler) => handler.context_for_prompt(user_message).await.text,
            None => String::new(),
        };

        // 6b. live web search, when enabled and the message looks like it needs
        // current information
        let web_context = if self.web_search_enabled && web_search::should_search(user_message) {
            let query = web_search::extract_query(user_message);
            let results = self.web_search_client.search(&query).await;
            web_search::format_search_results(&results, &query)
        } else {
            String::new()
        };

        // short-term history
        let short_term_messages = {
            let mut memory = self.memory.lock().await;
            memory.short_term().get_messages()
        };

        let system = build_system_prompt(
            &domain_context,
            &graph_context,
            &warnings,
            &web_context,
            declared_name.as_deref(),
            agent_name.as_deref(),
        );

        let mut messages: Vec<ChatMessage> = short_term_messages
            .into_iter()
            .map(|(role, content)| if role == "user" { ChatMessage::user(content) } else { ChatMessage::assistant(content) })
            .collect();
        if !memories.is_empty() {
            let recalled = memories
                .iter()
                .take(self.max_context_memories)
                .map(|m| format!("[{}] User: {}\nAssistant: {}", m.domain, m.user_message, m.agent_response))
                .collect::<Vec<_>>()
                .join("\n\n");
            messages.push(ChatMessage::user(format!("Relevant past interactions:\n{recalled}")));
        }
        messages.push(ChatMessage::user(user_message.to_string()));

        Ok(AssembledTurn { system, messages, domain, signal, user_message: user_message.to_string() })
    }

    /// Most-recently-updated `agent_name:*` preference node, if the user has
    /// ever renamed the agent.
    async fn current_agent_name(&self) -> Option<String> {
        self.graph
            .all_active_nodes()
            .await
            .into_iter()
            .filter(|n| n.label.starts_with(AGENT_NAME_LABEL_PREFIX))
            .max_by_key(|n| n.last_updated)
            .map(|n| n.label.trim_start_matches(AGENT_NAME_LABEL_PREFIX).to_string())
    }

    async fn apply_signal(&self, signal: &crate::signal::Signal, user_message: &str) {
        use crate::graph::{CONFIDENCE_USER_CONFIRM, CONFIDENCE_USER_CORRECT};
        match signal.signal_type {
            SignalType::StrongCorrection | SignalType::ModerateCorrection => {
                let target = SignalDetector::extract_correction_target(user_message, "");
                if !target.is_empty() {
                    if let Some(node) = self.graph.find_node_by_label(&target.to_lowercase(), None).await {
                        self.graph.update_node_confidence(&node.id, CONFIDENCE_USER_CORRECT).await;
                    }
                }
            }
            SignalType::Confirmation => {
                let top = self.graph.get_top_nodes(1).await;
                if let Some(node) = top.first() {
                    self.graph.update_node_confidence(&node.id, CONFIDENCE_USER_CONFIRM).await;
                }
            }
            _ => {}
        }
    }

    /// Steps 10-13: domain post-process, memory write, background extraction.
    async fn finish_turn(
        &self,
        session_id: &str,
        user_message: &str,
        response: &str,
        assembled: &AssembledTurn,
    ) -> Result<TurnResult, crate::error::BoxError> {
        if let Some(handler) = self.domains.get(&assembled.domain) {
            handler.post_process(user_message, response).await;
        }

        let interaction = Interaction {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            user_message: user_message.to_string(),
            agent_response: response.to_string(),
            domain: assembled.domain.clone(),
            timestamp: now_ts(),
            tokens_used: (user_message.len() + response.len()) as u32 / 4,
        };

        {
            let mut memory = self.memory.lock().await;
            memory.short_term().push(user_message.to_string(), response.to_string());
            memory.remember_interaction(&interaction).await?;
            let _ = memory.relational().increment_session_messages(session_id);
        }

        if self.extraction_enabled {
            self.spawn_extraction(session_id.to_string(), user_message.to_string(), response.to_string(), assembled.domain.clone());
        }

        Ok(TurnResult {
            response: response.to_string(),
            domain: assembled.domain.clone(),
            interaction_id: interaction.id,
            signal: assembled.signal.signal_type,
        })
    }

    /// Extraction and graph integration run off the turn's critical path;
    /// the caller sees the assistant's reply before the knowledge pipeline
    /// finishes writing.
    fn spawn_extraction(&self, session_id: String, user_message: String, agent_response: String, domain: String)
    where
        P: 'static,
    {
        let llm = self.llm.clone();
        let evolver = self.evolver.clone();
        tokio::spawn(async move {
            let extractor = crate::extractor::KnowledgeExtractor::new(llm);
            let result = extractor.extract_from_interaction(&user_message, &agent_response, &session_id, &domain).await;
            if !result.is_empty() {
                evolver.integrate(result).await;
            }
        });
    }
}

pub struct AssembledTurn {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub domain: String,
    pub signal: crate::signal::Signal,
    pub user_message: String,
}

fn detect_name_assignment(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    for prefix in NAME_ASSIGNMENT_PREFIXES {
        if let Some(rest) = lower.strip_prefix(prefix) {
            let name: String = rest
                .split(|c: char| c == '.' || c == ',' || c == '!' || c == '?')
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            if name.len() >= 2 && name.len() <= 40 {
                return Some(name);
            }
        }
    }
    None
}

/// Detects the user renaming the agent ("your name is X", "call you X"),
/// distinct from [`detect_name_assignment`] which picks up the user naming
/// themselves.
fn detect_agent_rename(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    for prefix in AGENT_RENAME_PREFIXES {
        if let Some(rest) = lower.strip_prefix(prefix) {
            let name: String = rest
                .split(|c: char| c == '.' || c == ',' || c == '!' || c == '?')
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            if name.len() >= 2 && name.len() <= 40 {
                return Some(name);
            }
        }
    }
    None
}

fn build_system_prompt(
    domain_context: &str,
    graph_context: &str,
    warnings: &str,
    web_context: &str,
    declared_name: Option<&str>,
    agent_name: Option<&str>,
) -> String {
    let mut prompt = format!("{DEFAULT_SYSTEM_PROMPT}\n\nCurrent time: {}\n", crate::model::iso_now());
    if let Some(name) = agent_name {
        prompt.push_str(&format!("\nThe user has asked you to go by the name {name}. Use it.\n"));
    }
    if let Some(name) = declared_name {
        prompt.push_str(&format!("\nThe user just told you their name is {name}. Acknowledge it naturally.\n"));
    }
    if !domain_context.is_empty() {
        prompt.push_str("\n");
        prompt.push_str(domain_context);
    }
    if !warnings.is_empty() {
        prompt.push('\n');
        prompt.push_str(warnings);
    }
    if !graph_context.is_empty() {
        prompt.push('\n');
        prompt.push_str(graph_context);
    }
    if !web_context.is_empty() {
        prompt.push('\n');
        prompt.push_str(web_context);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_name_assignment_variants() {
        assert_eq!(detect_name_assignment("my name is Ada"), Some("ada".to_string()));
        assert_eq!(detect_name_assignment("call me Grace!"), Some("grace".to_string()));
        assert_eq!(detect_name_assignment("I am fine today"), Some("fine today".to_string()));
        assert_eq!(detect_name_assignment("hello there"), None);
    }

    #[test]
    fn detects_agent_rename_variants() {
        assert_eq!(detect_agent_rename("your name is Jarvis"), Some("jarvis".to_string()));
        assert_eq!(detect_agent_rename("I'll call you Friday"), Some("friday".to_string()));
        assert_eq!(detect_agent_rename("you're now Hal"), Some("hal".to_string()));
        assert_eq!(detect_agent_rename("my name is Ada"), None);
    }

    #[test]
    fn system_prompt_includes_all_nonempty_sections() {
        let prompt = build_system_prompt(
            "PENDING TASKS: none",
            "KNOWLEDGE GRAPH",
            "PAST MISTAKES",
            "WEB SEARCH",
            Some("Ada"),
            Some("jarvis"),
        );
        assert!(prompt.contains("Ada"));
        assert!(prompt.contains("jarvis"));
        assert!(prompt.contains("PENDING TASKS"));
        assert!(prompt.contains("PAST MISTAKES"));
        assert!(prompt.contains("KNOWLEDGE GRAPH"));
        assert!(prompt.contains("WEB SEARCH"));
    }

    #[test]
    fn system_prompt_omits_empty_sections() {
        let prompt = build_system_prompt("", "", "", "", None, None);
        assert!(!prompt.contains("KNOWLEDGE GRAPH"));
        assert!(!prompt.contains("told you their name"));
        assert!(!prompt.contains("go by the name"));
    }

    struct StubLlm;

    #[async_trait::async_trait]
    impl LlmProvider for StubLlm {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _system: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<crate::llm::CompletionResult, crate::error::LlmError> {
            Ok(crate::llm::CompletionResult {
                content: "Sure thing.".to_string(),
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
        ) -> Result<ContentStream, crate::error::LlmError> {
            unimplemented!("not exercised in this test")
        }
    }

    async fn test_loop() -> (tempfile::TempDir, InteractionLoop<StubLlm>) {
        use crate::domain::DomainRegistry;
        use crate::evolver::GraphEvolver;
        use crate::memory::MemoryManager;
        use crate::mistake_tracker::MistakeTracker;
        use crate::store::vector::LocalVectorStore;
        use crate::store::RelationalStore;

        let dir = tempfile::tempdir().unwrap();
        let relational = Arc::new(RelationalStore::new(dir.path().join("psycho.db")).unwrap());
        relational.insert_session(&crate::model::Session::new("session-1".into(), "general")).unwrap();
        let vector = Arc::new(LocalVectorStore::open(dir.path().join("vectors")).unwrap());
        let graph = Arc::new(KnowledgeGraph::new(vector.clone(), dir.path().join("graph"), 0.92, 0.5, 0.3, 0.2));
        let evolver = Arc::new(GraphEvolver::new(graph.clone()));
        let mistakes = Arc::new(MistakeTracker::new(relational.clone(), vector.clone()));
        let memory = MemoryManager::new(relational.clone(), vector.clone());
        let interaction_loop =
            InteractionLoop::new(Arc::new(StubLlm), memory, graph, evolver, mistakes, DomainRegistry::new(), 5, false, false);
        (dir, interaction_loop)
    }

    #[tokio::test]
    async fn renaming_the_agent_writes_a_preference_node() {
        let (_dir, interaction_loop) = test_loop().await;
        interaction_loop.process("session-1", "your name is Jarvis").await.unwrap();
        let nodes = interaction_loop.graph.all_active_nodes().await;
        let node = nodes.iter().find(|n| n.label == "agent_name:jarvis").expect("agent_name node present");
        assert_eq!(node.node_type, NodeType::Preference);
        assert!(node.confidence >= AGENT_RENAME_CONFIDENCE - f32::EPSILON);
    }

    #[tokio::test]
    async fn agent_name_persists_into_a_later_turn_system_prompt() {
        let (_dir, interaction_loop) = test_loop().await;
        interaction_loop.process("session-1", "your name is Jarvis").await.unwrap();
        let assembled = interaction_loop.assemble_turn("session-1", "what's the weather like").await.unwrap();
        assert!(assembled.system.contains("Jarvis") || assembled.system.contains("jarvis"));
    }
}
