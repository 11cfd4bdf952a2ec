//! Domain classification and the thin handler contract the loop calls into for
//! domain-specific context and post-processing. Concrete handlers (coding
//! execution sandboxes, health-metric parsing, task/reminder extraction) are
//! collaborators with named interfaces only — implemented in `psycho-skills`.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const DOMAINS: &[&str] = &["coding", "health", "tasks", "finance", "science", "math", "general"];

static DOMAIN_KEYWORDS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("coding", vec!["rust", "python", "code", "function", "bug", "compile", "repository", "git", "api", "cargo"]);
    m.insert("health", vec!["sleep", "workout", "calories", "weight", "steps", "heart rate", "diet", "exercise"]);
    m.insert("tasks", vec!["remind", "todo", "deadline", "schedule", "task", "due"]);
    m.insert("finance", vec!["budget", "expense", "invoice", "stock", "invest", "salary"]);
    m.insert("science", vec!["experiment", "hypothesis", "molecule", "physics", "biology"]);
    m.insert("math", vec!["equation", "derivative", "integral", "theorem", "proof"]);
    m
});

/// Keyword match first; caller falls back to an LLM classifier for ambiguous
/// messages (not modeled here — this is the synchronous fast path).
pub fn classify_domain_by_keyword(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    let mut best: Option<(&'static str, usize)> = None;
    for (domain, keywords) in DOMAIN_KEYWORDS.iter() {
        let hits = keywords.iter().filter(|kw| lower.contains(*kw)).count();
        if hits > 0 && best.map(|(_, best_hits)| hits > best_hits).unwrap_or(true) {
            best = Some((domain, hits));
        }
    }
    best.map(|(domain, _)| domain)
}

#[derive(Debug, Clone, Default)]
pub struct DomainContext {
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct DomainArtifacts {
    pub created_reminders: Vec<String>,
    pub created_tasks: Vec<String>,
    pub logged_metrics: Vec<String>,
}

/// The collaborator contract domain-specific adapters implement. `psycho-skills`
/// provides thin adapters; this crate only depends on the trait.
#[async_trait]
pub trait DomainHandler: Send + Sync {
    fn domain(&self) -> &'static str;

    /// Pre-LLM-call context block (e.g. pending tasks, recent health stats).
    async fn context_for_prompt(&self, query: &str) -> DomainContext;

    /// Post-LLM-call structured artifact extraction from the agent's response.
    async fn post_process(&self, user_message: &str, agent_response: &str) -> DomainArtifacts;
}

pub struct DomainRegistry {
    handlers: HashMap<&'static str, std::sync::Arc<dyn DomainHandler>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn register(&mut self, handler: std::sync::Arc<dyn DomainHandler>) {
        self.handlers.insert(handler.domain(), handler);
    }

    pub fn get(&self, domain: &str) -> Option<std::sync::Arc<dyn DomainHandler>> {
        self.handlers.get(domain).cloned()
    }
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_coding_message() {
        assert_eq!(classify_domain_by_keyword("my rust function won't compile"), Some("coding"));
    }

    #[test]
    fn classifies_tasks_message() {
        assert_eq!(classify_domain_by_keyword("remind me about the deadline"), Some("tasks"));
    }

    #[test]
    fn ambiguous_message_returns_none() {
        assert_eq!(classify_domain_by_keyword("hello there"), None);
    }
}
