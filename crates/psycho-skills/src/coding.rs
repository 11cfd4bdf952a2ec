//! Coding-domain adapter: surfaces no stateful context of its own (there is no
//! project index here), but flags code blocks in the agent's reply so the loop
//! can log a lightweight "snippet produced" episodic event upstream.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use psycho_core::domain::{DomainArtifacts, DomainContext, DomainHandler};
use regex::Regex;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(\w*)\n").unwrap());

pub struct CodingHandler;

#[async_trait]
impl DomainHandler for CodingHandler {
    fn domain(&self) -> &'static str {
        "coding"
    }

    async fn context_for_prompt(&self, _query: &str) -> DomainContext {
        DomainContext {
            text: "You may be asked about code. Prefer small, runnable examples over prose.".to_string(),
        }
    }

    async fn post_process(&self, _user_message: &str, agent_response: &str) -> DomainArtifacts {
        let languages: Vec<String> = CODE_FENCE
            .captures_iter(agent_response)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .filter(|s| !s.is_empty())
            .collect();
        DomainArtifacts {
            logged_metrics: languages.into_iter().map(|l| format!("code_block:{l}")).collect(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flags_fenced_code_blocks_by_language() {
        let handler = CodingHandler;
        let artifacts = handler
            .post_process("how do I reverse a string in rust", "```rust\nfn main() {}\n```")
            .await;
        assert_eq!(artifacts.logged_metrics, vec!["code_block:rust"]);
    }

    #[tokio::test]
    async fn no_artifacts_without_code_fences() {
        let handler = CodingHandler;
        let artifacts = handler.post_process("what's a closure", "a closure captures its environment").await;
        assert!(artifacts.logged_metrics.is_empty());
    }
}
