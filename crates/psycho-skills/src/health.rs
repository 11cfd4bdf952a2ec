//! Health-domain adapter: extracts simple numeric health metrics ("slept 7
//! hours", "weighed 172 lbs") the user mentions, so the loop can log them as
//! episodic events without round-tripping through the LLM extractor.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use psycho_core::domain::{DomainArtifacts, DomainContext, DomainHandler};
use regex::Regex;

static SLEEP_HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)slept\s+(\d+(?:\.\d+)?)\s*hours?").unwrap());
static WEIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)weigh(?:ed|s)?\s+(\d+(?:\.\d+)?)\s*(lbs?|kg)").unwrap());
static STEPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d{3,6})\s*steps").unwrap());

pub struct HealthHandler;

#[async_trait]
impl DomainHandler for HealthHandler {
    fn domain(&self) -> &'static str {
        "health"
    }

    async fn context_for_prompt(&self, _query: &str) -> DomainContext {
        DomainContext {
            text: "Health data the user shares is personal; avoid diagnosing, suggest professional follow-up for anything concerning.".to_string(),
        }
    }

    async fn post_process(&self, user_message: &str, _agent_response: &str) -> DomainArtifacts {
        let mut logged = Vec::new();
        if let Some(c) = SLEEP_HOURS.captures(user_message) {
            logged.push(format!("sleep_hours:{}", &c[1]));
        }
        if let Some(c) = WEIGHT.captures(user_message) {
            logged.push(format!("weight:{}{}", &c[1], &c[2]));
        }
        if let Some(c) = STEPS.captures(user_message) {
            logged.push(format!("steps:{}", &c[1]));
        }
        DomainArtifacts { logged_metrics: logged, ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_sleep_hours() {
        let handler = HealthHandler;
        let artifacts = handler.post_process("I slept 6.5 hours last night", "").await;
        assert_eq!(artifacts.logged_metrics, vec!["sleep_hours:6.5"]);
    }

    #[tokio::test]
    async fn extracts_weight_and_steps() {
        let handler = HealthHandler;
        let artifacts = handler.post_process("weighed 172 lbs and did 8500 steps today", "").await;
        assert!(artifacts.logged_metrics.contains(&"weight:172lbs".to_string()));
        assert!(artifacts.logged_metrics.contains(&"steps:8500".to_string()));
    }
}
