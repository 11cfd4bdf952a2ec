//! Live web search: detects when a message needs current information, pulls a
//! query out of it, fetches DuckDuckGo's HTML results page and scrapes result
//! titles/snippets/links out of it, then formats a `─── WEB SEARCH:` block for
//! injection into the system prompt.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

const MAX_QUERY_CHARS: usize = 200;
const MAX_RESULTS: usize = 5;
const SEPARATOR_WIDTH: usize = 35;
const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

static SEARCH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bsearch(?:\s+for)?\s+(.+)",
        r"(?i)\blook\s+up\s+(.+)",
        r"(?i)\bfind\s+(?:info(?:rmation)?\s+(?:about|on)\s+)?(.+)",
        r"(?i)\bwho\s+is\s+(.+)",
        r"(?i)\bwhere\s+is\s+(.+)",
        r"(?i)\bprice\s+of\s+(.+)",
        r"(?i)\bweather\s+(?:in\s+)?(.+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const DIRECT_SEARCH_COMMANDS: &[&str] = &["search", "look up", "google", "bing", "find info"];
const LIVE_KEYWORDS: &[&str] =
    &["today", "current", "latest", "recent", "right now", "breaking", "news", "price", "weather", "stock", "trending"];

/// Returns true if the message likely needs live web data: a direct search
/// command, or a keyword that implies the answer changes day to day.
pub fn should_search(message: &str) -> bool {
    let lower = message.to_lowercase();
    DIRECT_SEARCH_COMMANDS.iter().any(|kw| lower.contains(kw)) || LIVE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Pulls the best search query out of the message, falling back to the whole
/// message (capped) when no trigger pattern matches.
pub fn extract_query(message: &str) -> String {
    let lower = message.to_lowercase();
    for pattern in SEARCH_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&lower) {
            if let Some(m) = caps.get(1) {
                return truncate_chars(m.as_str().trim(), MAX_QUERY_CHARS);
            }
        }
    }
    truncate_chars(message.trim(), MAX_QUERY_CHARS)
}

fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

pub struct WebSearchClient {
    client: reqwest::Client,
}

impl WebSearchClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder().user_agent("PsychoPortal/1.0").build().unwrap_or_default(),
        }
    }

    /// Fetches DuckDuckGo's HTML results page (no API key required). Network
    /// or parse failures degrade to an empty result set rather than an error,
    /// since search is an optional prompt enrichment, not a required step.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        let response = match self.client.get(DUCKDUCKGO_HTML_URL).query(&[("q", query)]).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "psycho::web_search", error = %e, "search request failed");
                return Vec::new();
            }
        };
        match response.text().await {
            Ok(body) => Self::parse_results(&body),
            Err(_) => Vec::new(),
        }
    }

    fn parse_results(html: &str) -> Vec<SearchResult> {
        let document = Html::parse_document(html);
        let result_sel = Selector::parse(".result").unwrap_or_else(|_| unreachable!());
        let title_sel = Selector::parse(".result__a").unwrap_or_else(|_| unreachable!());
        let snippet_sel = Selector::parse(".result__snippet").unwrap_or_else(|_| unreachable!());

        document
            .select(&result_sel)
            .filter_map(|el| {
                let title_el = el.select(&title_sel).next()?;
                let title = title_el.text().collect::<String>().trim().to_string();
                if title.is_empty() {
                    return None;
                }
                let url = title_el.value().attr("href").unwrap_or_default().to_string();
                let snippet =
                    el.select(&snippet_sel).next().map(|s| s.text().collect::<String>().trim().to_string()).unwrap_or_default();
                Some(SearchResult { title, snippet, url })
            })
            .take(MAX_RESULTS)
            .collect()
    }
}

impl Default for WebSearchClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a prompt-ready block; empty results yield an empty string so the
/// caller can skip the section entirely.
pub fn format_search_results(results: &[SearchResult], query: &str) -> String {
    if results.is_empty() {
        return String::new();
    }
    let mut out = format!("\n─── WEB SEARCH: '{query}' ───");
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!("\n[{}] {}", i + 1, r.title));
        if !r.snippet.is_empty() {
            out.push_str(&format!("\n    {}", r.snippet));
        }
        if !r.url.is_empty() {
            out.push_str(&format!("\n    URL: {}", r.url));
        }
    }
    out.push('\n');
    out.push_str(&"─".repeat(SEPARATOR_WIDTH));
    out.push_str("\nIncorporate the above into your answer and cite sources where useful.\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_search_detects_direct_command_and_live_keywords() {
        assert!(should_search("search for rust async runtimes"));
        assert!(should_search("what's the latest iphone"));
        assert!(!should_search("remind me to call mom"));
    }

    #[test]
    fn extract_query_strips_trigger_phrase() {
        assert_eq!(extract_query("look up the weather in paris"), "the weather in paris");
        assert_eq!(extract_query("who is the current president"), "the current president");
    }

    #[test]
    fn parse_results_reads_title_snippet_and_url() {
        let html = r#"
            <div class="result">
                <a class="result__a" href="https://example.com/rust">The Rust Programming Language</a>
                <a class="result__snippet">A systems language focused on safety.</a>
            </div>
        "#;
        let results = WebSearchClient::parse_results(html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "The Rust Programming Language");
        assert_eq!(results[0].url, "https://example.com/rust");
        assert!(results[0].snippet.contains("systems language"));
    }

    #[test]
    fn format_search_results_is_empty_for_no_results() {
        assert_eq!(format_search_results(&[], "anything"), "");
    }

    #[test]
    fn format_search_results_includes_header_and_footer() {
        let results = vec![SearchResult { title: "Title".into(), snippet: "Snippet".into(), url: "https://x".into() }];
        let block = format_search_results(&results, "query");
        assert!(block.contains("WEB SEARCH: 'query'"));
        assert!(block.contains("[1] Title"));
        assert!(block.contains("Incorporate the above"));
    }
}
