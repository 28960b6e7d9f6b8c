//! Optional code-to-image enrichment.
//!
//! Solution code blocks can be pre-rendered as images for cross-client
//! formatting fidelity. Rendering backends are modeled as a ranked list of
//! strategies: each either produces an image URL, reports itself
//! unavailable, or fails. The first success wins; total failure leaves the
//! question un-enriched and the renderer falls back to a preformatted
//! block. Enrichment failure is never fatal to the email.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::content::{ContentPayload, Question};

/// One code-image rendering backend.
#[async_trait]
pub trait CodeImageStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render code to a hosted image URL. `Ok(None)` means the backend is
    /// unavailable for this input; `Err` means it was tried and failed.
    async fn render(&self, code: &str) -> Result<Option<String>>;
}

/// Image URLs produced for one payload, keyed by question index.
///
/// Computed once per dispatch invocation; the images are
/// recipient-independent so per-recipient rendering stays pure.
#[derive(Debug, Default)]
pub struct Enrichment {
    images: HashMap<usize, String>,
}

impl Enrichment {
    /// No enrichment; every solution renders as preformatted text.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn set_image(&mut self, question_index: usize, url: String) {
        self.images.insert(question_index, url);
    }

    pub fn image_for(&self, question_index: usize) -> Option<&str> {
        self.images.get(&question_index).map(String::as_str)
    }
}

/// Ranked strategy list.
pub struct Enricher {
    strategies: Vec<Box<dyn CodeImageStrategy>>,
}

impl Enricher {
    pub fn new(strategies: Vec<Box<dyn CodeImageStrategy>>) -> Self {
        Self { strategies }
    }

    /// Enricher with no backends; [`Enricher::enrich`] returns no images.
    pub fn disabled() -> Self {
        Self { strategies: Vec::new() }
    }

    /// Attempt to pre-render every coding solution in the payload.
    ///
    /// Failures are logged and skipped; the returned map only holds the
    /// questions that actually got an image.
    pub async fn enrich(&self, payload: &ContentPayload) -> Enrichment {
        let mut enrichment = Enrichment::none();
        if self.strategies.is_empty() {
            return enrichment;
        }

        for (index, question) in payload.questions.iter().enumerate() {
            let code = match question {
                Question::Coding(q) => match &q.solution {
                    Some(solution) => solution.code.as_str(),
                    None => continue,
                },
                _ => continue,
            };

            if let Some(url) = self.render_with_fallback(code).await {
                enrichment.set_image(index, url);
            }
        }

        enrichment
    }

    async fn render_with_fallback(&self, code: &str) -> Option<String> {
        for strategy in &self.strategies {
            match strategy.render(code).await {
                Ok(Some(url)) => {
                    debug!(strategy = strategy.name(), "code_image_rendered");
                    return Some(url);
                }
                Ok(None) => {
                    debug!(strategy = strategy.name(), "code_image_strategy_unavailable");
                }
                Err(e) => {
                    warn!(
                        strategy = strategy.name(),
                        error = %e,
                        "code_image_strategy_failed"
                    );
                }
            }
        }
        None
    }
}

// =============================================================================
// HTTP rendering service strategy
// =============================================================================

#[derive(Deserialize)]
struct ImageServiceResponse {
    url: String,
}

/// Strategy backed by an external rendering service: POST the code, get a
/// hosted image URL back.
pub struct HttpImageService {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpImageService {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for image service")?;

        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl CodeImageStrategy for HttpImageService {
    fn name(&self) -> &'static str {
        "http_image_service"
    }

    async fn render(&self, code: &str) -> Result<Option<String>> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "code": code }))
            .send()
            .await
            .context("Image service request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Image service returned {}", response.status());
        }

        let body: ImageServiceResponse = response
            .json()
            .await
            .context("Image service returned invalid JSON")?;

        if body.url.is_empty() {
            return Ok(None);
        }

        Ok(Some(body.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{CodingQuestion, Solution};

    struct FailingStrategy;

    #[async_trait]
    impl CodeImageStrategy for FailingStrategy {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn render(&self, _code: &str) -> Result<Option<String>> {
            anyhow::bail!("boom")
        }
    }

    struct UnavailableStrategy;

    #[async_trait]
    impl CodeImageStrategy for UnavailableStrategy {
        fn name(&self) -> &'static str {
            "unavailable"
        }
        async fn render(&self, _code: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct FixedStrategy(&'static str);

    #[async_trait]
    impl CodeImageStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn render(&self, _code: &str) -> Result<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    fn payload_with_solution() -> ContentPayload {
        ContentPayload {
            title: "Issue".to_string(),
            topics: vec![],
            read_time: String::new(),
            questions: vec![Question::Coding(CodingQuestion {
                title: "Q".to_string(),
                difficulty: "Easy".to_string(),
                tags: vec![],
                description: String::new(),
                examples: vec![],
                solution: Some(Solution {
                    code: "print('x')".to_string(),
                    time_complexity: "O(1)".to_string(),
                    space_complexity: "O(1)".to_string(),
                }),
            })],
        }
    }

    #[tokio::test]
    async fn test_first_successful_strategy_wins() {
        let enricher = Enricher::new(vec![
            Box::new(UnavailableStrategy),
            Box::new(FixedStrategy("https://img/first.png")),
            Box::new(FixedStrategy("https://img/second.png")),
        ]);
        let enrichment = enricher.enrich(&payload_with_solution()).await;
        assert_eq!(enrichment.image_for(0), Some("https://img/first.png"));
    }

    #[tokio::test]
    async fn test_total_failure_yields_no_enrichment() {
        let enricher = Enricher::new(vec![
            Box::new(FailingStrategy),
            Box::new(UnavailableStrategy),
        ]);
        let enrichment = enricher.enrich(&payload_with_solution()).await;
        assert!(enrichment.image_for(0).is_none());
    }

    #[tokio::test]
    async fn test_disabled_enricher_is_empty() {
        let enrichment = Enricher::disabled().enrich(&payload_with_solution()).await;
        assert!(enrichment.image_for(0).is_none());
    }

    #[tokio::test]
    async fn test_questions_without_solution_are_skipped() {
        let mut payload = payload_with_solution();
        if let Question::Coding(q) = &mut payload.questions[0] {
            q.solution = None;
        }
        let enricher = Enricher::new(vec![Box::new(FixedStrategy("https://img/x.png"))]);
        let enrichment = enricher.enrich(&payload).await;
        assert!(enrichment.image_for(0).is_none());
    }
}
