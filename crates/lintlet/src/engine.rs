//! Contract for the analysis engine hosted by a worker.
//!
//! The engine does the actual linting and is not part of this crate. A worker
//! owns exactly one engine and calls it one operation at a time, so methods
//! take `&mut self`.

use async_trait::async_trait;

use crate::handle::{Lint, LintConfig, Span, SpanOutOfBounds, Suggestion};

/// Failure reported by an engine operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<SpanOutOfBounds> for EngineError {
    fn from(err: SpanOutOfBounds) -> Self {
        Self::new(err.to_string())
    }
}

#[async_trait]
pub trait Engine: Send + 'static {
    /// One-time initialization beyond construction. Defaults to nothing.
    async fn setup(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Run the configured rules over `text`.
    async fn lint(&mut self, text: &str) -> Result<Vec<Lint>, EngineError>;

    /// Apply `suggestion` at `span` and return the rewritten text.
    async fn apply_suggestion(
        &mut self,
        text: &str,
        suggestion: &Suggestion,
        span: Span,
    ) -> Result<String, EngineError> {
        let mut source: Vec<char> = text.chars().collect();
        suggestion.apply(span, &mut source)?;
        Ok(source.into_iter().collect())
    }

    /// Whether `text` is probably meant to be English.
    async fn is_likely_english(&mut self, text: &str) -> Result<bool, EngineError>;

    /// Keep only the parts of `text` that look like English.
    async fn isolate_english(&mut self, text: &str) -> Result<String, EngineError>;

    fn lint_config(&self) -> LintConfig;

    fn set_lint_config(&mut self, config: LintConfig) -> Result<(), EngineError>;
}
