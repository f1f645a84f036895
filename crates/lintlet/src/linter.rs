//! Caller-facing linting interface and its in-context implementation.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::bridge::protocol::{RemoteError, RemoteErrorKind};
use crate::engine::{Engine, EngineError};
use crate::handle::{Lint, LintConfig, Span, Suggestion};
use crate::value::{CodecError, UnexpectedType};

#[derive(Debug, Clone, thiserror::Error)]
pub enum LinterError {
    /// A value could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The channel to the worker failed to deliver or parse a message.
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine operation itself failed.
    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),

    /// The worker answered with a value of the wrong shape.
    #[error("unexpected result: {0}")]
    UnexpectedResult(#[from] UnexpectedType),

    /// The worker is gone; no further calls will be answered.
    #[error("worker exited: {0}")]
    WorkerExited(String),
}

impl From<RemoteError> for LinterError {
    fn from(err: RemoteError) -> Self {
        match err.kind {
            RemoteErrorKind::Procedure => Self::Engine(EngineError::new(err.message)),
            RemoteErrorKind::Undecodable => {
                Self::Transport(format!("worker could not read call: {}", err.message))
            }
        }
    }
}

/// An object that can perform linting actions.
#[async_trait]
pub trait Linter: Send + Sync {
    /// Complete any setup needed before linting. Setup also happens on demand;
    /// calling this early moves the cost to a convenient moment.
    async fn setup(&self) -> Result<(), LinterError>;

    /// Lint the provided text, returning only findings that carry a fix.
    async fn lint(&self, text: &str) -> Result<Vec<Lint>, LinterError>;

    /// Apply a suggestion to the given text, returning the transformed result.
    async fn apply_suggestion(
        &self,
        text: &str,
        suggestion: &Suggestion,
        span: Span,
    ) -> Result<String, LinterError>;

    /// Whether the text is likely intended to be English.
    async fn is_likely_english(&self, text: &str) -> Result<bool, LinterError>;

    /// The parts of the text that are likely intended to be English.
    async fn isolate_english(&self, text: &str) -> Result<String, LinterError>;

    async fn lint_config(&self) -> Result<LintConfig, LinterError>;

    async fn set_lint_config(&self, config: LintConfig) -> Result<(), LinterError>;
}

/// Linter that runs the engine in the caller's own context.
///
/// Heavy engine work runs on the calling task. Use
/// [`WorkerLinter`](crate::WorkerLinter) to keep it off the caller.
pub struct LocalLinter<E> {
    engine: Mutex<E>,
}

impl<E: Engine> LocalLinter<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    pub fn into_inner(self) -> E {
        self.engine.into_inner()
    }
}

#[async_trait]
impl<E: Engine> Linter for LocalLinter<E> {
    async fn setup(&self) -> Result<(), LinterError> {
        let mut engine = self.engine.lock().await;
        engine.setup().await?;
        // Warm the rule set so the first real lint is not the slow one.
        engine.lint("").await?;
        Ok(())
    }

    async fn lint(&self, text: &str) -> Result<Vec<Lint>, LinterError> {
        let lints = self.engine.lock().await.lint(text).await?;
        Ok(lints
            .into_iter()
            .filter(|lint| lint.suggestion_count() > 0)
            .collect())
    }

    async fn apply_suggestion(
        &self,
        text: &str,
        suggestion: &Suggestion,
        span: Span,
    ) -> Result<String, LinterError> {
        let mut engine = self.engine.lock().await;
        Ok(engine.apply_suggestion(text, suggestion, span).await?)
    }

    async fn is_likely_english(&self, text: &str) -> Result<bool, LinterError> {
        Ok(self.engine.lock().await.is_likely_english(text).await?)
    }

    async fn isolate_english(&self, text: &str) -> Result<String, LinterError> {
        Ok(self.engine.lock().await.isolate_english(text).await?)
    }

    async fn lint_config(&self) -> Result<LintConfig, LinterError> {
        Ok(self.engine.lock().await.lint_config())
    }

    async fn set_lint_config(&self, config: LintConfig) -> Result<(), LinterError> {
        Ok(self.engine.lock().await.set_lint_config(config)?)
    }
}
