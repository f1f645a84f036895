//! lintlet: run a stateful linting engine in an isolated worker.
//!
//! Callers talk to a [`Linter`]. [`LocalLinter`] runs the engine in place;
//! [`WorkerLinter`] runs it on a worker thread or in a child process and
//! serializes calls through a single-flight FIFO queue.

mod queue;
#[cfg(test)]
mod testing;

pub mod bridge;
pub mod controller;
pub mod engine;
pub mod handle;
pub mod linter;
pub mod logging;
pub mod value;
pub mod worker;

pub use bridge::protocol::{Procedure, RemoteError, RemoteErrorKind};
pub use bridge::transport::SpawnError;
pub use controller::{WorkerId, WorkerLinter, WorkerLinterConfig};
pub use engine::{Engine, EngineError};
pub use handle::{
    Lint, LintConfig, LintKind, OpaqueHandle, Span, SpanOutOfBounds, Suggestion, SuggestionKind,
};
pub use linter::{Linter, LinterError, LocalLinter};
pub use logging::init_tracing;
pub use value::{CodecError, TaggedValue, TypeTag, UnexpectedType, Value, decode, encode};
pub use worker::{WorkerConfig, run_worker, run_worker_stdio};
