//! Controller - owns the request queue and the event loop for one worker.
//!
//! Flow:
//! 1. Start the worker (thread, process, or caller-supplied stream pair)
//! 2. Buffer calls until the worker sends Ready
//! 3. Transmit one call, wait for its Response/Error, settle it, repeat
//! 4. When every handle is gone: drain the queue, send Shutdown
//! 5. On worker exit: fail everything still queued, reject later calls

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::{DEFAULT_MAX_FRAME_LEN, JsonCodec};
use crate::bridge::protocol::{ControlRequest, Procedure, WorkerMessage};
use crate::bridge::transport::{SpawnError, spawn_worker_process, spawn_worker_thread};
use crate::engine::{Engine, EngineError};
use crate::handle::{Lint, LintConfig, Span, Suggestion};
use crate::linter::{Linter, LinterError};
use crate::queue::{PendingCall, RequestQueue};
use crate::value::{UnexpectedType, Value};
use crate::worker::WorkerConfig;

/// How long a worker process gets to exit after its channel closes.
const PROCESS_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Identifies one worker in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(uuid::Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerLinterConfig {
    /// Buffer size of the in-memory pipe to a worker thread, in bytes.
    pub pipe_capacity: usize,
    pub thread_name: String,
    pub max_frame_len: usize,
}

impl WorkerLinterConfig {
    pub fn new() -> Self {
        Self {
            pipe_capacity: 64 * 1024,
            thread_name: "lintlet-worker".to_string(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_pipe_capacity(mut self, bytes: usize) -> Self {
        self.pipe_capacity = bytes;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_max_frame_len(mut self, bytes: usize) -> Self {
        self.max_frame_len = bytes;
        self
    }
}

impl Default for WorkerLinterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What the event loop cleans up after the worker is gone.
enum WorkerHost {
    Thread(std::thread::JoinHandle<()>),
    Process(Child),
    External,
}

impl WorkerHost {
    async fn reap(self, id: WorkerId) {
        match self {
            Self::Thread(thread) => {
                match tokio::task::spawn_blocking(move || thread.join()).await {
                    Ok(Ok(())) => tracing::debug!(worker = %id, "Worker thread joined"),
                    Ok(Err(_)) => tracing::error!(worker = %id, "Worker thread panicked"),
                    Err(e) => tracing::warn!(worker = %id, error = %e, "Failed to join worker thread"),
                }
            }
            Self::Process(mut child) => {
                match tokio::time::timeout(PROCESS_EXIT_GRACE, child.wait()).await {
                    Ok(Ok(status)) => tracing::debug!(worker = %id, %status, "Worker process exited"),
                    Ok(Err(e)) => tracing::warn!(worker = %id, error = %e, "Failed to wait for worker process"),
                    Err(_) => {
                        tracing::warn!(worker = %id, "Worker process did not exit, killing");
                        if let Err(e) = child.kill().await {
                            tracing::error!(worker = %id, error = %e, "Failed to kill worker process");
                        }
                    }
                }
            }
            Self::External => {}
        }
    }
}

/// How the event loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopExit {
    /// Worker acknowledged Shutdown.
    ShutDown,
    /// Worker went away on its own.
    Lost(String),
}

impl LoopExit {
    fn reason(&self) -> String {
        match self {
            Self::ShutDown => "worker shut down".to_string(),
            Self::Lost(reason) => reason.clone(),
        }
    }
}

/// Linter whose engine lives in an isolated worker.
///
/// Calls from any number of tasks are queued and sent to the worker one at a
/// time, in submission order. Each call settles exactly once.
///
/// Dropping the handle (or calling [`shutdown`](Self::shutdown)) lets queued
/// calls finish, then stops the worker. Share it with `Arc` to use it from
/// several tasks.
pub struct WorkerLinter {
    id: WorkerId,
    call_tx: mpsc::UnboundedSender<PendingCall>,
    exit_reason: Arc<OnceLock<String>>,
    event_loop: tokio::task::JoinHandle<LoopExit>,
}

impl WorkerLinter {
    /// Run `factory` on a new worker thread with default settings.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<E, F>(factory: F) -> Result<Self, SpawnError>
    where
        E: Engine,
        F: FnOnce() -> Result<E, EngineError> + Send + 'static,
    {
        Self::spawn_with_config(factory, WorkerLinterConfig::default())
    }

    pub fn spawn_with_config<E, F>(
        factory: F,
        config: WorkerLinterConfig,
    ) -> Result<Self, SpawnError>
    where
        E: Engine,
        F: FnOnce() -> Result<E, EngineError> + Send + 'static,
    {
        let channel = spawn_worker_thread(
            factory,
            &config.thread_name,
            config.pipe_capacity,
            WorkerConfig {
                max_frame_len: config.max_frame_len,
            },
        )?;
        Ok(Self::start(
            &config,
            channel.reader,
            channel.writer,
            WorkerHost::Thread(channel.thread),
        ))
    }

    /// Launch `command` as a worker process. The program is expected to call
    /// [`run_worker_stdio`](crate::run_worker_stdio).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_process(command: Command, config: WorkerLinterConfig) -> Result<Self, SpawnError> {
        let channel = spawn_worker_process(command)?;
        Ok(Self::start(
            &config,
            channel.reader,
            channel.writer,
            WorkerHost::Process(channel.child),
        ))
    }

    /// Talk to a worker that is already running at the other end of `reader`/`writer`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect<R, W>(config: WorkerLinterConfig, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::start(&config, reader, writer, WorkerHost::External)
    }

    fn start<R, W>(config: &WorkerLinterConfig, reader: R, writer: W, host: WorkerHost) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let id = WorkerId::new();
        let (call_tx, call_rx) = mpsc::unbounded_channel();
        let exit_reason = Arc::new(OnceLock::new());

        let reader = FramedRead::new(
            reader,
            JsonCodec::<WorkerMessage>::with_max_frame_len(config.max_frame_len),
        );
        let writer = FramedWrite::new(
            writer,
            JsonCodec::<ControlRequest>::with_max_frame_len(config.max_frame_len),
        );

        tracing::info!(worker = %id, "Starting worker event loop");
        let event_loop = tokio::spawn(run_event_loop(
            id,
            reader,
            writer,
            call_rx,
            Arc::clone(&exit_reason),
            host,
        ));

        Self {
            id,
            call_tx,
            exit_reason,
            event_loop,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Queue a call and wait for its result.
    pub async fn rpc(&self, procedure: Procedure, arguments: Vec<Value>) -> Result<Value, LinterError> {
        let (call, reply) = PendingCall::new(procedure, arguments);
        if self.call_tx.send(call).is_err() {
            return Err(self.exited());
        }
        reply.await.unwrap_or_else(|_| Err(self.exited()))
    }

    /// Let queued calls finish, then stop the worker and wait for it.
    ///
    /// Errors if the worker was already gone.
    pub async fn shutdown(self) -> Result<(), LinterError> {
        let Self {
            id,
            call_tx,
            event_loop,
            ..
        } = self;
        drop(call_tx);

        match event_loop.await {
            Ok(LoopExit::ShutDown) => {
                tracing::info!(worker = %id, "Worker shut down");
                Ok(())
            }
            Ok(LoopExit::Lost(reason)) => Err(LinterError::WorkerExited(reason)),
            Err(e) => Err(LinterError::WorkerExited(format!("event loop failed: {e}"))),
        }
    }

    fn exited(&self) -> LinterError {
        let reason = self
            .exit_reason
            .get()
            .cloned()
            .unwrap_or_else(|| "worker event loop stopped".to_string());
        LinterError::WorkerExited(reason)
    }

    async fn call<T>(&self, procedure: Procedure, arguments: Vec<Value>) -> Result<T, LinterError>
    where
        T: TryFrom<Value, Error = UnexpectedType>,
    {
        let value = self.rpc(procedure, arguments).await?;
        Ok(T::try_from(value)?)
    }
}

#[async_trait]
impl Linter for WorkerLinter {
    async fn setup(&self) -> Result<(), LinterError> {
        self.call(Procedure::Setup, vec![]).await
    }

    async fn lint(&self, text: &str) -> Result<Vec<Lint>, LinterError> {
        self.call(Procedure::Lint, vec![text.into()]).await
    }

    async fn apply_suggestion(
        &self,
        text: &str,
        suggestion: &Suggestion,
        span: Span,
    ) -> Result<String, LinterError> {
        self.call(
            Procedure::ApplySuggestion,
            vec![text.into(), suggestion.clone().into(), span.into()],
        )
        .await
    }

    async fn is_likely_english(&self, text: &str) -> Result<bool, LinterError> {
        self.call(Procedure::IsLikelyEnglish, vec![text.into()]).await
    }

    async fn isolate_english(&self, text: &str) -> Result<String, LinterError> {
        self.call(Procedure::IsolateEnglish, vec![text.into()]).await
    }

    async fn lint_config(&self) -> Result<LintConfig, LinterError> {
        self.call(Procedure::GetLintConfig, vec![]).await
    }

    async fn set_lint_config(&self, config: LintConfig) -> Result<(), LinterError> {
        self.call(Procedure::SetLintConfig, vec![config.into()]).await
    }
}

async fn run_event_loop<R, W>(
    id: WorkerId,
    mut reader: FramedRead<R, JsonCodec<WorkerMessage>>,
    mut writer: FramedWrite<W, JsonCodec<ControlRequest>>,
    mut call_rx: mpsc::UnboundedReceiver<PendingCall>,
    exit_reason: Arc<OnceLock<String>>,
    host: WorkerHost,
) -> LoopExit
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut queue = RequestQueue::new();
    let mut accepting = true;
    let mut shutdown_sent = false;

    let exit = loop {
        while let Some(record) = queue.next_dispatch() {
            let procedure = record.procedure;
            tracing::debug!(worker = %id, %procedure, queued = queue.len(), "Dispatching call");
            match writer.send(ControlRequest::Call(record)).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::error!(worker = %id, %procedure, error = %e, "Failed to send call");
                    queue.reject_in_flight(LinterError::Transport(format!(
                        "failed to send call: {e}"
                    )));
                }
            }
        }

        if !accepting && !shutdown_sent && queue.is_drained() {
            tracing::debug!(worker = %id, "Queue drained, sending Shutdown");
            if let Err(e) = writer.send(ControlRequest::Shutdown).await {
                break LoopExit::Lost(format!("failed to send shutdown: {e}"));
            }
            shutdown_sent = true;
        }

        tokio::select! {
            biased;

            msg = reader.next() => {
                match msg {
                    Some(Ok(Ok(WorkerMessage::Ready))) => {
                        if queue.mark_ready() {
                            tracing::info!(worker = %id, buffered = queue.len(), "Worker ready");
                        } else {
                            tracing::warn!(worker = %id, "Unexpected Ready in event loop");
                        }
                    }
                    Some(Ok(Ok(WorkerMessage::SetupFailed { reason }))) => {
                        tracing::error!(worker = %id, %reason, "Worker setup failed");
                        break LoopExit::Lost(format!("worker setup failed: {reason}"));
                    }
                    Some(Ok(Ok(WorkerMessage::Response { value }))) => {
                        tracing::trace!(worker = %id, kind = %value.kind, payload_bytes = value.payload.len(), "Response received");
                        queue.resolve_in_flight(&value);
                    }
                    Some(Ok(Ok(WorkerMessage::Error { error }))) => {
                        queue.reject_in_flight(error.into());
                    }
                    Some(Ok(Ok(WorkerMessage::ShuttingDown))) => {
                        tracing::info!(worker = %id, "Worker shutting down");
                        break LoopExit::ShutDown;
                    }
                    Some(Ok(Err(malformed))) => {
                        tracing::warn!(worker = %id, error = %malformed, "Unreadable message from worker");
                        queue.reject_in_flight(LinterError::Transport(malformed.to_string()));
                    }
                    Some(Err(e)) => {
                        tracing::error!(worker = %id, error = %e, "Control channel error");
                        break LoopExit::Lost(format!("control channel error: {e}"));
                    }
                    None => {
                        tracing::warn!(worker = %id, "Control channel closed (worker crashed?)");
                        break LoopExit::Lost("worker closed the channel".to_string());
                    }
                }
            }

            call = call_rx.recv(), if accepting => {
                match call {
                    Some(call) => queue.push(call),
                    None => {
                        tracing::debug!(worker = %id, pending = queue.len(), "All handles dropped");
                        accepting = false;
                    }
                }
            }
        }
    };

    let reason = exit.reason();
    let _ = exit_reason.set(reason.clone());
    let error = LinterError::WorkerExited(reason);
    queue.fail_all(&error);

    call_rx.close();
    while let Ok(call) = call_rx.try_recv() {
        tracing::debug!(worker = %id, procedure = %call.procedure(), "Rejecting call submitted during exit");
        call.settle(Err(error.clone()));
    }

    // Closing our end lets a worker still blocked on the channel see EOF.
    drop(writer);
    drop(reader);
    host.reap(id).await;

    tracing::info!(worker = %id, "Worker event loop exited");
    exit
}
