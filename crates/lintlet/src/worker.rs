//! Worker side of the protocol - runs in the isolated context that owns the engine.
//!
//! The controller side (queueing, settlement) is in controller.rs.
//!
//! Flow:
//! 1. Build the engine via the factory (the expensive part)
//! 2. Send Ready (or SetupFailed and exit)
//! 3. Handle one Call at a time: decode, invoke, encode, reply
//! 4. On Shutdown or channel close: exit
//!
//! Calls are never overlapped: the next frame is not read until the previous
//! reply has been written.

use std::io;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, stdin, stdout};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::{DEFAULT_MAX_FRAME_LEN, FrameTooLarge, JsonCodec};
use crate::bridge::protocol::{CallRecord, ControlRequest, Procedure, RemoteError, WorkerMessage};
use crate::engine::{Engine, EngineError};
use crate::linter::{Linter, LinterError, LocalLinter};
use crate::value::{CodecError, UnexpectedType, Value, decode, encode};

pub struct WorkerConfig {
    /// Upper bound on a single frame body, both directions.
    pub max_frame_len: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Call arguments that do not fit the procedure's signature.
#[derive(Debug, thiserror::Error)]
pub enum ArgumentError {
    #[error("{procedure}: argument {index} could not be decoded: {source}")]
    Decode {
        procedure: Procedure,
        index: usize,
        #[source]
        source: CodecError,
    },

    #[error("{procedure} takes {expected} argument(s), got {found}")]
    Arity {
        procedure: Procedure,
        expected: usize,
        found: usize,
    },

    #[error("{procedure}: argument {index}: {source}")]
    Type {
        procedure: Procedure,
        index: usize,
        #[source]
        source: UnexpectedType,
    },
}

/// Decoded arguments, consumed front to back by the dispatcher.
struct Arguments {
    procedure: Procedure,
    values: std::vec::IntoIter<Value>,
    index: usize,
}

impl Arguments {
    fn decode(record: &CallRecord) -> Result<Self, ArgumentError> {
        let procedure = record.procedure;
        let expected = procedure.arity();
        if record.arguments.len() != expected {
            return Err(ArgumentError::Arity {
                procedure,
                expected,
                found: record.arguments.len(),
            });
        }

        let values = record
            .arguments
            .iter()
            .enumerate()
            .map(|(index, tagged)| {
                decode(tagged).map_err(|source| ArgumentError::Decode {
                    procedure,
                    index,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            procedure,
            values: values.into_iter(),
            index: 0,
        })
    }

    fn next<T>(&mut self) -> Result<T, ArgumentError>
    where
        T: TryFrom<Value, Error = UnexpectedType>,
    {
        let index = self.index;
        self.index += 1;
        // Arity was checked up front.
        let value = self.values.next().unwrap_or(Value::Undefined);
        T::try_from(value).map_err(|source| ArgumentError::Type {
            procedure: self.procedure,
            index,
            source,
        })
    }
}

enum DispatchError {
    Arguments(ArgumentError),
    Linter(LinterError),
}

impl From<ArgumentError> for DispatchError {
    fn from(err: ArgumentError) -> Self {
        Self::Arguments(err)
    }
}

impl From<LinterError> for DispatchError {
    fn from(err: LinterError) -> Self {
        Self::Linter(err)
    }
}

async fn invoke<L>(linter: &L, record: &CallRecord) -> Result<Value, DispatchError>
where
    L: Linter + ?Sized,
{
    let mut args = Arguments::decode(record)?;
    let value = match record.procedure {
        Procedure::Setup => Value::from(linter.setup().await?),
        Procedure::Lint => {
            let text: String = args.next()?;
            Value::from(linter.lint(&text).await?)
        }
        Procedure::ApplySuggestion => {
            let text: String = args.next()?;
            let suggestion = args.next()?;
            let span = args.next()?;
            Value::from(linter.apply_suggestion(&text, &suggestion, span).await?)
        }
        Procedure::IsLikelyEnglish => {
            let text: String = args.next()?;
            Value::from(linter.is_likely_english(&text).await?)
        }
        Procedure::IsolateEnglish => {
            let text: String = args.next()?;
            Value::from(linter.isolate_english(&text).await?)
        }
        Procedure::GetLintConfig => Value::from(linter.lint_config().await?),
        Procedure::SetLintConfig => {
            let config = args.next()?;
            Value::from(linter.set_lint_config(config).await?)
        }
    };
    Ok(value)
}

/// Execute one call and build the message that answers it.
pub async fn dispatch<L>(linter: &L, record: &CallRecord) -> WorkerMessage
where
    L: Linter + ?Sized,
{
    let procedure = record.procedure;
    match invoke(linter, record).await {
        Ok(value) => match encode(&value) {
            Ok(value) => WorkerMessage::Response { value },
            Err(e) => {
                tracing::error!(%procedure, error = %e, "Failed to encode result");
                WorkerMessage::Error {
                    error: RemoteError::procedure(e.to_string()),
                }
            }
        },
        Err(DispatchError::Arguments(e)) => {
            tracing::warn!(%procedure, error = %e, "Rejecting call with bad arguments");
            WorkerMessage::Error {
                error: RemoteError::undecodable(e.to_string()),
            }
        }
        Err(DispatchError::Linter(e)) => {
            tracing::debug!(%procedure, error = %e, "Procedure failed");
            let message = match e {
                LinterError::Engine(e) => e.message().to_string(),
                other => other.to_string(),
            };
            WorkerMessage::Error {
                error: RemoteError::procedure(message),
            }
        }
    }
}

/// Send a call's reply. A reply too large for one frame is swapped for an
/// error so only that call fails; any other write failure ends the worker.
async fn send_reply<W>(
    writer: &mut FramedWrite<W, JsonCodec<WorkerMessage>>,
    procedure: Procedure,
    reply: WorkerMessage,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let err = match writer.send(reply).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    let Some(too_large) = FrameTooLarge::from_io(&err) else {
        return Err(err);
    };

    tracing::warn!(%procedure, len = too_large.len, max = too_large.max, "Reply exceeds frame limit");
    writer
        .send(WorkerMessage::Error {
            error: RemoteError::procedure(format!("result too large: {too_large}")),
        })
        .await
}

/// Run the worker event loop over an arbitrary byte stream pair.
///
/// `factory` builds the engine inside the worker context before Ready is sent.
/// Returns when the controller asks for shutdown or closes the channel.
pub async fn run_worker<E, F, R, W>(
    factory: F,
    config: WorkerConfig,
    reader: R,
    writer: W,
) -> io::Result<()>
where
    E: Engine,
    F: FnOnce() -> Result<E, EngineError>,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut ctrl_reader = FramedRead::new(
        reader,
        JsonCodec::<ControlRequest>::with_max_frame_len(config.max_frame_len),
    );
    let mut ctrl_writer = FramedWrite::new(
        writer,
        JsonCodec::<WorkerMessage>::with_max_frame_len(config.max_frame_len),
    );

    tracing::info!("Worker building engine");
    let engine = match factory() {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "Engine setup failed");
            ctrl_writer
                .send(WorkerMessage::SetupFailed {
                    reason: e.to_string(),
                })
                .await?;
            return Ok(());
        }
    };
    let linter = LocalLinter::new(engine);

    tracing::debug!("Sending Ready to controller");
    ctrl_writer.send(WorkerMessage::Ready).await?;

    loop {
        match ctrl_reader.next().await {
            Some(Ok(Ok(ControlRequest::Call(record)))) => {
                tracing::debug!(procedure = %record.procedure, args = record.arguments.len(), "Call received");
                let reply = dispatch(&linter, &record).await;
                send_reply(&mut ctrl_writer, record.procedure, reply).await?;
            }
            Some(Ok(Ok(ControlRequest::Shutdown))) => {
                tracing::info!("Shutdown requested");
                ctrl_writer.send(WorkerMessage::ShuttingDown).await?;
                break;
            }
            Some(Ok(Err(malformed))) => {
                tracing::warn!(error = %malformed, "Unreadable message from controller");
                ctrl_writer
                    .send(WorkerMessage::Error {
                        error: RemoteError::undecodable(malformed.to_string()),
                    })
                    .await?;
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Control channel error");
                return Err(e);
            }
            None => {
                tracing::info!("Control channel closed (controller gone?), exiting");
                break;
            }
        }
    }

    tracing::info!("Worker exiting");
    Ok(())
}

/// Run the worker over this process's stdin/stdout.
///
/// Entry point for a worker executable launched by
/// [`WorkerLinter::spawn_process`](crate::WorkerLinter::spawn_process).
/// Nothing else may write to stdout while it runs.
pub async fn run_worker_stdio<E, F>(factory: F, config: WorkerConfig) -> io::Result<()>
where
    E: Engine,
    F: FnOnce() -> Result<E, EngineError>,
{
    run_worker(factory, config, stdin(), stdout()).await
}
