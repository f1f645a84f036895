//! Byte channels between controller and worker.
//!
//! - **Thread**: worker on a dedicated OS thread with its own single-threaded
//!   runtime, joined to the controller by an in-memory duplex pipe.
//! - **Process**: worker in a child process, framed over its stdin/stdout.
//!
//! Both carry the same length-prefixed frames (see [`codec`](super::codec)).

use std::io;
use std::process::Stdio;
use std::thread::JoinHandle;

use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::engine::{Engine, EngineError};
use crate::worker::{WorkerConfig, run_worker};

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to start worker: {0}")]
    Io(#[from] io::Error),
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Controller end of a worker running on its own thread.
pub struct ThreadChannel {
    pub reader: ReadHalf<DuplexStream>,
    pub writer: WriteHalf<DuplexStream>,
    pub thread: JoinHandle<()>,
}

/// Start a worker thread.
///
/// `factory` runs on the new thread, so the engine never has to cross threads.
pub fn spawn_worker_thread<E, F>(
    factory: F,
    thread_name: &str,
    pipe_capacity: usize,
    worker_config: WorkerConfig,
) -> Result<ThreadChannel, SpawnError>
where
    E: Engine,
    F: FnOnce() -> Result<E, EngineError> + Send + 'static,
{
    let (controller_end, worker_end) = tokio::io::duplex(pipe_capacity);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    tracing::debug!(thread_name, pipe_capacity, "Spawning worker thread");
    let thread = std::thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || {
            let (read, write) = tokio::io::split(worker_end);
            if let Err(e) = runtime.block_on(run_worker(factory, worker_config, read, write)) {
                tracing::error!(error = %e, "Worker thread exited with I/O error");
            }
        })?;

    let (reader, writer) = tokio::io::split(controller_end);
    Ok(ThreadChannel {
        reader,
        writer,
        thread,
    })
}

/// Controller end of a worker running as a child process.
pub struct ProcessChannel {
    pub reader: ChildStdout,
    pub writer: ChildStdin,
    pub child: Child,
}

/// Launch `command` as a worker process.
///
/// stdin/stdout are taken over for framing; stderr is inherited so the
/// worker's logs stay visible. The child is killed if the channel is dropped.
pub fn spawn_worker_process(mut command: Command) -> Result<ProcessChannel, SpawnError> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    let writer = child
        .stdin
        .take()
        .ok_or_else(|| SpawnError::Other("stdin not captured".to_string()))?;
    let reader = child
        .stdout
        .take()
        .ok_or_else(|| SpawnError::Other("stdout not captured".to_string()))?;

    tracing::debug!(pid = ?child.id(), "Spawned worker process");
    Ok(ProcessChannel {
        reader,
        writer,
        child,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::codec::JsonCodec;
    use crate::bridge::protocol::{ControlRequest, WorkerMessage};
    use crate::testing::RepeatedWordEngine;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[tokio::test]
    async fn worker_thread_is_named_and_says_ready() {
        let channel = spawn_worker_thread(
            || {
                assert_eq!(std::thread::current().name(), Some("lint-test"));
                Ok(RepeatedWordEngine::new())
            },
            "lint-test",
            4096,
            WorkerConfig::default(),
        )
        .unwrap();

        let mut reader = FramedRead::new(channel.reader, JsonCodec::<WorkerMessage>::new());
        let mut writer = FramedWrite::new(channel.writer, JsonCodec::<ControlRequest>::new());
        assert!(matches!(reader.next().await.unwrap().unwrap().unwrap(), WorkerMessage::Ready));

        writer.send(ControlRequest::Shutdown).await.unwrap();
        assert!(matches!(
            reader.next().await.unwrap().unwrap().unwrap(),
            WorkerMessage::ShuttingDown
        ));
        tokio::task::spawn_blocking(move || channel.thread.join())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn worker_thread_exits_when_controller_hangs_up() {
        let channel = spawn_worker_thread(
            || Ok(RepeatedWordEngine::new()),
            "lint-test",
            4096,
            WorkerConfig::default(),
        )
        .unwrap();
        drop(channel.writer);
        drop(channel.reader);
        tokio::task::spawn_blocking(move || channel.thread.join())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn process_channel_carries_frames() {
        // `cat` echoes frames back unchanged.
        let channel = spawn_worker_process(Command::new("cat")).unwrap();
        let mut writer = FramedWrite::new(channel.writer, JsonCodec::<WorkerMessage>::new());
        let mut reader = FramedRead::new(channel.reader, JsonCodec::<WorkerMessage>::new());

        writer.send(WorkerMessage::Ready).await.unwrap();
        assert!(matches!(reader.next().await.unwrap().unwrap().unwrap(), WorkerMessage::Ready));
    }

    #[tokio::test]
    async fn missing_worker_binary_is_spawn_error() {
        let err = spawn_worker_process(Command::new("/nonexistent/lintlet-worker"))
            .err()
            .unwrap();
        assert!(matches!(err, SpawnError::Io(_)));
    }
}
