//! IPC bridge between the controller and a worker.
//!
//! - **protocol**: Message types (ControlRequest, WorkerMessage, CallRecord)
//! - **codec**: JSON framing codec for AsyncRead/AsyncWrite
//! - **transport**: Worker thread and process channels

pub mod codec;
pub mod protocol;
pub mod transport;
