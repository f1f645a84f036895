//! Controller-side request queue with single-flight dispatch.
//!
//! The queue knows nothing about I/O. The controller event loop feeds it calls
//! and worker messages, and transmits whatever [`RequestQueue::next_dispatch`]
//! hands back.
//!
//! States:
//! - `Starting`: worker has not signalled readiness; calls are buffered.
//! - `Idle`: nothing in flight.
//! - `Busy`: the head call has been transmitted and awaits its response.
//!
//! While `Busy` the head of the queue is the in-flight call, so an incoming
//! response settles the head. This is only sound because a second call is
//! never transmitted before the first is answered.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::bridge::protocol::{CallRecord, Procedure};
use crate::linter::LinterError;
use crate::value::{TaggedValue, Value, decode, encode};

pub(crate) type CallResult = Result<Value, LinterError>;

/// A caller waiting on a remote call.
pub(crate) struct PendingCall {
    procedure: Procedure,
    arguments: Vec<Value>,
    reply: oneshot::Sender<CallResult>,
}

impl PendingCall {
    pub(crate) fn new(
        procedure: Procedure,
        arguments: Vec<Value>,
    ) -> (Self, oneshot::Receiver<CallResult>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                procedure,
                arguments,
                reply,
            },
            rx,
        )
    }

    pub(crate) fn procedure(&self) -> Procedure {
        self.procedure
    }

    pub(crate) fn settle(self, result: CallResult) {
        if self.reply.send(result).is_err() {
            tracing::debug!(procedure = %self.procedure, "Caller dropped before call settled");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueState {
    Starting,
    Idle,
    Busy,
}

pub(crate) struct RequestQueue {
    pending: VecDeque<PendingCall>,
    state: QueueState,
}

impl RequestQueue {
    pub(crate) fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            state: QueueState::Starting,
        }
    }

    pub(crate) fn state(&self) -> QueueState {
        self.state
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Idle with nothing waiting.
    pub(crate) fn is_drained(&self) -> bool {
        self.state == QueueState::Idle && self.pending.is_empty()
    }

    pub(crate) fn push(&mut self, call: PendingCall) {
        tracing::trace!(procedure = %call.procedure, queued = self.pending.len() + 1, "Call enqueued");
        self.pending.push_back(call);
    }

    /// Leave `Starting`. Returns false if the worker was already ready.
    pub(crate) fn mark_ready(&mut self) -> bool {
        if self.state != QueueState::Starting {
            return false;
        }
        self.state = QueueState::Idle;
        true
    }

    /// Encode the head call and mark it in flight.
    ///
    /// Returns `None` unless `Idle` with work queued. A head whose arguments
    /// fail to encode is rejected on the spot and the next call is tried.
    pub(crate) fn next_dispatch(&mut self) -> Option<CallRecord> {
        if self.state != QueueState::Idle {
            return None;
        }

        loop {
            let head = self.pending.front_mut()?;
            let encoded = head
                .arguments
                .iter()
                .map(encode)
                .collect::<Result<Vec<_>, _>>();

            match encoded {
                Ok(arguments) => {
                    head.arguments.clear();
                    self.state = QueueState::Busy;
                    return Some(CallRecord {
                        procedure: head.procedure,
                        arguments,
                    });
                }
                Err(e) => {
                    if let Some(call) = self.pending.pop_front() {
                        tracing::warn!(procedure = %call.procedure, error = %e, "Rejecting call with unencodable arguments");
                        call.settle(Err(e.into()));
                    }
                }
            }
        }
    }

    /// Settle the in-flight call with a successful response.
    pub(crate) fn resolve_in_flight(&mut self, value: &TaggedValue) {
        let Some(call) = self.take_in_flight() else {
            tracing::warn!(kind = %value.kind, "Response received with no call in flight");
            return;
        };
        let result = decode(value).map_err(LinterError::from);
        if let Err(e) = &result {
            tracing::warn!(procedure = %call.procedure, error = %e, "Failed to decode response");
        }
        call.settle(result);
    }

    /// Settle the in-flight call with a failure.
    pub(crate) fn reject_in_flight(&mut self, error: LinterError) {
        match self.take_in_flight() {
            Some(call) => {
                tracing::debug!(procedure = %call.procedure, error = %error, "Call rejected");
                call.settle(Err(error));
            }
            None => {
                tracing::warn!(error = %error, "Error received with no call in flight");
            }
        }
    }

    /// Reject every queued call, in flight or not. Used when the worker is gone.
    pub(crate) fn fail_all(&mut self, error: &LinterError) {
        if !self.pending.is_empty() {
            tracing::warn!(count = self.pending.len(), error = %error, "Failing queued calls");
        }
        for call in self.pending.drain(..) {
            call.settle(Err(error.clone()));
        }
        if self.state == QueueState::Busy {
            self.state = QueueState::Idle;
        }
    }

    fn take_in_flight(&mut self) -> Option<PendingCall> {
        if self.state != QueueState::Busy {
            return None;
        }
        self.state = QueueState::Idle;
        self.pending.pop_front()
    }
}
