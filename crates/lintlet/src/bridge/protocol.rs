//! Wire protocol types for controller-worker communication.
//!
//! One duplex channel carries everything:
//! - **Controller → worker**: `Call`, `Shutdown`
//! - **Worker → controller**: `Ready` (once, after the engine is built),
//!   `Response` / `Error` (exactly one per call), `SetupFailed`, `ShuttingDown`
//!
//! Responses carry no call id. The controller never has more than one call
//! outstanding, so a response always belongs to the oldest unanswered call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::TaggedValue;

/// Remote operations the worker exposes. Serialized by their camelCase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Procedure {
    Setup,
    Lint,
    ApplySuggestion,
    IsLikelyEnglish,
    IsolateEnglish,
    GetLintConfig,
    SetLintConfig,
}

impl Procedure {
    pub const ALL: [Procedure; 7] = [
        Self::Setup,
        Self::Lint,
        Self::ApplySuggestion,
        Self::IsLikelyEnglish,
        Self::IsolateEnglish,
        Self::GetLintConfig,
        Self::SetLintConfig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Lint => "lint",
            Self::ApplySuggestion => "applySuggestion",
            Self::IsLikelyEnglish => "isLikelyEnglish",
            Self::IsolateEnglish => "isolateEnglish",
            Self::GetLintConfig => "getLintConfig",
            Self::SetLintConfig => "setLintConfig",
        }
    }

    /// Number of arguments the procedure takes.
    pub fn arity(&self) -> usize {
        match self {
            Self::Setup | Self::GetLintConfig => 0,
            Self::Lint | Self::IsLikelyEnglish | Self::IsolateEnglish | Self::SetLintConfig => 1,
            Self::ApplySuggestion => 3,
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested remote operation with its encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    #[serde(rename = "procedureName")]
    pub procedure: Procedure,
    pub arguments: Vec<TaggedValue>,
}

/// Messages from controller to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    Call(CallRecord),

    /// Sent once the controller has no callers left and nothing queued.
    Shutdown,
}

/// Messages from worker to controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Engine is built; calls may flow. Sent exactly once.
    Ready,

    /// Engine construction failed. The worker exits after sending this.
    SetupFailed { reason: String },

    /// Successful return value of the in-flight call.
    Response { value: TaggedValue },

    /// The in-flight call failed. Kept apart from `Response` so an empty or
    /// falsy result is never mistaken for a failure.
    Error { error: RemoteError },

    ShuttingDown,
}

/// Why the worker could not produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The procedure ran and failed (or its result could not be encoded).
    Procedure,
    /// The call message could not be turned into a call.
    Undecodable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn procedure(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Procedure,
            message: message.into(),
        }
    }

    pub fn undecodable(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Undecodable,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeTag;

    #[test]
    fn call_serializes() {
        let req = ControlRequest::Call(CallRecord {
            procedure: Procedure::ApplySuggestion,
            arguments: vec![TaggedValue::new(TypeTag::String, "\"an test\"")],
        });
        insta::assert_json_snapshot!(req, @r#"
        {
          "type": "call",
          "procedureName": "applySuggestion",
          "arguments": [
            {
              "payload": "\"an test\"",
              "kind": "string"
            }
          ]
        }
        "#);
    }

    #[test]
    fn shutdown_serializes() {
        insta::assert_json_snapshot!(ControlRequest::Shutdown, @r#"
        {
          "type": "shutdown"
        }
        "#);
    }

    #[test]
    fn ready_serializes() {
        insta::assert_json_snapshot!(WorkerMessage::Ready, @r#"
        {
          "type": "ready"
        }
        "#);
    }

    #[test]
    fn response_serializes() {
        let msg = WorkerMessage::Response {
            value: TaggedValue::new(TypeTag::Boolean, "false"),
        };
        insta::assert_json_snapshot!(msg, @r#"
        {
          "type": "response",
          "value": {
            "payload": "false",
            "kind": "boolean"
          }
        }
        "#);
    }

    #[test]
    fn error_serializes() {
        let msg = WorkerMessage::Error {
            error: RemoteError::procedure("span [100, 200) is out of bounds"),
        };
        insta::assert_json_snapshot!(msg, @r#"
        {
          "type": "error",
          "error": {
            "kind": "procedure",
            "message": "span [100, 200) is out of bounds"
          }
        }
        "#);
    }

    #[test]
    fn setup_failed_serializes() {
        let msg = WorkerMessage::SetupFailed {
            reason: "dictionary missing".to_string(),
        };
        insta::assert_json_snapshot!(msg, @r#"
        {
          "type": "setup_failed",
          "reason": "dictionary missing"
        }
        "#);
    }

    #[test]
    fn procedure_names_match_wire_names() {
        for procedure in Procedure::ALL {
            let json = serde_json::to_string(&procedure).unwrap();
            assert_eq!(json, format!("\"{}\"", procedure.as_str()));
        }
    }

    #[test]
    fn unknown_procedure_is_rejected() {
        let result = serde_json::from_str::<ControlRequest>(
            r#"{"type":"call","procedureName":"deleteEverything","arguments":[]}"#,
        );
        assert!(result.is_err());
    }
}
