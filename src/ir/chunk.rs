//! Stream chunks: the canonical unit of a translated token stream.

use super::message::Message;
use super::response::{FinishReason, Usage};
use serde::{Deserialize, Serialize};

/// One event in a canonical chunk stream.
///
/// Chunks for a single stream are totally ordered by `sequence` with no
/// gaps and no duplicates: exactly one `Start` at sequence 0, then zero or
/// more `Content`/`ToolCall` chunks, then exactly one terminal `Done` or
/// `Error`. The [`crate::stream::StreamTranslator`] enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamChunk {
    Start {
        sequence: u64,
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Content {
        sequence: u64,
        /// Incremental text since the previous content chunk.
        delta: String,
        /// Full text so far; populated only in accumulated mode.
        #[serde(skip_serializing_if = "Option::is_none")]
        accumulated: Option<String>,
    },
    ToolCall {
        sequence: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        arguments_delta: String,
    },
    Done {
        sequence: u64,
        finish_reason: FinishReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        /// The fully assembled assistant message.
        message: Message,
    },
    Error {
        sequence: u64,
        error: ErrorInfo,
    },
}

impl StreamChunk {
    pub fn sequence(&self) -> u64 {
        match self {
            StreamChunk::Start { sequence, .. }
            | StreamChunk::Content { sequence, .. }
            | StreamChunk::ToolCall { sequence, .. }
            | StreamChunk::Done { sequence, .. }
            | StreamChunk::Error { sequence, .. } => *sequence,
        }
    }

    /// True for `Done` and `Error`, after which the stream is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Done { .. } | StreamChunk::Error { .. })
    }
}

/// Serializable projection of a [`crate::error::GatewayError`], carried
/// in-band by terminal `Error` chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub category: crate::error::ErrorCategory,
    pub message: String,
    pub retryable: bool,
}

impl From<&crate::error::GatewayError> for ErrorInfo {
    fn from(err: &crate::error::GatewayError) -> Self {
        Self {
            code: err.code.clone(),
            category: err.category,
            message: err.message.clone(),
            retryable: err.retryable,
        }
    }
}
