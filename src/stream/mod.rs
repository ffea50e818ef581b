//! Streaming-chunk translation.
//!
//! [`StreamTranslator`] is a per-stream state machine that converts
//! backend-native delta events into the canonical chunk sequence:
//! `NotStarted -> Streaming -> Terminated`, exactly one `Start` at
//! sequence 0, strictly incrementing sequence numbers, and exactly one
//! terminal `Done` or `Error` chunk. Input after termination is ignored.

use crate::error::GatewayError;
use crate::ir::{ErrorInfo, FinishReason, Message, Role, StreamChunk, Usage};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

/// Streaming delivery style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Content chunks carry only the incremental delta.
    #[default]
    Delta,
    /// Content chunks carry the full text so far.
    Accumulated,
}

/// Options controlling chunk assembly and re-serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    pub mode: StreamMode,
    /// Carry both `delta` and `accumulated` on every content chunk.
    pub include_both: bool,
}

impl StreamOptions {
    fn wants_accumulated(&self) -> bool {
        self.include_both || self.mode == StreamMode::Accumulated
    }
}

/// Backend-native event vocabulary fed into the translator.
#[derive(Debug)]
pub enum BackendEvent {
    /// Stream opened; the model name if the backend reports one.
    Start { model: Option<String> },
    /// Incremental text.
    Delta(String),
    /// Incremental tool-call data.
    ToolCallDelta {
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// Successful end of stream.
    Done {
        finish_reason: FinishReason,
        usage: Option<Usage>,
    },
    /// Underlying transport failure.
    TransportError(GatewayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TranslatorState {
    NotStarted,
    Streaming,
    Terminated,
}

/// Per-stream translation state machine.
pub struct StreamTranslator {
    state: TranslatorState,
    sequence: u64,
    buffer: String,
    options: StreamOptions,
    request_id: String,
}

impl StreamTranslator {
    pub fn new(request_id: impl Into<String>, options: StreamOptions) -> Self {
        Self {
            state: TranslatorState::NotStarted,
            sequence: 0,
            buffer: String::new(),
            options,
            request_id: request_id.into(),
        }
    }

    /// Whether the terminal chunk has been emitted.
    pub fn is_terminated(&self) -> bool {
        self.state == TranslatorState::Terminated
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }

    fn start_chunk(&mut self, model: Option<String>) -> StreamChunk {
        self.state = TranslatorState::Streaming;
        StreamChunk::Start {
            sequence: self.next_sequence(),
            request_id: self.request_id.clone(),
            model,
        }
    }

    /// Translate one backend event into zero or more canonical chunks.
    ///
    /// A delta arriving before an explicit start implies the start; events
    /// after termination produce nothing.
    pub fn translate(&mut self, event: BackendEvent) -> Vec<StreamChunk> {
        if self.state == TranslatorState::Terminated {
            return Vec::new();
        }
        let mut out = Vec::new();
        match event {
            BackendEvent::Start { model } => {
                if self.state == TranslatorState::NotStarted {
                    out.push(self.start_chunk(model));
                }
            }
            BackendEvent::Delta(delta) => {
                if self.state == TranslatorState::NotStarted {
                    out.push(self.start_chunk(None));
                }
                self.buffer.push_str(&delta);
                let accumulated = self
                    .options
                    .wants_accumulated()
                    .then(|| self.buffer.clone());
                out.push(StreamChunk::Content {
                    sequence: self.next_sequence(),
                    delta,
                    accumulated,
                });
            }
            BackendEvent::ToolCallDelta { id, name, arguments } => {
                if self.state == TranslatorState::NotStarted {
                    out.push(self.start_chunk(None));
                }
                out.push(StreamChunk::ToolCall {
                    sequence: self.next_sequence(),
                    id,
                    name,
                    arguments_delta: arguments,
                });
            }
            BackendEvent::Done { finish_reason, usage } => {
                if self.state == TranslatorState::NotStarted {
                    out.push(self.start_chunk(None));
                }
                self.state = TranslatorState::Terminated;
                out.push(StreamChunk::Done {
                    sequence: self.next_sequence(),
                    finish_reason,
                    usage,
                    message: Message::text(Role::Assistant, std::mem::take(&mut self.buffer)),
                });
            }
            BackendEvent::TransportError(error) => {
                if self.state == TranslatorState::NotStarted {
                    out.push(self.start_chunk(None));
                }
                self.state = TranslatorState::Terminated;
                out.push(StreamChunk::Error {
                    sequence: self.next_sequence(),
                    error: ErrorInfo::from(&error),
                });
            }
        }
        out
    }

    /// Force termination without a terminal chunk, for cancellation: the
    /// stream ends in `Terminated` and no spurious `Done` is emitted.
    pub fn cancel(&mut self) {
        self.state = TranslatorState::Terminated;
    }
}

/// Adapt a lazy backend-event stream into a canonical chunk stream.
///
/// Pull-driven: nothing upstream is polled until the consumer asks for the
/// next chunk, and dropping the returned stream drops the upstream one.
pub fn translate_stream(
    request_id: impl Into<String>,
    options: StreamOptions,
    mut events: BoxStream<'static, BackendEvent>,
) -> BoxStream<'static, StreamChunk> {
    let mut translator = StreamTranslator::new(request_id, options);
    Box::pin(async_stream::stream! {
        while let Some(event) = events.next().await {
            for chunk in translator.translate(event) {
                let terminal = chunk.is_terminal();
                yield chunk;
                if terminal {
                    return;
                }
            }
        }
        // Upstream ended without a terminal event: surface it as a
        // streaming error so the consumer always sees a terminal chunk.
        if !translator.is_terminated() {
            for chunk in translator.translate(BackendEvent::TransportError(
                GatewayError::streaming("TRUNCATED", "backend stream ended without a terminal event"),
            )) {
                yield chunk;
            }
        }
    })
}
