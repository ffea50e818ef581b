//! Canonical intermediate representation (IR) for chat traffic.
//!
//! Every provider wire format is normalized into these types on the way in
//! and re-serialized from them on the way out. IR values are per-request
//! value objects: created when a request enters the gateway, discarded once
//! the response (or the last stream chunk) has been produced.

mod chunk;
mod message;
mod request;
mod response;

pub use chunk::{ErrorInfo, StreamChunk};
pub use message::{ContentBlock, ImageSource, Message, MessageContent, Role};
pub use request::{ChatRequest, Parameters, Provenance, RequestMetadata, ToolDefinition};
pub use response::{ChatResponse, FinishReason, Usage};
