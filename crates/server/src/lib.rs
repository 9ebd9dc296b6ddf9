//! Brick Server
//!
//! Streaming LLM inference over gRPC. A single model is loaded at startup
//! and shared by every call; each `GenerateStream` call runs generation on
//! a blocking thread and relays fragments to the client as they appear.

pub mod backend;
pub mod bridge;
pub mod connection;
pub mod generation;
pub mod grpc;
pub mod lifecycle;
pub mod model;
pub mod template;

#[cfg(test)]
mod testing;

pub use bridge::{StreamHandle, StreamingBridge};
pub use generation::{GenerationWorker, StreamEvent};
pub use grpc::{InferenceService, StreamState, STOP_ACK};
pub use lifecycle::{ServerLifecycle, ShutdownSignal};
pub use model::{Fragments, LoadState, ModelHost, ModelLoader, TextGenerator};
pub use template::{ChatPrompt, ChatTemplate};
