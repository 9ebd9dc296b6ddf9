//! gRPC surface of the server

pub mod service;

pub use service::{InferenceService, StreamState, STOP_ACK};
