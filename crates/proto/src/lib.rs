//! Brick Protocol Buffers
//!
//! Wire messages for the `llm.LLMService` gRPC service. The field numbers
//! match `proto/llm.proto`, which is the contract shared with non-Rust
//! clients. The tonic client and server are generated by `build.rs`.

/// Request to stream a completion for a single prompt
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GenerateRequest {
    /// User prompt, forwarded as-is (may be empty)
    #[prost(string, tag = "1")]
    pub prompt: ::prost::alloc::string::String,

    /// Upper bound on generated tokens, must be positive
    #[prost(int32, tag = "2")]
    pub max_tokens: i32,
}

/// One generated text fragment
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TokenChunk {
    #[prost(string, tag = "1")]
    pub token: ::prost::alloc::string::String,
}

/// Out-of-band stop command
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopRequest {
    /// Free-text reason, logged by the server
    #[prost(string, tag = "1")]
    pub reason: ::prost::alloc::string::String,
}

/// Acknowledgement of a stop command
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopResponse {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}

/// Generated `llm.LLMService` client and server
#[allow(clippy::all)]
pub mod llm {
    include!(concat!(env!("OUT_DIR"), "/llm.LLMService.rs"));
}

// The wire name keeps the upper-case acronym; Rust code uses the aliases
pub use llm::l_l_m_service_client::LLMServiceClient as LlmServiceClient;
pub use llm::l_l_m_service_server::{
    LLMService as LlmService, LLMServiceServer as LlmServiceServer, SERVICE_NAME,
};
