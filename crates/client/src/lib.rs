//! Brick Client
//!
//! Thin wrapper over the generated `llm.LLMService` client, used by the
//! `brick-client` command line tool.

pub mod llm_client;

pub use llm_client::LlmClient;
