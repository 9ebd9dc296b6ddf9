//! Common error types for Brick
//!
//! This module defines all error types used across the Brick server and client.
//! All errors are convertible to gRPC status codes for proper error propagation.

use std::net::AddrParseError;
use thiserror::Error;

/// Main error type for Brick
#[derive(Error, Debug)]
pub enum BrickError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// gRPC communication errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    /// gRPC transport errors
    #[error("gRPC transport error: {0}")]
    GrpcTransport(#[from] tonic::transport::Error),

    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Model is not loaded yet
    #[error("Model not ready: {0}")]
    NotReady(String),

    /// Rejected request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend failure while producing fragments
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Model load failure, fatal for the process
    #[error("Startup failed: {0}")]
    Startup(String),

    /// Timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AddrParseError> for BrickError {
    fn from(err: AddrParseError) -> Self {
        BrickError::Parse(err.to_string())
    }
}

impl BrickError {
    /// Convert error to gRPC status code
    pub fn to_status(&self) -> tonic::Status {
        match self {
            BrickError::Grpc(status) => status.clone(),
            BrickError::GrpcTransport(_) => tonic::Status::unavailable("Transport error"),
            BrickError::Connection(msg) => {
                tonic::Status::unavailable(format!("Connection error: {}", msg))
            }
            BrickError::Config(msg) => {
                tonic::Status::internal(format!("Configuration error: {}", msg))
            }
            BrickError::NotReady(msg) => {
                tonic::Status::unavailable(format!("Model not ready: {}", msg))
            }
            BrickError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg.clone()),
            // Clients display the backend's own description
            BrickError::Generation(msg) => tonic::Status::internal(msg.clone()),
            BrickError::Startup(msg) => {
                tonic::Status::internal(format!("Startup failed: {}", msg))
            }
            BrickError::Timeout(msg) => {
                tonic::Status::deadline_exceeded(format!("Timeout: {}", msg))
            }
            BrickError::Io(err) => tonic::Status::internal(format!("I/O error: {}", err)),
            BrickError::Parse(msg) => {
                tonic::Status::invalid_argument(format!("Parse error: {}", msg))
            }
            BrickError::Internal(msg) => {
                tonic::Status::internal(format!("Internal error: {}", msg))
            }
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        BrickError::Config(msg.into())
    }

    /// Create a not-ready error
    pub fn not_ready(msg: impl Into<String>) -> Self {
        BrickError::NotReady(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        BrickError::InvalidRequest(msg.into())
    }

    /// Create a generation error
    pub fn generation(msg: impl Into<String>) -> Self {
        BrickError::Generation(msg.into())
    }

    /// Create a startup error
    pub fn startup(msg: impl Into<String>) -> Self {
        BrickError::Startup(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        BrickError::Timeout(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        BrickError::Internal(msg.into())
    }
}

/// Result type alias for Brick operations
pub type Result<T> = std::result::Result<T, BrickError>;
