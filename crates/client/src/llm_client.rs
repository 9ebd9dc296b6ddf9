//! Client for the streaming inference service

use brick_common::error::{BrickError, Result};
use brick_proto::{GenerateRequest, LlmServiceClient, StopRequest, TokenChunk};
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Streaming};
use tracing::debug;

/// Connection to a Brick server
#[derive(Clone)]
pub struct LlmClient {
    endpoint: String,
    inner: LlmServiceClient<Channel>,

    /// Deadline for a whole call, including every streamed fragment
    timeout: Option<Duration>,
}

impl LlmClient {
    /// Connect to a server endpoint such as `http://localhost:50051`
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| BrickError::Connection(format!("invalid endpoint {}: {}", endpoint, e)))?
            .connect_timeout(Duration::from_secs(5))
            .connect()
            .await?;

        debug!("Connected to {}", endpoint);

        Ok(Self {
            endpoint: endpoint.to_string(),
            inner: LlmServiceClient::new(channel),
            timeout: None,
        })
    }

    /// Bound every call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        if let Some(timeout) = self.timeout {
            request.set_timeout(timeout);
        }
        request
    }

    /// Open a token stream for `prompt`
    pub async fn generate_stream(
        &mut self,
        prompt: &str,
        max_tokens: i32,
    ) -> Result<Streaming<TokenChunk>> {
        let request = self.request(GenerateRequest {
            prompt: prompt.to_string(),
            max_tokens,
        });
        let response = self.inner.generate_stream(request).await?;

        Ok(response.into_inner())
    }

    /// Stream a completion, calling `on_token` for every fragment as it
    /// arrives. Returns the full text once the stream ends.
    pub async fn generate<F>(&mut self, prompt: &str, max_tokens: i32, mut on_token: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let deadline = self.timeout;
        let call = async {
            let mut stream = self.generate_stream(prompt, max_tokens).await?;
            let mut text = String::new();

            while let Some(chunk) = stream.message().await? {
                on_token(&chunk.token);
                text.push_str(&chunk.token);
            }
            Ok::<_, BrickError>(text)
        };

        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .map_err(|_| BrickError::timeout(format!("no complete answer within {:?}", deadline)))?,
            None => call.await,
        }
    }

    /// Ask the server to stop; returns its acknowledgement
    pub async fn stop_server(&mut self, reason: &str) -> Result<String> {
        let request = self.request(StopRequest {
            reason: reason.to_string(),
        });
        let response = self.inner.stop_server(request).await?;

        Ok(response.into_inner().message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brick_proto::{LlmService, LlmServiceServer, StopResponse};
    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::{Response, Status};

    /// Accepts every call and never produces a fragment
    struct Stalled;

    #[tonic::async_trait]
    impl LlmService for Stalled {
        type GenerateStreamStream = tokio_stream::Pending<std::result::Result<TokenChunk, Status>>;

        async fn generate_stream(
            &self,
            _request: Request<GenerateRequest>,
        ) -> std::result::Result<Response<Self::GenerateStreamStream>, Status> {
            Ok(Response::new(tokio_stream::pending()))
        }

        async fn stop_server(
            &self,
            _request: Request<StopRequest>,
        ) -> std::result::Result<Response<StopResponse>, Status> {
            Ok(Response::new(StopResponse {
                message: "ok".to_string(),
            }))
        }
    }

    async fn stalled_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(
            tonic::transport::Server::builder()
                .add_service(LlmServiceServer::new(Stalled))
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_generate_times_out() {
        let endpoint = stalled_server().await;
        let mut client = LlmClient::connect(&endpoint)
            .await
            .unwrap()
            .with_timeout(Duration::from_millis(200));

        let result = client.generate("hello", 8, |_| {}).await;

        assert!(matches!(result, Err(BrickError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_stop_server_returns_ack() {
        let endpoint = stalled_server().await;
        let mut client = LlmClient::connect(&endpoint)
            .await
            .unwrap()
            .with_timeout(Duration::from_secs(5));

        assert_eq!(client.stop_server("done").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let result = LlmClient::connect("not a uri").await;

        assert!(matches!(result, Err(BrickError::Connection(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // Port 9 (discard) is not expected to run a gRPC server
        let result = LlmClient::connect("http://127.0.0.1:9").await;

        assert!(result.is_err());
    }
}
