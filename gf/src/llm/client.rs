//! LlmClient trait definition

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Stateless LLM client - each call is independent
///
/// One call is one HTTP round trip. Retry, timeout and schema policy live in
/// [`super::LlmGateway`], not in the clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Model identifier, for logging
    fn model(&self) -> &str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing::debug;

    use crate::llm::TokenUsage;

    /// One scripted reply
    #[derive(Debug, Clone)]
    pub enum MockReply {
        /// Successful text response with a fixed usage
        Text(String),
        /// HTTP error with the given status
        Fail(u16),
        /// Never answers within any sane timeout
        Hang,
    }

    impl MockReply {
        pub fn text(s: impl Into<String>) -> Self {
            MockReply::Text(s.into())
        }

        pub fn json(value: serde_json::Value) -> Self {
            MockReply::Text(value.to_string())
        }
    }

    type Router = Box<dyn Fn(&CompletionRequest) -> MockReply + Send + Sync>;

    /// Mock LLM client for unit tests
    ///
    /// Either replays a fixed script in order or routes each request through a
    /// closure. Every reply reports 10 input and 5 output tokens.
    pub struct MockLlmClient {
        script: Mutex<VecDeque<MockReply>>,
        router: Option<Router>,
        requests: Mutex<Vec<CompletionRequest>>,
        call_count: AtomicUsize,
    }

    impl MockLlmClient {
        pub fn new(replies: Vec<MockReply>) -> Self {
            debug!(reply_count = %replies.len(), "MockLlmClient::new: called");
            Self {
                script: Mutex::new(replies.into()),
                router: None,
                requests: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn with_router(router: impl Fn(&CompletionRequest) -> MockReply + Send + Sync + 'static) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                router: Some(Box::new(router)),
                requests: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// User prompts seen so far, in call order
        pub fn prompts(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.messages.iter().map(|m| m.content.clone()).collect::<Vec<_>>().join("\n"))
                .collect()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%idx, "MockLlmClient::complete: called");
            let reply = match &self.router {
                Some(router) => router(&request),
                None => self
                    .script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .ok_or_else(|| LlmError::InvalidResponse("No more mock responses".to_string()))?,
            };
            self.requests.lock().unwrap().push(request);

            match reply {
                MockReply::Text(text) => Ok(CompletionResponse {
                    text,
                    stop_reason: crate::llm::StopReason::EndTurn,
                    usage: TokenUsage {
                        input_tokens: 10,
                        output_tokens: 5,
                    },
                }),
                MockReply::Fail(status) => Err(LlmError::ApiError {
                    status,
                    message: "mock failure".to_string(),
                }),
                MockReply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(LlmError::InvalidResponse("mock hang elapsed".to_string()))
                }
            }
        }

        fn model(&self) -> &str {
            "mock"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::llm::Message;

        fn request(text: &str) -> CompletionRequest {
            CompletionRequest {
                system_prompt: "Test".to_string(),
                messages: vec![Message::user(text)],
                max_tokens: 1000,
                temperature: None,
            }
        }

        #[tokio::test]
        async fn test_mock_client_returns_responses_in_order() {
            let client = MockLlmClient::new(vec![MockReply::text("Response 1"), MockReply::text("Response 2")]);

            let resp1 = client.complete(request("a")).await.unwrap();
            assert_eq!(resp1.text, "Response 1");
            let resp2 = client.complete(request("b")).await.unwrap();
            assert_eq!(resp2.text, "Response 2");

            assert_eq!(client.call_count(), 2);
            assert_eq!(client.prompts(), vec!["a".to_string(), "b".to_string()]);
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            assert!(client.complete(request("a")).await.is_err());
        }

        #[tokio::test]
        async fn test_mock_client_router() {
            let client = MockLlmClient::with_router(|req| {
                if req.messages[0].content.contains("ping") {
                    MockReply::text("pong")
                } else {
                    MockReply::Fail(400)
                }
            });
            assert_eq!(client.complete(request("ping")).await.unwrap().text, "pong");
            assert!(client.complete(request("other")).await.is_err());
        }
    }
}
