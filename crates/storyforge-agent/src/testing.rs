// ABOUTME: Test utilities for storyforge-agent, including a scripted stub completion client.
// ABOUTME: Used in tests to simulate the external service without real API calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{CompletionClient, CompletionError, CompletionRequest, CompletionResponse};

/// A stub completion client that replays a scripted queue of responses.
///
/// Each `complete` call pops the next scripted response; once the script is
/// exhausted the configured default response is returned indefinitely. All
/// received requests are recorded for assertions.
pub struct StubCompletionClient {
    script: Mutex<VecDeque<CompletionResponse>>,
    default: CompletionResponse,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl StubCompletionClient {
    /// A stub that always returns the given text.
    pub fn text(response_text: &str) -> Self {
        Self::with_script_and_default(Vec::new(), CompletionResponse::text(response_text))
    }

    /// A stub that replays the script, then falls back to "Done.".
    pub fn with_script(script: Vec<CompletionResponse>) -> Self {
        Self::with_script_and_default(script, CompletionResponse::text("Done."))
    }

    /// A stub with both a script and an explicit fallback response.
    pub fn with_script_and_default(
        script: Vec<CompletionResponse>,
        default: CompletionResponse,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the recorded requests, for assertions after the fact.
    pub fn requests(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl CompletionClient for StubCompletionClient {
    async fn complete(
        &self,
        req: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        self.requests.lock().unwrap().push(req.clone());
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.default.clone()))
    }

    fn provider_name(&self) -> &str {
        "stub"
    }
}

/// A stub client whose every call fails with a provider error, for testing
/// transport-failure propagation.
pub struct FailingCompletionClient;

#[async_trait]
impl CompletionClient for FailingCompletionClient {
    async fn complete(
        &self,
        _req: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        Err(CompletionError::Provider("connection refused".to_string()))
    }

    fn provider_name(&self) -> &str {
        "failing-stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatMessage;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "stub-model".to_string(),
            messages: vec![ChatMessage::new("user", "hello")],
            tool_schemas: Vec::new(),
        }
    }

    #[tokio::test]
    async fn stub_replays_script_then_default() {
        let stub = StubCompletionClient::with_script(vec![
            CompletionResponse::text("first"),
            CompletionResponse::text("second"),
        ]);

        assert_eq!(
            stub.complete(&request()).await.unwrap().content.as_deref(),
            Some("first")
        );
        assert_eq!(
            stub.complete(&request()).await.unwrap().content.as_deref(),
            Some("second")
        );
        assert_eq!(
            stub.complete(&request()).await.unwrap().content.as_deref(),
            Some("Done.")
        );
    }

    #[tokio::test]
    async fn stub_records_requests() {
        let stub = StubCompletionClient::text("ok");
        let requests = stub.requests();

        stub.complete(&request()).await.unwrap();
        stub.complete(&request()).await.unwrap();

        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failing_stub_always_errors() {
        let err = FailingCompletionClient
            .complete(&request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
