use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::{is_retryable, LlmError};
use crate::traits::{ChatClient, ChatRequest, ChatResponse, ChatStream};

pub type RetryPredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// One provider endpoint plus the model it serves.
#[derive(Clone)]
pub struct ProviderRoute {
    pub name: String,
    pub model: String,
    pub client: Arc<dyn ChatClient>,
}

impl ProviderRoute {
    pub fn new(name: impl Into<String>, model: impl Into<String>, client: Arc<dyn ChatClient>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            client,
        }
    }
}

/// Ordered provider chain.
///
/// Each attempt rewrites the request's model to the route's model. A failure
/// before the first streamed item moves on to the next route when the retry
/// predicate accepts it; anything else is returned as-is. Failures after
/// output has started are never retried.
pub struct FallbackClient {
    routes: Vec<ProviderRoute>,
    should_retry: RetryPredicate,
}

impl FallbackClient {
    pub fn new(routes: Vec<ProviderRoute>) -> Self {
        Self {
            routes,
            should_retry: Arc::new(is_retryable),
        }
    }

    pub fn with_retry_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn routes(&self) -> &[ProviderRoute] {
        &self.routes
    }

    async fn attempt<T, F, Fut>(&self, request: ChatRequest, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn ChatClient>, ChatRequest) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for (position, route) in self.routes.iter().enumerate() {
            let routed = request.clone().with_model(route.model.clone());

            match call(Arc::clone(&route.client), routed).await {
                Ok(value) => {
                    if position > 0 {
                        tracing::info!(provider = %route.name, model = %route.model, "fallback provider answered");
                    }
                    return Ok(value);
                }
                Err(err) if (self.should_retry)(&err) => {
                    tracing::warn!(
                        provider = %route.name,
                        model = %route.model,
                        error = %err,
                        "provider failed, trying next in chain"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::NoProviders.into()))
    }
}

#[async_trait]
impl ChatClient for FallbackClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.attempt(request, |client, req| async move { client.chat(req).await })
            .await
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        self.attempt(request, |client, req| async move { client.chat_stream(req).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::StreamEvent;
    use crate::types::Message;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubClient {
        status: Option<u16>,
        calls: AtomicUsize,
        seen_models: Mutex<Vec<String>>,
    }

    impl StubClient {
        fn new(status: Option<u16>) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: AtomicUsize::new(0),
                seen_models: Mutex::new(Vec::new()),
            })
        }

        fn outcome(&self, model: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_models.lock().unwrap().push(model.to_string());
            match self.status {
                Some(status) => Err(LlmError::Status {
                    provider: "stub".to_string(),
                    status,
                    body: "boom".to_string(),
                }
                .into()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ChatClient for StubClient {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
            self.outcome(&request.model)?;
            Ok(ChatResponse {
                content: Some(request.model.clone()),
                tool_calls: None,
                usage: None,
                finish_reason: Some("stop".to_string()),
                raw: serde_json::Value::Null,
            })
        }

        async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
            self.outcome(&request.model)?;
            Ok(Box::pin(futures::stream::iter(vec![Ok(StreamEvent::Message {
                content: request.model,
            })])))
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::new("ignored", vec![Message::human("hi")])
    }

    #[tokio::test]
    async fn test_falls_back_on_availability_error() {
        let primary = StubClient::new(Some(503));
        let secondary = StubClient::new(None);
        let chain = FallbackClient::new(vec![
            ProviderRoute::new("groq", "gpt-oss", primary.clone()),
            ProviderRoute::new("deepinfra", "deepseek", secondary.clone()),
        ]);

        let mut stream = chain.chat_stream(request()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();

        assert_eq!(first, StreamEvent::Message { content: "deepseek".to_string() });
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*primary.seen_models.lock().unwrap(), vec!["gpt-oss".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let primary = StubClient::new(Some(400));
        let secondary = StubClient::new(None);
        let chain = FallbackClient::new(vec![
            ProviderRoute::new("groq", "a", primary),
            ProviderRoute::new("deepinfra", "b", secondary.clone()),
        ]);

        let err = chain.chat(request()).await.unwrap_err();
        assert_eq!(err.downcast_ref::<LlmError>().and_then(LlmError::status), Some(400));
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_returns_last_error() {
        let chain = FallbackClient::new(vec![
            ProviderRoute::new("a", "a", StubClient::new(Some(401))),
            ProviderRoute::new("b", "b", StubClient::new(Some(502))),
        ]);

        let err = chain.chat(request()).await.unwrap_err();
        assert_eq!(err.downcast_ref::<LlmError>().and_then(LlmError::status), Some(502));
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let chain = FallbackClient::new(vec![]);
        let err = chain.chat(request()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<LlmError>(), Some(LlmError::NoProviders)));
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let secondary = StubClient::new(None);
        let chain = FallbackClient::new(vec![
            ProviderRoute::new("a", "a", StubClient::new(Some(400))),
            ProviderRoute::new("b", "b", secondary.clone()),
        ])
        .with_retry_predicate(|_| true);

        let response = chain.chat(request()).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("b"));
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }
}
