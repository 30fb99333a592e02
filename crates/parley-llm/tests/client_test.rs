use futures::StreamExt;
use parley_llm::{
    ChatClient, ChatRequest, ClientFactory, LlmError, Message, OpenAIClient, ProviderConfig,
    StreamEvent,
};

const SSE_BODY: &str = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";

#[tokio::test]
async fn test_stream_against_compatible_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(SSE_BODY)
        .create_async()
        .await;

    let client = OpenAIClient::new("test-key").unwrap().with_base_url(server.url());
    let stream = client
        .chat_stream(ChatRequest::new("m", vec![Message::human("hello")]))
        .await
        .unwrap();
    let events: Vec<StreamEvent> = stream.map(|e| e.unwrap()).collect().await;

    mock.assert_async().await;
    assert_eq!(events[0], StreamEvent::Message { content: "hi".to_string() });
}

#[tokio::test]
async fn test_status_error_is_typed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let client = OpenAIClient::new("k")
        .unwrap()
        .with_base_url(server.url())
        .with_provider_name("groq");
    let err = client
        .chat_stream(ChatRequest::new("m", vec![Message::human("hello")]))
        .await
        .err()
        .expect("should fail");

    let llm_error = err.downcast_ref::<LlmError>().expect("typed error");
    assert_eq!(llm_error.status(), Some(503));
    assert!(llm_error.is_retryable());
}

#[tokio::test]
async fn test_chain_moves_to_second_provider() {
    let mut primary = mockito::Server::new_async().await;
    primary
        .mock("POST", "/chat/completions")
        .with_status(401)
        .create_async()
        .await;

    let mut secondary = mockito::Server::new_async().await;
    let second = secondary
        .mock("POST", "/chat/completions")
        .match_body(mockito::Matcher::PartialJsonString(
            "{\"model\":\"backup-model\"}".to_string(),
        ))
        .with_status(200)
        .with_body(SSE_BODY)
        .create_async()
        .await;

    let chain = ClientFactory::create_fallback_chain(&[
        ProviderConfig::new("primary", primary.url(), "main-model", "k"),
        ProviderConfig::new("secondary", secondary.url(), "backup-model", "k"),
    ])
    .unwrap();

    let stream = chain
        .chat_stream(ChatRequest::new("unused", vec![Message::human("hello")]))
        .await
        .unwrap();
    let events: Vec<_> = stream.collect().await;

    second.assert_async().await;
    assert!(events.iter().all(|e| e.is_ok()));
}
