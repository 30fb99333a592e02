use futures::StreamExt;
use parley_llm::streaming::parse_sse_bytes;
use parley_llm::StreamEvent;

fn chunks(parts: &[&str]) -> Vec<Result<Vec<u8>, std::io::Error>> {
    parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect()
}

async fn collect(parts: &[&str]) -> Vec<StreamEvent> {
    let stream = parse_sse_bytes(futures::stream::iter(chunks(parts)));
    stream
        .map(|event| event.expect("event should parse"))
        .collect()
        .await
}

#[tokio::test]
async fn test_message_and_finish_reason() {
    let events = collect(&[
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    ])
    .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Message { content: "Hel".to_string() },
            StreamEvent::Message { content: "lo".to_string() },
            StreamEvent::Done { finish_reason: Some("stop".to_string()) },
            StreamEvent::Done { finish_reason: None },
        ]
    );
}

#[tokio::test]
async fn test_line_split_across_chunks() {
    let events = collect(&[
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"con",
        "tent\":\"split\"},\"finish_reason\":null}]}\n",
        "\ndata: [DONE]\n",
    ])
    .await;

    assert_eq!(events[0], StreamEvent::Message { content: "split".to_string() });
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_reasoning_aliases() {
    let events = collect(&[
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning\":\"a\"},\"finish_reason\":null}]}\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"b\"},\"finish_reason\":null}]}\n",
    ])
    .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Reasoning { content: "a".to_string() },
            StreamEvent::Reasoning { content: "b".to_string() },
        ]
    );
}

#[tokio::test]
async fn test_tool_call_fragments() {
    let events = collect(&[
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"list_credentials\",\"arguments\":\"\"}}]},\"finish_reason\":null}]}\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{}\"}}]},\"finish_reason\":\"tool_calls\"}]}\n",
    ])
    .await;

    match &events[0] {
        StreamEvent::ToolCall { index, id, name, .. } => {
            assert_eq!(*index, 0);
            assert_eq!(id.as_deref(), Some("call_1"));
            assert_eq!(name.as_deref(), Some("list_credentials"));
        }
        other => panic!("Expected ToolCall, got {:?}", other),
    }
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Done { finish_reason: Some("tool_calls".to_string()) })
    );
}

#[tokio::test]
async fn test_malformed_chunk_is_an_error_item() {
    let stream = parse_sse_bytes(futures::stream::iter(chunks(&["data: {not json}\n"])));
    let items: Vec<_> = stream.collect().await;

    assert_eq!(items.len(), 1);
    assert!(items[0].is_err());
}

#[test]
fn test_stream_event_serialization() {
    let event = StreamEvent::Message { content: "Test".to_string() };

    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"type\":\"message\""));
}
