use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parley_graph::{
    ChatOrchestrator, FinalizeError, Finalized, Graph, GraphConfig, PreparedTurn, StreamEvent, TurnError, TurnRequest,
};
use parley_llm::{ChatClient, ChatRequest, ChatResponse, ChatStream, Message, StreamEvent as LlmEvent};
use parley_persist::cache::{thread_key, usage_key};
use parley_persist::{
    ActiveUser, BranchedThread, CacheClient, CacheTtls, CommittedTurn, CredentialRecord, HistoryRequest,
    MemoryCache, MemoryPersistenceClient, MessageQuery, NewCredential, PersistClient, PersistError,
    PersistenceClient, StoredMessage, Tenant, Thread, ThreadQuery, TurnCommit, Usage, User,
};
use parley_tools::{ProviderEndpoints, ToolRegistry};
use tokio::sync::mpsc;
use uuid::Uuid;

enum Step {
    Events(Vec<LlmEvent>),
    FailMidStream,
}

/// Replays canned model steps in order and records every request.
#[derive(Default)]
struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> ChatRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat(&self, _request: ChatRequest) -> anyhow::Result<ChatResponse> {
        Err(anyhow!("not scripted"))
    }

    async fn chat_stream(&self, request: ChatRequest) -> anyhow::Result<ChatStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("script exhausted"))?;

        let items: Vec<anyhow::Result<LlmEvent>> = match step {
            Step::Events(events) => events.into_iter().map(Ok).collect(),
            Step::FailMidStream => vec![
                Ok(LlmEvent::Message { content: "partial".into() }),
                Err(anyhow!("connection reset")),
            ],
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

fn reply(text: &str) -> Step {
    Step::Events(vec![
        LlmEvent::Message { content: text.to_string() },
        LlmEvent::Done { finish_reason: Some("stop".into()) },
    ])
}

fn call_tool(id: &str, name: &str) -> Step {
    Step::Events(vec![
        LlmEvent::ToolCall {
            index: 0,
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            arguments: Some("{}".into()),
        },
        LlmEvent::Done { finish_reason: Some("tool_calls".into()) },
    ])
}

/// In-memory store whose turn commit or usage increment can be made to fail.
struct FlakyStore {
    inner: Arc<MemoryPersistenceClient>,
    fail_commit: AtomicBool,
    fail_increment: AtomicBool,
}

impl FlakyStore {
    fn new(inner: Arc<MemoryPersistenceClient>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_commit: AtomicBool::new(false),
            fail_increment: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl PersistenceClient for FlakyStore {
    async fn get_usage(&self, slug: &str) -> parley_persist::Result<Option<Usage>> {
        self.inner.get_usage(slug).await
    }

    async fn increment_usage(&self, slug: &str) -> parley_persist::Result<Usage> {
        if self.fail_increment.load(Ordering::SeqCst) {
            return Err(PersistError::Internal("tenants collection unavailable".into()));
        }
        self.inner.increment_usage(slug).await
    }

    async fn find_credentials(&self, user: &ActiveUser) -> parley_persist::Result<Vec<CredentialRecord>> {
        self.inner.find_credentials(user).await
    }

    async fn upsert_credential(&self, credential: NewCredential) -> parley_persist::Result<CredentialRecord> {
        self.inner.upsert_credential(credential).await
    }

    async fn delete_credential(&self, credential_id: Uuid, user: &ActiveUser) -> parley_persist::Result<bool> {
        self.inner.delete_credential(credential_id, user).await
    }

    async fn grant_credential(
        &self,
        credential_id: Uuid,
        grantee_id: Uuid,
        is_admin: bool,
        granted_by: &ActiveUser,
    ) -> parley_persist::Result<bool> {
        self.inner
            .grant_credential(credential_id, grantee_id, is_admin, granted_by)
            .await
    }

    async fn list_threads(&self, user_id: Uuid, query: &ThreadQuery) -> parley_persist::Result<Vec<Thread>> {
        self.inner.list_threads(user_id, query).await
    }

    async fn rename_thread(&self, thread_id: Uuid, user_id: Uuid, title: &str) -> parley_persist::Result<Option<Thread>> {
        self.inner.rename_thread(thread_id, user_id, title).await
    }

    async fn delete_threads(&self, thread_ids: &[Uuid], user_id: Uuid) -> parley_persist::Result<Vec<Uuid>> {
        self.inner.delete_threads(thread_ids, user_id).await
    }

    async fn get_thread_messages(
        &self,
        thread_id: Uuid,
        query: &MessageQuery,
    ) -> parley_persist::Result<Vec<StoredMessage>> {
        self.inner.get_thread_messages(thread_id, query).await
    }

    async fn commit_turn(&self, commit: TurnCommit) -> parley_persist::Result<CommittedTurn> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(PersistError::Internal("write concern timeout on messages".into()));
        }
        self.inner.commit_turn(commit).await
    }

    async fn branch_off(&self, message_id: Uuid, user: &ActiveUser) -> parley_persist::Result<Option<BranchedThread>> {
        self.inner.branch_off(message_id, user).await
    }
}

struct Fixture {
    store: Arc<MemoryPersistenceClient>,
    flaky: Arc<FlakyStore>,
    orchestrator: ChatOrchestrator,
    standard: Arc<ScriptedClient>,
    reasoning: Arc<ScriptedClient>,
    alice: ActiveUser,
    bob: ActiveUser,
}

async fn fixture(used: i64, standard: Vec<Step>, reasoning: Vec<Step>, config: GraphConfig) -> Fixture {
    let store = Arc::new(MemoryPersistenceClient::new());
    let mut tenant = Tenant::new("acme", "Acme", 100);
    tenant.used_messages = used;
    store.insert_tenant(tenant).await.unwrap();

    let alice = User {
        id: Uuid::new_v4(),
        slug: "acme".into(),
        email: "alice@acme.test".into(),
        display_name: "Alice".into(),
        pfp_url: None,
        is_admin: false,
    };
    let bob = User {
        id: Uuid::new_v4(),
        email: "bob@acme.test".into(),
        display_name: "Bob".into(),
        ..alice.clone()
    };
    store.insert_user(alice.clone()).await.unwrap();
    store.insert_user(bob.clone()).await.unwrap();

    let flaky = FlakyStore::new(store.clone());
    let persist = PersistClient::new(flaky.clone(), Arc::new(MemoryCache::new()), CacheTtls::default());
    let registry = ToolRegistry::new(persist.credentials().clone(), &ProviderEndpoints::default());

    let standard = ScriptedClient::new(standard);
    let reasoning = ScriptedClient::new(reasoning);
    let graph = Graph::new(standard.clone(), reasoning.clone(), config);

    Fixture {
        store,
        flaky,
        orchestrator: ChatOrchestrator::new(persist, registry, Arc::new(graph)),
        standard,
        reasoning,
        alice: ActiveUser::from(&alice),
        bob: ActiveUser::from(&bob),
    }
}

async fn simple(used: i64, standard: Vec<Step>) -> Fixture {
    fixture(used, standard, Vec::new(), GraphConfig::default()).await
}

/// Prepare and run one turn, collecting every event it emitted.
async fn run_turn(
    f: &Fixture,
    user: &ActiveUser,
    request: TurnRequest,
) -> (Result<Finalized, FinalizeError>, Vec<StreamEvent>) {
    let prepared = f.orchestrator.prepare(user.clone(), request).await.unwrap();
    run_prepared(f, prepared).await
}

async fn run_prepared(f: &Fixture, prepared: PreparedTurn) -> (Result<Finalized, FinalizeError>, Vec<StreamEvent>) {
    let (tx, mut rx) = mpsc::channel(256);
    let outcome = f.orchestrator.run(prepared, tx).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (outcome, events)
}

fn names(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::event_name).collect()
}

fn texts(messages: &[StoredMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|m| {
            serde_json::from_value::<Message>(m.content.clone())
                .unwrap()
                .text()
                .unwrap_or_default()
        })
        .collect()
}

async fn thread_messages(f: &Fixture, thread_id: Uuid) -> Vec<StoredMessage> {
    f.orchestrator
        .persist()
        .history()
        .load_full(thread_id, &HistoryRequest::new("acme").owned_by(f.alice.id))
        .await
        .unwrap()
}

async fn used(f: &Fixture) -> i64 {
    f.store.get_usage("acme").await.unwrap().unwrap().used
}

async fn cached(f: &Fixture, key: &str) -> Option<serde_json::Value> {
    f.orchestrator.persist().cache().get(key).await.unwrap()
}

fn request_texts(request: &ChatRequest) -> Vec<String> {
    request
        .messages
        .iter()
        .skip(1)
        .map(|m| m.text().unwrap_or_default())
        .collect()
}

fn error_code(event: &StreamEvent) -> Option<&str> {
    match event {
        StreamEvent::Error { code, .. } => code.as_deref(),
        _ => None,
    }
}

#[tokio::test]
async fn test_quota_rejects_before_model_call() {
    let f = simple(99, vec![reply("never")]).await;

    let err = f
        .orchestrator
        .prepare(f.alice.clone(), TurnRequest::new("hello"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TurnError::QuotaExceeded { limit: 100, used: 99 }));
    assert_eq!(err.code(), "MESSAGE_LIMIT_REACHED");
    assert_eq!(f.standard.calls(), 0);
}

#[tokio::test]
async fn test_new_thread_turn_commits_and_counts() {
    let f = simple(10, vec![reply("Hi Alice!")]).await;

    let (outcome, events) = run_turn(&f, &f.alice, TurnRequest::new("  Hello there  ")).await;
    let finalized = outcome.unwrap();

    assert_eq!(names(&events), vec!["init_stream", "message", "done", "committed", "end_stream"]);
    assert_eq!(finalized.usage, Usage { limit: 100, used: 11 });
    assert_eq!(used(&f).await, 11);
    assert!(finalized.committed.created_thread);
    assert_eq!(finalized.committed.thread.title.as_deref(), Some("Hello there"));

    let stored = thread_messages(&f, finalized.committed.thread.id).await;
    assert_eq!(texts(&stored), vec!["Hello there", "Hi Alice!"]);

    match &events[3] {
        StreamEvent::Committed { thread_id, message_ids } => {
            assert_eq!(thread_id, &finalized.committed.thread.id.to_string());
            assert_eq!(message_ids.len(), 2);
        }
        other => panic!("unexpected event {:?}", other),
    }
    match events.last().unwrap() {
        StreamEvent::EndStream { status, .. } => assert_eq!(status, "success"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_tool_call_flow_commits_every_produced_message() {
    let f = simple(0, vec![call_tool("c1", "list_credentials"), reply("You have no connected accounts.")]).await;

    let (outcome, events) = run_turn(&f, &f.alice, TurnRequest::new("What is connected?")).await;
    let finalized = outcome.unwrap();

    assert_eq!(
        names(&events),
        vec![
            "init_stream",
            "tool_call",
            "done",
            "tool_result",
            "message",
            "done",
            "committed",
            "end_stream"
        ]
    );
    match &events[3] {
        StreamEvent::ToolResult { tool_call_id, result, is_error, .. } => {
            assert_eq!(tool_call_id, "c1");
            assert_eq!(result, "[]");
            assert!(!is_error);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let stored = thread_messages(&f, finalized.committed.thread.id).await;
    let roles: Vec<&str> = stored.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant", "tool", "assistant"]);
    assert_eq!(f.standard.calls(), 2);

    // The second model step saw the tool result
    let second = f.standard.last_request();
    assert!(matches!(second.messages.last(), Some(Message::Tool { .. })));
    assert!(second.options.tools.is_some());
}

#[tokio::test]
async fn test_unfinished_turn_writes_nothing() {
    let f = simple(
        5,
        vec![Step::Events(vec![
            LlmEvent::Message { content: "cut off".into() },
            LlmEvent::Done { finish_reason: Some("length".into()) },
        ])],
    )
    .await;

    let (outcome, events) = run_turn(&f, &f.alice, TurnRequest::new("Write a novel")).await;
    let err = outcome.err().unwrap();

    assert_eq!(err.code(), "FINISH_REASON_NOT_STOP");
    assert_eq!(names(&events), vec!["init_stream", "message", "done", "error", "end_stream"]);
    assert_eq!(used(&f).await, 5);
    assert!(f
        .store
        .list_threads(f.alice.id, &Default::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_edit_replaces_the_edited_turn_and_its_future() {
    let f = simple(0, vec![reply("answer one"), reply("answer two"), reply("answer revised")]).await;

    let (first, _) = run_turn(&f, &f.alice, TurnRequest::new("first question")).await;
    let thread_id = first.unwrap().committed.thread.id;

    let (second, _) = run_turn(&f, &f.alice, TurnRequest::new("second question").in_thread(thread_id)).await;
    let edited_id = second.unwrap().committed.messages[0].id;

    let (edit, _) = run_turn(
        &f,
        &f.alice,
        TurnRequest::new("second question, revised")
            .in_thread(thread_id)
            .editing(edited_id),
    )
    .await;
    let edit = edit.unwrap();
    assert!(!edit.committed.created_thread);

    // system prompt, the surviving pair and the new question
    let request = f.standard.last_request();
    assert_eq!(request.messages.len(), 4);

    let stored = thread_messages(&f, thread_id).await;
    assert_eq!(
        texts(&stored),
        vec!["first question", "answer one", "second question, revised", "answer revised"]
    );
    assert!(stored.iter().all(|m| m.id != edited_id));
    assert_eq!(used(&f).await, 3);
}

#[tokio::test]
async fn test_edit_of_unknown_or_assistant_message_is_rejected() {
    let f = simple(0, vec![reply("answer")]).await;
    let (first, _) = run_turn(&f, &f.alice, TurnRequest::new("question")).await;
    let committed = first.unwrap().committed;
    let assistant_id = committed.messages[1].id;

    for target in [Uuid::new_v4(), assistant_id] {
        let err = f
            .orchestrator
            .prepare(
                f.alice.clone(),
                TurnRequest::new("again").in_thread(committed.thread.id).editing(target),
            )
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TurnError::EditedMessageNotFound));
    }
    assert_eq!(f.standard.calls(), 1);
}

#[tokio::test]
async fn test_foreign_thread_is_not_found() {
    let f = simple(0, vec![reply("bob's answer")]).await;
    let (bobs, _) = run_turn(&f, &f.bob, TurnRequest::new("bob's question")).await;
    let thread_id = bobs.unwrap().committed.thread.id;

    let err = f
        .orchestrator
        .prepare(f.alice.clone(), TurnRequest::new("peek").in_thread(thread_id))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TurnError::ThreadNotFound));
    assert_eq!(err.code(), "THREAD_NOT_FOUND");
}

#[tokio::test]
async fn test_step_limit_stops_the_loop_without_commit() {
    let f = fixture(
        0,
        vec![call_tool("c1", "list_credentials"), call_tool("c2", "list_credentials")],
        Vec::new(),
        GraphConfig::new().with_max_steps(2),
    )
    .await;

    let (outcome, events) = run_turn(&f, &f.alice, TurnRequest::new("loop forever")).await;

    assert!(matches!(outcome, Err(FinalizeError::FinishReasonNotStop(Some(ref r))) if r == "tool_calls"));
    assert_eq!(f.standard.calls(), 2);
    assert_eq!(events.iter().filter(|e| e.event_name() == "tool_result").count(), 1);
    assert_eq!(used(&f).await, 0);
}

#[tokio::test]
async fn test_extra_reason_selects_reasoning_tier() {
    let f = fixture(0, Vec::new(), vec![reply("thought hard")], GraphConfig::default()).await;

    let (outcome, _) = run_turn(&f, &f.alice, TurnRequest::new("think").with_extra_reason(true)).await;
    let finalized = outcome.unwrap();

    assert_eq!(f.standard.calls(), 0);
    assert_eq!(f.reasoning.calls(), 1);
    assert_eq!(f.reasoning.last_request().model, "reasoning");

    let stored = thread_messages(&f, finalized.committed.thread.id).await;
    assert!(stored.iter().all(|m| m.extra_reason));
    assert_eq!(used(&f).await, 1);
}

#[tokio::test]
async fn test_stream_failure_reports_model_failure() {
    let f = simple(0, vec![Step::FailMidStream]).await;

    let (outcome, events) = run_turn(&f, &f.alice, TurnRequest::new("hello")).await;

    assert_eq!(outcome.err().unwrap().code(), "MODEL_FAILURE");
    assert_eq!(names(&events), vec!["init_stream", "message", "error", "end_stream"]);
    match &events[2] {
        StreamEvent::Error { code, message } => {
            assert_eq!(code.as_deref(), Some("MODEL_FAILURE"));
            assert!(!message.contains("connection reset"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(used(&f).await, 0);
}

#[tokio::test]
async fn test_turn_commits_after_client_disconnects() {
    let f = simple(0, vec![reply("nobody is listening")]).await;

    let prepared = f
        .orchestrator
        .prepare(f.alice.clone(), TurnRequest::new("hello?"))
        .await
        .unwrap();
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let finalized = f.orchestrator.run(prepared, tx).await.unwrap();
    let stored = thread_messages(&f, finalized.committed.thread.id).await;
    assert_eq!(texts(&stored), vec!["hello?", "nobody is listening"]);
    assert_eq!(used(&f).await, 1);
}

#[tokio::test]
async fn test_start_turn_streams_to_the_end() {
    let f = simple(0, vec![reply("streamed")]).await;

    let mut rx = f
        .orchestrator
        .start_turn(f.alice.clone(), TurnRequest::new("stream it"))
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
        events.push(event);
    }
    assert_eq!(events.first().map(StreamEvent::event_name), Some("init_stream"));
    assert_eq!(events.last().map(StreamEvent::event_name), Some("end_stream"));
    assert!(events.iter().any(|e| e.event_name() == "committed"));
}

#[tokio::test]
async fn test_overlapping_turns_on_one_thread_keep_history_whole() {
    let f = simple(0, vec![reply("a0"), reply("reply A"), reply("reply B"), reply("reply C")]).await;
    let (seed, _) = run_turn(&f, &f.alice, TurnRequest::new("seed")).await;
    let thread_id = seed.unwrap().committed.thread.id;

    // Two tabs read the same history before either commits
    let turn_a = f
        .orchestrator
        .prepare(f.alice.clone(), TurnRequest::new("question A").in_thread(thread_id))
        .await
        .unwrap();
    let turn_b = f
        .orchestrator
        .prepare(f.alice.clone(), TurnRequest::new("question B").in_thread(thread_id))
        .await
        .unwrap();

    run_prepared(&f, turn_a).await.0.unwrap();
    assert!(cached(&f, &thread_key(thread_id)).await.is_some());

    let (b, _) = run_prepared(&f, turn_b).await;
    b.unwrap();
    // B was built on a history that no longer ends the thread
    assert!(cached(&f, &thread_key(thread_id)).await.is_none());

    run_turn(&f, &f.alice, TurnRequest::new("question C").in_thread(thread_id))
        .await
        .0
        .unwrap();
    assert_eq!(
        request_texts(&f.standard.last_request()),
        vec!["seed", "a0", "question A", "reply A", "question B", "reply B", "question C"]
    );

    let stored = thread_messages(&f, thread_id).await;
    let from_cache = f
        .orchestrator
        .persist()
        .history()
        .load_partial(thread_id, &HistoryRequest::new("acme").owned_by(f.alice.id))
        .await
        .unwrap();
    assert_eq!(stored.len(), 8);
    assert_eq!(
        from_cache.iter().map(|m| m.id).collect::<Vec<_>>(),
        stored.iter().map(|m| m.id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_commit_failure_on_new_thread_writes_nothing() {
    let f = simple(3, vec![reply("never saved")]).await;
    f.flaky.fail_commit.store(true, Ordering::SeqCst);

    let (outcome, events) = run_turn(&f, &f.alice, TurnRequest::new("hello")).await;
    let err = outcome.err().unwrap();

    assert_eq!(err.code(), "COMMIT_FAILED");
    assert!(err.committed().is_none());
    assert_eq!(names(&events), vec!["init_stream", "message", "done", "error", "end_stream"]);
    match &events[3] {
        StreamEvent::Error { code, message } => {
            assert_eq!(code.as_deref(), Some("COMMIT_FAILED"));
            assert!(!message.contains("write concern"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(f
        .store
        .list_threads(f.alice.id, &Default::default())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(used(&f).await, 3);
}

#[tokio::test]
async fn test_commit_failure_on_existing_thread_drops_cached_history() {
    let f = simple(0, vec![reply("first answer"), reply("lost answer")]).await;
    let (first, _) = run_turn(&f, &f.alice, TurnRequest::new("first")).await;
    let thread_id = first.unwrap().committed.thread.id;
    assert!(cached(&f, &thread_key(thread_id)).await.is_some());

    f.flaky.fail_commit.store(true, Ordering::SeqCst);
    let (outcome, events) = run_turn(&f, &f.alice, TurnRequest::new("second").in_thread(thread_id)).await;

    assert_eq!(outcome.err().unwrap().code(), "COMMIT_FAILED");
    assert!(!names(&events).contains(&"committed"));
    assert!(cached(&f, &thread_key(thread_id)).await.is_none());
    assert_eq!(texts(&thread_messages(&f, thread_id).await), vec!["first", "first answer"]);
    assert_eq!(used(&f).await, 1);
}

#[tokio::test]
async fn test_usage_failure_after_commit_reports_committed_then_error() {
    let f = simple(7, vec![reply("saved anyway")]).await;
    f.flaky.fail_increment.store(true, Ordering::SeqCst);

    let (outcome, events) = run_turn(&f, &f.alice, TurnRequest::new("count me")).await;
    let err = outcome.err().unwrap();

    assert_eq!(err.code(), "USAGE_UPDATE_FAILED");
    assert!(err.is_retryable());
    assert_eq!(
        names(&events),
        vec!["init_stream", "message", "done", "committed", "error", "end_stream"]
    );
    assert_eq!(error_code(&events[4]), Some("USAGE_UPDATE_FAILED"));
    match events.last().unwrap() {
        StreamEvent::EndStream { status, .. } => assert_eq!(status, "error"),
        other => panic!("unexpected event {:?}", other),
    }

    // The messages are durable, the counter is untouched and the cached pair is gone
    let thread_id = err.committed().unwrap().thread.id;
    assert_eq!(texts(&thread_messages(&f, thread_id).await), vec!["count me", "saved anyway"]);
    assert_eq!(used(&f).await, 7);
    assert!(cached(&f, &usage_key("acme")).await.is_none());
}

#[tokio::test]
async fn test_overadmitted_turns_stop_at_the_limit() {
    let f = simple(98, vec![reply("one"), reply("two"), reply("three")]).await;

    // All three read used=98 and pass admission before any of them commits
    let mut prepared = Vec::new();
    for prompt in ["first", "second", "third"] {
        prepared.push(
            f.orchestrator
                .prepare(f.alice.clone(), TurnRequest::new(prompt))
                .await
                .unwrap(),
        );
    }

    let mut outcomes = Vec::new();
    for turn in prepared {
        outcomes.push(run_prepared(&f, turn).await);
    }

    assert_eq!(outcomes[0].0.as_ref().unwrap().usage.used, 99);
    assert_eq!(outcomes[1].0.as_ref().unwrap().usage.used, 100);
    let (third, events) = &outcomes[2];
    assert_eq!(third.as_ref().err().unwrap().code(), "USAGE_UPDATE_FAILED");
    assert!(names(events).contains(&"committed"));
    assert_eq!(used(&f).await, 100);
    assert!(cached(&f, &usage_key("acme")).await.is_none());

    let err = f
        .orchestrator
        .prepare(f.alice.clone(), TurnRequest::new("fourth"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TurnError::QuotaExceeded { limit: 100, used: 100 }));
}

#[tokio::test]
async fn test_one_message_of_headroom_admits_nothing() {
    let f = simple(99, vec![reply("never"), reply("never")]).await;

    for prompt in ["tab one", "tab two"] {
        let err = f
            .orchestrator
            .prepare(f.alice.clone(), TurnRequest::new(prompt))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "MESSAGE_LIMIT_REACHED");
    }
    assert_eq!(f.standard.calls(), 0);
    assert_eq!(used(&f).await, 99);
}
