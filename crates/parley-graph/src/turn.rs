use std::sync::Arc;
use std::time::Instant;

use parley_llm::Message;
use parley_persist::{
    ActiveUser, CommittedTurn, HistoryRequest, MessageRole, NewMessage, PartialMessage, PersistClient, PersistError,
    ThreadTarget, TurnCommit, Usage,
};
use parley_tools::{ToolExecutor, ToolRegistry};
use parley_types::validation::derive_thread_title;
use parley_types::{GraphInput, LLMConfig, ModelTier, StreamEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{FinalizeError, TurnError};
use crate::graph::{Graph, TurnResult};
use crate::node::{emit, EventSender};
use crate::prompt::build_system_prompt;

pub const DEFAULT_EVENT_BUFFER: usize = 100;

/// One chat request as the HTTP layer hands it over.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub prompt: String,
    pub extra_reason: bool,
    pub thread_id: Option<Uuid>,
    pub edited_message_id: Option<Uuid>,
    pub language_preference: Option<String>,
}

impl TurnRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn in_thread(mut self, thread_id: Uuid) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn editing(mut self, message_id: Uuid) -> Self {
        self.edited_message_id = Some(message_id);
        self
    }

    pub fn with_extra_reason(mut self, extra_reason: bool) -> Self {
        self.extra_reason = extra_reason;
        self
    }
}

/// An admitted turn with its context assembled, ready for the step loop.
pub struct PreparedTurn {
    pub user: ActiveUser,
    pub request: TurnRequest,
    pub user_message: NewMessage,
    /// Prior thread history the turn builds on, already truncated for edits
    pub history: Vec<PartialMessage>,
    pub input: GraphInput,
    pub tools: Arc<ToolExecutor>,
    pub target: ThreadTarget,
    pub truncate_from: Option<Uuid>,
}

impl PreparedTurn {
    pub fn thread_id(&self) -> Option<Uuid> {
        match self.target {
            ThreadTarget::Existing(id) => Some(id),
            ThreadTarget::New { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Finalized {
    pub committed: CommittedTurn,
    pub usage: Usage,
}

/// Admission, context assembly, the step loop and finalization for chat turns.
#[derive(Clone)]
pub struct ChatOrchestrator {
    persist: PersistClient,
    registry: ToolRegistry,
    graph: Arc<Graph>,
    event_buffer: usize,
}

impl ChatOrchestrator {
    pub fn new(persist: PersistClient, registry: ToolRegistry, graph: Arc<Graph>) -> Self {
        Self {
            persist,
            registry,
            graph,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn persist(&self) -> &PersistClient {
        &self.persist
    }

    /// Prepare the turn and run it in the background. Rejections happen here,
    /// before any event is produced.
    pub async fn start_turn(
        &self,
        user: ActiveUser,
        request: TurnRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, TurnError> {
        let prepared = self.prepare(user, request).await?;
        let (tx, rx) = mpsc::channel(self.event_buffer);

        let orchestrator = self.clone();
        tokio::spawn(async move {
            let _ = orchestrator.run(prepared, tx).await;
        });

        Ok(rx)
    }

    pub async fn prepare(&self, user: ActiveUser, request: TurnRequest) -> Result<PreparedTurn, TurnError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(TurnError::InvalidRequest("prompt must not be empty".to_string()));
        }
        if request.edited_message_id.is_some() && request.thread_id.is_none() {
            return Err(TurnError::InvalidRequest("editedMessageId requires threadId".to_string()));
        }

        self.persist.usage().check(&user.slug).await.map_err(|e| match e {
            PersistError::QuotaExceeded { limit, used } => TurnError::QuotaExceeded { limit, used },
            other => TurnError::Persist(other),
        })?;

        let mut history = match request.thread_id {
            Some(thread_id) => {
                let history_request = HistoryRequest::new(user.slug.clone())
                    .owned_by(user.id)
                    .bypass_cache();
                self.persist
                    .history()
                    .load_partial(thread_id, &history_request)
                    .await
                    .map_err(|e| match e {
                        PersistError::NotFound(_) => TurnError::ThreadNotFound,
                        other => TurnError::Persist(other),
                    })?
            }
            None => Vec::new(),
        };

        if let Some(edited) = request.edited_message_id {
            let position = history
                .iter()
                .position(|m| m.id == edited && m.role == MessageRole::User)
                .ok_or(TurnError::EditedMessageNotFound)?;
            history.truncate(position);
        }

        let human = Message::human(prompt);
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(build_system_prompt(
            &user,
            request.language_preference.as_deref(),
        )));
        for partial in history.iter().skip_while(|m| m.role == MessageRole::Tool) {
            messages.push(partial.to_llm()?);
        }
        messages.push(human.clone());

        let tools = self.registry.build_tools(&user, request.thread_id).await?;
        let llm_config = LLMConfig::new(ModelTier::from_extra_reason(request.extra_reason));
        let input = GraphInput::new(messages, llm_config);

        let target = match request.thread_id {
            Some(thread_id) => ThreadTarget::Existing(thread_id),
            None => ThreadTarget::New {
                title: derive_thread_title(prompt),
            },
        };

        tracing::info!(
            run_id = %input.run_id,
            user_id = %user.id,
            slug = %user.slug,
            thread_id = ?request.thread_id,
            edit = request.edited_message_id.is_some(),
            history_len = history.len(),
            tier = input.llm_config.tier.as_str(),
            "turn admitted"
        );

        Ok(PreparedTurn {
            user_message: NewMessage::from_llm(&human, request.extra_reason)?,
            truncate_from: request.edited_message_id,
            user,
            request,
            history,
            input,
            tools: Arc::new(tools),
            target,
        })
    }

    /// Stream the turn into `event_tx` and finalize it.
    ///
    /// Runs to completion even when the receiver is gone. `end_stream` is
    /// always the last event.
    pub async fn run(&self, prepared: PreparedTurn, event_tx: EventSender) -> Result<Finalized, FinalizeError> {
        let start_time = Instant::now();
        let run_id = prepared.input.run_id.clone();

        emit(
            &event_tx,
            StreamEvent::InitStream {
                run_id: run_id.clone(),
                thread_id: prepared.thread_id().map(|id| id.to_string()),
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        )
        .await;

        let outcome = match self
            .graph
            .run(prepared.input.clone(), Arc::clone(&prepared.tools), event_tx.clone())
            .await
        {
            Ok(result) => finalize(&self.persist, &prepared, &result).await,
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "step loop failed");
                Err(FinalizeError::ModelFailure(e.to_string()))
            }
        };

        match &outcome {
            Ok(finalized) => emit(&event_tx, committed_event(&finalized.committed)).await,
            Err(e) => {
                if let Some(committed) = e.committed() {
                    emit(&event_tx, committed_event(committed)).await;
                }
                tracing::warn!(
                    run_id = %run_id,
                    code = e.code(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "turn not finalized"
                );
                emit(&event_tx, StreamEvent::error(e.code(), public_message(e))).await;
            }
        }

        let status = if outcome.is_ok() { "success" } else { "error" };
        emit(
            &event_tx,
            StreamEvent::EndStream {
                status: status.to_string(),
                total_duration_ms: start_time.elapsed().as_millis() as u64,
            },
        )
        .await;

        outcome
    }
}

/// Durable write of a finished turn: thread and messages in one commit,
/// then the cache refresh, then the usage increment.
///
/// Nothing is written unless the last model step finished with `stop`.
pub async fn finalize(
    persist: &PersistClient,
    prepared: &PreparedTurn,
    result: &TurnResult,
) -> Result<Finalized, FinalizeError> {
    if !result.finished_normally() {
        return Err(FinalizeError::FinishReasonNotStop(result.finish_reason.clone()));
    }

    let mut messages = Vec::with_capacity(result.produced.len() + 1);
    messages.push(prepared.user_message.clone());
    for message in &result.produced {
        let message =
            NewMessage::from_llm(message, prepared.request.extra_reason).map_err(FinalizeError::CommitFailed)?;
        messages.push(message);
    }

    let commit = TurnCommit {
        user_id: prepared.user.id,
        slug: prepared.user.slug.clone(),
        target: prepared.target.clone(),
        truncate_from: prepared.truncate_from,
        messages,
    };

    let committed = match persist.store().commit_turn(commit).await {
        Ok(committed) => committed,
        Err(e) => {
            if let Some(thread_id) = prepared.thread_id() {
                persist.history().invalidate(&[thread_id]).await;
            }
            return Err(FinalizeError::CommitFailed(e));
        }
    };

    // Another turn landed on this thread since our history was read
    let expected_last = prepared.history.last().map(|m| m.id);
    if committed.previous_last == expected_last {
        let mut cached = prepared.history.clone();
        cached.extend(committed.messages.iter().map(|m| m.partial()));
        persist
            .history()
            .refresh(committed.thread.id, &prepared.user.slug, prepared.user.id, cached)
            .await;
    } else {
        tracing::debug!(
            thread_id = %committed.thread.id,
            "thread moved during the turn, dropping cached history"
        );
        persist.history().invalidate(&[committed.thread.id]).await;
    }

    tracing::info!(
        run_id = %result.run_id,
        thread_id = %committed.thread.id,
        created_thread = committed.created_thread,
        messages = committed.messages.len(),
        "turn committed"
    );

    match persist.usage().commit(&prepared.user.slug).await {
        Ok(usage) => Ok(Finalized { committed, usage }),
        Err(source) => Err(FinalizeError::UsageUpdateFailed {
            committed: Box::new(committed),
            source,
        }),
    }
}

fn committed_event(committed: &CommittedTurn) -> StreamEvent {
    StreamEvent::Committed {
        thread_id: committed.thread.id.to_string(),
        message_ids: committed.messages.iter().map(|m| m.id.to_string()).collect(),
    }
}

fn public_message(error: &FinalizeError) -> String {
    match error {
        FinalizeError::FinishReasonNotStop(reason) => format!(
            "The model stopped before finishing (finish reason: {})",
            reason.as_deref().unwrap_or("none")
        ),
        FinalizeError::ModelFailure(_) => "The model failed to respond. Please try again.".to_string(),
        FinalizeError::CommitFailed(_) => "The conversation could not be saved.".to_string(),
        FinalizeError::UsageUpdateFailed { .. } => {
            "The conversation was saved but usage could not be recorded.".to_string()
        }
    }
}
