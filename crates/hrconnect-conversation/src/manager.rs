use hrconnect_core::{
    now_display, ChatBackend, ConversationId, ConversationSummary, HrError, Message, Result,
    APOLOGY_TEXT, NO_ANSWER_TEXT, TIMEOUT_TEXT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::identity::ConversationIdentity;
use crate::loader::{HistoryLoader, LoadOutcome};
use crate::storage::ChatStorage;
use crate::store::MessageStore;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound on a single query round trip.
    pub query_timeout: Duration,
    /// Login id of the signed-in user. A transcript recorded under a
    /// different login is discarded on open.
    pub login_marker: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(60),
            login_marker: None,
        }
    }
}

/// What the session is waiting on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendPhase {
    #[default]
    Idle,
    Sending,
    Loading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyInput,
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Replied(Message),
    /// The query failed or timed out; the error message was appended.
    Failed(Message),
    Rejected(Rejection),
    /// The session was reset while the query was outstanding.
    Discarded,
}

/// Read-only view of the session published to every surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub conversation_id: Option<ConversationId>,
    pub messages: Vec<Message>,
    pub phase: SendPhase,
}

impl SessionSnapshot {
    pub fn is_typing(&self) -> bool {
        self.messages.iter().any(Message::is_typing)
    }

    pub fn is_sending(&self) -> bool {
        self.phase == SendPhase::Sending
    }

    pub fn is_busy(&self) -> bool {
        self.phase != SendPhase::Idle
    }
}

struct SessionState {
    messages: MessageStore,
    identity: ConversationIdentity,
    loader: HistoryLoader,
    phase: SendPhase,
    /// Bumped by `reset` so late replies from a previous session are dropped.
    generation: u64,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversation_id: self.identity.get(),
            messages: self.messages.to_vec(),
            phase: self.phase,
        }
    }
}

struct SessionShared {
    backend: Arc<dyn ChatBackend>,
    storage: ChatStorage,
    options: SessionOptions,
    state: Mutex<SessionState>,
    events: watch::Sender<SessionSnapshot>,
}

/// Shared handle to the chat session.
///
/// Every surface holds a clone; all of them observe the same transcript.
#[derive(Clone)]
pub struct ChatSession {
    shared: Arc<SessionShared>,
}

impl ChatSession {
    /// Hydrate the session from storage.
    pub fn open(
        backend: Arc<dyn ChatBackend>,
        storage: ChatStorage,
        options: SessionOptions,
    ) -> Self {
        if let Some(marker) = options.login_marker.as_deref() {
            let recorded = storage.initialized_marker().unwrap_or_else(|e| {
                warn!("Failed to read session marker: {}", e);
                None
            });
            if recorded.as_deref() != Some(marker) {
                info!("New login detected, starting with an empty chat");
                if let Err(e) = storage.clear() {
                    warn!("Failed to clear previous chat session: {}", e);
                }
                if let Err(e) = storage.set_initialized_marker(marker) {
                    warn!("Failed to record session marker: {}", e);
                }
            }
        }

        let conversation_id = storage.conversation_id().unwrap_or_else(|e| {
            warn!("Failed to read conversation id: {}", e);
            None
        });
        let persisted = storage.messages().unwrap_or_else(|e| {
            warn!("Failed to read chat messages: {}", e);
            Vec::new()
        });
        let persisted_len = persisted.len();
        let messages = MessageStore::from_messages(persisted);

        if messages.len() != persisted_len {
            debug!("Dropped stale typing placeholder from stored transcript");
            if let Err(e) = storage.set_messages(messages.as_slice()) {
                warn!("Failed to persist chat messages: {}", e);
            }
        }

        info!(
            "Opened chat session: conversation={:?}, messages={}",
            conversation_id,
            messages.len()
        );

        let state = SessionState {
            messages,
            identity: ConversationIdentity::new(conversation_id),
            loader: HistoryLoader::new(conversation_id),
            phase: SendPhase::Idle,
            generation: 0,
        };
        let (events, _) = watch::channel(state.snapshot());

        Self {
            shared: Arc::new(SessionShared {
                backend,
                storage,
                options,
                state: Mutex::new(state),
                events,
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.events.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.events.subscribe()
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.shared.events.borrow().conversation_id
    }

    /// Send a user message and wait for the assistant's reply.
    ///
    /// The exchange runs to completion even if the returned future is dropped.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn send(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Rejected(Rejection::EmptyInput);
        }

        let (conversation_id, generation) = {
            let mut state = self.shared.state.lock().await;
            if state.phase != SendPhase::Idle {
                debug!("Rejecting send while {:?}", state.phase);
                return SendOutcome::Rejected(Rejection::InFlight);
            }

            state.phase = SendPhase::Sending;
            state.messages.append(Message::user(text, now_display()));
            state.messages.push_typing();
            self.commit(&state);
            (state.identity.get(), state.generation)
        };

        let session = self.clone();
        let question = text.to_string();
        let exchange = tokio::spawn(async move {
            session.complete_send(question, conversation_id, generation).await
        });

        exchange.await.unwrap_or_else(|e| {
            error!("Send task failed: {}", e);
            SendOutcome::Discarded
        })
    }

    async fn complete_send(
        &self,
        question: String,
        conversation_id: Option<ConversationId>,
        generation: u64,
    ) -> SendOutcome {
        let timeout = self.shared.options.query_timeout;
        let result = tokio::time::timeout(
            timeout,
            self.shared.backend.query(&question, conversation_id),
        )
        .await;

        let mut state = self.shared.state.lock().await;
        if state.generation != generation {
            debug!("Dropping reply for a session that was reset");
            return SendOutcome::Discarded;
        }

        let reply = match result {
            Ok(Ok(response)) => {
                if let Some(id) = response.conversation_id.filter(|id| id.get() > 0) {
                    if state.identity.set(Some(id)).is_changed() {
                        info!("Conversation id is now {}", id);
                    }
                    state.loader.mark_loaded(id);
                }

                let answer = if response.answer.trim().is_empty() {
                    NO_ANSWER_TEXT.to_string()
                } else {
                    response.answer
                };
                Message::assistant(answer, now_display())
            }
            Ok(Err(HrError::Timeout(secs))) => {
                warn!("Query timed out in transport after {}s", secs);
                Message::assistant_error(TIMEOUT_TEXT, now_display())
            }
            Ok(Err(e)) => {
                warn!("Query failed: {}", e);
                Message::assistant_error(APOLOGY_TEXT, now_display())
            }
            Err(_) => {
                warn!("Query timed out after {}s", timeout.as_secs());
                Message::assistant_error(TIMEOUT_TEXT, now_display())
            }
        };

        state.messages.remove_typing();
        state.messages.append(reply.clone());
        state.phase = SendPhase::Idle;
        self.commit(&state);

        if reply.is_error {
            SendOutcome::Failed(reply)
        } else {
            SendOutcome::Replied(reply)
        }
    }

    /// Make `id` the active conversation, replacing the transcript with its history.
    #[instrument(skip(self))]
    pub async fn switch_conversation(&self, id: ConversationId) -> Result<LoadOutcome> {
        self.load(id, false).await
    }

    /// Load the history of the persisted conversation, if any.
    pub async fn resume(&self) -> Result<LoadOutcome> {
        match self.conversation_id() {
            Some(id) => self.load(id, false).await,
            None => Ok(LoadOutcome::AlreadyLoaded),
        }
    }

    /// Fetch the active conversation again, discarding the local transcript.
    pub async fn reload(&self) -> Result<LoadOutcome> {
        match self.conversation_id() {
            Some(id) => self.load(id, true).await,
            None => Ok(LoadOutcome::AlreadyLoaded),
        }
    }

    async fn load(&self, id: ConversationId, force: bool) -> Result<LoadOutcome> {
        let generation = {
            let mut state = self.shared.state.lock().await;
            if state.phase != SendPhase::Idle {
                return Err(HrError::SendInFlight);
            }

            if force {
                state.loader.forget();
            }

            let change = state.identity.set(Some(id));
            let has_transcript = !change.is_changed() && !state.messages.is_empty();
            if let Some(outcome) = state.loader.begin(id, has_transcript) {
                if change.is_changed() {
                    self.commit(&state);
                }
                return Ok(outcome);
            }

            // A fetched history replaces the transcript; it is never merged.
            state.messages.clear();
            state.phase = SendPhase::Loading;
            self.commit(&state);
            state.generation
        };

        let outcome = HistoryLoader::fetch(self.shared.backend.as_ref(), id).await;

        let mut state = self.shared.state.lock().await;
        if state.generation != generation {
            debug!("Dropping history for a session that was reset");
            return Ok(outcome);
        }

        if let LoadOutcome::Fetched(messages) = &outcome {
            state.messages.replace_all(messages.clone());
        }
        state.phase = SendPhase::Idle;
        self.commit(&state);

        Ok(outcome)
    }

    /// Start a fresh conversation. The next send creates one server-side.
    #[instrument(skip(self))]
    pub async fn new_chat(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if state.phase != SendPhase::Idle {
            return Err(HrError::SendInFlight);
        }

        self.clear_state(&mut state);
        info!("Started a new chat");
        Ok(())
    }

    /// Delete a conversation server-side. Returns true if it was the active one.
    #[instrument(skip(self))]
    pub async fn delete_conversation(&self, id: ConversationId) -> Result<bool> {
        {
            let state = self.shared.state.lock().await;
            if state.identity.get() == Some(id) && state.phase != SendPhase::Idle {
                return Err(HrError::SendInFlight);
            }
        }

        self.shared.backend.delete_conversation(id).await?;
        info!("Deleted conversation {}", id);

        let mut state = self.shared.state.lock().await;
        if state.identity.get() == Some(id) && state.phase == SendPhase::Idle {
            self.clear_state(&mut state);
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop all session state, e.g. on logout. Outstanding replies are discarded.
    pub async fn reset(&self) {
        let mut state = self.shared.state.lock().await;
        state.generation += 1;
        state.phase = SendPhase::Idle;
        self.clear_state(&mut state);
        debug!("Chat session reset");
    }

    /// Conversations of the signed-in user.
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        Ok(self.shared.backend.history().await?.conversations)
    }

    fn clear_state(&self, state: &mut SessionState) {
        state.messages.clear();
        state.identity.set(None);
        state.loader.forget();
        if let Err(e) = self.shared.storage.clear() {
            warn!("Failed to clear chat storage: {}", e);
        }
        self.shared.events.send_replace(state.snapshot());
    }

    /// Persist the state and publish it to subscribers.
    fn commit(&self, state: &SessionState) {
        let storage = &self.shared.storage;
        if let Err(e) = storage.set_conversation_id(state.identity.get()) {
            warn!("Failed to persist conversation id: {}", e);
        }
        if let Err(e) = storage.set_messages(state.messages.as_slice()) {
            warn!("Failed to persist chat messages: {}", e);
        }
        self.shared.events.send_replace(state.snapshot());
    }
}
