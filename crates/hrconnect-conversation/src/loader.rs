use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use hrconnect_core::{
    display_time, now_display, ChatBackend, ConversationDetail, ConversationId, Message, Sender,
};
use tracing::{debug, warn};

/// Result of a history load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The conversation was already fetched; the transcript is current.
    AlreadyLoaded,
    /// The persisted transcript belongs to this conversation and was kept.
    Hydrated,
    Fetched(Vec<Message>),
    /// The fetch failed; the transcript is empty.
    Failed,
}

/// Decides when a conversation's history must be fetched from the backend.
#[derive(Debug, Clone)]
pub struct HistoryLoader {
    last_fetched: Option<ConversationId>,
    hydrated_id: Option<ConversationId>,
    first_load: bool,
}

impl HistoryLoader {
    /// `hydrated_id` is the id the persisted transcript was saved under.
    pub fn new(hydrated_id: Option<ConversationId>) -> Self {
        Self {
            last_fetched: None,
            hydrated_id,
            first_load: true,
        }
    }

    pub fn last_fetched(&self) -> Option<ConversationId> {
        self.last_fetched
    }

    /// Resolve a load locally if possible.
    ///
    /// Returns `None` when the caller must [`fetch`](Self::fetch). The marker is
    /// set either way so a failed fetch is not retried until [`forget`](Self::forget).
    pub fn begin(&mut self, id: ConversationId, has_transcript: bool) -> Option<LoadOutcome> {
        if self.last_fetched == Some(id) {
            return Some(LoadOutcome::AlreadyLoaded);
        }

        let first_load = std::mem::replace(&mut self.first_load, false);
        self.last_fetched = Some(id);

        if first_load && self.hydrated_id == Some(id) && has_transcript {
            debug!("Reusing persisted transcript for conversation {}", id);
            return Some(LoadOutcome::Hydrated);
        }
        None
    }

    /// Record that the transcript already reflects `id`, e.g. after a send adopted it.
    pub fn mark_loaded(&mut self, id: ConversationId) {
        self.first_load = false;
        self.last_fetched = Some(id);
    }

    pub fn forget(&mut self) {
        self.first_load = false;
        self.last_fetched = None;
    }

    /// Fetch and map a conversation's messages.
    pub async fn fetch(backend: &dyn ChatBackend, id: ConversationId) -> LoadOutcome {
        match backend.get_conversation(id).await {
            Ok(detail) => {
                let messages = map_history(&detail);
                debug!("Fetched {} messages for conversation {}", messages.len(), id);
                LoadOutcome::Fetched(messages)
            }
            Err(e) => {
                warn!("Failed to load conversation {}: {}", id, e);
                LoadOutcome::Failed
            }
        }
    }
}

/// Map backend history entries to transcript messages.
///
/// Entries without a sender tag alternate user/assistant starting with the user.
pub fn map_history(detail: &ConversationDetail) -> Vec<Message> {
    detail
        .messages
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let sender = entry
                .sender_tag()
                .and_then(Sender::from_tag)
                .unwrap_or(if index % 2 == 0 {
                    Sender::User
                } else {
                    Sender::Assistant
                });

            let time = entry
                .timestamp()
                .and_then(parse_timestamp)
                .map(|at| display_time(&at))
                .unwrap_or_else(now_display);

            Message {
                sender,
                text: entry.body().to_string(),
                time,
                is_error: false,
            }
        })
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Local));
    }

    // Naive timestamps are UTC on the wire.
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive).with_timezone(&Local))
}
