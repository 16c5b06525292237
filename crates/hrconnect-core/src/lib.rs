use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod api;

pub use api::{
    ConversationDetail, ConversationSummary, HistoryEntry, HistoryList, LeaveBalance,
    LeaveHistory, LeaveRecord, LeaveRequest, LeaveType, LoginResponse, QueryRequest,
    QueryResponse, UserInfo,
};

/// Placeholder text shown while the assistant is composing a reply.
pub const TYPING_SENTINEL: &str = "Typing...";

/// Reply text used when the backend answers with an empty string.
pub const NO_ANSWER_TEXT: &str = "Sorry, I couldn't find an answer.";

/// Reply text used when a query fails.
pub const APOLOGY_TEXT: &str = "Oops! Something went wrong. Please try again later.";

/// Reply text used when a query outlives the configured wait.
pub const TIMEOUT_TEXT: &str = "Aiva is taking too long to respond. Please try again.";

pub const SESSION_EXPIRED_TEXT: &str =
    "Your session has expired or another login was detected. Please log in again.";

pub const SUGGESTED_PROMPTS: [&str; 6] = [
    "How can I update my personal information?",
    "Can I view my payslips online?",
    "What is the process for applying for sick leave?",
    "Are there any upcoming company events?",
    "How do I submit my timesheet for approval?",
    "Who can I contact for IT support?",
];

/// Server-assigned conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl ConversationId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ConversationId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant", alias = "bot")]
    Assistant,
}

impl Sender {
    /// Parse a backend-provided sender or role tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "user" | "human" => Some(Sender::User),
            "ai" | "assistant" | "bot" => Some(Sender::Assistant),
            _ => None,
        }
    }
}

/// One entry of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub time: String,
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    pub fn user(text: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            time: time.into(),
            is_error: false,
        }
    }

    pub fn assistant(text: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            time: time.into(),
            is_error: false,
        }
    }

    pub fn assistant_error(text: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::assistant(text, time)
        }
    }

    pub fn typing(time: impl Into<String>) -> Self {
        Self::assistant(TYPING_SENTINEL, time)
    }

    pub fn is_typing(&self) -> bool {
        self.sender == Sender::Assistant && self.text == TYPING_SENTINEL
    }
}

/// Format a timestamp the way the transcript displays it, e.g. `10:05 AM`.
pub fn display_time<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.format("%-I:%M %p").to_string()
}

pub fn now_display() -> String {
    display_time(&Local::now())
}

#[derive(Error, Debug)]
pub enum HrError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("A message is still being answered")]
    SendInFlight,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl HrError {
    /// True for errors that mean the stored credentials are no longer accepted.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            HrError::Unauthorized(_) | HrError::Api { status: 401, .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HrError>;

/// Field-level messages collected while validating a form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    fields: Vec<(&'static str, String)>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `field`. The first message per field wins.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        if self.get(field).is_none() {
            self.fields.push((field, message.into()));
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, message)| message.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields.iter().map(|(name, message)| (*name, message.as_str()))
    }

    /// `Ok` when nothing was recorded, else a validation error listing every message.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        Err(HrError::Validation(self.to_string()))
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.fields.iter().map(|(_, m)| m.as_str()).collect();
        write!(f, "{}", messages.join(" "))
    }
}

/// Storage keys shared by the auth layer and the chat session.
pub mod keys {
    pub const AUTH_TOKEN: &str = "auth_token";
    pub const LOGIN_ID: &str = "login_id";
    pub const CONVERSATION_ID: &str = "conversationId";
    pub const CHAT_MESSAGES: &str = "chatMessages";
    pub const CHAT_INITIALIZED: &str = "chatInitialized";
}

/// Client-side key-value persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse>;
    async fn logout(&self) -> Result<()>;
    async fn register(&self, email: &str, password: &str) -> Result<()>;
    async fn validate(&self) -> Result<UserInfo>;
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Ask a question. `None` starts a new conversation server-side.
    async fn query(
        &self,
        question: &str,
        conversation_id: Option<ConversationId>,
    ) -> Result<QueryResponse>;
    async fn get_conversation(&self, id: ConversationId) -> Result<ConversationDetail>;
    async fn history(&self) -> Result<HistoryList>;
    async fn delete_conversation(&self, id: ConversationId) -> Result<()>;
}

#[async_trait]
pub trait LeaveBackend: Send + Sync {
    async fn balance(&self, leave_type: LeaveType) -> Result<LeaveBalance>;
    async fn leave_history(&self, leave_type: LeaveType) -> Result<LeaveHistory>;
    async fn create_leave(&self, leave_type: LeaveType, request: &LeaveRequest) -> Result<()>;
    async fn update_leave(&self, leave_type: LeaveType, request: &LeaveRequest) -> Result<()>;
}
