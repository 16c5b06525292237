//! Request and response bodies of the HR backend.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ConversationId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    /// `0` asks the backend to start a new conversation.
    pub conversation_id: i64,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, conversation_id: Option<ConversationId>) -> Self {
        Self {
            question: question.into(),
            conversation_id: conversation_id.map(ConversationId::get).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
}

/// One stored message as the history endpoint returns it. Older backends use
/// `content`, newer ones `text`; the sender tag is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

impl HistoryEntry {
    pub fn body(&self) -> &str {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.content.as_deref())
            .unwrap_or("")
    }

    pub fn sender_tag(&self) -> Option<&str> {
        self.sender.as_deref().or(self.role.as_deref())
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.created_at.as_deref().or(self.time.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(default)]
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryList {
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveType {
    Vacation,
    Sick,
    Emergency,
}

impl LeaveType {
    /// Dashboard order: emergency, vacation, sick.
    pub const ALL: [LeaveType; 3] = [LeaveType::Emergency, LeaveType::Vacation, LeaveType::Sick];

    /// Path segment of the leave endpoints, e.g. `vacation-leave`.
    pub fn resource(self) -> &'static str {
        match self {
            LeaveType::Vacation => "vacation-leave",
            LeaveType::Sick => "sick-leave",
            LeaveType::Emergency => "emergency-leave",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LeaveType::Vacation => "Vacation Leave",
            LeaveType::Sick => "Sick Leave",
            LeaveType::Emergency => "Emergency Leave",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let value = value.strip_suffix(" leave").unwrap_or(&value);
        match value {
            "vacation" => Some(LeaveType::Vacation),
            "sick" => Some(LeaveType::Sick),
            "emergency" => Some(LeaveType::Emergency),
            _ => None,
        }
    }
}

impl fmt::Display for LeaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaveBalance {
    pub total_days: f64,
    pub used_days: f64,
}

impl LeaveBalance {
    pub fn remaining(&self) -> f64 {
        self.total_days - self.used_days
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRecord {
    pub used_days: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaveHistory {
    #[serde(default)]
    pub history: Vec<LeaveRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub used_days: u32,
    pub reason: String,
}
