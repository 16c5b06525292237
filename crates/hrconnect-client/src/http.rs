use async_trait::async_trait;
use hrconnect_config::HrConfig;
use hrconnect_core::{
    AuthBackend, ChatBackend, ConversationDetail, ConversationId, HistoryList, HrError,
    LeaveBackend, LeaveBalance, LeaveHistory, LeaveRequest, LeaveType, LoginResponse,
    QueryRequest, QueryResponse, Result, UserInfo,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::auth::AuthContext;

/// reqwest implementation of every backend contract.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    query_timeout: Duration,
    auth: Arc<AuthContext>,
}

/// Whether a request carries the stored token. Anonymous requests never expire the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Credentials {
    Bearer,
    Anonymous,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration, auth: Arc<AuthContext>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HrError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            timeout,
            query_timeout: timeout,
            auth,
        })
    }

    pub fn from_config(config: &HrConfig, auth: Arc<AuthContext>) -> Result<Self> {
        Ok(Self::new(config.base_url(), config.request_timeout(), auth)?
            .with_query_timeout(config.query_timeout()))
    }

    /// Let chatbot queries run for up to `timeout`, never less than the request timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout.max(self.timeout);
        self
    }

    pub fn auth(&self) -> &Arc<AuthContext> {
        &self.auth
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        self.execute(method, path, body, self.timeout, Credentials::Bearer)
            .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout: Duration,
        credentials: Credentials,
    ) -> Result<T> {
        let mut request = self
            .client
            .request(method.clone(), self.url(path))
            .header("Content-Type", "application/json")
            .timeout(timeout);

        if credentials == Credentials::Bearer {
            if let Some(token) = self.auth.token() {
                request = request.bearer_auth(token);
            }
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!("{} {}", method, path);
        let response = request
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED && credentials == Credentials::Bearer {
            self.auth.invalidate();
        }

        let text = response
            .text()
            .await
            .map_err(|e| map_transport(e, timeout))?;

        if !status.is_success() {
            let message = error_message(&text);
            warn!("{} {} failed with {}: {}", method, path, status.as_u16(), message);
            return Err(HrError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            "null"
        } else {
            text.as_str()
        };

        serde_json::from_str(text).map_err(|e| {
            HrError::Unknown(format!("Unexpected response from {}: {}", path, e))
        })
    }

}

fn map_transport(error: reqwest::Error, timeout: Duration) -> HrError {
    if error.is_timeout() {
        HrError::Timeout(timeout.as_secs())
    } else {
        HrError::Network(error.to_string())
    }
}

/// Human-readable message of an error body: `detail`, then `message`, then the raw text.
pub fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        match value.get("detail") {
            Some(Value::String(detail)) if !detail.is_empty() => return detail.clone(),
            Some(Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect();
                if !messages.is_empty() {
                    return messages.join("; ");
                }
            }
            _ => {}
        }

        if let Some(message) = value.get("message").and_then(Value::as_str) {
            if !message.is_empty() {
                return message.to_string();
            }
        }
    }

    let text = body.trim();
    if text.is_empty() {
        "API Error".to_string()
    } else {
        text.to_string()
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    #[instrument(skip(self, password))]
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let response: LoginResponse = self
            .execute(
                Method::POST,
                "/v1/auth/login",
                Some(json!({ "email": email, "password": password })),
                self.timeout,
                Credentials::Anonymous,
            )
            .await?;

        if response.access_token.is_empty() {
            return Err(HrError::Unknown("Login response carried no token".into()));
        }
        self.auth.begin_login(&response.access_token)?;
        Ok(response)
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> Result<()> {
        let result = self
            .call::<Value>(Method::POST, "/v1/auth/logout", None)
            .await;
        self.auth.clear()?;
        result.map(|_| ())
    }

    #[instrument(skip(self, password))]
    async fn register(&self, email: &str, password: &str) -> Result<()> {
        self.execute::<Value>(
            Method::POST,
            "/v1/auth/register",
            Some(json!({ "email": email, "password": password })),
            self.timeout,
            Credentials::Anonymous,
        )
        .await
        .map(|_| ())
    }

    async fn validate(&self) -> Result<UserInfo> {
        if self.auth.token().is_none() {
            return Err(HrError::Unauthorized("No token".into()));
        }
        self.call(Method::GET, "/v1/auth/me", None).await
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    #[instrument(skip(self, question))]
    async fn query(
        &self,
        question: &str,
        conversation_id: Option<ConversationId>,
    ) -> Result<QueryResponse> {
        let body = serde_json::to_value(QueryRequest::new(question, conversation_id))?;
        self.execute(
            Method::POST,
            "/v1/chatbot/query",
            Some(body),
            self.query_timeout,
            Credentials::Bearer,
        )
        .await
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<ConversationDetail> {
        self.call(Method::GET, &format!("/v1/chatbot/history/{}", id), None)
            .await
    }

    async fn history(&self) -> Result<HistoryList> {
        self.call(Method::GET, "/v1/chatbot/history", None).await
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<()> {
        self.call::<Value>(Method::DELETE, &format!("/v1/chatbot/history/{}", id), None)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl LeaveBackend for HttpBackend {
    async fn balance(&self, leave_type: LeaveType) -> Result<LeaveBalance> {
        let path = format!("/v1/{}/balance", leave_type.resource());
        self.call(Method::GET, &path, None).await
    }

    async fn leave_history(&self, leave_type: LeaveType) -> Result<LeaveHistory> {
        let path = format!("/v1/{}/history", leave_type.resource());
        self.call(Method::GET, &path, None).await
    }

    #[instrument(skip(self, request))]
    async fn create_leave(&self, leave_type: LeaveType, request: &LeaveRequest) -> Result<()> {
        let path = format!("/v1/{}", leave_type.resource());
        let body = serde_json::to_value(request)?;
        self.call::<Value>(Method::POST, &path, Some(body))
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, request))]
    async fn update_leave(&self, leave_type: LeaveType, request: &LeaveRequest) -> Result<()> {
        let path = format!("/v1/{}", leave_type.resource());
        let body = serde_json::to_value(request)?;
        self.call::<Value>(Method::PUT, &path, Some(body))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_precedence() {
        assert_eq!(error_message(r#"{"detail":"Bad credentials","message":"x"}"#), "Bad credentials");
        assert_eq!(error_message(r#"{"message":"Server down"}"#), "Server down");
        assert_eq!(
            error_message(r#"{"detail":[{"msg":"field required"},{"msg":"too short"}]}"#),
            "field required; too short"
        );
        assert_eq!(error_message("Gateway Timeout"), "Gateway Timeout");
        assert_eq!(error_message(""), "API Error");
    }
}
