use hrconnect_client::{AuthContext, HttpBackend};
use hrconnect_conversation::MemoryStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";

/// Mock HR backend mounted under `/api`.
pub struct HrMockServer {
    server: MockServer,
}

impl HrMockServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}/api", self.server.uri())
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Backend with a fresh auth context, optionally signed in.
    pub fn backend(&self, signed_in: bool) -> (HttpBackend, Arc<AuthContext>) {
        self.backend_with_timeouts(signed_in, Duration::from_secs(5), Duration::from_secs(5))
    }

    pub fn backend_with_timeouts(
        &self,
        signed_in: bool,
        request_timeout: Duration,
        query_timeout: Duration,
    ) -> (HttpBackend, Arc<AuthContext>) {
        let auth = Arc::new(AuthContext::new(Arc::new(MemoryStore::new())));
        if signed_in {
            auth.begin_login(TOKEN).unwrap();
        }
        let backend = HttpBackend::new(&self.base_url(), request_timeout, auth.clone())
            .unwrap()
            .with_query_timeout(query_timeout);
        (backend, auth)
    }

    pub async fn mock_json(&self, verb: &str, route: &str, status: u16, body: Value) {
        Mock::given(method(verb))
            .and(path(format!("/api{}", route)))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}
