use hrconnect_core::AuthBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::auth::AuthContext;

/// Background task that periodically checks the stored token with the backend.
///
/// Checks immediately, then every `interval`. Stops after the first rejection,
/// which it reports through [`AuthContext::invalidate`].
pub struct SessionMonitor {
    handle: JoinHandle<()>,
}

impl SessionMonitor {
    pub fn spawn(
        backend: Arc<dyn AuthBackend>,
        auth: Arc<AuthContext>,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match backend.validate().await {
                    Ok(user) => debug!("Session valid for {}", user.email),
                    Err(e) if e.is_unauthorized() => {
                        info!("Session rejected: {}", e);
                        auth.invalidate();
                        break;
                    }
                    Err(e) => warn!("Session check failed: {}", e),
                }
            }
        });

        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the monitor to stop on its own.
    pub async fn join(mut self) {
        let _ = (&mut self.handle).await;
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hrconnect_conversation::MemoryStore;
    use hrconnect_core::{HrError, LoginResponse, Result, UserInfo};
    use mockall::{mock, Sequence};
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        Auth {}

        #[async_trait]
        impl AuthBackend for Auth {
            async fn login(&self, email: &str, password: &str) -> Result<LoginResponse>;
            async fn logout(&self) -> Result<()>;
            async fn register(&self, email: &str, password: &str) -> Result<()>;
            async fn validate(&self) -> Result<UserInfo>;
        }
    }

    fn user() -> UserInfo {
        UserInfo {
            email: "jane@example.com".into(),
            user_id: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_after_rejection() {
        let mut backend = MockAuth::new();
        let mut seq = Sequence::new();
        backend
            .expect_validate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(user()));
        backend
            .expect_validate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(HrError::Network("offline".into())));
        backend
            .expect_validate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Err(HrError::Api {
                    status: 401,
                    message: "expired".into(),
                })
            });

        let auth = Arc::new(AuthContext::new(Arc::new(MemoryStore::new())));
        auth.begin_login("token").unwrap();

        let expired = Arc::new(AtomicUsize::new(0));
        let seen = expired.clone();
        auth.on_unauthorized(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let monitor = SessionMonitor::spawn(Arc::new(backend), auth.clone(), Duration::from_secs(120));
        monitor.join().await;

        assert_eq!(expired.load(Ordering::SeqCst), 1);
        assert!(!auth.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_checks_immediately() {
        let mut backend = MockAuth::new();
        backend
            .expect_validate()
            .times(1)
            .returning(|| Err(HrError::Unauthorized("No token".into())));

        let auth = Arc::new(AuthContext::new(Arc::new(MemoryStore::new())));
        let monitor = SessionMonitor::spawn(Arc::new(backend), auth, Duration::from_secs(3600));

        tokio::time::timeout(Duration::from_secs(1), monitor.join())
            .await
            .expect("first check runs without waiting for the interval");
    }
}
