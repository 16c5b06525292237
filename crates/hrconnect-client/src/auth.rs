use hrconnect_core::{keys, FormErrors, KeyValueStore, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("Invalid regex pattern"));

type UnauthorizedHook = Box<dyn Fn() + Send + Sync>;

/// Owner of the bearer token and the login id.
///
/// Subscribers registered with [`on_unauthorized`](Self::on_unauthorized) are
/// notified once each time a held token is rejected.
pub struct AuthContext {
    store: Arc<dyn KeyValueStore>,
    hooks: RwLock<Vec<UnauthorizedHook>>,
}

impl AuthContext {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn token(&self) -> Option<String> {
        match self.store.get(keys::AUTH_TOKEN) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Failed to read auth token: {}", e);
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Id minted on the last successful login.
    pub fn login_id(&self) -> Option<String> {
        self.store.get(keys::LOGIN_ID).ok().flatten()
    }

    /// Store a freshly issued token under a new login id.
    pub fn begin_login(&self, token: &str) -> Result<String> {
        let login_id = Uuid::new_v4().to_string();
        self.store.set(keys::AUTH_TOKEN, token)?;
        self.store.set(keys::LOGIN_ID, &login_id)?;
        info!("Logged in (login id {})", login_id);
        Ok(login_id)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(keys::AUTH_TOKEN)?;
        debug!("Auth token cleared");
        Ok(())
    }

    pub fn on_unauthorized<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        hooks.push(Box::new(hook));
    }

    /// Drop a rejected token and notify subscribers. Returns false if no token was held.
    pub fn invalidate(&self) -> bool {
        if self.token().is_none() {
            return false;
        }

        if let Err(e) = self.clear() {
            warn!("Failed to clear rejected token: {}", e);
        }
        warn!("Stored credentials were rejected");

        let hooks = self.hooks.read().unwrap_or_else(|e| e.into_inner());
        for hook in hooks.iter() {
            hook();
        }
        true
    }
}

/// Sign-up form as entered by the user.
#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = FormErrors::new();

        let email = self.email.trim();
        if email.is_empty() {
            errors.add("email", "Email is required.");
        } else if !EMAIL_REGEX.is_match(email) {
            errors.add("email", "Please enter a valid email address.");
        }

        if self.password.is_empty() {
            errors.add("password", "Password is required.");
        }

        if self.confirm_password != self.password {
            errors.add("confirm_password", "Passwords don't match.");
        }

        errors.into_result()
    }
}
