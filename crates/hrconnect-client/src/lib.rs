pub mod auth;
pub mod formatter;
pub mod http;
pub mod monitor;
pub mod routes;

pub use auth::{AuthContext, RegisterForm};
pub use formatter::MessageFormatter;
pub use http::{error_message, HttpBackend};
pub use monitor::SessionMonitor;
pub use routes::{RouteDecision, RouteGuard, PUBLIC_ROUTES};
