/// Paths reachable without signing in.
pub const PUBLIC_ROUTES: [&str; 3] = ["/", "/register", "/login"];

pub const LOGIN_ROUTE: &str = "/login";
pub const HOME_ROUTE: &str = "/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect(&'static str),
}

/// Public/protected path contract of the app.
pub struct RouteGuard;

impl RouteGuard {
    pub fn is_public(path: &str) -> bool {
        PUBLIC_ROUTES.contains(&normalize(path))
    }

    pub fn check(path: &str, authenticated: bool) -> RouteDecision {
        let path = normalize(path);

        if path == LOGIN_ROUTE && authenticated {
            return RouteDecision::Redirect(HOME_ROUTE);
        }
        if !authenticated && !PUBLIC_ROUTES.contains(&path) {
            return RouteDecision::Redirect(LOGIN_ROUTE);
        }
        RouteDecision::Allow
    }
}

/// Path without query, fragment or trailing slash.
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or("");
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
