use serde::Serialize;

const SIGN_IN: &str = "/signin";
const HOME_FEED: &str = "/feed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Public,
    /// Only for visitors; signed-in users are sent to the feed.
    GuestOnly,
    Protected,
}

const ROUTES: &[(&str, Access)] = &[
    ("/", Access::Public),
    ("/signup", Access::GuestOnly),
    ("/signin", Access::GuestOnly),
    ("/forgot-password", Access::Public),
    ("/reset-password", Access::Public),
    ("/check-email", Access::Public),
    ("/feed", Access::Protected),
    ("/discover", Access::Protected),
    ("/explore", Access::Protected),
    ("/library", Access::Protected),
    ("/saved", Access::Protected),
    ("/analysis", Access::Protected),
    ("/profile", Access::Protected),
    ("/profile/:username", Access::Protected),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RouteDecision {
    Allow,
    Redirect { to: String },
    NotFound,
}

/// Decide what a client navigating to `path` should see.
pub fn resolve(path: &str, authenticated: bool) -> RouteDecision {
    let Some(access) = lookup(path) else {
        return RouteDecision::NotFound;
    };

    match (access, authenticated) {
        (Access::Protected, false) => RouteDecision::Redirect {
            to: SIGN_IN.to_string(),
        },
        (Access::GuestOnly, true) => RouteDecision::Redirect {
            to: HOME_FEED.to_string(),
        },
        _ => RouteDecision::Allow,
    }
}

fn lookup(path: &str) -> Option<Access> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    ROUTES
        .iter()
        .find(|(pattern, _)| matches_pattern(pattern, path))
        .map(|(_, access)| *access)
}

fn matches_pattern(pattern: &str, path: &str) -> bool {
    let mut pattern_parts = pattern.split('/');
    let mut path_parts = path.split('/');
    loop {
        match (pattern_parts.next(), path_parts.next()) {
            (None, None) => return true,
            (Some(p), Some(s)) if p.starts_with(':') => {
                if s.is_empty() {
                    return false;
                }
            }
            (Some(p), Some(s)) if p == s => {}
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect(to: &str) -> RouteDecision {
        RouteDecision::Redirect { to: to.to_string() }
    }

    #[test]
    fn test_protected_routes_need_a_user() {
        assert_eq!(resolve("/feed", false), redirect("/signin"));
        assert_eq!(resolve("/profile/ada", false), redirect("/signin"));
        assert_eq!(resolve("/feed", true), RouteDecision::Allow);
        assert_eq!(resolve("/library/", true), RouteDecision::Allow);
    }

    #[test]
    fn test_auth_pages_bounce_signed_in_users() {
        assert_eq!(resolve("/signin", true), redirect("/feed"));
        assert_eq!(resolve("/signup?ref=x", true), redirect("/feed"));
        assert_eq!(resolve("/signin", false), RouteDecision::Allow);
        assert_eq!(resolve("/check-email", true), RouteDecision::Allow);
    }

    #[test]
    fn test_unknown_routes() {
        assert_eq!(resolve("/", false), RouteDecision::Allow);
        assert_eq!(resolve("/admin", true), RouteDecision::NotFound);
        assert_eq!(resolve("/profile/ada/extra", true), RouteDecision::NotFound);
    }
}
