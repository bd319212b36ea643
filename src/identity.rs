use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::convert::Infallible;

pub const ANONYMOUS: &str = "Anonymous";

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";
pub const IS_ADMIN_HEADER: &str = "x-is-admin";

/// Logged-in session as supplied by the auth layer in front of the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Option<i64>,
    pub username: String,
    pub is_admin: bool,
}

impl AuthContext {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let username = headers
            .get(USERNAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())?
            .to_string();

        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok());

        let is_admin = headers
            .get(IS_ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| matches!(s.trim(), "1" | "true" | "TRUE" | "True"))
            .unwrap_or(false);

        Some(Self { user_id, username, is_admin })
    }
}

/// Extractor that never rejects; `None` means no session.
pub struct Auth(pub Option<AuthContext>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Auth(AuthContext::from_headers(&parts.headers)))
    }
}

/// The unit a daily review limit is tracked against.
///
/// Without an authenticated id the username is the key, so anonymous
/// submitters sharing a name share one limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: Option<i64>,
    pub username: String,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self { user_id: None, username: ANONYMOUS.to_string() }
    }

    pub fn named(username: impl Into<String>) -> Self {
        Self { user_id: None, username: username.into() }
    }

    /// Session identity wins over whatever name the client submitted.
    pub fn resolve(auth: Option<&AuthContext>, submitted: Option<&str>, max_chars: usize) -> Self {
        match auth {
            Some(ctx) => Self {
                user_id: ctx.user_id,
                username: sanitize_username(Some(&ctx.username), max_chars),
            },
            None => Self {
                user_id: None,
                username: sanitize_username(submitted, max_chars),
            },
        }
    }

    pub fn key(&self) -> String {
        match self.user_id {
            Some(id) => format!("user:{}", id),
            None => format!("name:{}", self.username),
        }
    }
}

pub fn sanitize_username(input: Option<&str>, max_chars: usize) -> String {
    let trimmed = input.unwrap_or_default().trim();
    if trimmed.is_empty() {
        return ANONYMOUS.to_string();
    }
    trimmed.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn username_defaults_and_truncates() {
        assert_eq!(sanitize_username(None, 60), ANONYMOUS);
        assert_eq!(sanitize_username(Some("   "), 60), ANONYMOUS);
        assert_eq!(sanitize_username(Some("  kira "), 60), "kira");
        assert_eq!(sanitize_username(Some("abcdef"), 3), "abc");
    }

    #[test]
    fn key_prefers_user_id() {
        let named = Identity::named("alice");
        let authed = Identity { user_id: Some(7), username: "alice".into() };
        assert_eq!(named.key(), "name:alice");
        assert_eq!(authed.key(), "user:7");
        assert_ne!(named.key(), authed.key());
    }

    #[test]
    fn session_overrides_submitted_name() {
        let ctx = AuthContext { user_id: Some(3), username: "mod".into(), is_admin: true };
        let id = Identity::resolve(Some(&ctx), Some("someone-else"), 60);
        assert_eq!(id, Identity { user_id: Some(3), username: "mod".into() });

        let anon = Identity::resolve(None, Some(""), 60);
        assert_eq!(anon, Identity::anonymous());
    }

    #[test]
    fn auth_context_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(AuthContext::from_headers(&headers).is_none());

        headers.insert(USERNAME_HEADER, HeaderValue::from_static("bob"));
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("42"));
        headers.insert(IS_ADMIN_HEADER, HeaderValue::from_static("1"));
        let ctx = AuthContext::from_headers(&headers).unwrap();
        assert_eq!(ctx.user_id, Some(42));
        assert_eq!(ctx.username, "bob");
        assert!(ctx.is_admin);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("nope"));
        headers.remove(IS_ADMIN_HEADER);
        let ctx = AuthContext::from_headers(&headers).unwrap();
        assert_eq!(ctx.user_id, None);
        assert!(!ctx.is_admin);
    }
}
