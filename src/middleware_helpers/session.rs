use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Cookie scoping anonymous carts to a browser.
pub const SESSION_COOKIE: &str = "sessionCartId";
const SESSION_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 30;

/// Session cart id resolved for the current request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionId(pub String);

/// Looks up a cookie by name across every `Cookie` header.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(session_id: &str) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, session_id, SESSION_MAX_AGE_SECS
    )
}

/// Issues the session cart cookie on the first request that lacks one.
pub async fn session_middleware(mut request: Request, next: Next) -> Response {
    let existing = read_cookie(request.headers(), SESSION_COOKIE);
    let session_id = existing
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(SessionId(session_id.clone()));

    let mut response = next.run(request).await;

    if existing.is_none() {
        if let Ok(value) = HeaderValue::from_str(&session_cookie(&session_id)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}
