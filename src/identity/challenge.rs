use axum::http::{HeaderMap, StatusCode};

/// Decide whether a downstream response should be turned into a challenge.
///
/// Scripted (XHR) requests get the bare 401 so the calling page can react;
/// redirecting them to the login form would hand HTML to a script.
pub fn should_challenge(request_headers: &HeaderMap, status: StatusCode, _response_headers: &HeaderMap) -> bool {
    let xhr = request_headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "XMLHttpRequest");
    !xhr && status == StatusCode::UNAUTHORIZED
}
