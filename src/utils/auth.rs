//! Credential headers for outbound requests.

/// Attach `Authorization: Bearer <token>` when a token is configured.
///
/// Blank tokens are treated as absent so an empty environment variable does
/// not produce a malformed header.
pub fn add_bearer_auth(
    request: reqwest::RequestBuilder,
    token: Option<&str>,
) -> reqwest::RequestBuilder {
    match token.map(str::trim).filter(|token| !token.is_empty()) {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}
