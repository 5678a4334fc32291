//! Base-URL handling for the relay and gateway endpoints.

/// Strip trailing slashes so endpoint paths can be appended safely.
///
/// ```
/// use agentdesk::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://127.0.0.1:9800/"), "http://127.0.0.1:9800");
/// assert_eq!(normalize_base_url("https://gateway.example/v1///"), "https://gateway.example/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them.
///
/// ```
/// use agentdesk::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://gateway.example/v1/", "/chat/completions"),
///     "https://gateway.example/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}

/// Whether a configured base URL looks usable for HTTP requests.
pub fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/'))
}
