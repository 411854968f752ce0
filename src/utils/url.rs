//! Backend URL handling.

/// Strips trailing slashes so endpoint paths can be joined with a single `/`.
///
/// ```
/// use parley::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:8000/"), "http://localhost:8000");
/// assert_eq!(normalize_base_url("https://chat.example.com/v2//"), "https://chat.example.com/v2");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Joins a backend base URL and an endpoint path such as `api/chat`.
///
/// ```
/// use parley::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:8000/", "/api/models"),
///     "http://localhost:8000/api/models"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        normalize_base_url(base_url),
        endpoint.trim_start_matches('/')
    )
}

/// Normalizes `base_url` and checks that it names an http(s) origin.
pub fn validate_base_url(base_url: &str) -> Result<String, String> {
    let normalized = normalize_base_url(base_url);
    let rest = normalized
        .strip_prefix("http://")
        .or_else(|| normalized.strip_prefix("https://"))
        .ok_or_else(|| format!("expected an http:// or https:// URL, got '{base_url}'"))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(format!("missing host in '{base_url}'"));
    }
    Ok(normalized)
}
