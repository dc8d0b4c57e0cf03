use http::header::AUTHORIZATION;

/// Key from `Authorization: Bearer <key>`, forwarded upstream as-is.
///
/// A missing key is not rejected locally; the upstream answers 401/403 and
/// that response is relayed.
#[must_use]
pub fn extract_bearer_key(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|key| !key.is_empty())
}
