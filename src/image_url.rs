//! Image URL helpers shared by the resolver, filter and updater.

/// Rewrites scheme-relative URLs to HTTPS and rejects anything that is not an
/// absolute http(s) URL with a host.
pub fn normalize_image_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let absolute = if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        trimmed.to_string()
    };
    let rest = absolute
        .strip_prefix("https://")
        .or_else(|| absolute.strip_prefix("http://"))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    Some(absolute)
}

/// URL without query string or fragment.
pub fn path_without_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Lower-cased host of an absolute or scheme-relative URL.
pub fn host_of(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .or_else(|| trimmed.strip_prefix("//"))?;
    let host = rest.split(['/', '?', '#']).next()?;
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

/// Last path segment, percent-decoded.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let path = path_without_query(url);
    let segment = path.rsplit('/').next()?.trim();
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(decoded)
}
