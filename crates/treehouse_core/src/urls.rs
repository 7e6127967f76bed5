use url::Url;

/// Scheme, host and port of `url`, without a trailing slash
/// (`https://teamtreehouse.com`). `None` for unparsable or opaque URLs.
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return None;
    }
    Some(origin.ascii_serialization())
}

/// The stage-listing page lives under the course URL: `{course}{suffix}`.
pub fn stage_listing_url(course_url: &str, suffix: &str) -> String {
    let course = course_url.trim().trim_end_matches('/');
    let suffix = suffix.trim();
    if suffix.is_empty() {
        return course.to_string();
    }
    if suffix.starts_with('/') {
        format!("{course}{suffix}")
    } else {
        format!("{course}/{suffix}")
    }
}

/// Turn a link found on a page into an absolute URL.
///
/// Absolute links are returned as-is; anything else is prefixed with the
/// site's origin. Empty links resolve to `None`.
pub fn resolve_link(origin: &str, link: &str) -> Option<String> {
    let trimmed = link.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(trimmed) {
        if url.has_host() {
            return Some(trimmed.to_string());
        }
    }
    let origin = origin.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("//") {
        let scheme = origin.split_once("://").map_or("https", |(scheme, _)| scheme);
        return Some(format!("{scheme}://{rest}"));
    }
    if trimmed.starts_with('/') {
        Some(format!("{origin}{trimmed}"))
    } else {
        Some(format!("{origin}/{trimmed}"))
    }
}
