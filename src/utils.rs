/// Convert a URL to a sanitized filename stem
pub fn sanitize_filename(url: &str) -> String {
    // Remove protocol and replace invalid filename characters
    let mut name = url.replace("http://", "").replace("https://", "");
    name = name.replace(['/', ':', '?', '&', '=', '#', '%'], "_");

    // Limit filename length
    if name.len() > 100 {
        name[..100].to_string()
    } else {
        name
    }
}

/// Build a stable screenshot filename from a page's URL and content
/// fingerprint. The fingerprint prefix disambiguates URLs that collide
/// after sanitization.
pub fn screenshot_filename(url: &str, fingerprint: &str) -> String {
    let fp = &fingerprint[..fingerprint.len().min(8)];
    format!("{}_{}.png", sanitize_filename(url), fp)
}
