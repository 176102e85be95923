/// Statuses a protected site answers with when it rejects automation.
const BLOCKING_STATUSES: &[u16] = &[401, 403, 429, 503];

/// True when the navigation status or the rendered page says we were blocked.
pub fn detect_blocking(status: Option<u16>, content: &str, markers: &[String]) -> bool {
    if let Some(code) = status {
        if BLOCKING_STATUSES.contains(&code) {
            return true;
        }
    }

    let lowered = content.to_lowercase();
    markers
        .iter()
        .filter(|marker| !marker.is_empty())
        .any(|marker| lowered.contains(&marker.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        vec!["Access Denied".to_string(), "captcha".to_string()]
    }

    #[test]
    fn rejection_status_is_blocking() {
        assert!(detect_blocking(Some(403), "<html></html>", &markers()));
        assert!(detect_blocking(Some(429), "", &markers()));
        assert!(!detect_blocking(Some(200), "<html>fine</html>", &markers()));
    }

    #[test]
    fn markers_match_case_insensitively() {
        assert!(detect_blocking(None, "<div>Please solve the CAPTCHA</div>", &markers()));
        assert!(detect_blocking(Some(200), "<h1>access denied</h1>", &markers()));
        assert!(!detect_blocking(None, "<h1>Listing</h1>", &[String::new()]));
    }
}
