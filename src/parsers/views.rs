use once_cell::sync::Lazy;
use regex::Regex;

static COUNTER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d[\d\s\u{00a0}\u{202f},]*")
        .expect("Invalid view counter regex")
});

/// Pulls the first integer out of counter text such as "Просмотров: 1 204".
pub fn parse_view_count(text: &str) -> Option<i64> {
    let found = COUNTER_REGEX.find(text)?;
    let digits: String = found
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_grouped_counters() {
        assert_eq!(parse_view_count("Просмотров: 1 204"), Some(1204));
        assert_eq!(parse_view_count("Views: 12,345"), Some(12345));
        assert_eq!(parse_view_count("87"), Some(87));
    }

    #[test]
    fn no_digits_means_no_count() {
        assert_eq!(parse_view_count("Просмотров: —"), None);
        assert_eq!(parse_view_count(""), None);
    }
}
