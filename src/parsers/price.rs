/// Keeps digits and the decimal point, then parses. Anything unparsable is 0.
pub fn normalize_price(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    cleaned.parse::<f64>().unwrap_or(0.0)
}
