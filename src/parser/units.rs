/// Unit string used for service rows (no quantity/price in the source).
pub const SERVICE_UNIT: &str = "service";

/// Resolves an OKEI-style measurement unit code to a short human-readable
/// unit. Unknown codes are not an error; the caller falls back to the raw
/// code with an info issue.
pub fn resolve(code: &str) -> Option<&'static str> {
    match code.trim() {
        "006" => Some("m"),
        "055" => Some("m2"),
        "113" => Some("m3"),
        "112" => Some("l"),
        "166" => Some("kg"),
        "168" => Some("t"),
        "356" => Some("h"),
        "359" => Some("day"),
        "362" => Some("month"),
        "642" => Some("unit"),
        "736" => Some("roll"),
        "778" => Some("pack"),
        "796" => Some("pcs"),
        "839" => Some("set"),
        "876" => Some(SERVICE_UNIT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_resolve() {
        assert_eq!(resolve("796"), Some("pcs"));
        assert_eq!(resolve(" 166 "), Some("kg"));
        assert_eq!(resolve("876"), Some(SERVICE_UNIT));
    }

    #[test]
    fn unknown_codes_fall_through() {
        assert_eq!(resolve("999"), None);
        assert_eq!(resolve(""), None);
    }
}
