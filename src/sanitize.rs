use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

// Code points the xlsx XML parts cannot carry.
static ILLEGAL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").expect("valid control character class")
});

/// Strips the spreadsheet-illegal control characters from `value`.
///
/// Tab, line feed and carriage return are kept.
pub fn clean_text(value: &str) -> String {
    ILLEGAL_CHARS.replace_all(value, "").into_owned()
}

/// Applies [`clean_text`] to string values and leaves every other JSON value as is.
///
/// Nested arrays and objects are cleaned recursively, since they are written to
/// the sheet as their JSON text.
pub fn clean_value(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(clean_text(&text)),
        Value::Array(items) => Value::Array(items.into_iter().map(clean_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, clean_value(value)))
                .collect(),
        ),
        other => other,
    }
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strips_every_illegal_code_point() {
        let illegal: String = (0x00u32..=0x1F)
            .filter(|cp| !matches!(cp, 0x09 | 0x0A | 0x0D))
            .filter_map(char::from_u32)
            .collect();
        let input = format!("a{illegal}b");
        assert_eq!(clean_text(&input), "ab");
    }

    #[test]
    fn keeps_whitespace_controls_and_unicode() {
        let input = "line\tone\r\nÜber – 東京 🚀";
        assert_eq!(clean_text(input), input);
    }

    #[test]
    fn clean_value_only_touches_strings() {
        let value = json!({
            "agency": "EPA\u{0007}",
            "value": 12.5,
            "flag": true,
            "missing": null,
            "tags": ["a\u{001F}b"]
        });
        let cleaned = clean_value(value);
        assert_eq!(cleaned["agency"], "EPA");
        assert_eq!(cleaned["value"], 12.5);
        assert_eq!(cleaned["flag"], true);
        assert!(cleaned["missing"].is_null());
        assert_eq!(cleaned["tags"][0], "ab");
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html(r#"<b>"R&D"</b>"#),
            "&lt;b&gt;&quot;R&amp;D&quot;&lt;/b&gt;"
        );
    }
}
