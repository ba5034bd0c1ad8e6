//! Redaction for text that leaves the process toward telemetry storage.
//!
//! Only reasoning and intermediate steps go through here; the user-facing
//! answer is never rewritten.

use regex::Regex;
use std::sync::LazyLock;

pub const EMAIL_PLACEHOLDER: &str = "[REDACTED_EMAIL]";
pub const API_KEY_PLACEHOLDER: &str = "[REDACTED_API_KEY]";

static EMAIL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok()
});
// `sk-...`, `pk-...`, `sess-...`: short alphabetic prefix, hyphen, long token
// run. Only runs containing a digit count; long hyphenated words do not.
static API_KEY_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z]{2,8}-[A-Za-z0-9_-]{16,}").ok());

/// Redact email addresses and API-key-shaped tokens.
///
/// Returns `None` if a redaction rule is unavailable. Callers must then drop
/// the text rather than forward it unscrubbed.
pub fn scrub(text: &str) -> Option<String> {
    let email = EMAIL_RE.as_ref()?;
    let api_key = API_KEY_RE.as_ref()?;
    let out = email.replace_all(text, EMAIL_PLACEHOLDER);
    let out = api_key.replace_all(&out, |caps: &regex::Captures<'_>| {
        let token = &caps[0];
        if token.bytes().any(|b| b.is_ascii_digit()) {
            API_KEY_PLACEHOLDER.to_string()
        } else {
            token.to_string()
        }
    });
    Some(out.into_owned())
}

/// [`scrub`] applied to every string inside a JSON value.
pub fn scrub_json(value: &serde_json::Value) -> Option<serde_json::Value> {
    use serde_json::Value;
    Some(match value {
        Value::String(s) => Value::String(scrub(s)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(scrub_json)
                .collect::<Option<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), scrub_json(v)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}
