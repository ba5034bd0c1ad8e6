use regex::Regex;
use std::sync::LazyLock;

static URL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"https?://\S+").ok());

/// Find the first `http://` / `https://` token in free-form text.
///
/// The token is returned verbatim: it runs to the next whitespace, so prose
/// punctuation right after a URL ("see https://x.org/a.") stays attached.
pub fn extract_first_url(text: &str) -> Option<&str> {
    let re = URL_RE.as_ref()?;
    re.find(text).map(|m| m.as_str())
}
