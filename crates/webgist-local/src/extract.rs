use html_scraper::{Html, Node, Selector};

/// Character budget for cleaned page content handed to the prompt.
pub const MAX_CONTENT_CHARS: usize = 8_000;

/// Structural elements whose subtrees are never treated as content.
const NOISE_TAGS: &[&str] = &["script", "style", "nav", "footer", "header"];

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => (s[..byte].to_string(), true),
        None => (s.to_string(), false),
    }
}

fn is_noise(node: &Node) -> bool {
    node.as_element()
        .map(|el| NOISE_TAGS.contains(&el.name()))
        .unwrap_or(false)
}

/// Visible paragraph text of an HTML document.
///
/// Every `<p>` outside `script/style/nav/footer/header` contributes its
/// whitespace-normalized text; paragraphs are joined with single spaces and the
/// result is capped at [`MAX_CONTENT_CHARS`]. Malformed markup is recovered by
/// the parser, so this never fails; it may return an empty string.
pub fn paragraph_text(html: &str) -> String {
    let joined = paragraphs(html).join(" ");
    truncate_chars(&joined, MAX_CONTENT_CHARS).0
}

fn paragraphs(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("p") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for p in doc.select(&sel) {
        if p.ancestors().any(|n| is_noise(n.value())) {
            continue;
        }
        let mut raw = String::new();
        for node in p.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            // Noise nested inside the paragraph itself (inline <script> etc.).
            if node
                .ancestors()
                .take_while(|a| a.id() != p.id())
                .any(|a| is_noise(a.value()))
            {
                continue;
            }
            raw.push_str(text);
            raw.push(' ');
        }
        let text = norm_ws(&raw);
        if !text.is_empty() {
            out.push(text);
        }
    }
    out
}
