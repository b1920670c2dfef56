use std::sync::OnceLock;

use regex::Regex;

fn block_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<\s*br\s*/?\s*>|</\s*(p|div|li|h[1-6]|tr)\s*>").expect("valid regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Decode the handful of entities helpdesk bodies actually contain
pub fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Strip markup from an HTML fragment and collapse it onto one line
pub fn strip_markup(input: &str) -> String {
    let spaced = block_break_re().replace_all(input, " ");
    let untagged = tag_re().replace_all(&spaced, "");
    let decoded = decode_entities(&untagged);
    whitespace_re().replace_all(&decoded, " ").trim().to_string()
}
