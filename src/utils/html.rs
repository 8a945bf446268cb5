use ammonia;

/// Clean author-supplied HTML using the ammonia library.
///
/// Whitelist-based: formatting tags (<b>, <p>, <a>) survive, while <script>,
/// <iframe> and event-handler attributes are stripped. Post bodies are
/// rendered as HTML by the portal, so this runs on every write.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Like `clean_html`, but maps empty results to `None`.
pub fn clean_optional(input: Option<String>) -> Option<String> {
    input
        .map(|text| clean_html(&text))
        .filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_keeps_markup() {
        let cleaned = clean_html("<p>Hello <b>world</b></p><script>alert(1)</script>");
        assert_eq!(cleaned, "<p>Hello <b>world</b></p>");
    }

    #[test]
    fn optional_drops_empty_results() {
        assert_eq!(clean_optional(Some("<script>x</script>".into())), None);
        assert_eq!(clean_optional(None), None);
        assert_eq!(clean_optional(Some("short".into())).as_deref(), Some("short"));
    }
}
