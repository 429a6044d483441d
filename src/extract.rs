//! Tag-delimited extraction of artifacts from raw model text.

/// Return the trimmed text between the first `<tag>` and the first `</tag>`
/// that follows it.
///
/// Falls back to the unmodified input when either delimiter is missing.
pub fn extract_between(text: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let Some(start) = text.find(&open) else {
        tracing::debug!(tag, "extraction tag missing; using raw text");
        return text.to_string();
    };
    let body = &text[start + open.len()..];
    let Some(end) = body.find(&close) else {
        tracing::debug!(tag, "closing tag missing; using raw text");
        return text.to_string();
    };
    body[..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tagged_core() {
        assert_eq!(
            extract_between("blah <analysis>core</analysis> trailing", "analysis"),
            "core"
        );
    }

    #[test]
    fn returns_input_when_tags_absent() {
        assert_eq!(extract_between("no tags here", "analysis"), "no tags here");
    }

    #[test]
    fn returns_input_when_only_one_delimiter_present() {
        let text = "<review>unterminated";
        assert_eq!(extract_between(text, "review"), text);
        let text = "dangling</review>";
        assert_eq!(extract_between(text, "review"), text);
    }

    #[test]
    fn trims_multiline_body_and_uses_first_pair() {
        let text = "<final_translation>\n  Grâce infinie\n</final_translation>\n<final_translation>x</final_translation>";
        assert_eq!(extract_between(text, "final_translation"), "Grâce infinie");
    }

    #[test]
    fn stray_closing_tag_before_opening_is_skipped() {
        assert_eq!(extract_between("</a> x <a>y</a>", "a"), "y");
        let text = "</analysis> then <analysis>";
        assert_eq!(extract_between(text, "analysis"), text);
    }
}
