use crate::conversation::ContentItem;
use regex::Regex;
use std::sync::LazyLock;

const EXIT_TOKENS: [&str; 4] = ["exit", "quit", "/exit", "/quit"];

static ATTACHMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(image|video):([^>]+)>").expect("attachment pattern is a valid regex")
});

/// Result of parsing one line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    /// The user asked to end the session.
    Terminate,
    /// Attachments in order of appearance, then the remaining text if any.
    /// Empty when the input was blank.
    Content(Vec<ContentItem>),
}

pub fn is_exit_token(raw: &str) -> bool {
    let folded = raw.trim().to_lowercase();
    EXIT_TOKENS.contains(&folded.as_str())
}

/// Splits inline `<image:...>` / `<video:...>` markers out of `raw`.
///
/// Attachments always come before the trailing text item, whatever their
/// position in the input; text between markers is merged into that one item.
pub fn parse(raw: &str) -> ParsedInput {
    if is_exit_token(raw) {
        return ParsedInput::Terminate;
    }

    let mut items = Vec::new();
    for caps in ATTACHMENT_PATTERN.captures_iter(raw) {
        let locator = caps[2].to_string();
        match &caps[1] {
            "image" => items.push(ContentItem::image(locator)),
            _ => items.push(ContentItem::video(locator)),
        }
    }

    let remaining = ATTACHMENT_PATTERN.replace_all(raw, "");
    let trailing = remaining.trim();
    if !trailing.is_empty() {
        items.push(ContentItem::text(trailing));
    }

    ParsedInput::Content(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(raw: &str) -> Vec<ContentItem> {
        match parse(raw) {
            ParsedInput::Content(items) => items,
            ParsedInput::Terminate => panic!("unexpected terminate for {:?}", raw),
        }
    }

    #[test]
    fn plain_text_becomes_single_trimmed_item() {
        for raw in ["hello", "  spaced out  ", "multi word question?\n", "a > b"] {
            assert_eq!(content(raw), vec![ContentItem::text(raw.trim())]);
        }
    }

    #[test]
    fn blank_input_yields_no_items() {
        for raw in ["", "   ", "\t\n"] {
            assert!(content(raw).is_empty());
        }
    }

    #[test]
    fn exit_tokens_terminate_regardless_of_case_and_whitespace() {
        for raw in ["exit", "QUIT", "  /Exit ", "/quit\n", "Quit"] {
            assert_eq!(parse(raw), ParsedInput::Terminate);
        }
        assert_ne!(parse("exit now"), ParsedInput::Terminate);
        assert_ne!(parse("/exits"), ParsedInput::Terminate);
    }

    #[test]
    fn image_marker_precedes_text() {
        assert_eq!(
            content("<image:foo.jpg> describe this"),
            vec![ContentItem::image("foo.jpg"), ContentItem::text("describe this")]
        );
    }

    #[test]
    fn attachments_come_first_whatever_their_position() {
        assert_eq!(
            content("compare <image:a.png> with <image:https://example.com/b.jpg> please"),
            vec![
                ContentItem::image("a.png"),
                ContentItem::image("https://example.com/b.jpg"),
                ContentItem::text("compare  with  please"),
            ]
        );
    }

    #[test]
    fn tag_decides_kind_not_extension() {
        assert_eq!(
            content("<video:clip.jpg><image:movie.mp4>"),
            vec![ContentItem::video("clip.jpg"), ContentItem::image("movie.mp4")]
        );
    }

    #[test]
    fn marker_only_input_has_no_text_item() {
        assert_eq!(content("  <video:clip.mp4>  "), vec![ContentItem::video("clip.mp4")]);
    }

    #[test]
    fn malformed_markers_stay_in_text() {
        assert_eq!(
            content("<image:> <audio:x.wav> <image:open"),
            vec![ContentItem::text("<image:> <audio:x.wav> <image:open")]
        );
    }
}
