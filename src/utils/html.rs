//! Plain-text rendering of the HTML bodies platforms send

use regex::Regex;
use std::sync::LazyLock;

static BREAK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>|</h\d>").unwrap());
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static BLANK_LINES_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Lines kept in a notification excerpt
pub const EXCERPT_LINES: usize = 4;

/// Strip tags, decode common entities and collapse runs of blank lines
pub fn strip_html(input: &str) -> String {
    let text = BREAK_REGEX.replace_all(input, "\n");
    let text = TAG_REGEX.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    BLANK_LINES_REGEX
        .replace_all(text.trim(), "\n\n")
        .into_owned()
}

/// First `EXCERPT_LINES` non-empty lines of plain text
pub fn first_lines(text: &str) -> String {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .take(EXCERPT_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut `text` to at most `max_chars` characters, marking the cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn decode_entities(text: &str) -> String {
    // &amp; last so "&amp;lt;" stays literal
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_basic() {
        assert_eq!(
            strip_html("<p>Room <b>DMP 110</b></p><p>Bring a pencil &amp; ID</p>"),
            "Room DMP 110\nBring a pencil & ID"
        );
    }

    #[test]
    fn test_strip_html_keeps_escaped_markup_literal() {
        assert_eq!(strip_html("a &amp;lt; b"), "a &lt; b");
        assert_eq!(strip_html("x &lt;y&gt;"), "x <y>");
    }

    #[test]
    fn test_strip_html_collapses_blank_lines() {
        assert_eq!(strip_html("a<br><br><br><br>b"), "a\n\nb");
    }

    #[test]
    fn test_first_lines_takes_four_lines() {
        let body = strip_html("<p>one</p><p>two</p><p></p><p>three</p><p>four</p><p>five</p>");
        assert_eq!(first_lines(&body), "one\ntwo\nthree\nfour");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
