//! Command argument parsing utilities.
//!
//! Commands take leading flags such as `-since 2-week` or `-all`, followed by
//! positional arguments. Only flags listed as value flags consume the next
//! token; a bare number like `-1001234` is positional, not a flag.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static FLAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-([A-Za-z]\w*)$").unwrap());

/// Result of parsing command arguments with leading flags.
#[derive(Debug, Clone, Default)]
pub struct ParsedArgs {
    /// Flags by lowercase name; switches map to `None`.
    pub flags: HashMap<String, Option<String>>,
    /// Remaining positional arguments.
    pub positional: Vec<String>,
}

impl ParsedArgs {
    pub fn has(&self, flag: &str) -> bool {
        self.flags.contains_key(flag)
    }

    pub fn value(&self, flag: &str) -> Option<&str> {
        self.flags.get(flag).and_then(|v| v.as_deref())
    }
}

/// Parse leading flags; `value_flags` names the flags that take a value.
///
/// # Examples
/// ```ignore
/// let parsed = parse_args("-since 3-day 42 43", &["since"]);
/// assert_eq!(parsed.value("since"), Some("3-day"));
/// assert_eq!(parsed.positional, vec!["42", "43"]);
/// ```
pub fn parse_args(args: &str, value_flags: &[&str]) -> ParsedArgs {
    let mut parsed = ParsedArgs::default();
    let mut parts = args.split_whitespace().peekable();

    while let Some(part) = parts.peek() {
        let Some(caps) = FLAG_REGEX.captures(part) else {
            break;
        };
        let name = caps[1].to_lowercase();
        parts.next();

        let value = if value_flags.contains(&name.as_str()) {
            parts.next().map(str::to_string)
        } else {
            None
        };
        parsed.flags.insert(name, value);
    }

    parsed.positional = parts.map(str::to_string).collect();
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args_empty() {
        let parsed = parse_args("", &["since"]);
        assert!(parsed.flags.is_empty());
        assert!(parsed.positional.is_empty());
    }

    #[test]
    fn test_parse_args_no_flags() {
        let parsed = parse_args("42 43", &["since"]);
        assert!(parsed.flags.is_empty());
        assert_eq!(parsed.positional, vec!["42", "43"]);
    }

    #[test]
    fn test_parse_args_value_flag() {
        let parsed = parse_args("-since 3-day 42", &["since"]);
        assert_eq!(parsed.value("since"), Some("3-day"));
        assert_eq!(parsed.positional, vec!["42"]);
    }

    #[test]
    fn test_parse_args_switch() {
        let parsed = parse_args("-all 42", &["since"]);
        assert!(parsed.has("all"));
        assert_eq!(parsed.value("all"), None);
        assert_eq!(parsed.positional, vec!["42"]);
    }

    #[test]
    fn test_parse_args_case_insensitive_flag() {
        let parsed = parse_args("-Due 1-week", &["due"]);
        assert_eq!(parsed.value("due"), Some("1-week"));
    }

    #[test]
    fn test_parse_args_negative_number_is_positional() {
        let parsed = parse_args("-1001234567890", &["since"]);
        assert!(parsed.flags.is_empty());
        assert_eq!(parsed.positional, vec!["-1001234567890"]);
    }

    #[test]
    fn test_parse_args_value_flag_at_end() {
        let parsed = parse_args("-since", &["since"]);
        assert!(parsed.has("since"));
        assert_eq!(parsed.value("since"), None);
    }

    #[test]
    fn test_parse_args_stops_at_positional() {
        let parsed = parse_args("42 -all", &[]);
        assert!(!parsed.has("all"));
        assert_eq!(parsed.positional, vec!["42", "-all"]);
    }
}
