//! Routing directive parsing
//!
//! A directive is a message whose first line lists target contacts, each
//! introduced by the prefix character, and whose remaining lines are the
//! payload:
//!
//! ```text
//! #Alice#Project Team
//! Meeting moved to 5pm.
//! Bring the slides.
//! ```

use crate::config::Config;

/// Target contacts and the payload to retype to each of them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayDirective {
    /// In message order; duplicates are kept and each is sent separately
    pub target_names: Vec<String>,
    /// Everything after the first newline, unmodified
    pub payload: String,
}

impl RelayDirective {
    /// False when every name fragment was blank
    pub fn is_actionable(&self) -> bool {
        !self.target_names.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DirectiveParser {
    prefix: char,
}

impl DirectiveParser {
    pub fn new(prefix: char) -> Self {
        Self { prefix }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.contact_prefix)
    }

    pub fn prefix(&self) -> char {
        self.prefix
    }

    /// Parse `raw` into a directive, or `None` if it is not one: it must
    /// start with the prefix and contain a newline.
    pub fn parse(&self, raw: &str) -> Option<RelayDirective> {
        let split = raw.find('\n')?;
        if !raw.starts_with(self.prefix) {
            return None;
        }

        let target_names = raw[..split]
            .split(self.prefix)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        Some(RelayDirective {
            target_names,
            payload: raw[split + 1..].to_string(),
        })
    }
}

impl Default for DirectiveParser {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONTACT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(raw: &str) -> Option<RelayDirective> {
        DirectiveParser::default().parse(raw)
    }

    #[test]
    fn test_two_targets_multiline_payload() {
        let d = parse("#A#B\nhello\nworld").unwrap();
        assert_eq!(d.target_names, vec!["A", "B"]);
        assert_eq!(d.payload, "hello\nworld");
        assert!(d.is_actionable());
    }

    #[test]
    fn test_prefix_only_is_not_actionable() {
        let d = parse("#\nx").unwrap();
        assert!(d.target_names.is_empty());
        assert_eq!(d.payload, "x");
        assert!(!d.is_actionable());
    }

    #[test]
    fn test_no_newline() {
        assert_eq!(parse("#Alice"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn test_no_prefix() {
        assert_eq!(parse("Alice\nhello"), None);
        assert_eq!(parse(" #Alice\nhello"), None);
        assert_eq!(parse("\n#Alice"), None);
    }

    #[test]
    fn test_names_trimmed_and_blank_dropped() {
        let d = parse("# Alice Smith #  # Bob\t#\npayload").unwrap();
        assert_eq!(d.target_names, vec!["Alice Smith", "Bob"]);
    }

    #[test]
    fn test_duplicates_preserved_in_order() {
        let d = parse("#Bob#Alice#Bob\nx").unwrap();
        assert_eq!(d.target_names, vec!["Bob", "Alice", "Bob"]);
    }

    #[test]
    fn test_payload_unmodified() {
        let d = parse("#A\n  indented\n#B is not a target\n").unwrap();
        assert_eq!(d.target_names, vec!["A"]);
        assert_eq!(d.payload, "  indented\n#B is not a target\n");
    }

    #[test]
    fn test_empty_payload() {
        let d = parse("#A\n").unwrap();
        assert_eq!(d.payload, "");
    }

    #[test]
    fn test_custom_prefix() {
        let parser = DirectiveParser::new('@');
        let d = parser.parse("@Ann@Ben\nhi").unwrap();
        assert_eq!(d.target_names, vec!["Ann", "Ben"]);
        assert_eq!(parser.parse("#Ann\nhi"), None);
    }

    #[test]
    fn test_unicode_names() {
        let d = parse("#Zoë#李雷\nça va").unwrap();
        assert_eq!(d.target_names, vec!["Zoë", "李雷"]);
        assert_eq!(d.payload, "ça va");
    }

    proptest! {
        #[test]
        fn prop_non_prefixed_is_ignored(raw in "[^#].*(\n.*)?") {
            prop_assert_eq!(parse(&raw), None);
        }

        #[test]
        fn prop_parse_is_deterministic(raw in "#[a-zA-Z# ]{0,20}\n[a-z\n#]{0,30}") {
            let first = parse(&raw);
            prop_assert!(first.is_some());
            prop_assert_eq!(first, parse(&raw));
        }

        #[test]
        fn prop_names_never_blank(raw in "#[a-z #\t]{0,30}\n.*") {
            let d = parse(&raw).unwrap();
            prop_assert!(d.target_names.iter().all(|n| !n.is_empty() && n.trim() == n));
        }
    }
}
