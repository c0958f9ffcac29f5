//! Mount option classification.
//!
//! The raw option string is split on commas. `rw` is discarded, the four
//! identity keys are extracted, and every other token is kept verbatim,
//! in order, for the FUSE layer.

use std::fmt;

use usermap_common::constants::{
    OPT_GROUP, OPT_RW, OPT_SOURCE_GROUP, OPT_SOURCE_USER, OPT_USER, OPTION_SEPARATOR,
};

/// Ordered, uninterpreted mount options destined for the FUSE layer.
///
/// Duplicates are kept; order is the order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet(Vec<String>);

impl OptionSet {
    /// Creates an empty option set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends one opaque token.
    pub fn push(&mut self, token: impl Into<String>) {
        self.0.push(token.into());
    }

    /// Iterates over the tokens in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of tokens.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set holds no tokens.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the tokens as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(&OPTION_SEPARATOR.to_string()))
    }
}

impl<S: Into<String>> FromIterator<S> for OptionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Result of classifying a raw option string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    /// Value of `source_user=`, if given.
    pub source_user: Option<String>,
    /// Value of `source_group=`, if given.
    pub source_group: Option<String>,
    /// Value of `user=`, if given.
    pub user: Option<String>,
    /// Value of `group=`, if given.
    pub group: Option<String>,
    /// Every token that is not one of the above.
    pub passthrough: OptionSet,
}

/// Classifies a comma-separated option string.
///
/// Empty tokens are skipped. When a key repeats, the last value wins.
#[must_use]
pub fn parse_options(raw: &str) -> ParsedOptions {
    let mut parsed = ParsedOptions::default();
    for token in raw.split(OPTION_SEPARATOR).filter(|t| !t.is_empty()) {
        if token == OPT_RW {
            continue;
        } else if let Some(value) = token.strip_prefix(OPT_SOURCE_USER) {
            parsed.source_user = Some(value.to_owned());
        } else if let Some(value) = token.strip_prefix(OPT_SOURCE_GROUP) {
            parsed.source_group = Some(value.to_owned());
        } else if let Some(value) = token.strip_prefix(OPT_USER) {
            parsed.user = Some(value.to_owned());
        } else if let Some(value) = token.strip_prefix(OPT_GROUP) {
            parsed.group = Some(value.to_owned());
        } else {
            parsed.passthrough.push(token);
        }
    }
    tracing::debug!(passthrough = %parsed.passthrough, "classified mount options");
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_keys_are_extracted_and_removed() {
        let parsed = parse_options(
            "source_user=alice,source_group=staff,user=bob,group=wheel,allow_other",
        );
        assert_eq!(parsed.source_user.as_deref(), Some("alice"));
        assert_eq!(parsed.source_group.as_deref(), Some("staff"));
        assert_eq!(parsed.user.as_deref(), Some("bob"));
        assert_eq!(parsed.group.as_deref(), Some("wheel"));
        assert_eq!(parsed.passthrough.as_slice(), ["allow_other"]);
    }

    #[test]
    fn rw_is_discarded() {
        let parsed = parse_options("rw,ro,rw");
        assert_eq!(parsed.passthrough.as_slice(), ["ro"]);
    }

    #[test]
    fn opaque_tokens_keep_order_and_duplicates() {
        let parsed = parse_options("nosuid,uid=5000,source_user=x,nosuid,fsname=home");
        assert_eq!(parsed.passthrough.to_string(), "nosuid,uid=5000,nosuid,fsname=home");
    }

    #[test]
    fn uid_is_not_confused_with_user_key() {
        let parsed = parse_options("source_user=alice,rw,uid=5000");
        assert_eq!(parsed.user, None);
        assert_eq!(parsed.passthrough.as_slice(), ["uid=5000"]);
    }

    #[test]
    fn empty_tokens_are_skipped() {
        let parsed = parse_options(",,allow_other,,");
        assert_eq!(parsed.passthrough.len(), 1);
        assert!(parse_options("").passthrough.is_empty());
    }

    #[test]
    fn last_value_wins_for_repeated_keys() {
        let parsed = parse_options("user=first,user=second");
        assert_eq!(parsed.user.as_deref(), Some("second"));
    }
}
