//! Page titles.
//!
//! A `Title` is a namespace plus normalised page text. The engine only builds
//! titles out of references it finds in the document (template names, link
//! targets) and out of category names; everything else is handed in by the
//! caller.

use crate::wikitext::enums::Namespace;
use crate::wikitext::errors::{Result, WtError};
use std::fmt;
use std::str::FromStr;

/// Characters that can never appear in a title.
const ILLEGAL: &[char] = &['<', '>', '[', ']', '{', '}', '|'];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Title {
    namespace: Namespace,
    text: String,
}

impl Title {
    /// Build a title directly. The text is normalised but not validated.
    pub fn new<S: AsRef<str>>(namespace: Namespace, text: S) -> Self {
        Title {
            namespace,
            text: normalise(text.as_ref()),
        }
    }

    /// A page in the Special namespace, e.g. `Title::special("Contributions")`.
    pub fn special<S: AsRef<str>>(name: S) -> Self {
        Self::new(Namespace::Special, name)
    }

    /// Parse `text` as a title in the main namespace.
    pub fn new_from_text(text: &str) -> Result<Self> {
        Self::new_from_text_in(text, Namespace::Main)
    }

    /// Parse `text`, using `default` when no namespace prefix is present.
    ///
    /// A leading `:` forces the main namespace unless a prefix follows it, so
    /// `{{:Foo}}` names the article `Foo` and `[[:Category:X]]` names the
    /// category page itself.
    pub fn new_from_text_in(text: &str, default: Namespace) -> Result<Self> {
        let mut rest = text.trim();
        let mut default = default;
        if let Some(stripped) = rest.strip_prefix(':') {
            rest = stripped.trim_start();
            default = Namespace::Main;
        }
        // fragments are not part of the title
        if let Some(hash) = rest.find('#') {
            rest = &rest[..hash];
        }
        if let Some(bad) = rest.chars().find(|c| ILLEGAL.contains(c)) {
            return Err(WtError::invalid_arg(format!(
                "title '{}' contains illegal character '{}'",
                text, bad
            )));
        }

        let (namespace, page) = match rest.split_once(':') {
            Some((prefix, page)) => match Namespace::from_str(prefix) {
                Ok(ns) if ns != Namespace::Main => (ns, page),
                _ => (default, rest),
            },
            None => (default, rest),
        };

        let title = Self::new(namespace, page);
        if title.text.is_empty() {
            return Err(WtError::invalid_arg(format!("empty title '{}'", text)));
        }
        Ok(title)
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Page text without the namespace prefix.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Prefixed text with spaces, e.g. `Template:Foo bar`.
    pub fn full_text(&self) -> String {
        match self.namespace {
            Namespace::Main => self.text.clone(),
            ns => format!("{}:{}", ns.canonical_name(), self.text),
        }
    }

    /// Database key: unprefixed text with spaces as underscores.
    pub fn db_key(&self) -> String {
        self.text.replace(' ', "_")
    }

    /// Prefixed database key, e.g. `Template:Foo_bar`.
    pub fn prefixed_db_key(&self) -> String {
        self.full_text().replace(' ', "_")
    }

    /// Special pages are administrative contexts: no tracking categories.
    pub fn is_special(&self) -> bool {
        self.namespace == Namespace::Special
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_text())
    }
}

/// Underscores become spaces, runs of spaces collapse, first letter is upper-cased.
fn normalise(text: &str) -> String {
    let spaced = text.replace('_', " ");
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
