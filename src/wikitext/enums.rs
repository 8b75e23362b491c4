//! Enums used by the wikitext module.
//!
//! - `Namespace`: the namespaces titles can live in.
//! - `InclusionMode`: which side of `<noinclude>`/`<includeonly>` is visible.
//! - `TrimPolicy`: how section text is trimmed when extracted or replaced.
//!
//! Each type implements `Display` and `FromStr` so it can come from config files
//! and command-line flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Page namespaces understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    Media,
    Special,
    Main,
    Talk,
    User,
    UserTalk,
    Project,
    File,
    MediaWiki,
    Template,
    Help,
    Category,
}

impl Namespace {
    /// Canonical prefix without the colon. Empty for the main namespace.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Namespace::Media => "Media",
            Namespace::Special => "Special",
            Namespace::Main => "",
            Namespace::Talk => "Talk",
            Namespace::User => "User",
            Namespace::UserTalk => "User talk",
            Namespace::Project => "Project",
            Namespace::File => "File",
            Namespace::MediaWiki => "MediaWiki",
            Namespace::Template => "Template",
            Namespace::Help => "Help",
            Namespace::Category => "Category",
        }
    }

    /// File and Media references both point at uploaded files.
    pub fn is_file(self) -> bool {
        matches!(self, Namespace::File | Namespace::Media)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

impl FromStr for Namespace {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().replace('_', " ").to_lowercase();
        match key.as_str() {
            "media" => Ok(Namespace::Media),
            "special" => Ok(Namespace::Special),
            "" | "main" => Ok(Namespace::Main),
            "talk" => Ok(Namespace::Talk),
            "user" => Ok(Namespace::User),
            "user talk" => Ok(Namespace::UserTalk),
            "project" => Ok(Namespace::Project),
            "file" | "image" => Ok(Namespace::File),
            "mediawiki" => Ok(Namespace::MediaWiki),
            "template" => Ok(Namespace::Template),
            "help" => Ok(Namespace::Help),
            "category" => Ok(Namespace::Category),
            other => Err(format!("unknown Namespace '{}'", other)),
        }
    }
}

/// Which parts of a page are visible in a given context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionMode {
    /// The page is rendered on its own: `<includeonly>` content is hidden.
    View,
    /// The page is transcluded into another: `<noinclude>` content is hidden and
    /// `<onlyinclude>`, when present, limits what is visible.
    Transclude,
    /// The page seeds a new edit box. Same visibility as `Transclude`.
    Preload,
}

/// Trailing-text policy for section extraction and replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimPolicy {
    /// Drop exactly one trailing newline.
    #[default]
    Newline,
    /// Drop all trailing whitespace.
    Whitespace,
}

impl fmt::Display for TrimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrimPolicy::Newline => write!(f, "newline"),
            TrimPolicy::Whitespace => write!(f, "whitespace"),
        }
    }
}

impl FromStr for TrimPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "newline" | "nl" | "n" => Ok(TrimPolicy::Newline),
            "whitespace" | "ws" | "all" => Ok(TrimPolicy::Whitespace),
            other => Err(format!("unknown TrimPolicy '{}'", other)),
        }
    }
}

impl TrimPolicy {
    /// Apply the policy to `text`.
    pub fn apply(self, text: &str) -> &str {
        match self {
            TrimPolicy::Newline => text.strip_suffix('\n').unwrap_or(text),
            TrimPolicy::Whitespace => text.trim_end(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_fromstr_and_display() {
        assert_eq!(Namespace::from_str("file").unwrap(), Namespace::File);
        assert_eq!(Namespace::from_str("Image").unwrap(), Namespace::File);
        assert_eq!(Namespace::from_str("user_talk").unwrap(), Namespace::UserTalk);
        assert!(Namespace::from_str("Nope").is_err());
        assert_eq!(format!("{}", Namespace::Template), "Template");
    }

    #[test]
    fn trim_policy_apply() {
        assert_eq!(TrimPolicy::Newline.apply("a\n\n"), "a\n");
        assert_eq!(TrimPolicy::Whitespace.apply("a \n\n"), "a");
        assert_eq!(TrimPolicy::from_str("ws").unwrap(), TrimPolicy::Whitespace);
        assert_eq!(TrimPolicy::default(), TrimPolicy::Newline);
    }
}
