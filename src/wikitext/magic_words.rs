//! Magic words and their compiled matchers.
//!
//! A magic word is a keyword with one or more synonyms (`SUBST:`, `#REDIRECT`,
//! `PAGENAME`, ...). Matchers are compiled on first use and kept in a
//! `MagicWordCache` owned by whoever owns the `Parser`; tests and long-running
//! hosts can `clear()` it between runs.

use crate::wikitext::errors::Result;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagicWordId {
    Subst,
    SafeSubst,
    Redirect,
    PageName,
    FullPageName,
    Namespace,
    /// `{{!}}`, a literal pipe.
    Pipe,
    CurrentYear,
}

impl MagicWordId {
    /// Variables that expand to a value when used as `{{NAME}}`.
    pub const VARIABLES: [MagicWordId; 5] = [
        MagicWordId::PageName,
        MagicWordId::FullPageName,
        MagicWordId::Namespace,
        MagicWordId::Pipe,
        MagicWordId::CurrentYear,
    ];

    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            MagicWordId::Subst => &["SUBST:"],
            MagicWordId::SafeSubst => &["SAFESUBST:"],
            MagicWordId::Redirect => &["#REDIRECT"],
            MagicWordId::PageName => &["PAGENAME"],
            MagicWordId::FullPageName => &["FULLPAGENAME"],
            MagicWordId::Namespace => &["NAMESPACE"],
            MagicWordId::Pipe => &["!"],
            MagicWordId::CurrentYear => &["CURRENTYEAR"],
        }
    }

    pub fn case_sensitive(self) -> bool {
        !matches!(
            self,
            MagicWordId::Subst | MagicWordId::SafeSubst | MagicWordId::Redirect
        )
    }
}

impl fmt::Display for MagicWordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.synonyms()[0])
    }
}

/// Compiled matcher for one magic word.
#[derive(Debug)]
pub struct MagicWord {
    start: Regex,
    exact: Regex,
}

impl MagicWord {
    pub fn new(id: MagicWordId) -> Result<Self> {
        let alternatives = id
            .synonyms()
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        let flags = if id.case_sensitive() { "" } else { "(?i)" };
        Ok(MagicWord {
            start: Regex::new(&format!("^{flags}(?:{alternatives})"))?,
            exact: Regex::new(&format!("^{flags}(?:{alternatives})$"))?,
        })
    }

    /// Byte length of the synonym `text` starts with, if any.
    pub fn match_start(&self, text: &str) -> Option<usize> {
        self.start.find(text).map(|m| m.end())
    }

    /// `text` with a leading synonym removed.
    pub fn strip_start<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.match_start(text).map(|len| &text[len..])
    }

    pub fn matches(&self, text: &str) -> bool {
        self.exact.is_match(text)
    }
}

/// Read-mostly cache of compiled magic words.
#[derive(Debug, Default)]
pub struct MagicWordCache {
    words: RwLock<HashMap<MagicWordId, Arc<MagicWord>>>,
}

impl MagicWordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: MagicWordId) -> Result<Arc<MagicWord>> {
        if let Some(word) = self
            .words
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return Ok(Arc::clone(word));
        }
        let word = Arc::new(MagicWord::new(id)?);
        log::debug!("compiled magic word {}", id);
        let mut words = self.words.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(words.entry(id).or_insert(word)))
    }

    /// The variable `name` names exactly, if any.
    pub fn variable(&self, name: &str) -> Result<Option<MagicWordId>> {
        for id in MagicWordId::VARIABLES {
            if self.get(id)?.matches(name) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Drop every compiled matcher. Not meant to race an in-flight parse.
    pub fn clear(&self) {
        self.words
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.words
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subst_is_case_insensitive_prefix() {
        let cache = MagicWordCache::new();
        let subst = cache.get(MagicWordId::Subst).unwrap();
        assert_eq!(subst.strip_start("subst:Foo"), Some("Foo"));
        assert_eq!(subst.strip_start("SuBsT:Foo"), Some("Foo"));
        assert_eq!(subst.strip_start("Foo"), None);
        assert_eq!(subst.strip_start("safesubst:Foo"), None);
    }

    #[test]
    fn variables_are_case_sensitive() {
        let cache = MagicWordCache::new();
        assert_eq!(cache.variable("PAGENAME").unwrap(), Some(MagicWordId::PageName));
        assert_eq!(cache.variable("pagename").unwrap(), None);
        assert_eq!(cache.variable("!").unwrap(), Some(MagicWordId::Pipe));
        assert_eq!(cache.variable("PAGENAMEX").unwrap(), None);
    }

    #[test]
    fn clear_empties_and_rebuilds() {
        let cache = MagicWordCache::new();
        cache.get(MagicWordId::Redirect).unwrap();
        cache.get(MagicWordId::Subst).unwrap();
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(MagicWordId::Redirect).unwrap().matches("#redirect"));
        assert_eq!(cache.len(), 1);
    }
}
