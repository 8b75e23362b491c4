//! `<noinclude>`, `<includeonly>` and `<onlyinclude>` handling.
//!
//! Works on the token stream so that the tags are only recognised where the
//! scanner sees them as tags: a `<noinclude>` inside a comment or a `<nowiki>`
//! block is left alone. Everything the filter keeps is copied byte for byte.

use crate::wikitext::enums::InclusionMode;
use crate::wikitext::scanner::{Scanner, Token};

const NOINCLUDE: &str = "noinclude";
const INCLUDEONLY: &str = "includeonly";
const ONLYINCLUDE: &str = "onlyinclude";

/// Apply the inclusion rules of `mode` to `text`.
pub fn filter(text: &str, mode: InclusionMode) -> String {
    let tokens: Vec<Token<'_>> = Scanner::new(text).collect();
    match mode {
        InclusionMode::View => view(&tokens),
        InclusionMode::Transclude | InclusionMode::Preload => {
            if tokens.iter().any(|t| t.is_open_tag(ONLYINCLUDE)) {
                only_included(&tokens)
            } else {
                included(&tokens)
            }
        }
    }
}

fn is_inclusion_tag(tok: &Token<'_>) -> bool {
    [NOINCLUDE, INCLUDEONLY, ONLYINCLUDE]
        .iter()
        .any(|name| tok.is_tag(name))
}

/// Direct view: `<includeonly>` content disappears, the other two tags are unwrapped.
fn view(tokens: &[Token<'_>]) -> String {
    let mut out = String::new();
    let mut hidden = false;
    for tok in tokens {
        if tok.is_open_tag(INCLUDEONLY) {
            hidden = true;
        } else if tok.is_close_tag(INCLUDEONLY) {
            hidden = false;
        } else if hidden || is_inclusion_tag(tok) {
            continue;
        } else {
            out.push_str(tok.text);
        }
    }
    out
}

/// Inclusion without `<onlyinclude>`: `<noinclude>` content is dropped (an
/// unclosed one runs to the end), `<includeonly>` is unwrapped.
fn included(tokens: &[Token<'_>]) -> String {
    let mut out = String::new();
    let mut hidden = false;
    for tok in tokens {
        if tok.is_open_tag(NOINCLUDE) {
            hidden = true;
        } else if tok.is_close_tag(NOINCLUDE) {
            hidden = false;
        } else if hidden || is_inclusion_tag(tok) {
            continue;
        } else {
            out.push_str(tok.text);
        }
    }
    out
}

/// Only the content of `<onlyinclude>` blocks survives, with the normal
/// inclusion rules applied inside them.
fn only_included(tokens: &[Token<'_>]) -> String {
    let mut out = String::new();
    let mut inside = false;
    let mut hidden = false;
    for tok in tokens {
        if tok.is_open_tag(ONLYINCLUDE) {
            inside = true;
            continue;
        }
        if tok.is_close_tag(ONLYINCLUDE) {
            inside = false;
            hidden = false;
            continue;
        }
        if !inside {
            continue;
        }
        if tok.is_open_tag(NOINCLUDE) {
            hidden = true;
        } else if tok.is_close_tag(NOINCLUDE) {
            hidden = false;
        } else if !hidden && !is_inclusion_tag(tok) {
            out.push_str(tok.text);
        }
    }
    out
}
