//! Signatures, signature cleaning and the pipe trick.
//!
//! Pre-save rewriting only touches plain text: comments, `<nowiki>` and `<pre>`
//! blocks are copied through unchanged.

use crate::wikitext::errors::Result;
use crate::wikitext::expander::{ExpandMode, Expander};
use crate::wikitext::magic_words::{MagicWordCache, MagicWordId};
use crate::wikitext::options::ParserOptions;
use crate::wikitext::scanner::{Scanner, TokenKind};
use crate::wikitext::title::Title;
use chrono::{DateTime, Utc};
use lazy_regex::{regex, regex_replace_all};

const SIGNATURE_DATE_FORMAT: &str = "%H:%M, %-d %B %Y (UTC)";

/// Remove signature tildes (`~~~`, `~~~~`, `~~~~~`), leftmost and longest first.
/// Six tildes leave one, eight leave none.
pub fn clean_sig_in_sig(text: &str) -> String {
    regex_replace_all!(r"~{3,5}", text, "").into_owned()
}

/// Make `text` safe to use as a signature: force every template to be
/// substituted and drop nested signatures. Identity when signature cleaning is
/// turned off.
pub fn clean_sig(text: &str, options: &ParserOptions, magic: &MagicWordCache) -> Result<String> {
    if !options.clean_signatures {
        return Ok(text.to_string());
    }
    let subst = magic.get(MagicWordId::Subst)?;
    let safe = magic.get(MagicWordId::SafeSubst)?;
    let tokens: Vec<_> = Scanner::new(text).collect();

    let mut out = String::with_capacity(text.len() + 16);
    for (i, tok) in tokens.iter().enumerate() {
        out.push_str(tok.text);
        if tok.kind != TokenKind::TemplateOpen {
            continue;
        }
        let next = tokens
            .get(i + 1)
            .filter(|t| t.is_plain())
            .map_or("", |t| t.text.trim_start());
        if subst.match_start(next).is_none() && safe.match_start(next).is_none() {
            out.push_str(MagicWordId::Subst.synonyms()[0]);
        }
    }
    Ok(clean_sig_in_sig(&out))
}

pub fn signature_date(now: DateTime<Utc>) -> String {
    now.format(SIGNATURE_DATE_FORMAT).to_string()
}

/// The wikitext `~~~` expands to for the configured user.
pub fn user_signature(
    title: &Title,
    options: &ParserOptions,
    magic: &MagicWordCache,
) -> Result<String> {
    let user = &options.user;
    if user.anonymous {
        return Ok(format!(
            "[[Special:Contributions/{0}|{0}]]",
            user.name
        ));
    }
    let nickname = user
        .nickname
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    match nickname {
        Some(nick) if user.fancy_signature => {
            let cleaned = clean_sig(nick, options, magic)?;
            let mut expander = Expander::new(title, options, magic, ExpandMode::PreSave);
            expander.expand(&cleaned)
        }
        _ => {
            let shown = clean_sig_in_sig(nickname.unwrap_or(&user.name));
            Ok(format!("[[User:{}|{}]]", user.name, shown))
        }
    }
}

/// Apply `f` to every plain run outside comments and raw blocks.
fn map_plain<F>(text: &str, mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut raw = false;
    for tok in Scanner::new(text) {
        if tok.is_raw_open() {
            raw = true;
        } else if tok.is_raw_close() {
            raw = false;
        }
        if tok.is_plain() && !raw {
            out.push_str(&f(tok.text));
        } else {
            out.push_str(tok.text);
        }
    }
    out
}

/// Replace `~~~`, `~~~~` and `~~~~~` with the user's signature and the date.
pub fn expand_signatures(
    text: &str,
    title: &Title,
    options: &ParserOptions,
    magic: &MagicWordCache,
) -> Result<String> {
    if !text.contains("~~~") {
        return Ok(text.to_string());
    }
    let sig = user_signature(title, options, magic)?;
    let date = signature_date(options.now());
    Ok(map_plain(text, |run| {
        regex_replace_all!(r"~{3,5}", run, |tildes: &str| match tildes.len() {
            3 => sig.clone(),
            4 => format!("{} {}", sig, date),
            _ => date.clone(),
        })
        .into_owned()
    }))
}

/// Fill in empty link labels: `[[Ns:Page (x)|]]` becomes
/// `[[Ns:Page (x)|Page]]`, and `[[|Page]]` borrows the context of the current
/// title.
pub fn pipe_trick(text: &str, title: &Title) -> String {
    let context = title_context(title.text());
    map_plain(text, |run| {
        if !run.contains("|]]") && !run.contains("[[|") {
            return run.to_string();
        }
        let run = regex_replace_all!(
            r"\[\[(:?[ _0-9A-Za-z\x{80}-\x{10FFFF}-]+:|:|)([^\[\]{}|<>\n]+?)( ?\([^\[\]{}|<>\n]+\))\|\]\]",
            run,
            |_, ns: &str, page: &str, ctx: &str| format!("[[{ns}{page}{ctx}|{page}]]")
        );
        let run = regex_replace_all!(
            r"\[\[(:?[ _0-9A-Za-z\x{80}-\x{10FFFF}-]+:|:|)([^\[\]{}|<>\n]+?)( ?\([^\[\]{}|<>\n]+\)|)((?:, |，)[^\[\]{}|<>\n]+|)\|\]\]",
            &run,
            |_, ns: &str, page: &str, ctx: &str, comma: &str| {
                format!("[[{ns}{page}{ctx}{comma}|{page}]]")
            }
        );
        regex_replace_all!(r"\[\[\|([^\[\]{}|<>\n]+)\]\]", &run, |_, page: &str| {
            match &context {
                Some(ctx) => format!("[[{page}{ctx}|{page}]]"),
                None => format!("[[{page}]]"),
            }
        })
        .into_owned()
    })
}

/// The disambiguation suffix of a title: ` (x)` or `, x`.
fn title_context(text: &str) -> Option<String> {
    let paren = regex!(r"^[^\[\]{}|<>\n]+?( \([^\[\]{}|<>\n]+\))$");
    let comma = regex!(r"^[^\[\]{}|<>\n]+?(, [^\[\]{}|<>\n]+)$");
    paren
        .captures(text)
        .or_else(|| comma.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wikitext::enums::Namespace;
    use crate::wikitext::options::{ParserOptionsBuilder, UserContext};

    fn opts(clean: bool) -> ParserOptions {
        ParserOptionsBuilder::default()
            .clean_signatures(clean)
            .build()
            .unwrap()
    }

    #[test]
    fn clean_sig_in_sig_tilde_runs() {
        assert_eq!(clean_sig_in_sig("a~~~b"), "ab");
        assert_eq!(clean_sig_in_sig("a~~~~b"), "ab");
        assert_eq!(clean_sig_in_sig("a~~~~~b"), "ab");
        assert_eq!(clean_sig_in_sig("a~~~~~~b"), "a~b");
        assert_eq!(clean_sig_in_sig("a~~~~~~~~b"), "ab");
        assert_eq!(clean_sig_in_sig("a~~b"), "a~~b");
        assert_eq!(clean_sig_in_sig("{{Foo}} ~~~~"), "{{Foo}} ");
    }

    #[test]
    fn clean_sig_forces_subst() {
        let magic = MagicWordCache::new();
        assert_eq!(
            clean_sig("{{Foo}} {{subst:Bar}} {{ safesubst:Baz}} ~~~", &opts(true), &magic).unwrap(),
            "{{SUBST:Foo}} {{subst:Bar}} {{ safesubst:Baz}} "
        );
    }

    #[test]
    fn clean_sig_is_identity_when_disabled() {
        let magic = MagicWordCache::new();
        let text = "{{Foo}} ~~~~ <nowiki>x</nowiki>";
        assert_eq!(clean_sig(text, &opts(false), &magic).unwrap(), text);
        assert_eq!(clean_sig_in_sig(text), "{{Foo}}  <nowiki>x</nowiki>");
    }

    #[test]
    fn signatures_use_user_and_fixed_date() {
        let magic = MagicWordCache::new();
        let title = Title::new(Namespace::Talk, "Page");
        let options = ParserOptionsBuilder::default()
            .user(UserContext::named("Alice").with_nickname("Al", false))
            .timestamp(
                DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z")
                    .unwrap()
                    .with_timezone(&Utc),
            )
            .build()
            .unwrap();
        let out = expand_signatures(
            "a ~~~ b ~~~~ c ~~~~~ <!-- ~~~ --> <nowiki>~~~</nowiki>",
            &title,
            &options,
            &magic,
        )
        .unwrap();
        assert_eq!(
            out,
            "a [[User:Alice|Al]] b [[User:Alice|Al]] 07:08, 5 March 2024 (UTC) c 07:08, 5 March 2024 (UTC) <!-- ~~~ --> <nowiki>~~~</nowiki>"
        );
    }

    #[test]
    fn anonymous_and_fancy_signatures() {
        let magic = MagicWordCache::new();
        let title = Title::new(Namespace::Main, "Page");
        let anon = opts(true);
        assert_eq!(
            user_signature(&title, &anon, &magic).unwrap(),
            "[[Special:Contributions/127.0.0.1|127.0.0.1]]"
        );
        let fancy = ParserOptionsBuilder::default()
            .user(UserContext::named("Bob").with_nickname("'''Bob''' ~~~", true))
            .build()
            .unwrap();
        assert_eq!(user_signature(&title, &fancy, &magic).unwrap(), "'''Bob''' ");
    }

    #[test]
    fn pipe_trick_variants() {
        let title = Title::new(Namespace::Main, "Kingdom (biology)");
        assert_eq!(
            pipe_trick("[[Help:Foo (bar)|]] and [[Foo, Bar|]]", &title),
            "[[Help:Foo (bar)|Foo]] and [[Foo, Bar|Foo]]"
        );
        assert_eq!(
            pipe_trick("[[|Phylum]]", &title),
            "[[Phylum (biology)|Phylum]]"
        );
        let plain = Title::new(Namespace::Main, "Plain");
        assert_eq!(pipe_trick("[[|Phylum]]", &plain), "[[Phylum]]");
        assert_eq!(pipe_trick("<nowiki>[[A (b)|]]</nowiki>", &plain), "<nowiki>[[A (b)|]]</nowiki>");
    }
}
