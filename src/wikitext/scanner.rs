//! Lazy tokenizer for wikitext.
//!
//! `Scanner` walks the source once and yields `Token`s on demand. Every byte of
//! the input belongs to exactly one token, so concatenating `token.text` gives
//! the input back; headings are the one exception, they are zero-width markers
//! placed in front of the line they describe.
//!
//! Plain runs are found with a byte search for the few characters that can
//! start markup (`{`, `}`, `<` and a newline followed by `=`), and a candidate
//! that turns out not to be markup is skipped without rescanning. Scanning is
//! therefore linear in the input, including megabyte-long lines of digits.
//!
//! Brace runs are split the way wikitext reads them: `{{` opens a template,
//! `{{{` a parameter, longer runs are split into those two (`{{{{{` is `{{`
//! followed by `{{{`). Closing runs are matched against the stack of openers the
//! scanner has seen; closers nobody opened are plain text.

use std::collections::VecDeque;
use std::ops::Range;

/// Tags whose content is never tokenized.
const RAW_TAGS: &[&str] = &["nowiki", "pre"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind<'a> {
    Plain,
    /// Zero-width marker at the start of a heading line ending at `line_end`.
    Heading {
        level: u8,
        title: &'a str,
        line_end: usize,
    },
    TemplateOpen,
    TemplateClose,
    ParamOpen,
    ParamClose,
    Tag {
        name: &'a str,
        attrs: &'a str,
        closing: bool,
        self_closing: bool,
    },
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Range<usize>,
    pub text: &'a str,
}

impl Token<'_> {
    pub fn is_plain(&self) -> bool {
        matches!(self.kind, TokenKind::Plain)
    }

    /// Opening tag named `name` (case-insensitive), not self-closing.
    pub fn is_open_tag(&self, tag: &str) -> bool {
        matches!(self.kind, TokenKind::Tag { name, closing: false, self_closing: false, .. }
            if name.eq_ignore_ascii_case(tag))
    }

    pub fn is_close_tag(&self, tag: &str) -> bool {
        matches!(self.kind, TokenKind::Tag { name, closing: true, .. }
            if name.eq_ignore_ascii_case(tag))
    }

    /// Any tag token named `name`: open, close or self-closing.
    pub fn is_tag(&self, tag: &str) -> bool {
        matches!(self.kind, TokenKind::Tag { name, .. } if name.eq_ignore_ascii_case(tag))
    }

    /// Opening tag of a raw block (`<nowiki>`, `<pre>`).
    pub fn is_raw_open(&self) -> bool {
        RAW_TAGS.iter().any(|t| self.is_open_tag(t))
    }

    pub fn is_raw_close(&self) -> bool {
        RAW_TAGS.iter().any(|t| self.is_close_tag(t))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brace {
    Template,
    Param,
}

/// What starts at a given byte offset.
enum Markup<'a> {
    Heading {
        level: u8,
        title: &'a str,
        line_end: usize,
    },
    Comment {
        end: usize,
    },
    Tag {
        end: usize,
        name: &'a str,
        attrs: &'a str,
        closing: bool,
        self_closing: bool,
    },
    Raw {
        open_end: usize,
        name: &'a str,
        attrs: &'a str,
        close_start: usize,
        close_end: usize,
    },
    Open(usize),
    Close(usize),
}

/// Lazy, restartable token stream over a wikitext string.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    heading_done: Option<usize>,
    braces: Vec<Brace>,
    pending: VecDeque<Token<'a>>,
    /// Raw tags known to have no closing tag after the current position.
    unclosed_raw: Vec<String>,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Scanner {
            src,
            pos: 0,
            heading_done: None,
            braces: Vec::new(),
            pending: VecDeque::new(),
            unclosed_raw: Vec::new(),
        }
    }

    fn token(&self, kind: TokenKind<'a>, span: Range<usize>) -> Token<'a> {
        Token {
            kind,
            text: &self.src[span.clone()],
            span,
        }
    }

    fn push(&mut self, kind: TokenKind<'a>, span: Range<usize>) {
        let tok = self.token(kind, span);
        self.pending.push_back(tok);
    }

    fn at_line_start(&self, pos: usize) -> bool {
        pos == 0 || self.src.as_bytes()[pos - 1] == b'\n'
    }

    fn closable(&self, run: usize) -> bool {
        match self.braces.last() {
            Some(Brace::Template) => run >= 2,
            Some(Brace::Param) => run >= 3,
            None => false,
        }
    }

    fn markup_at(&mut self, pos: usize) -> Option<Markup<'a>> {
        let bytes = self.src.as_bytes();
        match bytes[pos] {
            b'=' if self.heading_done != Some(pos) && self.at_line_start(pos) => {
                let line_end = bytes[pos..]
                    .iter()
                    .position(|b| *b == b'\n')
                    .map_or(bytes.len(), |off| pos + off);
                let (level, title) = parse_heading(&self.src[pos..line_end])?;
                Some(Markup::Heading {
                    level,
                    title,
                    line_end,
                })
            }
            b'<' => self.tag_at(pos),
            b'{' => {
                let run = run_len(bytes, pos, b'{');
                (run >= 2).then_some(Markup::Open(run))
            }
            b'}' => {
                let run = run_len(bytes, pos, b'}');
                self.closable(run).then_some(Markup::Close(run))
            }
            _ => None,
        }
    }

    fn tag_at(&mut self, pos: usize) -> Option<Markup<'a>> {
        let src = self.src;
        let bytes = src.as_bytes();
        if src[pos..].starts_with("<!--") {
            let end = src[pos + 4..]
                .find("-->")
                .map_or(src.len(), |off| pos + 4 + off + 3);
            return Some(Markup::Comment { end });
        }

        let mut i = pos + 1;
        let closing = bytes.get(i) == Some(&b'/');
        if closing {
            i += 1;
        }
        let name_start = i;
        if !bytes.get(i).is_some_and(u8::is_ascii_alphabetic) {
            return None;
        }
        while bytes.get(i).is_some_and(u8::is_ascii_alphanumeric) {
            i += 1;
        }
        let name = &src[name_start..i];
        match bytes.get(i) {
            Some(b) if b.is_ascii_whitespace() || *b == b'/' || *b == b'>' => {}
            _ => return None,
        }
        // attributes can't contain '<'; stopping there keeps failed tag matches cheap
        let gt = i + bytes[i..].iter().position(|b| *b == b'>' || *b == b'<')?;
        if bytes[gt] != b'>' {
            return None;
        }
        let inner = src[i..gt].trim_end();
        let self_closing = inner.ends_with('/');
        let attrs = inner.trim_end_matches('/').trim();
        let end = gt + 1;

        let lower = name.to_ascii_lowercase();
        if !closing && !self_closing && RAW_TAGS.contains(&lower.as_str()) {
            if self.unclosed_raw.contains(&lower) {
                return None;
            }
            return match find_close_tag(src, end, name) {
                Some((close_start, close_end)) => Some(Markup::Raw {
                    open_end: end,
                    name,
                    attrs,
                    close_start,
                    close_end,
                }),
                None => {
                    self.unclosed_raw.push(lower);
                    None
                }
            };
        }

        Some(Markup::Tag {
            end,
            name,
            attrs,
            closing,
            self_closing,
        })
    }

    fn emit(&mut self, start: usize, markup: Markup<'a>) {
        match markup {
            Markup::Heading {
                level,
                title,
                line_end,
            } => {
                self.heading_done = Some(start);
                self.push(
                    TokenKind::Heading {
                        level,
                        title,
                        line_end,
                    },
                    start..start,
                );
            }
            Markup::Comment { end } => {
                self.push(TokenKind::Comment, start..end);
                self.pos = end;
            }
            Markup::Tag {
                end,
                name,
                attrs,
                closing,
                self_closing,
            } => {
                self.push(
                    TokenKind::Tag {
                        name,
                        attrs,
                        closing,
                        self_closing,
                    },
                    start..end,
                );
                self.pos = end;
            }
            Markup::Raw {
                open_end,
                name,
                attrs,
                close_start,
                close_end,
            } => {
                self.push(
                    TokenKind::Tag {
                        name,
                        attrs,
                        closing: false,
                        self_closing: false,
                    },
                    start..open_end,
                );
                if close_start > open_end {
                    self.push(TokenKind::Plain, open_end..close_start);
                }
                let close_name = &self.src[close_start + 2..close_start + 2 + name.len()];
                self.push(
                    TokenKind::Tag {
                        name: close_name,
                        attrs: "",
                        closing: true,
                        self_closing: false,
                    },
                    close_start..close_end,
                );
                self.pos = close_end;
            }
            Markup::Open(run) => {
                let mut at = start;
                let mut left = run;
                while left >= 2 {
                    let (take, kind, brace) = if matches!(left, 2 | 4 | 5) {
                        (2, TokenKind::TemplateOpen, Brace::Template)
                    } else {
                        (3, TokenKind::ParamOpen, Brace::Param)
                    };
                    self.push(kind, at..at + take);
                    self.braces.push(brace);
                    at += take;
                    left -= take;
                }
                self.pos = start + run;
            }
            Markup::Close(run) => {
                let mut at = start;
                let mut left = run;
                while left >= 2 {
                    let (take, kind) = match self.braces.last() {
                        Some(Brace::Template) => (2, TokenKind::TemplateClose),
                        Some(Brace::Param) if left >= 3 => (3, TokenKind::ParamClose),
                        _ => break,
                    };
                    self.braces.pop();
                    self.push(kind, at..at + take);
                    at += take;
                    left -= take;
                }
                if left > 0 {
                    self.push(TokenKind::Plain, at..start + run);
                }
                self.pos = start + run;
            }
        }
    }

    /// End of the plain run starting at `start`.
    fn plain_end(&mut self, start: usize) -> usize {
        let bytes = self.src.as_bytes();
        let len = bytes.len();
        let mut i = start + 1;
        while i < len {
            let Some(off) = bytes[i..]
                .iter()
                .position(|b| matches!(b, b'{' | b'}' | b'<' | b'\n'))
            else {
                return len;
            };
            let at = i + off;
            match bytes[at] {
                b'\n' => {
                    let next = at + 1;
                    if next < len && bytes[next] == b'=' && self.markup_at(next).is_some() {
                        return next;
                    }
                    i = next;
                }
                b @ (b'{' | b'}') => {
                    if self.markup_at(at).is_some() {
                        return at;
                    }
                    i = at + run_len(bytes, at, b);
                }
                _ => {
                    if self.markup_at(at).is_some() {
                        return at;
                    }
                    i = at + 1;
                }
            }
        }
        len
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(tok) = self.pending.pop_front() {
            return Some(tok);
        }
        if self.pos >= self.src.len() {
            return None;
        }
        let start = self.pos;
        if let Some(markup) = self.markup_at(start) {
            self.emit(start, markup);
            return self.pending.pop_front();
        }
        let end = self.plain_end(start);
        self.pos = end;
        Some(self.token(TokenKind::Plain, start..end))
    }
}

/// Parse a single line as a heading: equal runs of 1 to 6 `=` on both sides of a
/// non-empty title, trailing spaces allowed.
pub fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_end_matches([' ', '\t', '\r']);
    let lead = trimmed.bytes().take_while(|b| *b == b'=').count();
    if lead == 0 || lead > 6 || lead * 2 >= trimmed.len() {
        return None;
    }
    let trail = trimmed.bytes().rev().take_while(|b| *b == b'=').count();
    if trail != lead {
        return None;
    }
    let title = trimmed[lead..trimmed.len() - trail].trim();
    if title.is_empty() {
        return None;
    }
    Some((lead as u8, title))
}

/// For every token, whether it is a brace opener with a matching closer.
pub fn matched_openers(tokens: &[Token<'_>]) -> Vec<bool> {
    let mut matched = vec![false; tokens.len()];
    let mut open: Vec<usize> = Vec::new();
    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::TemplateOpen | TokenKind::ParamOpen => open.push(i),
            TokenKind::TemplateClose | TokenKind::ParamClose => {
                if let Some(o) = open.pop() {
                    matched[o] = true;
                }
            }
            _ => {}
        }
    }
    matched
}

fn run_len(bytes: &[u8], pos: usize, b: u8) -> usize {
    bytes[pos..].iter().take_while(|c| **c == b).count()
}

/// Find `</name>` (case-insensitive, optional space before `>`) at or after `from`.
fn find_close_tag(src: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let hay = &src[from..];
    for (i, _) in hay.match_indices("</") {
        let rest = &hay.as_bytes()[i + 2..];
        if rest.len() < name.len() || !rest[..name.len()].eq_ignore_ascii_case(name.as_bytes()) {
            continue;
        }
        let after = &rest[name.len()..];
        let ws = after.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if after.get(ws) == Some(&b'>') {
            let start = from + i;
            return Some((start, start + 2 + name.len() + ws + 1));
        }
    }
    None
}
