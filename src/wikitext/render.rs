//! Minimal HTML rendering of expanded wikitext.
//!
//! Only what a full parse needs: comments go away, `<nowiki>`/`<pre>` content
//! is protected behind strip markers, links and headings become HTML, `''` and
//! `'''` become `<i>`/`<b>`, and runs of ordinary lines are wrapped in `<p>`.
//! No sanitisation is attempted; tags the renderer does not know are copied.

use crate::wikitext::enums::Namespace;
use crate::wikitext::options::ParserOptions;
use crate::wikitext::output::ParserOutput;
use crate::wikitext::scanner::{Scanner, TokenKind, parse_heading};
use crate::wikitext::title::Title;
use html_escape::{encode_double_quoted_attribute, encode_text};
use itertools::Itertools;
use lazy_regex::{regex, regex_captures, regex_is_match};
use regex::Captures;
use url::Url;

pub const BROKEN_FILE_CATEGORY: &str = "broken-file-category";

const MARKER_OPEN: &str = "\x7fUNIQ";
const MARKER_CLOSE: &str = "QINU\x7f";

/// Content pulled out of the text before rendering and put back afterwards.
#[derive(Debug, Default)]
struct StripState {
    items: Vec<String>,
    /// Whether item N renders as a block element.
    blocks: Vec<bool>,
}

impl StripState {
    fn insert(&mut self, html: String, block: bool) -> String {
        let marker = format!("{}{:08x}{}", MARKER_OPEN, self.items.len(), MARKER_CLOSE);
        self.items.push(html);
        self.blocks.push(block);
        marker
    }

    fn is_block_marker(&self, line: &str) -> bool {
        regex_captures!(r"^\x7fUNIQ([0-9a-f]{8})QINU\x7f\s*$", line)
            .and_then(|(_, n)| usize::from_str_radix(n, 16).ok())
            .and_then(|n| self.blocks.get(n).copied())
            .unwrap_or(false)
    }

    fn unstrip(&self, text: &str) -> String {
        if !text.contains(MARKER_OPEN) {
            return text.to_string();
        }
        regex!(r"\x7fUNIQ([0-9a-f]{8})QINU\x7f")
            .replace_all(text, |caps: &Captures<'_>| {
                usize::from_str_radix(&caps[1], 16)
                    .ok()
                    .and_then(|n| self.items.get(n))
                    .cloned()
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

/// Turns expanded wikitext into HTML plus link metadata.
pub struct Renderer<'a> {
    title: &'a Title,
    options: &'a ParserOptions,
    output: ParserOutput,
    strip: StripState,
    tracking: Vec<&'static str>,
    external_count: usize,
}

impl<'a> Renderer<'a> {
    pub fn new(title: &'a Title, options: &'a ParserOptions) -> Self {
        Renderer {
            title,
            options,
            output: ParserOutput::default(),
            strip: StripState::default(),
            tracking: Vec::new(),
            external_count: 0,
        }
    }

    /// Record a tracking category key. Resolved when rendering finishes.
    pub fn track(&mut self, key: &'static str) {
        if !self.tracking.contains(&key) {
            self.tracking.push(key);
        }
    }

    pub fn render(mut self, text: &str) -> ParserOutput {
        let stripped = self.strip_text(text);
        let mut blocks: Vec<String> = Vec::new();
        let mut paragraph: Vec<String> = Vec::new();

        let body = stripped.strip_suffix('\n').unwrap_or(&stripped);
        for line in body.split('\n') {
            if let Some((level, title)) = parse_heading(line) {
                flush_paragraph(&mut blocks, &mut paragraph);
                let inner = self.inline(title);
                blocks.push(format!("<h{level}>{inner}</h{level}>"));
                continue;
            }
            if line.trim().is_empty() {
                flush_paragraph(&mut blocks, &mut paragraph);
                continue;
            }
            let rendered = self.inline(line);
            if rendered.trim().is_empty() {
                // a line that only held category links
                continue;
            }
            if self.strip.is_block_marker(&rendered) || is_block_line(&rendered) {
                flush_paragraph(&mut blocks, &mut paragraph);
                blocks.push(rendered);
            } else {
                paragraph.push(rendered);
            }
        }
        flush_paragraph(&mut blocks, &mut paragraph);

        let html = blocks.join("\n");
        self.output.text = self.strip.unstrip(&html);
        self.finish_tracking();
        self.output
    }

    /// Drop comments and hide raw block content behind markers.
    fn strip_text(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut raw: Option<(&str, String)> = None;
        for tok in Scanner::new(text) {
            if let Some((name, content)) = raw.as_mut() {
                if tok.is_close_tag(name) {
                    let html = if name.eq_ignore_ascii_case("pre") {
                        format!("<pre>{}</pre>", encode_text(content.as_str()))
                    } else {
                        encode_text(content.as_str()).into_owned()
                    };
                    let block = name.eq_ignore_ascii_case("pre");
                    out.push_str(&self.strip.insert(html, block));
                    raw = None;
                } else {
                    content.push_str(tok.text);
                }
                continue;
            }
            match tok.kind {
                TokenKind::Comment => {}
                TokenKind::Tag { name, .. } if tok.is_raw_open() => {
                    raw = Some((name, String::new()));
                }
                _ => out.push_str(tok.text),
            }
        }
        out
    }

    fn inline(&mut self, line: &str) -> String {
        let linked = if line.contains("[[") {
            regex!(r"\[\[([^\[\]\n]+)\]\]")
                .replace_all(line, |caps: &Captures<'_>| self.internal_link(&caps[1]))
                .into_owned()
        } else {
            line.to_string()
        };
        let linked = if linked.contains("://") {
            regex!(r#"\[((?:https?|ftp)://[^\s\[\]<>"]+)(?:[ \t]+([^\]\n]*))?\]"#)
                .replace_all(&linked, |caps: &Captures<'_>| {
                    let label = caps.get(2).map(|m| m.as_str());
                    self.external_link(&caps[0], &caps[1], label)
                })
                .into_owned()
        } else {
            linked
        };
        quotes(&linked)
    }

    fn internal_link(&mut self, inner: &str) -> String {
        let (target, label) = match inner.split_once('|') {
            Some((target, label)) => (target, Some(label)),
            None => (inner, None),
        };
        let forced = target.trim_start().starts_with(':');
        let Ok(title) = Title::new_from_text(target) else {
            return format!("[[{}]]", inner);
        };
        let label = label
            .map(|l| l.rsplit('|').next().unwrap_or(l).to_string())
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| target.trim().trim_start_matches(':').to_string());

        match title.namespace() {
            Namespace::Category if !forced => {
                self.output.add_category(title.db_key());
                String::new()
            }
            ns if ns.is_file() && !forced => self.file_link(&title, &label, inner.contains('|')),
            _ => {
                self.output.add_link(&title);
                format!(
                    "<a href=\"/wiki/{}\" title=\"{}\">{}</a>",
                    encode_double_quoted_attribute(&title.prefixed_db_key()),
                    encode_double_quoted_attribute(&title.full_text()),
                    label
                )
            }
        }
    }

    fn file_link(&mut self, title: &Title, label: &str, has_label: bool) -> String {
        let file = Title::new(Namespace::File, title.text());
        match self.options.file_source.find_file(&file) {
            Some(info) => {
                self.output.add_link(&file);
                let alt = if has_label { label } else { file.text() };
                if title.namespace() == Namespace::Media {
                    format!(
                        "<a href=\"{}\" class=\"internal\" title=\"{}\">{}</a>",
                        encode_double_quoted_attribute(&info.url),
                        encode_double_quoted_attribute(&file.full_text()),
                        label
                    )
                } else {
                    format!(
                        "<img alt=\"{}\" src=\"{}\" />",
                        encode_double_quoted_attribute(alt),
                        encode_double_quoted_attribute(&info.url)
                    )
                }
            }
            None => {
                log::debug!("file {} not found", file);
                self.track(BROKEN_FILE_CATEGORY);
                format!(
                    "<a href=\"/wiki/Special:Upload?wpDestFile={}\" class=\"new\" title=\"{}\">{}</a>",
                    encode_double_quoted_attribute(&file.db_key()),
                    encode_double_quoted_attribute(&file.full_text()),
                    encode_text(&file.full_text())
                )
            }
        }
    }

    fn external_link(&mut self, whole: &str, url: &str, label: Option<&str>) -> String {
        let Ok(parsed) = Url::parse(url) else {
            return whole.to_string();
        };
        self.output.add_external_link(parsed.as_str());
        let label = match label.map(str::trim).filter(|l| !l.is_empty()) {
            Some(label) => label.to_string(),
            None => {
                self.external_count += 1;
                format!("[{}]", self.external_count)
            }
        };
        format!(
            "<a rel=\"nofollow\" class=\"external\" href=\"{}\">{}</a>",
            encode_double_quoted_attribute(url),
            label
        )
    }

    /// Resolve tracking keys to categories, unless the page is administrative.
    fn finish_tracking(&mut self) {
        if self.title.is_special() {
            if !self.tracking.is_empty() {
                log::debug!("suppressing tracking categories on {}", self.title);
            }
            return;
        }
        for key in std::mem::take(&mut self.tracking) {
            self.output.add_tracking_key(key);
            match self.options.messages.message(key, &self.options.language) {
                Some(name) => {
                    let category = Title::new(Namespace::Category, name);
                    self.output.add_category(category.db_key());
                }
                None => log::warn!("no message for tracking category {}", key),
            }
        }
    }
}

fn flush_paragraph(blocks: &mut Vec<String>, paragraph: &mut Vec<String>) {
    if paragraph.is_empty() {
        return;
    }
    let body = paragraph.drain(..).map(|l| l + "\n").join("");
    blocks.push(format!("<p>{}</p>", body));
}

fn is_block_line(line: &str) -> bool {
    regex_is_match!(
        r"(?i)^\s*</?(?:div|table|pre|ul|ol|li|dl|blockquote|h[1-6]|p|hr|center)\b",
        line
    )
}

/// `''italic''`, `'''bold'''` and `'''''both'''''` within one line.
fn quotes(line: &str) -> String {
    if !line.contains("''") {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + 16);
    let mut open: Vec<char> = Vec::new();
    let mut last = 0;
    for m in regex!(r"'{2,}").find_iter(line) {
        out.push_str(&line[last..m.start()]);
        last = m.end();
        let mut run = m.as_str().len();
        if run == 4 {
            out.push('\'');
            run = 3;
        } else if run > 5 {
            out.push_str(&"'".repeat(run - 5));
            run = 5;
        }
        match run {
            2 => toggle(&mut out, &mut open, 'i'),
            3 => toggle(&mut out, &mut open, 'b'),
            _ => {
                if open.len() == 2 {
                    let top = open[1];
                    let below = open[0];
                    toggle(&mut out, &mut open, top);
                    toggle(&mut out, &mut open, below);
                } else if open.contains(&'i') {
                    toggle(&mut out, &mut open, 'i');
                    toggle(&mut out, &mut open, 'b');
                } else {
                    toggle(&mut out, &mut open, 'b');
                    toggle(&mut out, &mut open, 'i');
                }
            }
        }
    }
    out.push_str(&line[last..]);
    while let Some(tag) = open.pop() {
        out.push_str(&format!("</{tag}>"));
    }
    out
}

/// Open `tag`, or close it, reopening anything that was nested inside.
fn toggle(out: &mut String, open: &mut Vec<char>, tag: char) {
    let Some(pos) = open.iter().position(|t| *t == tag) else {
        open.push(tag);
        out.push_str(&format!("<{tag}>"));
        return;
    };
    let inner: Vec<char> = open.drain(pos + 1..).collect();
    for t in inner.iter().rev() {
        out.push_str(&format!("</{t}>"));
    }
    open.pop();
    out.push_str(&format!("</{tag}>"));
    for t in inner {
        out.push_str(&format!("<{t}>"));
        open.push(t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticFileSource;
    use crate::wikitext::options::ParserOptionsBuilder;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn render(text: &str, title: &Title, options: &ParserOptions) -> ParserOutput {
        Renderer::new(title, options).render(text)
    }

    fn page() -> Title {
        Title::new(Namespace::Main, "Page")
    }

    #[test]
    fn paragraphs_and_emphasis() {
        let out = render("Test\nContent of ''X''\n", &page(), &ParserOptions::default());
        assert_eq!(out.text, "<p>Test\nContent of <i>X</i>\n</p>");
        let out = render("a\n\nb", &page(), &ParserOptions::default());
        assert_eq!(out.text, "<p>a\n</p>\n<p>b\n</p>");
    }

    #[test]
    fn quote_runs() {
        assert_eq!(quotes("'''b''' ''i''"), "<b>b</b> <i>i</i>");
        assert_eq!(quotes("'''''x'''''"), "<b><i>x</i></b>");
        assert_eq!(quotes("''a'''b'''c''"), "<i>a<b>b</b>c</i>");
        assert_eq!(quotes("''open"), "<i>open</i>");
        assert_eq!(quotes("''''x'''"), "'<b>x</b>");
        assert_eq!(quotes("it's"), "it's");
    }

    #[test]
    fn headings_are_blocks() {
        let out = render("== H ==\ntext", &page(), &ParserOptions::default());
        assert_eq!(out.text, "<h2>H</h2>\n<p>text\n</p>");
    }

    #[test]
    fn categories_are_collected_and_removed() {
        let out = render(
            "x [[Category:Birds]]\n[[Category:Fish|sortkey]]\n[[:Category:Shown]]",
            &page(),
            &ParserOptions::default(),
        );
        assert_eq!(out.category_links, vec!["Birds", "Fish"]);
        assert!(out.text.contains("title=\"Category:Shown\""));
        assert!(!out.text.contains("Birds"));
    }

    #[test]
    fn broken_file_is_tracked_unless_special() {
        let out = render("[[file:nonexistent]]", &page(), &ParserOptions::default());
        assert_eq!(out.tracking_categories, vec![BROKEN_FILE_CATEGORY]);
        assert_eq!(out.category_links, vec!["Pages_with_broken_file_links"]);
        assert!(out.text.contains("wpDestFile=Nonexistent"));

        let special = Title::special("Blankpage");
        let out = render("[[file:nonexistent]]", &special, &ParserOptions::default());
        assert!(out.tracking_categories.is_empty());
        assert!(out.category_links.is_empty());
    }

    #[test]
    fn existing_file_renders_image() {
        let files = StaticFileSource::new().with_file("Cat.png", "/images/Cat.png");
        let options = ParserOptionsBuilder::default()
            .file_source(Arc::new(files))
            .build()
            .unwrap();
        let out = render("[[File:Cat.png|A cat]]", &page(), &options);
        assert_eq!(out.text, "<p><img alt=\"A cat\" src=\"/images/Cat.png\" />\n</p>");
        assert!(out.tracking_categories.is_empty());
    }

    #[test]
    fn nowiki_and_pre_are_protected() {
        let out = render(
            "<nowiki>''x'' [[y]]</nowiki> <!-- gone -->\n<pre>a < b</pre>",
            &page(),
            &ParserOptions::default(),
        );
        assert_eq!(out.text, "<p>''x'' [[y]] \n</p>\n<pre>a &lt; b</pre>");
    }

    #[test]
    fn links_internal_and_external() {
        let out = render(
            "[[Main Page|home]] [https://example.org site] [https://example.com]",
            &page(),
            &ParserOptions::default(),
        );
        assert_eq!(
            out.text,
            "<p><a href=\"/wiki/Main_Page\" title=\"Main Page\">home</a> \
             <a rel=\"nofollow\" class=\"external\" href=\"https://example.org\">site</a> \
             <a rel=\"nofollow\" class=\"external\" href=\"https://example.com\">[1]</a>\n</p>"
        );
        assert_eq!(out.links, vec!["Main_Page"]);
        assert_eq!(out.external_links.len(), 2);
    }

    #[test]
    fn long_numeric_line_is_one_paragraph() {
        let digits = format!("1.{}", "1234567890".repeat(100_000));
        let out = render(&format!("{}\n", digits), &page(), &ParserOptions::default());
        assert_eq!(out.text, format!("<p>{}\n</p>", digits));
    }
}
