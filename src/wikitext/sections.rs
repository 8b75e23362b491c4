//! Section index, extraction and replacement.
//!
//! Section 0 is everything before the first heading. Section N starts at the
//! Nth heading and runs up to the next heading whose level is the same or
//! higher (fewer `=`), so it contains its subsections. Headings are taken from
//! the scanner, which means `== x ==` inside a comment or `<nowiki>` is not a
//! section break.

use crate::wikitext::enums::TrimPolicy;
use crate::wikitext::scanner::{Scanner, TokenKind};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub index: usize,
    /// 0 for the lead, 1..=6 otherwise.
    pub level: u8,
    pub title: String,
    /// Byte span of the section in the source, end exclusive.
    pub start: usize,
    pub end: usize,
    /// The heading line as written; empty for the lead.
    pub heading_line: String,
    /// Index of the closest enclosing section with a heading.
    pub parent: Option<usize>,
}

impl Section {
    pub fn span<'t>(&self, text: &'t str) -> &'t str {
        &text[self.start..self.end]
    }
}

/// Flat list of sections, lead first.
pub fn sections(text: &str) -> Vec<Section> {
    let mut out = vec![Section {
        index: 0,
        level: 0,
        title: String::new(),
        start: 0,
        end: text.len(),
        heading_line: String::new(),
        parent: None,
    }];

    // sections still running to the end, levels strictly increasing
    let mut open: Vec<usize> = Vec::new();
    for tok in Scanner::new(text) {
        let TokenKind::Heading {
            level,
            title,
            line_end,
        } = tok.kind
        else {
            continue;
        };
        let start = tok.span.start;
        let index = out.len();
        if index == 1 {
            out[0].end = start;
        }
        while let Some(&top) = open.last()
            && out[top].level >= level
        {
            out[top].end = start;
            open.pop();
        }
        out.push(Section {
            index,
            level,
            title: title.to_string(),
            start,
            end: text.len(),
            heading_line: text[start..line_end].to_string(),
            parent: open.last().copied(),
        });
        open.push(index);
    }
    out
}

/// Text of section `index`, trimmed per `trim`; empty when out of range.
pub fn get_section(text: &str, index: usize, trim: TrimPolicy) -> &str {
    sections(text)
        .get(index)
        .map_or("", |s| trim.apply(s.span(text)))
}

/// Replace section `index` with `new_text`.
///
/// The new text loses its trailing newlines and is separated from whatever
/// follows by one blank line; an empty replacement removes the section. Text
/// outside the section is kept byte for byte, then `trim` is applied to the
/// end of the document. Out of range leaves `text` unchanged.
pub fn replace_section(text: &str, index: usize, new_text: &str, trim: TrimPolicy) -> String {
    let list = sections(text);
    let Some(section) = list.get(index) else {
        log::debug!("section {} out of range ({} sections)", index, list.len());
        return text.to_string();
    };
    let before = &text[..section.start];
    let after = &text[section.end..];
    let new_text = new_text.trim_end_matches('\n');

    let mut out = String::with_capacity(text.len() + new_text.len());
    out.push_str(before);
    out.push_str(new_text);
    if !new_text.is_empty() && !after.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(after);
    trim.apply(&out).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = "Section 0\n== Heading 1 ==\nSection 1\n=== Heading 2 ===\nSection 2\n== Heading 3 ==\nSection 3\n";

    #[test]
    fn extracts_nested_sections() {
        let nl = TrimPolicy::Newline;
        assert_eq!(get_section(DOC, 0, nl), "Section 0");
        assert_eq!(get_section(DOC, 2, nl), "=== Heading 2 ===\nSection 2");
        assert_eq!(
            get_section(DOC, 1, nl),
            "== Heading 1 ==\nSection 1\n=== Heading 2 ===\nSection 2"
        );
        assert_eq!(get_section(DOC, 3, nl), "== Heading 3 ==\nSection 3");
        assert_eq!(get_section(DOC, 4, nl), "");
    }

    #[test]
    fn replaces_section_with_blank_line_separator() {
        assert_eq!(
            replace_section(DOC, 1, "New section 1", TrimPolicy::Newline),
            "Section 0\nNew section 1\n\n== Heading 3 ==\nSection 3"
        );
    }

    #[test]
    fn section_tree_links_parents() {
        let list = sections(DOC);
        assert_eq!(list.len(), 4);
        assert_eq!(list[1].parent, None);
        assert_eq!(list[2].parent, Some(1));
        assert_eq!(list[3].parent, None);
        assert_eq!(list[2].heading_line, "=== Heading 2 ===");
        assert_eq!(list[2].title, "Heading 2");
        assert_eq!(list[2].level, 3);
    }

    #[test]
    fn skipped_levels_still_nest_and_close() {
        let doc = "== A ==\n==== A.1 ====\n=== A.2 ===\n===== A.2.1 =====\n== B ==\n";
        let list = sections(doc);
        let parents: Vec<_> = list.iter().map(|s| s.parent).collect();
        assert_eq!(parents, vec![None, None, Some(1), Some(1), Some(3), None]);
        assert_eq!(list[0].span(doc), "");
        assert_eq!(list[2].span(doc), "==== A.1 ====\n");
        assert_eq!(list[3].span(doc), "=== A.2 ===\n===== A.2.1 =====\n");
        assert_eq!(list[5].span(doc), "== B ==\n");
    }

    #[test]
    fn long_flat_documents_index_every_heading() {
        let doc = "== Hi ==\nx\n".repeat(50_000);
        let list = sections(&doc);
        assert_eq!(list.len(), 50_001);
        assert!(list.iter().skip(1).all(|s| s.parent.is_none()));
        assert_eq!(get_section(&doc, 50_000, TrimPolicy::Newline), "== Hi ==\nx");
        assert_eq!(list[1].end, list[2].start);
    }

    #[test]
    fn no_headings_means_one_section() {
        let text = "just text\nmore\n";
        assert_eq!(get_section(text, 0, TrimPolicy::Newline), "just text\nmore");
        assert_eq!(get_section(text, 0, TrimPolicy::Whitespace), "just text\nmore");
        assert_eq!(get_section(text, 1, TrimPolicy::Newline), "");
    }

    #[test]
    fn identical_replacement_is_a_no_op_on_normalised_text() {
        let doc = "Lead\n\n== A ==\nText a\n\n=== A.1 ===\nSub\n\n== B ==\nText b";
        for policy in [TrimPolicy::Newline, TrimPolicy::Whitespace] {
            for index in 0..sections(doc).len() {
                let current = get_section(doc, index, policy).to_string();
                assert_eq!(
                    replace_section(doc, index, &current, policy),
                    doc,
                    "section {} with {:?}",
                    index,
                    policy
                );
            }
        }
    }

    #[test]
    fn empty_replacement_removes_section() {
        let doc = "Lead\n== A ==\na\n== B ==\nb";
        assert_eq!(
            replace_section(doc, 1, "", TrimPolicy::Newline),
            "Lead\n== B ==\nb"
        );
    }

    #[test]
    fn out_of_range_replacement_is_unchanged() {
        assert_eq!(replace_section(DOC, 9, "x", TrimPolicy::Newline), DOC);
    }

    #[test]
    fn mismatched_and_commented_headings_do_not_split() {
        let doc = "a\n=== no ==\nb\n<!--\n== hidden ==\n-->\nc";
        assert_eq!(sections(doc).len(), 1);
    }
}
