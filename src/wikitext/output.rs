//! What a full parse hands back to the caller.

use crate::wikitext::title::Title;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Something went wrong during expansion but the parse carried on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpansionWarning {
    TemplateLoop { title: String },
    DepthExceeded { title: String, depth: usize },
    MissingTemplate { title: String },
}

impl fmt::Display for ExpansionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpansionWarning::TemplateLoop { title } => write!(f, "template loop at {}", title),
            ExpansionWarning::DepthExceeded { title, depth } => {
                write!(f, "depth {} exceeded expanding {}", depth, title)
            }
            ExpansionWarning::MissingTemplate { title } => write!(f, "missing template {}", title),
        }
    }
}

/// Rendered text plus the metadata collected while producing it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParserOutput {
    pub text: String,
    /// Category DB keys in first-seen order, tracking categories included.
    pub category_links: Vec<String>,
    /// Symbolic tracking keys that fired, e.g. `broken-file-category`.
    pub tracking_categories: Vec<String>,
    /// Prefixed DB keys of every page the expansion depended on.
    pub templates: Vec<String>,
    pub links: Vec<String>,
    pub external_links: Vec<String>,
    pub warnings: Vec<ExpansionWarning>,
    #[serde(skip)]
    seen: Seen,
}

/// Membership sets for the de-duplicated lists above.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Seen {
    categories: HashSet<String>,
    tracking: HashSet<String>,
    templates: HashSet<String>,
    links: HashSet<String>,
    external: HashSet<String>,
}

impl ParserOutput {
    pub fn add_category<S: Into<String>>(&mut self, db_key: S) {
        push_unique(&mut self.category_links, &mut self.seen.categories, db_key.into());
    }

    pub fn add_tracking_key(&mut self, key: &str) {
        push_unique(&mut self.tracking_categories, &mut self.seen.tracking, key.to_string());
    }

    pub fn add_template(&mut self, title: &Title) {
        push_unique(&mut self.templates, &mut self.seen.templates, title.prefixed_db_key());
    }

    pub fn add_link(&mut self, title: &Title) {
        push_unique(&mut self.links, &mut self.seen.links, title.prefixed_db_key());
    }

    pub fn add_external_link<S: Into<String>>(&mut self, url: S) {
        push_unique(&mut self.external_links, &mut self.seen.external, url.into());
    }
}

fn push_unique(list: &mut Vec<String>, seen: &mut HashSet<String>, value: String) {
    if seen.insert(value.clone()) {
        list.push(value);
    }
}
