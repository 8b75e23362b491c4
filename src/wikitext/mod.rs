//! Wikitext preprocessing: template expansion, sections, signatures and a small
//! HTML renderer.
//!
//! `Parser` is the entry point; the submodules hold the pieces it drives.

pub mod enums;
pub mod errors;
pub mod expander;
pub mod inclusion;
pub mod magic_words;
pub mod options;
pub mod output;
pub mod parser;
pub mod render;
pub mod scanner;
pub mod sections;
pub mod signature;
pub mod title;

pub use enums::{InclusionMode, Namespace, TrimPolicy};
pub use errors::{Result, WtError};
pub use magic_words::MagicWordCache;
pub use options::{
    FetchContext, FileInfo, FileSource, FnTemplateSource, MessageSource, ParserOptions,
    ParserOptionsBuilder, TemplateFetchResult, TemplateSource, UserContext,
};
pub use output::{ExpansionWarning, ParserOutput};
pub use parser::Parser;
pub use sections::Section;
pub use title::Title;
