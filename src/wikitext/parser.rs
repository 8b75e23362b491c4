use crate::wikitext::enums::{InclusionMode, TrimPolicy};
use crate::wikitext::errors::Result;
use crate::wikitext::expander::{ExpandMode, Expander};
use crate::wikitext::inclusion;
use crate::wikitext::magic_words::MagicWordCache;
use crate::wikitext::options::{ParserOptions, UserContext};
use crate::wikitext::output::ParserOutput;
use crate::wikitext::render::Renderer;
use crate::wikitext::sections::{self, Section};
use crate::wikitext::signature;
use crate::wikitext::title::Title;
use lazy_regex::regex_replace_all;
use std::sync::Arc;

/// Entry point for every wikitext operation.
///
/// A `Parser` only holds the magic word cache and the section trim policy, so
/// one instance can serve any number of concurrent calls; everything a call
/// needs beyond that lives in the call itself.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    magic_words: Arc<MagicWordCache>,
    section_trim: TrimPolicy,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing magic word cache.
    pub fn with_magic_words(magic_words: Arc<MagicWordCache>) -> Self {
        Parser {
            magic_words,
            section_trim: TrimPolicy::default(),
        }
    }

    pub fn with_section_trim(mut self, trim: TrimPolicy) -> Self {
        self.section_trim = trim;
        self
    }

    pub fn magic_words(&self) -> &Arc<MagicWordCache> {
        &self.magic_words
    }

    pub fn section_trim(&self) -> TrimPolicy {
        self.section_trim
    }

    /// Full pipeline: inclusion filter, template expansion, rendering.
    pub fn parse(&self, text: &str, title: &Title, options: &ParserOptions) -> Result<ParserOutput> {
        log::debug!("parsing {} ({} bytes)", title, text.len());
        let viewed = inclusion::filter(text, InclusionMode::View);
        let mut expander = Expander::new(title, options, &self.magic_words, ExpandMode::Render);
        let expanded = expander.expand(&viewed)?;

        let mut renderer = Renderer::new(title, options);
        for key in expander.tracking_keys() {
            renderer.track(*key);
        }
        let mut output = renderer.render(&expanded);
        for dep in expander.dependencies() {
            output.add_template(dep);
        }
        output.warnings = expander.warnings().to_vec();
        Ok(output)
    }

    /// Expansion only: the wikitext a page turns into before rendering.
    pub fn preprocess(&self, text: &str, title: &Title, options: &ParserOptions) -> Result<String> {
        let viewed = inclusion::filter(text, InclusionMode::View);
        Expander::new(title, options, &self.magic_words, ExpandMode::Render).expand(&viewed)
    }

    /// The rewrite applied before saving: `subst:` is expanded, signatures and
    /// the pipe trick are filled in, line endings and trailing space normalised.
    pub fn pre_save_transform(
        &self,
        text: &str,
        title: &Title,
        user: &UserContext,
        options: &ParserOptions,
    ) -> Result<String> {
        let mut options = options.clone();
        options.user = user.clone();

        let text = regex_replace_all!(r"\r\n?", text, "\n");
        let substituted =
            Expander::new(title, &options, &self.magic_words, ExpandMode::PreSave).expand(&text)?;
        let signed = signature::expand_signatures(&substituted, title, &options, &self.magic_words)?;
        let piped = signature::pipe_trick(&signed, title);
        Ok(piped.trim_end().to_string())
    }

    /// Section `index` of `text`; empty when there is no such section.
    pub fn get_section(&self, text: &str, index: usize) -> String {
        sections::get_section(text, index, self.section_trim).to_string()
    }

    /// `text` with section `index` replaced; unchanged when out of range.
    pub fn replace_section(&self, text: &str, index: usize, new_text: &str) -> String {
        sections::replace_section(text, index, new_text, self.section_trim)
    }

    pub fn sections(&self, text: &str) -> Vec<Section> {
        sections::sections(text)
    }

    /// Text used to seed a new page from a template: `<noinclude>` removed,
    /// `<onlyinclude>` honoured, everything else untouched.
    pub fn get_preload_text(&self, text: &str, title: &Title, _options: &ParserOptions) -> String {
        log::debug!("preload text for {}", title);
        inclusion::filter(text, InclusionMode::Preload)
    }

    pub fn clean_sig(&self, text: &str, options: &ParserOptions) -> Result<String> {
        signature::clean_sig(text, options, &self.magic_words)
    }

    pub fn clean_sig_in_sig(text: &str) -> String {
        signature::clean_sig_in_sig(text)
    }
}
