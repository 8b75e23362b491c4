//! Parser options and the capabilities the engine calls out to.
//!
//! The engine never looks up pages, files or messages itself. It asks the
//! `TemplateSource`, `FileSource` and `MessageSource` stored in `ParserOptions`.

use crate::wikitext::errors::Result;
use crate::wikitext::title::Title;
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use std::fmt;
use std::sync::Arc;

/// Where a fetch is happening: the page being parsed and the current nesting.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    pub context_title: &'a Title,
    pub depth: usize,
}

/// What a template source hands back for a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFetchResult {
    /// `None` when the title resolved but no such page exists.
    pub text: Option<String>,
    pub final_title: Title,
    /// Extra titles the fetch depended on (redirect hops, ...).
    pub deps: Vec<Title>,
}

impl TemplateFetchResult {
    pub fn found<S: Into<String>>(title: Title, text: S) -> Self {
        TemplateFetchResult {
            text: Some(text.into()),
            final_title: title,
            deps: Vec::new(),
        }
    }

    pub fn missing(title: Title) -> Self {
        TemplateFetchResult {
            text: None,
            final_title: title,
            deps: Vec::new(),
        }
    }
}

/// Fetches template (or any page) text by title.
///
/// `Ok(None)` means the source could not resolve the title at all; it is
/// treated like a missing page but is not recorded as a dependency.
pub trait TemplateSource: Send + Sync {
    fn fetch_template(
        &self,
        title: &Title,
        ctx: &FetchContext<'_>,
    ) -> Result<Option<TemplateFetchResult>>;
}

/// Adapts a closure into a `TemplateSource`.
pub struct FnTemplateSource<F>(F);

impl<F> FnTemplateSource<F>
where
    F: Fn(&Title, &FetchContext<'_>) -> Result<Option<TemplateFetchResult>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnTemplateSource(f)
    }
}

impl<F> TemplateSource for FnTemplateSource<F>
where
    F: Fn(&Title, &FetchContext<'_>) -> Result<Option<TemplateFetchResult>> + Send + Sync,
{
    fn fetch_template(
        &self,
        title: &Title,
        ctx: &FetchContext<'_>,
    ) -> Result<Option<TemplateFetchResult>> {
        (self.0)(title, ctx)
    }
}

/// Source that knows no templates; every reference renders as missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTemplates;

impl TemplateSource for NoTemplates {
    fn fetch_template(
        &self,
        title: &Title,
        _ctx: &FetchContext<'_>,
    ) -> Result<Option<TemplateFetchResult>> {
        Ok(Some(TemplateFetchResult::missing(title.clone())))
    }
}

/// An uploaded file the engine can link to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub title: Title,
    pub url: String,
}

pub trait FileSource: Send + Sync {
    fn find_file(&self, title: &Title) -> Option<FileInfo>;
}

/// No files exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFiles;

impl FileSource for NoFiles {
    fn find_file(&self, _title: &Title) -> Option<FileInfo> {
        None
    }
}

/// Resolves symbolic message keys (tracking category names, ...).
pub trait MessageSource: Send + Sync {
    fn message(&self, key: &str, language: &str) -> Option<String>;
}

/// Built-in English messages for the keys the engine emits.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishMessages;

impl MessageSource for EnglishMessages {
    fn message(&self, key: &str, _language: &str) -> Option<String> {
        let text = match key {
            "broken-file-category" => "Pages with broken file links",
            "template-loop-category" => "Pages with template loops",
            "expansion-depth-exceeded-category" => "Pages where the expansion depth is exceeded",
            _ => return None,
        };
        Some(text.to_string())
    }
}

/// The user a pre-save transform signs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub name: String,
    pub nickname: Option<String>,
    /// The nickname is raw wikitext rather than a plain display name.
    pub fancy_signature: bool,
    pub anonymous: bool,
}

impl UserContext {
    pub fn named<S: Into<String>>(name: S) -> Self {
        UserContext {
            name: name.into(),
            nickname: None,
            fancy_signature: false,
            anonymous: false,
        }
    }

    pub fn anonymous<S: Into<String>>(ip: S) -> Self {
        UserContext {
            name: ip.into(),
            nickname: None,
            fancy_signature: false,
            anonymous: true,
        }
    }

    pub fn with_nickname<S: Into<String>>(mut self, nickname: S, fancy: bool) -> Self {
        self.nickname = Some(nickname.into());
        self.fancy_signature = fancy;
        self
    }
}

impl Default for UserContext {
    fn default() -> Self {
        UserContext::anonymous("127.0.0.1")
    }
}

/// Everything a single parse call may consult. Shared by reference, never
/// changed while a call is running.
#[derive(Clone, Builder)]
#[builder(default, pattern = "owned")]
pub struct ParserOptions {
    pub template_source: Arc<dyn TemplateSource>,
    pub file_source: Arc<dyn FileSource>,
    pub messages: Arc<dyn MessageSource>,
    pub user: UserContext,
    #[builder(setter(into))]
    pub language: String,
    pub clean_signatures: bool,
    pub max_template_depth: usize,
    /// Redirect hops followed when a fetched template is a redirect.
    pub max_redirects: usize,
    /// Fixed "now" for signatures; the wall clock when unset.
    #[builder(setter(strip_option))]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            template_source: Arc::new(NoTemplates),
            file_source: Arc::new(NoFiles),
            messages: Arc::new(EnglishMessages),
            user: UserContext::default(),
            language: "en".to_string(),
            clean_signatures: true,
            max_template_depth: 40,
            max_redirects: 2,
            timestamp: None,
        }
    }
}

impl fmt::Debug for ParserOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserOptions")
            .field("user", &self.user)
            .field("language", &self.language)
            .field("clean_signatures", &self.clean_signatures)
            .field("max_template_depth", &self.max_template_depth)
            .field("max_redirects", &self.max_redirects)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

impl ParserOptions {
    pub fn builder() -> ParserOptionsBuilder {
        ParserOptionsBuilder::default()
    }

    /// Signature timestamp: the override, or now.
    pub fn now(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }
}
