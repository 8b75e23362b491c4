//! Run configuration: an optional JSON file, overridden by `WIKIPREP_*`
//! environment variables (a `.env` file is loaded by the binary).

use crate::remote::{RemoteTemplateSource, referenced_templates};
use crate::sources::DirectoryTemplateSource;
use crate::wikitext::enums::TrimPolicy;
use crate::wikitext::errors::{Result, WtError};
use crate::wikitext::options::{NoTemplates, ParserOptions, TemplateSource, UserContext};
use crate::wikitext::parser::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

pub const ENV_WIKI_URL: &str = "WIKIPREP_WIKI_URL";
pub const ENV_CACHE_PATH: &str = "WIKIPREP_CACHE_PATH";
pub const ENV_USER_AGENT: &str = "WIKIPREP_USER_AGENT";
pub const ENV_USER: &str = "WIKIPREP_USER";
pub const ENV_TEMPLATE_DIR: &str = "WIKIPREP_TEMPLATE_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wiki to fetch templates from, e.g. `https://en.wikipedia.org/`.
    pub wiki_url: Option<Url>,
    pub cache_path: Option<String>,
    pub user_agent: Option<String>,
    /// Signing user. Anonymous when unset.
    pub user: Option<String>,
    /// Local template tree, preferred over `wiki_url` when both are set.
    pub template_dir: Option<PathBuf>,
    pub language: String,
    pub clean_signatures: bool,
    pub max_template_depth: usize,
    pub section_trim: TrimPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let options = ParserOptions::default();
        Config {
            wiki_url: None,
            cache_path: None,
            user_agent: None,
            user: None,
            template_dir: None,
            language: options.language,
            clean_signatures: options.clean_signatures,
            max_template_depth: options.max_template_depth,
            section_trim: TrimPolicy::default(),
        }
    }
}

/// Where templates come from for one run.
pub enum Backend {
    Directory(DirectoryTemplateSource),
    Remote(RemoteTemplateSource),
    Empty,
}

impl Backend {
    /// Warm a remote backend with the templates `text` references directly.
    pub fn prefetch(&self, text: &str) {
        if let Backend::Remote(remote) = self {
            remote.prefetch(&referenced_templates(text));
        }
    }

    pub fn into_source(self) -> Arc<dyn TemplateSource> {
        match self {
            Backend::Directory(dir) => Arc::new(dir),
            Backend::Remote(remote) => Arc::new(remote),
            Backend::Empty => Arc::new(NoTemplates),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| WtError::io_err(format!("reading config {:?}", path), e))?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Override fields from variables looked up through `get`.
    pub fn apply_vars<F>(mut self, get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_WIKI_URL) {
            self.wiki_url = Some(Url::parse(&url)?);
        }
        if let Some(path) = get(ENV_CACHE_PATH) {
            self.cache_path = Some(path);
        }
        if let Some(agent) = get(ENV_USER_AGENT) {
            self.user_agent = Some(agent);
        }
        if let Some(user) = get(ENV_USER) {
            self.user = Some(user);
        }
        if let Some(dir) = get(ENV_TEMPLATE_DIR) {
            self.template_dir = Some(PathBuf::from(dir));
        }
        Ok(self)
    }

    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    pub fn user_context(&self) -> UserContext {
        match &self.user {
            Some(name) => UserContext::named(name.clone()),
            None => UserContext::default(),
        }
    }

    pub fn backend(&self) -> Result<Backend> {
        if let Some(dir) = &self.template_dir {
            log::debug!("templates from {:?}", dir);
            return Ok(Backend::Directory(DirectoryTemplateSource::new(dir)));
        }
        if let Some(url) = &self.wiki_url {
            log::debug!("templates from {}", url);
            return Ok(Backend::Remote(RemoteTemplateSource::new(
                url.clone(),
                self.cache_path.as_deref(),
                self.user_agent.as_deref(),
            )?));
        }
        Ok(Backend::Empty)
    }

    pub fn parser_options(&self, templates: Arc<dyn TemplateSource>) -> Result<ParserOptions> {
        ParserOptions::builder()
            .template_source(templates)
            .user(self.user_context())
            .language(self.language.clone())
            .clean_signatures(self.clean_signatures)
            .max_template_depth(self.max_template_depth)
            .build()
            .map_err(|e| WtError::invalid_arg(e.to_string()))
    }

    pub fn parser(&self) -> Parser {
        Parser::new().with_section_trim(self.section_trim)
    }
}
