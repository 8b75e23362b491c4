//! Template source backed by a live wiki.
//!
//! Pages are fetched as `<wiki>/wiki/<Title>?action=raw` through a reqwest
//! client with an on-disk HTTP cache, so repeated runs only revalidate. The
//! engine itself is synchronous; the source owns a Tokio runtime and blocks on
//! it for each fetch. `prefetch` warms the source with many pages concurrently
//! before a parse starts.

use crate::wikitext::enums::Namespace;
use crate::wikitext::errors::{Result, WtError};
use crate::wikitext::options::{FetchContext, TemplateFetchResult, TemplateSource};
use crate::wikitext::scanner::{Scanner, TokenKind};
use crate::wikitext::title::Title;
use futures::future;
use http_cache_reqwest::{CACacheManager, Cache, CacheMode, HttpCache, HttpCacheOptions};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::runtime::Runtime;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = concat!("wikiprep/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_CACHE_PATH: &str = "./.cache";

/// HTTP client with middleware that caches based on HTTP headers.
#[derive(Debug, Clone)]
pub struct WikiClient(ClientWithMiddleware);

impl WikiClient {
    /// # Arguments
    /// - cache_path -> where the cache lives. Defaults to `./.cache`
    /// - user_agent -> what to tell the server. Defaults to `wikiprep/<version>`
    pub fn new(cache_path: Option<&str>, user_agent: Option<&str>) -> Result<Self> {
        let client = reqwest_middleware::ClientBuilder::new(
            reqwest::ClientBuilder::new()
                .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
                .build()?,
        )
        .with(Cache(HttpCache {
            mode: CacheMode::Default,
            manager: CACacheManager::new(cache_path.unwrap_or(DEFAULT_CACHE_PATH).into(), true),
            options: HttpCacheOptions::default(),
        }))
        .build();
        Ok(Self(client))
    }

    /// Raw text of every url, in order. `Ok(None)` for a 404.
    pub async fn get_text(&self, urls: Vec<Url>) -> Vec<Result<Option<String>>> {
        future::join_all(urls.into_iter().map(|url| fetch_one(self.0.clone(), url))).await
    }
}

async fn fetch_one(client: ClientWithMiddleware, url: Url) -> Result<Option<String>> {
    let response = client.get(url.clone()).send().await?;
    if response.status() == StatusCode::NOT_FOUND {
        log::debug!("{} returned 404", url);
        return Ok(None);
    }
    let response = response.error_for_status()?;
    Ok(Some(response.text().await?))
}

/// `TemplateSource` that reads raw page text from a wiki.
pub struct RemoteTemplateSource {
    client: WikiClient,
    wiki: Url,
    runtime: Runtime,
    prefetched: Mutex<HashMap<Title, Option<String>>>,
}

impl RemoteTemplateSource {
    pub fn new(wiki: Url, cache_path: Option<&str>, user_agent: Option<&str>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(RemoteTemplateSource {
            client: WikiClient::new(cache_path, user_agent)?,
            wiki,
            runtime,
            prefetched: Mutex::new(HashMap::new()),
        })
    }

    pub fn wiki(&self) -> &Url {
        &self.wiki
    }

    /// `<wiki>/wiki/<title>?action=raw`, with the title percent-encoded.
    pub fn raw_url(&self, title: &Title) -> Result<Url> {
        let mut url = self.wiki.clone();
        url.path_segments_mut()
            .map_err(|_| WtError::invalid_arg(format!("{} cannot be a base url", self.wiki)))?
            .pop_if_empty()
            .push("wiki")
            .extend(title.prefixed_db_key().split('/'));
        url.query_pairs_mut().append_pair("action", "raw");
        Ok(url)
    }

    /// Fetch `titles` concurrently and keep the results for later lookups.
    /// Failures are logged and left for the regular fetch to retry.
    pub fn prefetch(&self, titles: &[Title]) {
        let mut urls = Vec::new();
        let mut wanted = Vec::new();
        for title in titles {
            match self.raw_url(title) {
                Ok(url) => {
                    urls.push(url);
                    wanted.push(title.clone());
                }
                Err(e) => log::warn!("skipping prefetch of {}: {}", title, e),
            }
        }
        if urls.is_empty() {
            return;
        }
        log::info!("prefetching {} pages from {}", urls.len(), self.wiki);
        let results = self.runtime.block_on(self.client.get_text(urls));
        let mut cache = self.prefetched.lock().unwrap_or_else(PoisonError::into_inner);
        for (title, result) in wanted.into_iter().zip(results) {
            match result {
                Ok(text) => {
                    cache.insert(title, text);
                }
                Err(e) => log::warn!("prefetch of {} failed: {}", title, e),
            }
        }
    }

    fn fetch_text(&self, title: &Title) -> Result<Option<String>> {
        if let Some(hit) = self
            .prefetched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(title)
        {
            return Ok(hit.clone());
        }
        let url = self.raw_url(title)?;
        self.runtime
            .block_on(self.client.get_text(vec![url]))
            .pop()
            .unwrap_or(Ok(None))
    }
}

impl TemplateSource for RemoteTemplateSource {
    fn fetch_template(
        &self,
        title: &Title,
        _ctx: &FetchContext<'_>,
    ) -> Result<Option<TemplateFetchResult>> {
        let text = self.fetch_text(title)?;
        Ok(Some(TemplateFetchResult {
            text,
            final_title: title.clone(),
            deps: Vec::new(),
        }))
    }
}

/// Templates referenced directly by `text`, for prefetching. Names that are
/// built from other templates or parameters are skipped.
pub fn referenced_templates(text: &str) -> Vec<Title> {
    let tokens: Vec<_> = Scanner::new(text).collect();
    let mut titles: Vec<Title> = Vec::new();
    for pair in tokens.windows(3) {
        if pair[0].kind != TokenKind::TemplateOpen || !pair[1].is_plain() {
            continue;
        }
        if !matches!(pair[2].kind, TokenKind::TemplateClose) && !pair[1].text.contains('|') {
            continue;
        }
        let name = pair[1].text.split('|').next().unwrap_or_default().trim();
        let name = strip_subst(name);
        if let Ok(title) = Title::new_from_text_in(name, Namespace::Template)
            && !titles.contains(&title)
        {
            titles.push(title);
        }
    }
    titles
}

fn strip_subst(name: &str) -> &str {
    lazy_regex::regex_find!(r"(?i)^(?:safe)?subst:", name)
        .map_or(name, |prefix| name[prefix.len()..].trim_start())
}
