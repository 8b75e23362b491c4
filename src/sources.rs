//! Ready-made template and file sources for callers that don't bring their own.

use crate::wikitext::enums::Namespace;
use crate::wikitext::errors::{Result, WtError};
use crate::wikitext::options::{
    FetchContext, FileInfo, FileSource, TemplateFetchResult, TemplateSource,
};
use crate::wikitext::title::Title;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Pages held in memory, keyed by title.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplateSource {
    pages: HashMap<Title, String>,
}

impl StaticTemplateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page<S: Into<String>>(mut self, title: Title, text: S) -> Self {
        self.pages.insert(title, text.into());
        self
    }

    /// Build from `(full title, text)` pairs such as `("Template:Foo", "...")`.
    pub fn from_pages<'a, I>(pages: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut source = Self::new();
        for (title, text) in pages {
            source
                .pages
                .insert(Title::new_from_text(title)?, text.to_string());
        }
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl TemplateSource for StaticTemplateSource {
    fn fetch_template(
        &self,
        title: &Title,
        _ctx: &FetchContext<'_>,
    ) -> Result<Option<TemplateFetchResult>> {
        Ok(Some(match self.pages.get(title) {
            Some(text) => TemplateFetchResult::found(title.clone(), text.clone()),
            None => TemplateFetchResult::missing(title.clone()),
        }))
    }
}

/// Pages stored as files: `<root>/<Namespace>/<Db_key>.wiki`, with `Main` as
/// the directory for the main namespace.
#[derive(Debug, Clone)]
pub struct DirectoryTemplateSource {
    root: PathBuf,
}

impl DirectoryTemplateSource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        DirectoryTemplateSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, title: &Title) -> PathBuf {
        let dir = match title.namespace().canonical_name() {
            "" => "Main".to_string(),
            name => name.replace(' ', "_"),
        };
        self.root.join(dir).join(format!("{}.wiki", title.db_key()))
    }
}

impl TemplateSource for DirectoryTemplateSource {
    fn fetch_template(
        &self,
        title: &Title,
        _ctx: &FetchContext<'_>,
    ) -> Result<Option<TemplateFetchResult>> {
        let path = self.path_for(title);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(TemplateFetchResult::found(title.clone(), text))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("no file for {} at {:?}", title, path);
                Ok(Some(TemplateFetchResult::missing(title.clone())))
            }
            Err(e) => Err(WtError::io_err(format!("reading {:?}", path), e)),
        }
    }
}

/// Files known up front, by name.
#[derive(Debug, Clone, Default)]
pub struct StaticFileSource {
    files: HashMap<Title, String>,
}

impl StaticFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` (without the `File:` prefix) as served from `url`.
    pub fn with_file<S: Into<String>>(mut self, name: &str, url: S) -> Self {
        self.files
            .insert(Title::new(Namespace::File, name), url.into());
        self
    }
}

impl FileSource for StaticFileSource {
    fn find_file(&self, title: &Title) -> Option<FileInfo> {
        self.files.get(title).map(|url| FileInfo {
            title: title.clone(),
            url: url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(title: &Title) -> FetchContext<'_> {
        FetchContext {
            context_title: title,
            depth: 0,
        }
    }

    #[test]
    fn static_source_reports_missing_pages() {
        let source = StaticTemplateSource::from_pages([("Template:Foo", "foo")]).unwrap();
        let page = Title::new(Namespace::Main, "P");
        let foo = Title::new(Namespace::Template, "Foo");
        let bar = Title::new(Namespace::Template, "Bar");
        assert_eq!(
            source.fetch_template(&foo, &ctx(&page)).unwrap().unwrap().text.as_deref(),
            Some("foo")
        );
        assert_eq!(source.fetch_template(&bar, &ctx(&page)).unwrap().unwrap().text, None);
        assert!(StaticTemplateSource::from_pages([("Bad|title", "")]).is_err());
    }

    #[test]
    fn directory_source_reads_namespace_folders() {
        let root = std::env::temp_dir().join(format!("wikiprep-dir-{}", std::process::id()));
        std::fs::create_dir_all(root.join("Template")).unwrap();
        std::fs::write(root.join("Template").join("Foo_bar.wiki"), "hello").unwrap();

        let source = DirectoryTemplateSource::new(&root);
        let page = Title::new(Namespace::Main, "P");
        let found = source
            .fetch_template(&Title::new(Namespace::Template, "Foo bar"), &ctx(&page))
            .unwrap()
            .unwrap();
        assert_eq!(found.text.as_deref(), Some("hello"));
        let missing = source
            .fetch_template(&Title::new(Namespace::Template, "Nope"), &ctx(&page))
            .unwrap()
            .unwrap();
        assert_eq!(missing.text, None);
        assert_eq!(
            source.path_for(&Title::new(Namespace::Main, "X")),
            root.join("Main").join("X.wiki")
        );
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn static_files() {
        let files = StaticFileSource::new().with_file("Cat.png", "/c.png");
        assert!(files.find_file(&Title::new(Namespace::File, "Cat.png")).is_some());
        assert!(files.find_file(&Title::new(Namespace::File, "Dog.png")).is_none());
    }
}
