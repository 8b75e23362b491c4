//! Template and parameter expansion.
//!
//! Brace pairs within one text are resolved with an explicit stack of pending
//! calls: an opener pushes a call, plain text is split into the call's
//! arguments on top-level `|`, and the closer pops the call, resolves it and
//! appends the result to the call below (or to the output). A resolved result
//! is never re-split, so pipes produced by an inner template stay inside the
//! argument they were produced in.
//!
//! Template bodies are expanded the same way, one `Job` per body on a heap
//! stack: a call that needs a body suspends its job, the body's job runs, and
//! its output is handed back to the suspended one. Nesting depth therefore
//! costs memory, never native stack. Titles whose bodies are in flight are
//! kept in `in_flight`; re-entering one of them, or nesting deeper than
//! `max_template_depth`, produces an inline error instead of a fetch.

use crate::wikitext::enums::{InclusionMode, Namespace};
use crate::wikitext::errors::{Result, WtError};
use crate::wikitext::inclusion;
use crate::wikitext::magic_words::{MagicWordCache, MagicWordId};
use crate::wikitext::options::{FetchContext, ParserOptions, TemplateFetchResult};
use crate::wikitext::output::ExpansionWarning;
use crate::wikitext::scanner::{Scanner, TokenKind, matched_openers};
use crate::wikitext::title::Title;
use chrono::Datelike;
use itertools::Itertools;
use lazy_regex::regex_replace_all;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

pub const LOOP_CATEGORY: &str = "template-loop-category";
pub const DEPTH_CATEGORY: &str = "expansion-depth-exceeded-category";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandMode {
    /// Transclude everything except `subst:`, which is left as written.
    Render,
    /// Only `subst:`/`safesubst:` references are expanded.
    PreSave,
    /// Only parameters are replaced; used for substituted template bodies.
    ParamsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Template,
    Param,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subst {
    None,
    Subst,
    SafeSubst,
}

#[derive(Debug, Default, Clone)]
struct Part {
    text: String,
    /// Offset of the first top-level `=` in `text`.
    eq: Option<usize>,
}

#[derive(Debug)]
struct PendingCall {
    kind: CallKind,
    parts: Vec<Part>,
    link_depth: usize,
}

impl PendingCall {
    fn new(kind: CallKind) -> Self {
        PendingCall {
            kind,
            parts: vec![Part::default()],
            link_depth: 0,
        }
    }

    fn last(&mut self) -> &mut Part {
        if self.parts.is_empty() {
            self.parts.push(Part::default());
        }
        let last = self.parts.len() - 1;
        &mut self.parts[last]
    }

    /// Append source text, splitting on top-level pipes.
    fn push_plain(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let mut start = 0;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'[' if bytes.get(i + 1) == Some(&b'[') => {
                    self.link_depth += 1;
                    i += 2;
                    continue;
                }
                b']' if bytes.get(i + 1) == Some(&b']') && self.link_depth > 0 => {
                    self.link_depth -= 1;
                    i += 2;
                    continue;
                }
                b'|' if self.link_depth == 0 => {
                    self.last().text.push_str(&s[start..i]);
                    self.parts.push(Part::default());
                    start = i + 1;
                }
                b'=' if self.link_depth == 0 && self.parts.len() > 1 => {
                    let offset = i - start;
                    let part = self.last();
                    if part.eq.is_none() {
                        part.eq = Some(part.text.len() + offset);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        self.last().text.push_str(&s[start..]);
    }

    /// Append text that must not be split (expansions, comments, tags).
    fn push_opaque(&mut self, s: &str) {
        self.last().text.push_str(s);
    }

    /// The call exactly as written, with inner calls already resolved.
    fn literal(&self) -> String {
        let (open, close) = match self.kind {
            CallKind::Template => ("{{", "}}"),
            CallKind::Param => ("{{{", "}}}"),
        };
        format!("{}{}{}", open, self.parts.iter().map(|p| &p.text).join("|"), close)
    }

    fn name(&self) -> Cow<'_, str> {
        strip_comments(&self.parts[0].text)
    }
}

/// Arguments of the template call whose body is being expanded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Frame {
    args: HashMap<String, String>,
}

impl Frame {
    fn from_parts(parts: &[Part]) -> Self {
        let mut args = HashMap::new();
        let mut position = 0;
        for part in parts {
            match part.eq {
                Some(eq) => {
                    let name = strip_comments(&part.text[..eq]).trim().to_string();
                    args.insert(name, part.text[eq + 1..].trim().to_string());
                }
                None => {
                    position += 1;
                    args.insert(position.to_string(), part.text.clone());
                }
            }
        }
        Frame { args }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }
}

/// What a scanned token means to the expander.
#[derive(Debug, Clone, Copy)]
enum Step {
    Open(CallKind),
    Close,
    /// Text that may be split into arguments.
    Plain,
    /// Text copied as is: comments, tags, raw blocks, unmatched openers.
    Opaque,
}

/// One text being expanded: the page itself or a template body.
struct Job {
    text: String,
    steps: Vec<(Step, Range<usize>)>,
    next: usize,
    out: String,
    pending: Vec<PendingCall>,
    frame: Option<Frame>,
    mode: ExpandMode,
    depth: usize,
    /// Title to release from `in_flight` when the job finishes.
    title: Option<Title>,
}

impl Job {
    fn new(text: String, frame: Option<Frame>, mode: ExpandMode, depth: usize) -> Self {
        let tokens: Vec<_> = Scanner::new(&text).collect();
        let matched = matched_openers(&tokens);
        let mut steps = Vec::with_capacity(tokens.len());
        let mut raw = false;
        for (tok, is_matched) in tokens.iter().zip(matched) {
            let step = match tok.kind {
                TokenKind::TemplateOpen if is_matched => Step::Open(CallKind::Template),
                TokenKind::ParamOpen if is_matched => Step::Open(CallKind::Param),
                TokenKind::TemplateClose | TokenKind::ParamClose => Step::Close,
                TokenKind::Plain if !raw => Step::Plain,
                _ => {
                    if tok.is_raw_open() {
                        raw = true;
                    } else if tok.is_raw_close() {
                        raw = false;
                    }
                    Step::Opaque
                }
            };
            steps.push((step, tok.span.clone()));
        }
        drop(tokens);
        Job {
            out: String::with_capacity(text.len()),
            text,
            steps,
            next: 0,
            pending: Vec::new(),
            frame,
            mode,
            depth,
            title: None,
        }
    }

    /// Run until a template call closes (returned) or the text is used up.
    fn advance(&mut self) -> Option<PendingCall> {
        while let Some((step, span)) = self.steps.get(self.next).cloned() {
            self.next += 1;
            match step {
                Step::Open(kind) => self.pending.push(PendingCall::new(kind)),
                Step::Close => match self.pending.pop() {
                    Some(call) if call.kind == CallKind::Template => return Some(call),
                    Some(call) => {
                        let value = resolve_param(call, self.frame.as_ref(), self.mode);
                        self.push_result(&value);
                    }
                    None => push_opaque(&mut self.out, &mut self.pending, &self.text[span]),
                },
                Step::Plain => match self.pending.last_mut() {
                    Some(call) => call.push_plain(&self.text[span]),
                    None => self.out.push_str(&self.text[span]),
                },
                Step::Opaque => push_opaque(&mut self.out, &mut self.pending, &self.text[span]),
            }
        }
        None
    }

    fn push_result(&mut self, s: &str) {
        push_opaque(&mut self.out, &mut self.pending, s);
    }

    fn finish(mut self) -> String {
        // only matched openers are pushed, so nothing is left here
        for call in self.pending.drain(..) {
            self.out.push_str(&call.literal());
        }
        self.out
    }
}

/// How a closed template call resolves.
enum Resolved {
    Text(String),
    /// The call's body, to run before the caller continues.
    Body(Job),
}

/// Per-call expansion state. Create one per parse.
pub struct Expander<'a> {
    title: &'a Title,
    options: &'a ParserOptions,
    magic: &'a MagicWordCache,
    mode: ExpandMode,
    memo: HashMap<Title, Option<TemplateFetchResult>>,
    in_flight: HashSet<Title>,
    deps: Vec<Title>,
    dep_set: HashSet<Title>,
    warnings: Vec<ExpansionWarning>,
    tracking: Vec<&'static str>,
    tracked: HashSet<&'static str>,
}

impl<'a> Expander<'a> {
    pub fn new(
        title: &'a Title,
        options: &'a ParserOptions,
        magic: &'a MagicWordCache,
        mode: ExpandMode,
    ) -> Self {
        Expander {
            title,
            options,
            magic,
            mode,
            memo: HashMap::new(),
            in_flight: HashSet::from([title.clone()]),
            deps: Vec::new(),
            dep_set: HashSet::new(),
            warnings: Vec::new(),
            tracking: Vec::new(),
            tracked: HashSet::new(),
        }
    }

    /// Expand top-level text (no frame).
    pub fn expand(&mut self, text: &str) -> Result<String> {
        let mut jobs = vec![Job::new(text.to_string(), None, self.mode, 0)];
        while let Some(job) = jobs.last_mut() {
            if let Some(call) = job.advance() {
                match self.resolve_template(call, job.mode, job.depth)? {
                    Resolved::Text(out) => job.push_result(&out),
                    Resolved::Body(body) => jobs.push(body),
                }
                continue;
            }
            let Some(done) = jobs.pop() else { break };
            if let Some(title) = &done.title {
                self.in_flight.remove(title);
            }
            let out = done.finish();
            match jobs.last_mut() {
                Some(caller) => caller.push_result(&out),
                None => return Ok(out),
            }
        }
        Ok(String::new())
    }

    /// Every title fetched, in first-fetch order.
    pub fn dependencies(&self) -> &[Title] {
        &self.deps
    }

    pub fn warnings(&self) -> &[ExpansionWarning] {
        &self.warnings
    }

    pub fn tracking_keys(&self) -> &[&'static str] {
        &self.tracking
    }

    /// Template bodies only see their own arguments, never the caller's frame.
    fn resolve_template(
        &mut self,
        call: PendingCall,
        mode: ExpandMode,
        depth: usize,
    ) -> Result<Resolved> {
        if mode == ExpandMode::ParamsOnly {
            return Ok(Resolved::Text(call.literal()));
        }
        let name = call.name();
        let name = name.trim();

        let (subst, target) = if let Some(rest) = self.magic.get(MagicWordId::Subst)?.strip_start(name) {
            (Subst::Subst, rest.trim())
        } else if let Some(rest) = self.magic.get(MagicWordId::SafeSubst)?.strip_start(name) {
            (Subst::SafeSubst, rest.trim())
        } else {
            (Subst::None, name)
        };
        match (mode, subst) {
            (ExpandMode::PreSave, Subst::None) | (ExpandMode::Render, Subst::Subst) => {
                return Ok(Resolved::Text(call.literal()));
            }
            _ => {}
        }

        if call.parts.len() == 1
            && let Some(var) = self.magic.variable(target)?
        {
            return Ok(Resolved::Text(self.variable(var)));
        }

        let Ok(title) = Title::new_from_text_in(target, Namespace::Template) else {
            return Ok(Resolved::Text(call.literal()));
        };

        if self.in_flight.contains(&title) {
            return Ok(Resolved::Text(self.template_loop(&title)));
        }
        if depth >= self.options.max_template_depth {
            let err = WtError::recursion_limit(self.options.max_template_depth);
            log::warn!("{} while expanding {}", err, title);
            self.warnings.push(ExpansionWarning::DepthExceeded {
                title: title.full_text(),
                depth: self.options.max_template_depth,
            });
            self.track(DEPTH_CATEGORY);
            return Ok(Resolved::Text(error_span(&err)));
        }

        let Some((final_title, text)) = self.fetch(&title, depth)? else {
            log::debug!("template {} not found", title);
            self.warnings.push(ExpansionWarning::MissingTemplate {
                title: title.full_text(),
            });
            return Ok(Resolved::Text(format!("[[:{}]]", title.full_text())));
        };
        if final_title != title && self.in_flight.contains(&final_title) {
            return Ok(Resolved::Text(self.template_loop(&final_title)));
        }

        let body = inclusion::filter(&text, InclusionMode::Transclude);
        let args = Frame::from_parts(&call.parts[1..]);

        if subst != Subst::None && mode == ExpandMode::PreSave {
            let job = Job::new(body, Some(args), ExpandMode::ParamsOnly, depth + 1);
            return Ok(Resolved::Body(job));
        }

        let mut job = Job::new(body, Some(args), mode, depth + 1);
        self.in_flight.insert(final_title.clone());
        job.title = Some(final_title);
        Ok(Resolved::Body(job))
    }

    fn template_loop(&mut self, title: &Title) -> String {
        let err = WtError::template_loop(title.full_text());
        log::warn!("{}", err);
        self.warnings.push(ExpansionWarning::TemplateLoop {
            title: title.full_text(),
        });
        self.track(LOOP_CATEGORY);
        error_span(&err)
    }

    fn track(&mut self, key: &'static str) {
        if self.tracked.insert(key) {
            self.tracking.push(key);
        }
    }

    fn variable(&self, id: MagicWordId) -> String {
        match id {
            MagicWordId::PageName => self.title.text().to_string(),
            MagicWordId::FullPageName => self.title.full_text(),
            MagicWordId::Namespace => self.title.namespace().canonical_name().to_string(),
            MagicWordId::Pipe => "|".to_string(),
            MagicWordId::CurrentYear => self.options.now().year().to_string(),
            MagicWordId::Subst | MagicWordId::SafeSubst | MagicWordId::Redirect => String::new(),
        }
    }

    /// Fetch `title`, following redirects. `None` when there is no page.
    fn fetch(&mut self, title: &Title, depth: usize) -> Result<Option<(Title, String)>> {
        let mut current = title.clone();
        let mut hops = 0;
        loop {
            let Some(result) = self.fetch_once(&current, depth) else {
                return Ok(None);
            };
            let Some(text) = result.text else {
                return Ok(None);
            };
            if hops < self.options.max_redirects
                && let Some(target) = self.redirect_target(&text)?
                && target != current
            {
                log::debug!("following redirect {} -> {}", current, target);
                current = target;
                hops += 1;
                continue;
            }
            return Ok(Some((result.final_title, text)));
        }
    }

    /// One call to the template source per distinct title.
    fn fetch_once(&mut self, title: &Title, depth: usize) -> Option<TemplateFetchResult> {
        if let Some(hit) = self.memo.get(title) {
            log::trace!("memo hit for {}", title);
            return hit.clone();
        }
        let ctx = FetchContext {
            context_title: self.title,
            depth,
        };
        log::debug!("fetching {}", title);
        let result = match self.options.template_source.fetch_template(title, &ctx) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("fetching {} failed: {}", title, e);
                None
            }
        };
        if let Some(r) = &result {
            self.add_dep(title);
            self.add_dep(&r.final_title);
            for dep in &r.deps {
                self.add_dep(dep);
            }
        }
        self.memo.insert(title.clone(), result.clone());
        result
    }

    fn add_dep(&mut self, title: &Title) {
        if self.dep_set.insert(title.clone()) {
            self.deps.push(title.clone());
        }
    }

    /// Target of a `#REDIRECT [[Target]]` page.
    fn redirect_target(&self, text: &str) -> Result<Option<Title>> {
        let redirect = self.magic.get(MagicWordId::Redirect)?;
        let Some(rest) = redirect.strip_start(text.trim_start()) else {
            return Ok(None);
        };
        let line = rest.lines().next().unwrap_or_default();
        let Some(start) = line.find("[[") else {
            return Ok(None);
        };
        let Some(len) = line[start + 2..].find("]]") else {
            return Ok(None);
        };
        let inner = &line[start + 2..start + 2 + len];
        let target = inner.split('|').next().unwrap_or_default().trim();
        Ok(Title::new_from_text(target).ok())
    }
}

fn resolve_param(call: PendingCall, frame: Option<&Frame>, mode: ExpandMode) -> String {
    if frame.is_none() && mode != ExpandMode::Render {
        return call.literal();
    }
    let name = call.name();
    if let Some(value) = frame.and_then(|f| f.get(name.trim())) {
        return value.to_string();
    }
    match call.parts.get(1) {
        Some(default) => default.text.clone(),
        None => call.literal(),
    }
}

fn push_opaque(root: &mut String, pending: &mut [PendingCall], s: &str) {
    match pending.last_mut() {
        Some(call) => call.push_opaque(s),
        None => root.push_str(s),
    }
}

fn error_span(err: &WtError) -> String {
    format!("<span class=\"error\">{}</span>", err)
}

fn strip_comments(s: &str) -> Cow<'_, str> {
    regex_replace_all!(r"(?s)<!--.*?(?:-->|\z)", s, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wikitext::options::{FnTemplateSource, ParserOptionsBuilder, TemplateSource};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn options_with(pages: &[(&str, &str)]) -> ParserOptions {
        let pages: HashMap<String, String> = pages
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let source = FnTemplateSource::new(move |title: &Title, _ctx: &FetchContext<'_>| {
            Ok(Some(match pages.get(&title.full_text()) {
                Some(text) => TemplateFetchResult::found(title.clone(), text.clone()),
                None => TemplateFetchResult::missing(title.clone()),
            }))
        });
        ParserOptionsBuilder::default()
            .template_source(Arc::new(source))
            .build()
            .unwrap()
    }

    fn run(text: &str, opts: &ParserOptions, mode: ExpandMode) -> (String, Vec<String>) {
        let page = Title::new(Namespace::Main, "Test page");
        let magic = MagicWordCache::new();
        let mut ex = Expander::new(&page, opts, &magic, mode);
        let out = ex.expand(text).unwrap();
        let deps = ex.dependencies().iter().map(Title::full_text).collect();
        (out, deps)
    }

    #[test]
    fn nested_templates_with_arguments() {
        let opts = options_with(&[
            ("Template:Outer", "[{{Inner|{{{1}}}|b={{{x|dx}}}}}]"),
            ("Template:Inner", "{{{1}}}-{{{b}}}"),
        ]);
        let (out, deps) = run("{{Outer|a}}", &opts, ExpandMode::Render);
        assert_eq!(out, "[a-dx]");
        assert_eq!(deps, vec!["Template:Outer", "Template:Inner"]);
    }

    #[test]
    fn named_arguments_are_trimmed_positional_are_not() {
        let opts = options_with(&[("Template:Show", "<{{{1}}}|{{{k}}}>")]);
        let (out, _) = run("{{Show| p | k = v }}", &opts, ExpandMode::Render);
        assert_eq!(out, "< p |v>");
    }

    #[test]
    fn pipes_inside_links_do_not_split() {
        let opts = options_with(&[("Template:L", "{{{1}}}")]);
        let (out, _) = run("{{L|[[a|b]]}}", &opts, ExpandMode::Render);
        assert_eq!(out, "[[a|b]]");
    }

    #[test]
    fn missing_template_renders_link_marker() {
        let opts = options_with(&[]);
        let page = Title::new(Namespace::Main, "P");
        let magic = MagicWordCache::new();
        let mut ex = Expander::new(&page, &opts, &magic, ExpandMode::Render);
        assert_eq!(ex.expand("a {{Nope}} b").unwrap(), "a [[:Template:Nope]] b");
        assert_eq!(ex.dependencies().len(), 1);
        assert!(matches!(
            ex.warnings()[0],
            ExpansionWarning::MissingTemplate { .. }
        ));
    }

    #[test]
    fn each_title_is_fetched_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let source = FnTemplateSource::new(move |title: &Title, _ctx: &FetchContext<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(TemplateFetchResult::found(title.clone(), "x")))
        });
        let opts = ParserOptionsBuilder::default()
            .template_source(Arc::new(source))
            .build()
            .unwrap();
        let (out, deps) = run("{{A}}{{A}}{{ a }}{{B}}", &opts, ExpandMode::Render);
        assert_eq!(out, "xxxx");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn self_transclusion_is_a_loop() {
        let opts = options_with(&[("Template:Me", "x{{Me}}")]);
        let page = Title::new(Namespace::Main, "P");
        let magic = MagicWordCache::new();
        let mut ex = Expander::new(&page, &opts, &magic, ExpandMode::Render);
        let out = ex.expand("{{Me}}").unwrap();
        assert_eq!(
            out,
            "x<span class=\"error\">Template loop detected: [[:Template:Me]]</span>"
        );
        assert_eq!(ex.tracking_keys(), &[LOOP_CATEGORY]);
    }

    #[test]
    fn depth_limit_is_inline_error() {
        let source = FnTemplateSource::new(|title: &Title, _ctx: &FetchContext<'_>| {
            let n: usize = title.text().trim_start_matches('T').parse().unwrap_or(0);
            Ok(Some(TemplateFetchResult::found(
                title.clone(),
                format!("{}{{{{T{}}}}}", n, n + 1),
            )))
        });
        let opts = ParserOptionsBuilder::default()
            .template_source(Arc::new(source))
            .max_template_depth(3)
            .build()
            .unwrap();
        let (out, _) = run("{{T0}}", &opts, ExpandMode::Render);
        assert_eq!(
            out,
            "012<span class=\"error\">Template recursion depth limit exceeded (3)</span>"
        );
    }

    #[test]
    fn indirect_loop_is_reported_at_the_reentry() {
        let opts = options_with(&[("Template:A", "a{{B}}"), ("Template:B", "b{{A}}")]);
        let page = Title::new(Namespace::Main, "P");
        let magic = MagicWordCache::new();
        let mut ex = Expander::new(&page, &opts, &magic, ExpandMode::Render);
        let out = ex.expand("{{A}}").unwrap();
        assert_eq!(
            out,
            "ab<span class=\"error\">Template loop detected: [[:Template:A]]</span>"
        );
        assert!(matches!(
            &ex.warnings()[0],
            ExpansionWarning::TemplateLoop { title } if title == "Template:A"
        ));
    }

    #[test]
    fn redirect_back_into_an_open_template_is_a_loop() {
        let opts = options_with(&[
            ("Template:A", "{{B}}"),
            ("Template:B", "#REDIRECT [[Template:A]]"),
        ]);
        let (out, deps) = run("x{{A}}y", &opts, ExpandMode::Render);
        assert_eq!(
            out,
            "x<span class=\"error\">Template loop detected: [[:Template:A]]</span>y"
        );
        assert_eq!(deps, vec!["Template:A", "Template:B"]);
    }

    #[test]
    fn loop_guard_is_released_after_each_call() {
        let opts = options_with(&[("Template:A", "a"), ("Template:B", "{{A}}{{A}}")]);
        let (out, _) = run("{{A}}{{B}}{{A}}", &opts, ExpandMode::Render);
        assert_eq!(out, "aaaa");
    }

    fn chain_source(last: usize) -> impl TemplateSource + 'static {
        FnTemplateSource::new(move |title: &Title, _ctx: &FetchContext<'_>| {
            let n: usize = title.text().trim_start_matches('T').parse().unwrap_or(0);
            let body = if n == last {
                "end".to_string()
            } else {
                format!("{{{{T{}}}}}", n + 1)
            };
            Ok(Some(TemplateFetchResult::found(title.clone(), body)))
        })
    }

    #[test]
    fn very_deep_chains_expand_within_a_large_limit() {
        let opts = ParserOptionsBuilder::default()
            .template_source(Arc::new(chain_source(50_000)))
            .max_template_depth(200_000)
            .build()
            .unwrap();
        let (out, deps) = run("<{{T0}}>", &opts, ExpandMode::Render);
        assert_eq!(out, "<end>");
        assert_eq!(deps.len(), 50_001);
    }

    #[test]
    fn very_deep_chains_stop_at_a_large_limit() {
        let opts = ParserOptionsBuilder::default()
            .template_source(Arc::new(chain_source(usize::MAX)))
            .max_template_depth(20_000)
            .build()
            .unwrap();
        let (out, deps) = run("{{T0}}", &opts, ExpandMode::Render);
        assert_eq!(
            out,
            "<span class=\"error\">Template recursion depth limit exceeded (20000)</span>"
        );
        assert_eq!(deps.len(), 20_000);
    }

    #[test]
    fn source_reported_titles_are_dependencies() {
        let source = FnTemplateSource::new(|title: &Title, _ctx: &FetchContext<'_>| {
            Ok(Some(TemplateFetchResult {
                text: Some("x".to_string()),
                final_title: title.clone(),
                deps: vec![Title::new(Namespace::Template, "Helper")],
            }))
        });
        let opts = ParserOptionsBuilder::default()
            .template_source(Arc::new(source))
            .build()
            .unwrap();
        let (out, deps) = run("{{A}}{{B}}", &opts, ExpandMode::Render);
        assert_eq!(out, "xx");
        assert_eq!(deps, vec!["Template:A", "Template:Helper", "Template:B"]);
    }

    #[test]
    fn presave_only_expands_subst_without_recursing() {
        let opts = options_with(&[("Template:Foo", "F{{Bar}}{{{1|d}}}<noinclude>doc</noinclude>")]);
        let (out, _) = run("{{subst:Foo}} {{Bar}} {{{1}}}", &opts, ExpandMode::PreSave);
        assert_eq!(out, "F{{Bar}}d {{Bar}} {{{1}}}");
    }

    #[test]
    fn render_leaves_subst_and_expands_safesubst() {
        let opts = options_with(&[("Template:Foo", "F")]);
        let (out, _) = run("{{subst:Foo}}{{safesubst:Foo}}", &opts, ExpandMode::Render);
        assert_eq!(out, "{{subst:Foo}}F");
    }

    #[test]
    fn redirects_are_followed_and_recorded() {
        let opts = options_with(&[
            ("Template:Old", "#REDIRECT [[Template:New]]"),
            ("Template:New", "new"),
        ]);
        let (out, deps) = run("{{Old}}", &opts, ExpandMode::Render);
        assert_eq!(out, "new");
        assert_eq!(deps, vec!["Template:Old", "Template:New"]);
    }

    #[test]
    fn unresolved_titles_are_not_dependencies() {
        let source = FnTemplateSource::new(|_t: &Title, _ctx: &FetchContext<'_>| Ok(None));
        let opts = ParserOptionsBuilder::default()
            .template_source(Arc::new(source))
            .build()
            .unwrap();
        let (out, deps) = run("{{X}}", &opts, ExpandMode::Render);
        assert_eq!(out, "[[:Template:X]]");
        assert!(deps.is_empty());
    }

    #[test]
    fn fetch_errors_degrade_to_missing() {
        let source = FnTemplateSource::new(|_t: &Title, _ctx: &FetchContext<'_>| {
            Err(WtError::fetch("offline"))
        });
        let opts = ParserOptionsBuilder::default()
            .template_source(Arc::new(source))
            .build()
            .unwrap();
        let (out, deps) = run("a{{X}}", &opts, ExpandMode::Render);
        assert_eq!(out, "a[[:Template:X]]");
        assert!(deps.is_empty());
    }

    #[test]
    fn unbalanced_braces_stay_literal() {
        let opts = options_with(&[("Template:B", "b")]);
        let (out, _) = run("{{a {{B}} }", &opts, ExpandMode::Render);
        assert_eq!(out, "{{a b }");
        let (out, _) = run("}} {{{B", &opts, ExpandMode::Render);
        assert_eq!(out, "}} {{{B");
    }

    #[test]
    fn variables_and_top_level_params() {
        let opts = ParserOptionsBuilder::default()
            .timestamp(chrono::DateTime::from_timestamp(0, 0).unwrap())
            .build()
            .unwrap();
        let (out, _) = run(
            "{{PAGENAME}}|{{NAMESPACE}}|{{CURRENTYEAR}}|{{!}}|{{{x|def}}}",
            &opts,
            ExpandMode::Render,
        );
        assert_eq!(out, "Test page||1970|||def");
    }

    #[test]
    fn nowiki_content_is_not_expanded() {
        let opts = options_with(&[("Template:B", "b")]);
        let (out, _) = run("<nowiki>{{B}}</nowiki>{{B}}", &opts, ExpandMode::Render);
        assert_eq!(out, "<nowiki>{{B}}</nowiki>b");
    }
}
