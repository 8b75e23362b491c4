//! Errors returned at the engine's seams.
//!
//! A parse itself almost never fails: malformed markup stays literal text and
//! expansion limits turn into inline markers. What does fail is everything the
//! engine talks to: title parsing, template sources, config files, HTTP.
//!
//! `RecursionLimit` and `TemplateLoop` are never returned from a parse. The
//! expander builds them for their `Display` text, which is the body of the
//! inline error span.

use std::error::Error;
use std::fmt;

pub type Result<T> = std::result::Result<T, WtError>;

/// Underlying error kept for `Error::source`.
pub type Cause = Box<dyn Error + Send + Sync + 'static>;

#[derive(Debug)]
pub enum WtError {
    /// Bad caller input: an unusable title, a malformed URL, a rejected option.
    InvalidArgument { msg: String },
    /// Template nesting reached the configured depth.
    RecursionLimit { depth: usize },
    /// A template is already being expanded further up.
    TemplateLoop { title: String },
    /// A template source could not answer.
    Fetch { msg: String, cause: Option<Cause> },
    /// Reading a template tree, config file or input failed.
    Io { msg: String, cause: Option<Cause> },
    Other { msg: String, cause: Option<Cause> },
}

impl WtError {
    pub fn invalid_arg<S: Into<String>>(msg: S) -> Self {
        WtError::InvalidArgument { msg: msg.into() }
    }

    pub fn recursion_limit(depth: usize) -> Self {
        WtError::RecursionLimit { depth }
    }

    pub fn template_loop<S: Into<String>>(title: S) -> Self {
        WtError::TemplateLoop {
            title: title.into(),
        }
    }

    /// A fetch failure without an underlying error, e.g. an unexpected status.
    pub fn fetch<S: Into<String>>(msg: S) -> Self {
        WtError::Fetch {
            msg: msg.into(),
            cause: None,
        }
    }

    pub fn fetch_err<E: Error + Send + Sync + 'static>(msg: impl Into<String>, e: E) -> Self {
        WtError::Fetch {
            msg: msg.into(),
            cause: Some(Box::new(e)),
        }
    }

    pub fn io_err<E: Error + Send + Sync + 'static>(msg: impl Into<String>, e: E) -> Self {
        WtError::Io {
            msg: msg.into(),
            cause: Some(Box::new(e)),
        }
    }

    pub fn other<E: Error + Send + Sync + 'static>(msg: impl Into<String>, e: E) -> Self {
        WtError::Other {
            msg: msg.into(),
            cause: Some(Box::new(e)),
        }
    }

    /// Variant name, for logs and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            WtError::InvalidArgument { .. } => "InvalidArgument",
            WtError::RecursionLimit { .. } => "RecursionLimit",
            WtError::TemplateLoop { .. } => "TemplateLoop",
            WtError::Fetch { .. } => "Fetch",
            WtError::Io { .. } => "Io",
            WtError::Other { .. } => "Other",
        }
    }

    fn cause(&self) -> Option<&Cause> {
        match self {
            WtError::Fetch { cause, .. } | WtError::Io { cause, .. } | WtError::Other { cause, .. } => {
                cause.as_ref()
            }
            _ => None,
        }
    }
}

impl fmt::Display for WtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WtError::InvalidArgument { msg } => write!(f, "Invalid argument: {}", msg),
            WtError::RecursionLimit { depth } => {
                write!(f, "Template recursion depth limit exceeded ({})", depth)
            }
            WtError::TemplateLoop { title } => write!(f, "Template loop detected: [[:{}]]", title),
            WtError::Fetch { msg, .. } => write!(f, "Fetch error: {}", msg),
            WtError::Io { msg, .. } => write!(f, "IO error: {}", msg),
            WtError::Other { msg, .. } => write!(f, "{}", msg),
        }?;
        match self.cause() {
            Some(cause) => write!(f, " (cause: {})", cause),
            None => Ok(()),
        }
    }
}

impl Error for WtError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause().map(|c| c.as_ref() as &(dyn Error + 'static))
    }
}

impl From<std::io::Error> for WtError {
    fn from(e: std::io::Error) -> Self {
        WtError::io_err("I/O error", e)
    }
}

impl From<regex::Error> for WtError {
    fn from(e: regex::Error) -> Self {
        WtError::other("bad magic word pattern", e)
    }
}

impl From<serde_json::Error> for WtError {
    fn from(e: serde_json::Error) -> Self {
        WtError::other("json error", e)
    }
}

impl From<url::ParseError> for WtError {
    fn from(e: url::ParseError) -> Self {
        WtError::invalid_arg(format!("bad url: {}", e))
    }
}

impl From<reqwest::Error> for WtError {
    fn from(e: reqwest::Error) -> Self {
        WtError::fetch_err("http request failed", e)
    }
}

impl From<reqwest_middleware::Error> for WtError {
    fn from(e: reqwest_middleware::Error) -> Self {
        WtError::fetch_err("http middleware failed", e)
    }
}
