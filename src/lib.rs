pub mod config;
pub mod remote;
pub mod sources;
pub mod wikitext;

pub use config::Config;
pub use wikitext::{Parser, ParserOptions, ParserOutput, Title, WtError};
