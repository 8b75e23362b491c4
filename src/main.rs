use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use url::Url;
use wikiprep::config::Config;
use wikiprep::wikitext::errors::{Result, WtError};
use wikiprep::wikitext::title::Title;

#[derive(Parser)]
#[command(name = "wikiprep")]
#[command(about = "Expand, section and pre-save transform wikitext", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Title of the page being processed
    #[arg(long, global = true, default_value = "Main Page")]
    title: String,

    /// JSON config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Read templates from `<DIR>/<Namespace>/<Name>.wiki`
    #[arg(long, global = true, value_name = "DIR")]
    templates: Option<PathBuf>,

    /// Fetch templates from this wiki
    #[arg(long, global = true, value_name = "URL")]
    wiki: Option<Url>,
}

#[derive(Subcommand)]
enum Command {
    /// Render to HTML
    Parse {
        /// Print the full parser output as JSON
        #[arg(long)]
        json: bool,
        file: Option<PathBuf>,
    },
    /// Expand templates without rendering
    Preprocess { file: Option<PathBuf> },
    /// Pre-save transform: substitutions, signatures, pipe trick
    Pst { file: Option<PathBuf> },
    /// Print one section
    Section { index: usize, file: Option<PathBuf> },
    /// Replace one section with the contents of NEW
    ReplaceSection {
        index: usize,
        new: PathBuf,
        file: Option<PathBuf>,
    },
    /// Text to seed a new page with
    Preload { file: Option<PathBuf> },
    /// Clean a signature
    CleanSig { file: Option<PathBuf> },
    /// List sections as JSON
    Sections { file: Option<PathBuf> },
}

impl Command {
    fn file(&self) -> Option<&Path> {
        match self {
            Command::Parse { file, .. }
            | Command::Preprocess { file }
            | Command::Pst { file }
            | Command::Section { file, .. }
            | Command::ReplaceSection { file, .. }
            | Command::Preload { file }
            | Command::CleanSig { file }
            | Command::Sections { file } => file.as_deref(),
        }
    }

    fn needs_templates(&self) -> bool {
        matches!(
            self,
            Command::Parse { .. } | Command::Preprocess { .. } | Command::Pst { .. }
        )
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| WtError::io_err(format!("reading {:?}", path), e)),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .apply_env()?;
    if let Some(dir) = &cli.templates {
        config.template_dir = Some(dir.clone());
    }
    if let Some(url) = &cli.wiki {
        config.wiki_url = Some(url.clone());
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<String> {
    let config = load_config(&cli)?;
    let title = Title::new_from_text(&cli.title)?;
    let text = read_input(cli.command.file())?;

    let backend = if cli.command.needs_templates() {
        config.backend()?
    } else {
        wikiprep::config::Backend::Empty
    };
    backend.prefetch(&text);
    let options = config.parser_options(backend.into_source())?;
    let parser = config.parser();

    Ok(match cli.command {
        Command::Parse { json, .. } => {
            let output = parser.parse(&text, &title, &options)?;
            for warning in &output.warnings {
                log::warn!("{}", warning);
            }
            if json {
                serde_json::to_string_pretty(&output)?
            } else {
                output.text
            }
        }
        Command::Preprocess { .. } => parser.preprocess(&text, &title, &options)?,
        Command::Pst { .. } => {
            parser.pre_save_transform(&text, &title, &config.user_context(), &options)?
        }
        Command::Section { index, .. } => parser.get_section(&text, index),
        Command::ReplaceSection { index, new, .. } => {
            let new_text = read_input(Some(new.as_path()))?;
            parser.replace_section(&text, index, &new_text)
        }
        Command::Preload { .. } => parser.get_preload_text(&text, &title, &options),
        Command::CleanSig { .. } => parser.clean_sig(&text, &options)?,
        Command::Sections { .. } => serde_json::to_string_pretty(&parser.sections(&text))?,
    })
}

fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();

    match run(Cli::parse()) {
        Ok(out) => {
            println!("{}", out);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            eprintln!("wikiprep: {}", e);
            ExitCode::FAILURE
        }
    }
}
