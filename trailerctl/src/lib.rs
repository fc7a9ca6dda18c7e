use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trailer_core::{
    load_style_library, AssemblerConfig, CandidateRecord, CharacterHint, NarrativeAssembler,
    NarrativeSequence, StyleLibrary,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] trailer_core::ConfigurationError),
    #[error("assembly error: {0}")]
    Narrative(#[from] trailer_core::NarrativeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid input file {path}: {source}")]
    Input {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Trailer assembly command-line interface", long_about = None)]
pub struct Cli {
    /// Extra style tables (TOML), validated on top of the builtins
    #[arg(long)]
    pub styles_file: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assembles trailer sequences from a candidate file
    Assemble(AssembleArgs),
    /// Lists the available styles and their phase tables
    Styles,
    /// Emits shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
pub struct AssembleArgs {
    /// Candidate file (JSON) produced by the media analyzers
    pub input: PathBuf,
    /// Style to assemble; repeat for parallel multi-style runs
    #[arg(long = "style")]
    pub styles: Vec<String>,
    /// Trailer duration budget in seconds
    #[arg(long)]
    pub target_duration: Option<f64>,
    #[arg(long)]
    pub min_beats: Option<usize>,
    #[arg(long)]
    pub max_beats: Option<usize>,
    /// Allow candidates past the spoiler cutoff
    #[arg(long, default_value_t = false)]
    pub include_spoilers: bool,
    /// Overlay title; falls back to the style default
    #[arg(long)]
    pub title: Option<String>,
    /// Also write the full JSON report to this path
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Self-contained assembly input: the analyzed source plus its candidates.
#[derive(Debug, Deserialize)]
pub struct AssemblyInput {
    pub source_duration: f64,
    pub candidates: Vec<CandidateRecord>,
    #[serde(default)]
    pub character_hint: Option<CharacterHint>,
}

#[derive(Debug, Serialize)]
pub struct AssembleReport {
    pub sequences: BTreeMap<String, NarrativeSequence>,
}

#[derive(Debug, Serialize)]
pub struct StyleSummary {
    pub name: String,
    pub phases: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StylesReport {
    pub styles: Vec<StyleSummary>,
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let library = match &cli.styles_file {
        Some(path) => load_style_library(path)?,
        None => StyleLibrary::builtin(),
    };

    match cli.command {
        Commands::Assemble(args) => {
            let report = assemble_styles(library, &args).await?;
            if let Some(path) = &args.output {
                fs::write(path, serde_json::to_string_pretty(&report)?)?;
                info!(target: "trailerctl", path = %path.display(), "report written");
            }
            render(&report, cli.format)?;
        }
        Commands::Styles => {
            let report = styles_report(&library);
            render(&report, cli.format)?;
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "trailerctl", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Runs every requested style against the same candidate pool. Assembly is
/// CPU-bound and shares nothing between runs, so each style goes to its own
/// blocking task.
pub async fn assemble_styles(library: StyleLibrary, args: &AssembleArgs) -> Result<AssembleReport> {
    let input = read_input(&args.input)?;
    let styles = if args.styles.is_empty() {
        vec!["dramatic".to_string()]
    } else {
        args.styles.clone()
    };

    let defaults = AssemblerConfig::default();
    let config = AssemblerConfig {
        target_duration_s: args.target_duration.unwrap_or(defaults.target_duration_s),
        min_beats: args.min_beats.unwrap_or(defaults.min_beats),
        max_beats: args.max_beats.unwrap_or(defaults.max_beats),
        include_spoilers: args.include_spoilers,
        title: args.title.clone(),
        ..defaults
    };

    let assembler = Arc::new(NarrativeAssembler::with_library(config, library));
    let records = Arc::new(input.candidates);
    let source_duration = input.source_duration;
    let hint = input.character_hint;

    let mut handles = Vec::with_capacity(styles.len());
    for style in styles {
        let assembler = Arc::clone(&assembler);
        let records = Arc::clone(&records);
        let hint = hint.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let sequence = assembler.assemble(&records, source_duration, &style, hint.as_ref())?;
            Ok::<_, trailer_core::NarrativeError>((style, sequence))
        }));
    }

    let mut sequences = BTreeMap::new();
    for handle in handles {
        let (style, sequence) = handle.await??;
        sequences.insert(style, sequence);
    }

    Ok(AssembleReport { sequences })
}

fn read_input(path: &PathBuf) -> Result<AssemblyInput> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| AppError::Input {
        source,
        path: path.clone(),
    })
}

fn styles_report(library: &StyleLibrary) -> StylesReport {
    let styles = library
        .style_names()
        .map(|name| {
            let phases = library
                .phases(name)
                .unwrap_or(&[])
                .iter()
                .map(|phase| format!("{}({:.2})", phase.name, phase.duration_ratio))
                .collect();
            StyleSummary {
                name: name.to_string(),
                phases,
            }
        })
        .collect();
    StylesReport { styles }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for AssembleReport {
    fn display(&self) -> String {
        let mut lines = Vec::with_capacity(self.sequences.len());
        for (style, sequence) in &self.sequences {
            lines.push(format!(
                "{style}: beats={} duration={:.1}s/{:.0}s quality={:.0} confidence={:.0}{}",
                sequence.beats.len(),
                sequence.actual_duration,
                sequence.target_duration,
                sequence.structure_quality,
                sequence.confidence,
                if sequence.degraded { " [degraded]" } else { "" },
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for StylesReport {
    fn display(&self) -> String {
        self.styles
            .iter()
            .map(|summary| format!("{}: {}", summary.name, summary.phases.join(" ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
