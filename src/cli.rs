//! CLI argument parsing for the translation workflow.
//!
//! The CLI stays thin: it collects pipeline framing and provider selection,
//! then hands off to `workflow`.
use crate::config::Provider;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "tflow",
    version,
    about = "Memoized multi-phase LM translation workflow",
    after_help = "Commands:\n  translate --text <TEXT> --target-lang <LANG>   Run the six phases once\n  session --source-file <PATH>                   Interactive redo/edit/improve loop\n  align --original <PATH> --translations <PATH>  Align translations to the original\n  config                                         Print a config stub\n\nExamples:\n  tflow translate --text 'Amazing grace' --target-lang French --target-lang Spanish\n  tflow translate --source-file hymn.txt --song --improve-rounds 2 --json\n  tflow session --source-file hymn.txt --song --target-lang German\n  tflow config > ~/.config/tflow/config.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Emit debug logs on stderr (TFLOW_LOG overrides)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Translate(TranslateArgs),
    Session(SessionArgs),
    Align(AlignArgs),
    Config(ConfigArgs),
}

/// Framing shared by every pipeline run.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Language of the source text
    #[arg(long, value_name = "LANG", default_value = "English")]
    pub source_lang: String,

    /// Target language (repeat for several)
    #[arg(long, value_name = "LANG", default_values_t = vec!["French".to_string()])]
    pub target_lang: Vec<String>,

    /// Treat the source as song lyrics (stress analysis, syllabification)
    #[arg(long)]
    pub song: bool,

    /// Free-form context appended to every prompt
    #[arg(long, value_name = "TEXT", conflicts_with = "extra_context_file")]
    pub extra_context: Option<String>,

    /// Read extra context from a file
    #[arg(long, value_name = "PATH")]
    pub extra_context_file: Option<PathBuf>,
}

/// Where the model calls go.
#[derive(Args, Debug, Clone, Default)]
pub struct ProviderArgs {
    /// LM command to pipe prompts through (e.g. "claude -p --model haiku")
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Model provider
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Model name for API providers
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// Config file (defaults to <config_dir>/tflow/config.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Source text selection; stdin is used when neither flag is given.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Source text to translate
    #[arg(long, value_name = "TEXT", conflicts_with = "source_file")]
    pub text: Option<String>,

    /// Read the source text from a file
    #[arg(long, value_name = "PATH")]
    pub source_file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Run the translation pipeline once per target language")]
pub struct TranslateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Feed the final translation back as the clarified draft N more times
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub improve_rounds: usize,

    /// Emit a machine-readable run summary
    #[arg(long)]
    pub json: bool,

    /// Stream model output to stderr as it arrives
    #[arg(long)]
    pub stream: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Interactive session with redo, edit and improve")]
pub struct SessionArgs {
    // Stdin carries session commands, so the source never comes from it.
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Stream model output to stderr as it arrives
    #[arg(long)]
    pub stream: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Align existing translations to the original and backtranslate them")]
pub struct AlignArgs {
    /// Original text, one line per slide line
    #[arg(long, value_name = "PATH")]
    pub original: PathBuf,

    /// Existing translations to align
    #[arg(long, value_name = "PATH")]
    pub translations: PathBuf,

    /// Language of the original
    #[arg(long, value_name = "LANG", default_value = "English")]
    pub source_lang: String,

    /// Language of the translations
    #[arg(long, value_name = "LANG", default_value = "French")]
    pub target_lang: String,

    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Stream model output to stderr as it arrives
    #[arg(long)]
    pub stream: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Print a config stub with the built-in defaults")]
pub struct ConfigArgs {
    /// Print the default config path instead
    #[arg(long)]
    pub path: bool,
}
