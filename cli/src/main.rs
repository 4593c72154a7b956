//! `compact`: CLI front-end for the supercompact pipeline. Argument
//! parsing, environment-variable fallback, file I/O, and exit-code
//! mapping live here; the pipeline itself is `supercompact-core`.

mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::ValueEnum;
use supercompact_core::Method;
use supercompact_core::OutputFormat;
use supercompact_core::PipelineConfig;
use supercompact_core::SupercompactError;

/// Exit codes per the external-interface contract: 0 success, 2 parse
/// error, 3 I/O error, 4 invalid arguments, 5 over-budget pinned set
/// (output is still written).
mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const PARSE_ERROR: u8 = 2;
    pub const IO_ERROR: u8 = 3;
    pub const INVALID_ARGUMENT: u8 = 4;
    pub const OVER_BUDGET: u8 = 5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "kebab-case")]
enum MethodArg {
    Eitf,
    SetCover,
    Dedup,
    DryRun,
}

impl From<MethodArg> for Method {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::Eitf => Method::Eitf,
            MethodArg::SetCover => Method::SetCover,
            MethodArg::Dedup => Method::Dedup,
            MethodArg::DryRun => Method::DryRun,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "kebab-case")]
enum FormatArg {
    Rollout,
    Summary,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Rollout => OutputFormat::Rollout,
            FormatArg::Summary => OutputFormat::Summary,
        }
    }
}

/// Compact an AI-coding-agent rollout log to fit a token budget while
/// preserving the technical entities a resuming agent needs.
#[derive(Parser, Debug)]
#[command(name = "compact", author, version, about)]
struct Cli {
    /// Rollout log to compact.
    input: PathBuf,

    /// Scoring method.
    #[arg(long, value_enum, env = "SUPERCOMPACT_METHOD", default_value = "eitf")]
    method: MethodArg,

    /// Token ceiling for the compacted output.
    #[arg(long, env = "SUPERCOMPACT_BUDGET", default_value_t = 80_000)]
    budget: u32,

    /// Where to write the compacted output. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output dialect.
    #[arg(long, value_enum, default_value = "rollout")]
    format: FormatArg,

    /// System turns at or below this many tokens are always pinned and
    /// excluded from scoring.
    #[arg(long, default_value_t = 300)]
    short_threshold: u32,

    /// Suppresses matches shorter than this from contributing to "seen"
    /// state in the Dedup scorer.
    #[arg(long, default_value_t = 64)]
    min_repeat_len: usize,

    /// Write a `turn_index,role,tokens,score,kept` CSV to this path.
    #[arg(long)]
    scores_file: Option<PathBuf>,

    /// Print a per-turn score breakdown to stderr and raise log verbosity.
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn validate(&self) -> Result<(), SupercompactError> {
        if self.budget == 0 {
            return Err(invalid_argument("budget", "must be greater than zero"));
        }
        if self.min_repeat_len == 0 {
            return Err(invalid_argument("min-repeat-len", "must be greater than zero"));
        }
        if !self.input.exists() {
            return Err(SupercompactError::Io(supercompact_core::error::IoError {
                path: self.input.clone(),
                reason: "input file does not exist".to_string(),
            }));
        }
        Ok(())
    }

    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            method: self.method.into(),
            budget: self.budget,
            format: self.format.into(),
            short_threshold: self.short_threshold,
            min_repeat_len: self.min_repeat_len,
            verbose: self.verbose,
            ..PipelineConfig::default()
        }
    }
}

fn invalid_argument(name: &str, reason: &str) -> SupercompactError {
    SupercompactError::InvalidArgument(supercompact_core::error::InvalidArgumentError {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_tracing(cli.verbose);

    if let Err(err) = cli.validate() {
        return report_and_exit(&err);
    }

    let request = pipeline::RunRequest {
        input: &cli.input,
        output: cli.output.as_deref(),
        scores_file: cli.scores_file.as_deref(),
        config: cli.pipeline_config(),
    };

    match pipeline::run(&request) {
        Ok(report) if report.over_budget => ExitCode::from(exit_code::OVER_BUDGET),
        Ok(_) => ExitCode::from(exit_code::SUCCESS),
        Err(err) => report_and_exit(&err),
    }
}

fn report_and_exit(err: &SupercompactError) -> ExitCode {
    eprintln!("error: {err}");
    let code = match err {
        SupercompactError::Parse(_) => exit_code::PARSE_ERROR,
        SupercompactError::Io(_) => exit_code::IO_ERROR,
        SupercompactError::InvalidArgument(_) => exit_code::INVALID_ARGUMENT,
        SupercompactError::Tokenizer(_) | SupercompactError::Extractor(_) => exit_code::IO_ERROR,
    };
    ExitCode::from(code)
}

fn install_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
