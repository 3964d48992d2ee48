//! Binary entry point for the expectify CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Convert everything under spec/ (runs the suite once for dynamic analysis)
//! expectify
//!
//! # Static analysis only, keep `stub` as is, JSON output
//! expectify -s -k stub --format json spec/models
//!
//! # Custom spec command and a commit message in .git/COMMIT_EDITMSG
//! expectify -c "bin/rspec --fail-fast" -m
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use expectify::cli::{convert_workspace, RunOptions};
use expectify::summary;
use expectify_core::config::{BooleanMatcherTarget, Category, Configuration, NegativeForm};
use expectify_core::error::{ExpectifyError, OutputErrorCode};
use expectify_core::output::{emit_response, ErrorResponse};

// ============================================================================
// CLI Structure
// ============================================================================

/// Migrate RSpec specs from the should/stub syntax to expect/allow.
#[derive(Parser, Debug)]
#[command(
    name = "expectify",
    version,
    about = "Migrate RSpec specs from the should/stub syntax to expect/allow"
)]
struct Cli {
    /// Files or directories to convert (default: spec).
    paths: Vec<PathBuf>,

    /// Process even if the current Git repository is not clean.
    #[arg(short, long)]
    force: bool,

    /// Convert with static analysis only. Less accurate.
    #[arg(short, long)]
    skip_dynamic_analysis: bool,

    /// Command that runs the suite for dynamic analysis (default: "bundle exec rspec").
    #[arg(short = 'c', long, value_name = "COMMAND")]
    rspec_command: Option<String>,

    /// Write a commit message describing the conversions to .git/COMMIT_EDITMSG.
    #[arg(short = 'm', long)]
    generate_commit_message: bool,

    /// Keep syntaxes by disabling their conversion.
    ///
    /// Types: should, should_receive, stub, have_items, deprecated.
    #[arg(short, long, value_name = "TYPE[,TYPE...]", value_delimiter = ',')]
    keep: Vec<String>,

    /// Negative form of `to` in `expect(...).to`.
    #[arg(short, long, value_enum, default_value = "not_to")]
    negative_form: NegativeFormArg,

    /// Do not parenthesize the argument of matchers converted from operators,
    /// unless parentheses are needed to keep the meaning.
    #[arg(short = 'p', long)]
    no_parentheses_matcher_arg: bool,

    /// What `be_true`/`be_false` become.
    #[arg(short, long, value_enum, default_value = "conditional")]
    boolean_matcher: BooleanMatcherArg,

    /// Upper bound for the dynamic analysis run, in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 300)]
    timeout: u64,

    /// Leave the dynamic analysis sandbox on disk.
    #[arg(long)]
    keep_sandbox: bool,

    /// Skip files matching this glob (workspace-relative, repeatable).
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Workspace root directory (default: current directory).
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Log level for tracing output.
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum NegativeFormArg {
    #[value(name = "not_to")]
    NotTo,
    #[value(name = "to_not")]
    ToNot,
}

impl From<NegativeFormArg> for NegativeForm {
    fn from(arg: NegativeFormArg) -> Self {
        match arg {
            NegativeFormArg::NotTo => NegativeForm::NotTo,
            NegativeFormArg::ToNot => NegativeForm::ToNot,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BooleanMatcherArg {
    /// be_truthy / be_falsey
    Conditional,
    /// be true / be false
    Exact,
}

impl From<BooleanMatcherArg> for BooleanMatcherTarget {
    fn from(arg: BooleanMatcherArg) -> Self {
        match arg {
            BooleanMatcherArg::Conditional => BooleanMatcherTarget::Conditional,
            BooleanMatcherArg::Exact => BooleanMatcherTarget::Exact,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.log_level);

    let format = cli.format;
    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            match format {
                OutputFormat::Json => {
                    let _ = emit_response(&ErrorResponse::from_error(&err), &mut io::stdout());
                    let _ = io::stdout().flush();
                }
                OutputFormat::Text => eprintln!("error: {err}"),
            }
            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Map flags onto a [`Configuration`].
fn build_configuration(cli: &Cli) -> Result<Configuration, ExpectifyError> {
    let keep = cli
        .keep
        .iter()
        .map(|name| Category::from_str(name.trim()))
        .collect::<Result<_, _>>()?;

    Ok(Configuration {
        force: cli.force,
        skip_dynamic_analysis: cli.skip_dynamic_analysis,
        rspec_command: cli.rspec_command.clone(),
        generate_commit_message: cli.generate_commit_message,
        negative_form: cli.negative_form.into(),
        parenthesize_matcher_arg: !cli.no_parentheses_matcher_arg,
        boolean_matcher: cli.boolean_matcher.into(),
        keep,
        analysis_timeout: Duration::from_secs(cli.timeout),
        keep_sandbox: cli.keep_sandbox,
    })
}

/// The invocation as typed, with the program name normalized.
fn command_line() -> String {
    std::iter::once("expectify".to_string())
        .chain(std::env::args().skip(1))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Execute the conversion and print its outcome.
fn execute(cli: Cli) -> Result<ExitCode, ExpectifyError> {
    let config = build_configuration(&cli)?;
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let paths = if cli.paths.is_empty() {
        vec![PathBuf::from("spec")]
    } else {
        cli.paths
    };

    let options = RunOptions {
        workspace_root,
        paths,
        excludes: cli.exclude,
        config,
        command_line: command_line(),
    };
    let response = convert_workspace(&options)?;

    match cli.format {
        OutputFormat::Json => {
            emit_response(&response, &mut io::stdout())?;
        }
        OutputFormat::Text => {
            print!("{}", summary::render_text(&response));
        }
    }
    let _ = io::stdout().flush();

    if response.has_failures() {
        Ok(ExitCode::from(OutputErrorCode::ApplyError.code()))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
