use crate::bundle::parse_export_bundle;
use crate::client::{ClientError, TachyonClient};
use crate::config::{ConfigError, RemoteConfig};
use crate::framework::read_target_framework;
use crate::prompt::{ChatMessage, build_prompt};
use crate::writer::{
    WriteAction, WriteOptions, extract_files, extract_summary, parse_llm_json, safe_write_files,
    save_raw_output,
};
use crate::{log_debug, ui};
use anyhow::{Context, Result};
use clap::builder::{Styles, styling::AnsiColor};
use clap::{Parser, crate_version};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const LOG_FILE: &str = "mpgw-convert-debug.log";

/// CLI structure defining the conversion options
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version = crate_version!(),
    about = "Convert a legacy DataPower export to the Target structure using the Tachyon API",
    long_about = "Reads a legacy DataPower export.xml and the local:/// files it references, \
asks a Tachyon chat-completion model to port the service onto the Target framework, \
and writes the returned files under the repository root.\n\n\
The endpoint is configured through TACHYON_BASE_URL, TACHYON_API_KEY and TACHYON_MODEL \
(optionally TACHYON_CHAT_PATH and TACHYON_TIMEOUT_SECS).",
    styles = get_styles(),
)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// App folder name under Target/ (e.g. visa)
    #[arg(long, help = "App folder name under Target/ (e.g., visa)")]
    pub app: String,

    /// Path to the legacy export.xml
    #[arg(long = "export-xml", help = "Path to legacy export.xml")]
    pub export_xml: PathBuf,

    /// Repository root; defaults to the current directory
    #[arg(long = "repo-root", help = "Repo root path (defaults to the current directory)")]
    pub repo_root: Option<PathBuf>,

    /// Target folder, relative to the repository root
    #[arg(
        long = "target-root",
        default_value = "Target",
        help = "Target folder path (relative to repo root)"
    )]
    pub target_root: PathBuf,

    #[arg(long, help = "Do not write files; just print what would happen")]
    pub dry_run: bool,

    #[arg(long, help = "Allow overwriting existing files")]
    pub force: bool,

    #[arg(long, default_value_t = 0.2, help = "LLM temperature")]
    pub temperature: f64,

    #[arg(long = "max-tokens", default_value_t = 4000, help = "LLM max_tokens")]
    pub max_tokens: u32,

    /// Log debug messages to a file
    #[arg(short = 'l', long = "log", help = "Log debug messages to a file")]
    pub log: bool,

    /// Specify a custom log file path
    #[arg(long = "log-file", help = "Specify a custom log file path")]
    pub log_file: Option<String>,

    /// Suppress non-essential output (spinner, progress lines)
    #[arg(short = 'q', long = "quiet", help = "Suppress non-essential output")]
    pub quiet: bool,
}

/// How a conversion run ended, mapped onto the process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The export document does not exist
    MissingInput,
    /// Configuration, transport, HTTP or response-shape failure
    RemoteFailure,
    /// The model's reply was not JSON; raw text saved for inspection
    UnparseableResponse,
    /// The reply had no `files` array
    MissingFileList,
}

impl Outcome {
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::MissingInput => 2,
            Self::RemoteFailure => 3,
            Self::UnparseableResponse => 4,
            Self::MissingFileList => 5,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        Self::from(outcome.code())
    }
}

/// Define custom styles for Clap
fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Magenta.on_default().bold())
        .usage(AnsiColor::Cyan.on_default().bold())
        .literal(AnsiColor::Green.on_default().bold())
        .placeholder(AnsiColor::Yellow.on_default())
        .valid(AnsiColor::Blue.on_default().bold())
        .invalid(AnsiColor::Red.on_default().bold())
        .error(AnsiColor::Red.on_default().bold())
}

/// Parse the command-line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Main function to parse arguments and run one conversion
pub async fn main() -> Result<ExitCode> {
    let cli = parse_args();

    if cli.log {
        crate::logger::enable_logging();
        let log_file = cli.log_file.as_deref().unwrap_or(LOG_FILE);
        crate::logger::set_log_file(log_file)
            .with_context(|| format!("Failed to open log file {log_file}"))?;
    } else {
        crate::logger::disable_logging();
    }

    if cli.quiet {
        ui::set_quiet_mode(true);
    }

    let outcome = run(&cli, RemoteConfig::from_env()).await?;
    log_debug!("Conversion finished: {:?}", outcome);
    Ok(outcome.into())
}

/// Run the pipeline once: read export, build prompt, call model, write files
///
/// A missing export is reported before anything else is resolved, and
/// `remote` is only consulted once the inputs have been read. Write-safety failures are
/// returned as errors rather than as an [`Outcome`].
pub async fn run(cli: &Cli, remote: Result<RemoteConfig, ConfigError>) -> Result<Outcome> {
    ui::print_version(crate_version!());
    ui::print_newline();

    let repo_root = match &cli.repo_root {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let export_xml_path = std::path::absolute(&cli.export_xml)
        .with_context(|| format!("Invalid export path: {}", cli.export_xml.display()))?;

    if !export_xml_path.exists() {
        ui::print_error(&format!(
            "export.xml not found: {}",
            export_xml_path.display()
        ));
        return Ok(Outcome::MissingInput);
    }

    let repo_root = fs::canonicalize(&repo_root)
        .with_context(|| format!("Repo root not found: {}", repo_root.display()))?;
    let target_root = repo_root.join(&cli.target_root);

    log_debug!(
        "app={} export={} repo_root={} target_root={}",
        cli.app,
        export_xml_path.display(),
        repo_root.display(),
        target_root.display()
    );

    let bundle = parse_export_bundle(&export_xml_path)
        .with_context(|| format!("Failed to read export {}", export_xml_path.display()))?;
    ui::print_info(&format!(
        "Export: {} gateway(s), {} local file(s)",
        bundle.mpgw_names.len(),
        bundle.local_files.len()
    ));

    let framework_ctx = read_target_framework(&target_root);
    let messages = build_prompt(&cli.app, &bundle, &framework_ctx);

    let raw = match request_conversion(remote, &messages, cli.temperature, cli.max_tokens).await
    {
        Ok(raw) => raw,
        Err(e) => {
            ui::print_error(&format!("Tachyon error: {e}"));
            return Ok(Outcome::RemoteFailure);
        }
    };

    let payload = match parse_llm_json(&raw) {
        Ok(payload) => payload,
        Err(e) => {
            let saved = save_raw_output(&repo_root, &raw)
                .context("Failed to save raw model output")?;
            ui::print_error(&format!(
                "Failed to parse model JSON. Raw output saved to: {}",
                saved.display()
            ));
            ui::print_error(&format!("Parse error: {e}"));
            return Ok(Outcome::UnparseableResponse);
        }
    };

    let Some(files) = extract_files(&payload) else {
        ui::print_error("Model JSON missing 'files' list");
        return Ok(Outcome::MissingFileList);
    };

    let options = WriteOptions {
        dry_run: cli.dry_run,
        force: cli.force,
    };
    let actions = safe_write_files(&repo_root, files, options)?;
    log_debug!(
        "Materialized: {}",
        actions
            .iter()
            .map(WriteAction::path)
            .collect::<Vec<_>>()
            .join(", ")
    );
    report_actions(&actions, &repo_root, options);

    ui::print_message(&format!("\nSummary:\n{}", extract_summary(&payload)));
    Ok(Outcome::Success)
}

async fn request_conversion(
    remote: Result<RemoteConfig, ConfigError>,
    messages: &[ChatMessage],
    temperature: f64,
    max_tokens: u32,
) -> Result<String, ClientError> {
    let client = TachyonClient::new(remote?)?;

    let spinner = ui::create_spinner(&format!(
        "Waiting for {} at {}...",
        client.config().model,
        client.config().endpoint()
    ));
    let result = client.chat(messages, temperature, max_tokens).await;
    spinner.finish_and_clear();
    result
}

fn report_actions(actions: &[WriteAction], repo_root: &Path, options: WriteOptions) {
    if actions.is_empty() {
        ui::print_warning("Model returned no files");
    } else if options.dry_run {
        ui::print_info(&format!(
            "Dry run: {} file(s) would be written under {}",
            actions.len(),
            repo_root.display()
        ));
    } else {
        ui::print_success(&format!("Wrote {} file(s)", actions.len()));
    }
}
