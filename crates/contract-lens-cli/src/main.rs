use std::collections::HashMap;
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use contract_lens_core::report::{AnalysisInfo, ReportMetadata, ReportRenderer};
use contract_lens_core::{
    scan_red_flags, AnalysisClient, FileGuidelineRepository, GuidelineBundle,
    GuidelineRepository, HeadingValidator, PdfReader, ResponseValidator, ReviewError,
    ReviewSettings, Severity,
};
use tokio::sync::oneshot;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const MIN_CONTRACT_CHARS: usize = 100;
const CONFIRM_COST_USD: f64 = 1.0;
const CONFIG_KEY_PREFIX: &str = "CONTRACT_LENS_";

#[derive(Parser, Debug)]
#[command(
    name = "contract-lens",
    author,
    version,
    about = "Review sponsorship contracts against negotiation and risk guidelines"
)]
struct Cli {
    /// Directory containing guideline files and redflags.json
    #[arg(
        long = "guidelines-dir",
        value_name = "DIR",
        default_value = "./data",
        global = true
    )]
    guidelines_dir: PathBuf,

    /// Optional config file (toml, json or yaml); environment variables take precedence
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse a contract PDF and write a review report
    Review {
        /// Contract PDF to review
        #[arg(long, value_name = "PDF")]
        contract: PathBuf,

        /// Directory for generated reports
        #[arg(long, value_name = "DIR", default_value = "./output")]
        output: PathBuf,

        /// Print the cost estimate and stop before calling the model
        #[arg(long)]
        estimate_cost: bool,

        /// Answer yes to every confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Combine existing reports into a summary document
    Summarize {
        /// Directory containing contract_review_*.md reports
        #[arg(long = "reports-dir", value_name = "DIR", default_value = "./output")]
        reports_dir: PathBuf,

        /// Summary file to write (defaults to a timestamped file in the reports directory)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// List the loaded red-flag keywords
    RedFlags {
        /// Emit red flags as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted by user")),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Review {
            contract,
            output,
            estimate_cost,
            yes,
        } => {
            let options = ReviewOptions {
                contract,
                output,
                estimate_only: estimate_cost,
                assume_yes: yes,
            };
            review(&cli.guidelines_dir, cli.config.as_deref(), options).await
        }
        Commands::Summarize { reports_dir, out } => summarize(&reports_dir, out.as_deref()),
        Commands::RedFlags { json } => list_red_flags(&cli.guidelines_dir, json).await,
    }
}

struct ReviewOptions {
    contract: PathBuf,
    output: PathBuf,
    estimate_only: bool,
    assume_yes: bool,
}

async fn review(
    guidelines_dir: &Path,
    config: Option<&Path>,
    options: ReviewOptions,
) -> Result<()> {
    let reader = PdfReader::new();
    let check = reader.validate(&options.contract);
    if !check.passed {
        return Err(ReviewError::Validation(check.message).into());
    }
    let info = reader.get_info(&options.contract);
    if !info.is_valid {
        let reason = info.error.as_deref().unwrap_or("unknown error");
        return Err(ReviewError::Validation(format!("PDF cannot be opened: {reason}")).into());
    }
    println!(
        "{} {} ({} page(s), {:.1} MB)",
        "Contract:".bold(),
        options.contract.display(),
        info.page_count,
        info.size_mb()
    );

    let settings = load_settings(config)?;
    let bundle = load_bundle(guidelines_dir).await?;

    let text = reader
        .extract_text(&options.contract)
        .with_context(|| format!("failed to read {}", options.contract.display()))?;
    let text_length = text.chars().count();
    if text_length < MIN_CONTRACT_CHARS {
        return Err(ReviewError::Validation(format!(
            "extracted text is too short ({text_length} characters); \
             the PDF may be image-only or scanned"
        ))
        .into());
    }
    println!("{} {text_length} characters extracted", "Text:".bold());

    let hits = scan_red_flags(&text, &bundle.red_flags);
    if !hits.is_empty() {
        println!("{}", "Red flag keywords found:".bold());
        for hit in &hits {
            println!(
                "  - {} [{}] x{}",
                hit.keyword,
                severity_label(hit.severity),
                hit.occurrences
            );
        }
    }

    let client = AnalysisClient::from_settings(&settings)?;
    let cost = client.estimate_cost(&text, &bundle.guideline_text());
    println!(
        "{} {} tokens, ${:.4} (about {:.0} {})",
        "Estimated cost:".bold(),
        cost.total_tokens,
        cost.usd,
        cost.converted,
        cost.currency
    );
    if options.estimate_only {
        return Ok(());
    }
    if cost.usd > CONFIRM_COST_USD
        && !options.assume_yes
        && !confirm(&format!("Estimated cost is ${:.2}. Continue?", cost.usd)).await?
    {
        println!("{}", "Review cancelled.".yellow());
        return Ok(());
    }

    println!(
        "{} {} ({})",
        "Analysing with".bold(),
        client.model(),
        client.provider()
    );
    let analysis = client.analyze(&text, &bundle).await?;

    let verdict = HeadingValidator::default().validate(&analysis);
    if verdict.valid {
        debug!(message = %verdict.message, "response validated");
    } else {
        println!("{} {}", "warning:".yellow().bold(), verdict.message);
        if !options.assume_yes && !confirm("Save the report anyway?").await? {
            println!("{}", "Report discarded.".yellow());
            return Ok(());
        }
    }

    let contract_name = options
        .contract
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| options.contract.display().to_string());
    let metadata = ReportMetadata {
        document: Some(info),
        cost: Some(cost),
        analysis: Some(AnalysisInfo {
            provider: client.provider().to_string(),
            model: client.model().to_string(),
            text_length,
        }),
        keyword_hits: hits,
    };
    let path =
        ReportRenderer::new(&options.output).render(&analysis, &contract_name, &metadata)?;
    println!("{} {}", "Report saved:".green().bold(), path.display());
    Ok(())
}

fn summarize(reports_dir: &Path, out: Option<&Path>) -> Result<()> {
    let path = ReportRenderer::new(reports_dir)
        .summarize(out)
        .with_context(|| format!("failed to summarize reports in {}", reports_dir.display()))?;
    println!("{} {}", "Summary saved:".green().bold(), path.display());
    Ok(())
}

async fn list_red_flags(guidelines_dir: &Path, json: bool) -> Result<()> {
    let bundle = load_bundle(guidelines_dir).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&bundle.red_flags)?);
        return Ok(());
    }

    println!(
        "{} red flag(s) loaded from {}",
        bundle.red_flags.len(),
        guidelines_dir.display()
    );
    for flag in &bundle.red_flags {
        println!(
            "- {keyword:<24} [{severity}] {reason}",
            keyword = flag.keyword,
            severity = severity_label(flag.severity),
            reason = flag.reason
        );
    }
    Ok(())
}

async fn load_bundle(guidelines_dir: &Path) -> Result<GuidelineBundle> {
    let repo = FileGuidelineRepository::new(guidelines_dir);
    repo.load_bundle()
        .await
        .with_context(|| format!("failed to load guidelines from {}", guidelines_dir.display()))
}

/// Config file values first, then `CONTRACT_LENS_*` environment variables on top.
fn load_settings(config: Option<&Path>) -> Result<ReviewSettings> {
    let mut values: HashMap<String, String> = HashMap::new();
    if let Some(path) = config {
        let file_values: HashMap<String, String> = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        info!(path = %path.display(), keys = file_values.len(), "config file loaded");
        for (key, value) in file_values {
            values.insert(format!("{CONFIG_KEY_PREFIX}{}", key.to_uppercase()), value);
        }
    }
    for (key, value) in env::vars() {
        if key.starts_with(CONFIG_KEY_PREFIX) || key == ReviewSettings::FALLBACK_API_KEY_ENV {
            values.insert(key, value);
        }
    }
    Ok(ReviewSettings::from_map(&values)?)
}

/// Ask a yes/no question on stdin. End of input counts as "no".
///
/// The line is read on a detached thread so an interrupt can end the process
/// while the prompt is still waiting.
async fn confirm(question: &str) -> Result<bool> {
    print!("{question} (y/N): ");
    io::stdout().flush()?;

    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        let mut answer = String::new();
        let _ = tx.send(io::stdin().read_line(&mut answer).map(|_| answer));
    });
    let answer = rx
        .await
        .context("confirmation reader stopped")?
        .context("failed to read confirmation")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => severity.as_str().red().bold(),
        Severity::High => severity.as_str().red(),
        Severity::Medium => severity.as_str().yellow(),
        Severity::Low => severity.as_str().normal(),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info,tokio=warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
