use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use listguard_core::{
    audit_listings, ComplianceVerdict, ExportGate, IntakeForm, LaunchReport, ListingsCollection,
    ProductDescriptor, RunState, Stage,
};
use listguard_runtime::{
    LaunchPipeline, ProviderRegistry, RuntimeConfig, SimulatedMarketInsight, StageObserver,
};

mod policy_index;

use policy_index::LocalPolicyIndex;

#[derive(Parser, Debug)]
#[command(name = "listguard", version, about = "Compliance-gated product listing generator")]
struct Cli {
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline for one product
    Run {
        #[arg(long, help = "Product intake file (YAML or JSON)")]
        product: PathBuf,
        #[arg(long, help = "Directory of Markdown policy documents")]
        policies: PathBuf,
        #[arg(long, help = "Runtime config file (YAML or JSON)")]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long, help = "Write the report here instead of stdout")]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = false, help = "Allow export of RED, ERROR or UNKNOWN tier reports")]
        acknowledge_risk: bool,
        #[arg(long, default_value_t = false, help = "Run without a model provider")]
        offline: bool,
    },
    /// Audit existing listings without any model call
    Audit {
        #[arg(long)]
        product: PathBuf,
        #[arg(long)]
        listings: PathBuf,
        #[arg(long, help = "Compliance verdict file; defaults to an UNKNOWN verdict")]
        verdict: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

/// Logs stage transitions for the terminal user.
struct ProgressLog;

impl StageObserver for ProgressLog {
    fn stage_started(&self, stage: Stage) {
        tracing::info!(stage = %stage, "Stage started");
    }

    fn stage_finished(&self, stage: Stage, state: &RunState) {
        tracing::debug!(stage = %stage, diagnostics = state.diagnostics().len(), "Stage finished");
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            product,
            policies,
            config,
            format,
            output,
            acknowledge_risk,
            offline,
        } => {
            run(RunArgs {
                product,
                policies,
                config,
                format,
                output,
                acknowledge_risk,
                offline,
            })
            .await
        }
        Commands::Audit {
            product,
            listings,
            verdict,
        } => audit(&product, &listings, verdict.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("listguard=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("listguard=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct RunArgs {
    product: PathBuf,
    policies: PathBuf,
    config: Option<PathBuf>,
    format: OutputFormat,
    output: Option<PathBuf>,
    acknowledge_risk: bool,
    offline: bool,
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let form = IntakeForm::from_file(&args.product)
        .with_context(|| format!("failed to load product intake {}", args.product.display()))?;

    let config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    }
    .apply_env();

    let provider = if args.offline {
        None
    } else {
        config
            .build_provider(&ProviderRegistry::with_defaults())
            .context("failed to configure model provider")?
    };
    if provider.is_none() {
        tracing::warn!("No model provider; assessment and generation will be degraded");
    }

    // Fresh per run so policy edits are picked up.
    let index = LocalPolicyIndex::load(&args.policies)
        .with_context(|| format!("failed to index policies in {}", args.policies.display()))?;

    let pipeline = LaunchPipeline::builder()
        .config(config)
        .provider(provider)
        .search(Arc::new(index))
        .market(Arc::new(SimulatedMarketInsight::new()))
        .observer(Arc::new(ProgressLog))
        .build()?;

    let state = pipeline.run(form).await?;
    let report = LaunchReport::compose(&state, pipeline.config().excerpt_chars);
    let rendered = render(&report, args.format)?;

    match &args.output {
        Some(path) => {
            check_export(report.export_gate, args.acknowledge_risk)?;
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write report {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => println!("{}", rendered),
    }

    Ok(ExitCode::SUCCESS)
}

fn render(report: &LaunchReport, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Markdown => report.to_markdown(),
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
    })
}

fn check_export(gate: ExportGate, acknowledged: bool) -> Result<()> {
    if gate.permits_export(acknowledged) {
        return Ok(());
    }
    match gate {
        ExportGate::Blocked => bail!(
            "export blocked: generated listings contain unverified regulated claims (risk gating failed)"
        ),
        _ => bail!("export requires acknowledgement of RED/ERROR/UNKNOWN risk: rerun with --acknowledge-risk"),
    }
}

fn audit(product: &Path, listings: &Path, verdict: Option<&Path>) -> Result<ExitCode> {
    let form = IntakeForm::from_file(product)
        .with_context(|| format!("failed to load product intake {}", product.display()))?;
    let product = ProductDescriptor::from_intake(form);

    let listings: ListingsCollection = load_document(listings)?;
    let verdict: ComplianceVerdict = match verdict {
        Some(path) => load_document(path)?,
        None => ComplianceVerdict::unknown(),
    };

    let outcome = audit_listings(&listings, &verdict, &product);
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.metrics.risk_gating_passed {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!(hallucinations = ?outcome.hallucinations, "Risk gating failed");
        Ok(ExitCode::FAILURE)
    }
}

/// Read a JSON (`.json`) or YAML (anything else) document.
fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("invalid YAML in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "listguard", "run", "--product", "p.yaml", "--policies", "data", "--format", "json",
            "--offline", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run { format, offline, acknowledge_risk, .. } => {
                assert_eq!(format, OutputFormat::Json);
                assert!(offline);
                assert!(!acknowledge_risk);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_export_gate_enforced() {
        assert!(check_export(ExportGate::Open, false).is_ok());
        assert!(check_export(ExportGate::RequiresAcknowledgement, false).is_err());
        assert!(check_export(ExportGate::RequiresAcknowledgement, true).is_ok());
        assert!(check_export(ExportGate::Blocked, true).is_err());
    }

    #[test]
    fn test_load_document_by_extension() {
        let dir = std::env::temp_dir().join(format!("listguard-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let json = dir.join("listings.json");
        std::fs::write(
            &json,
            r#"{"version_a": {"title": "A"}, "version_b": {"title": "B"}}"#,
        )
        .unwrap();
        let listings: ListingsCollection = load_document(&json).unwrap();
        assert_eq!(listings.conversion.title, "A");

        let yaml = dir.join("verdict.yaml");
        std::fs::write(
            &yaml,
            "risk_level: YELLOW\nconfidence_score: 0.5\nissues: []\n",
        )
        .unwrap();
        let verdict: ComplianceVerdict = load_document(&yaml).unwrap();
        assert_eq!(verdict.risk_level, listguard_core::RiskTier::Yellow);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
