// src/main.rs
use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::Parser;
use plangate::materializer::PlanMaterializer;
use plangate::runtime::TerraformRenderer;
use plangate::toolchain::release::DEFAULT_RELEASES_URL;
use plangate::toolchain::{ReleaseInstaller, ToolchainProvider};
use plangate::{Gate, PermissionPolicy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Deny a terraform plan that creates, updates or deletes without permission.
#[derive(Parser, Debug)]
#[command(name = "plangate", version, about, long_about = None)]
struct Cli {
    /// Load terraform plan from FILE
    #[arg(short = 'p', long = "tfplan", env = "PLANGATE_TFPLAN", value_name = "FILE")]
    tfplan: PathBuf,

    /// Allow delete actions
    #[arg(short = 'd', long, env = "PLANGATE_ALLOW_DELETE", value_parser = FalseyValueParser::new())]
    allow_delete: bool,

    /// Allow update actions
    #[arg(short = 'u', long, env = "PLANGATE_ALLOW_UPDATE", value_parser = FalseyValueParser::new())]
    allow_update: bool,

    /// Allow create actions
    #[arg(short = 'c', long, env = "PLANGATE_ALLOW_CREATE", value_parser = FalseyValueParser::new())]
    allow_create: bool,

    /// JSON file with allow_delete / allow_update / allow_create
    #[arg(long, env = "PLANGATE_POLICY", value_name = "FILE")]
    policy: Option<PathBuf>,

    /// Render binary plans with terraform (may download a toolchain)
    #[arg(long, env = "PLANGATE_ALLOW_BINARY_PLAN", value_parser = FalseyValueParser::new())]
    allow_binary_plan: bool,

    /// Where downloaded toolchains are unpacked
    #[arg(long, env = "PLANGATE_INSTALL_DIR", value_name = "DIR")]
    install_dir: Option<PathBuf>,

    /// Base URL of the toolchain release server
    #[arg(long, env = "PLANGATE_RELEASES_URL", default_value = DEFAULT_RELEASES_URL)]
    releases_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PLANGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env may carry any of the PLANGATE_* bindings
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("{:#}", e);
        return ExitCode::from(2);
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Ok(true) on allow, Ok(false) on deny.
async fn run(cli: Cli) -> Result<bool> {
    // A. Policy: flags, plus the file if there is one
    let mut policy = PermissionPolicy::new(cli.allow_delete, cli.allow_update, cli.allow_create);
    if let Some(path) = &cli.policy {
        policy = policy.merge(PermissionPolicy::load(path)?);
    }
    info!(?policy, "permission policy");

    // B. Materializer
    let materializer = if cli.allow_binary_plan {
        let install_dir = cli
            .install_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("plangate"));
        let installer = ReleaseInstaller::new(&cli.releases_url, install_dir)
            .context("Failed to set up toolchain installer")?;
        PlanMaterializer::with_binary_plans(
            ToolchainProvider::new(Box::new(installer)),
            Box::new(TerraformRenderer::new()),
        )
    } else {
        PlanMaterializer::structured_only()
    };

    // C. Check
    info!(binary_plans = materializer.renders_binary_plans(), "plan materializer ready");
    let gate = Gate::new(materializer, policy);
    let decision = gate
        .check(&cli.tfplan)
        .await
        .with_context(|| format!("Failed to check plan {}", cli.tfplan.display()))?;

    if decision.is_allowed() {
        info!("{}", decision);
    } else {
        error!("{}", decision);
    }
    Ok(decision.is_allowed())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    // stderr: stdout belongs to whoever pipes us
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
