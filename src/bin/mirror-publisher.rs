//! mirror-publisher CLI
//!
//! Publishes the packages of a workspace to an npm registry in dependency
//! order and mirrors each published tarball into an asset repository

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mirror_publisher::{ConfigLoadOptions, ConfigLoader, PublisherConfig, WorkspacePublisher};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Publish workspace packages and mirror them downstream
#[derive(Parser)]
#[command(name = "mirror-publisher")]
#[command(version)]
#[command(about = "Publish workspace packages in dependency order and mirror them into an asset repository", long_about = None)]
struct Cli {
    /// Verbose output (debug logs, including process output)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish every package, then push each into the asset repository
    Publish {
        #[command(flatten)]
        config: ConfigArgs,

        /// Only print what would happen
        #[arg(long)]
        dry_run: bool,

        /// Leave packages whose downstream branch already exists untouched
        #[arg(long)]
        skip_existing_branches: bool,

        /// Write a JSON report of the run to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Print the publish order with versions, tags and branches
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// Workspace root (defaults to current directory)
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,

    /// npm registry URL
    #[arg(long, value_name = "URL")]
    registry: Option<String>,

    /// git URL of the downstream asset repository
    #[arg(long, value_name = "URL")]
    assets_repo: Option<String>,

    /// npm scope of the workspace packages, e.g. @acme
    #[arg(long)]
    scope: Option<String>,

    /// Directory holding one subdirectory per package, relative to ROOT
    #[arg(long, value_name = "DIR")]
    packages_dir: Option<PathBuf>,

    /// Config file (defaults to ROOT/.mirror-publisher.yaml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl ConfigArgs {
    fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn overrides(&self) -> PublisherConfig {
        PublisherConfig {
            registry_url: self.registry.clone(),
            scope: self.scope.clone(),
            packages_dir: self.packages_dir.clone(),
            assets_repo: self.assets_repo.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {}", cause);
            }
            process::exit(1);
        }
    }
}

/// Console logging controlled by RUST_LOG (default: info, `-v` for debug)
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_filter(filter),
        )
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Publish {
            config,
            dry_run,
            skip_existing_branches,
            report,
        } => {
            let mut overrides = config.overrides();
            if dry_run {
                overrides.dry_run = Some(true);
            }
            if skip_existing_branches {
                overrides.skip_existing_branches = Some(true);
            }
            publish_command(&config, overrides, report).await
        }
        Commands::Plan { config } => plan_command(&config).await,
    }
}

async fn load_publisher(config: &ConfigArgs, overrides: PublisherConfig) -> Result<WorkspacePublisher> {
    let root = config.root();
    let settings = ConfigLoader::load(ConfigLoadOptions {
        project_path: root.clone(),
        config_file: config.config.clone(),
        cli_args: Some(overrides),
        env: std::env::vars().collect(),
    })
    .await
    .context("failed to load configuration")?;

    Ok(WorkspacePublisher::new(root, settings))
}

async fn publish_command(
    config: &ConfigArgs,
    overrides: PublisherConfig,
    report_path: Option<PathBuf>,
) -> Result<i32> {
    println!("\n📦 mirror-publisher\n");

    let publisher = load_publisher(config, overrides).await?;
    let report = publisher.publish().await?;

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    if report.dry_run {
        println!("\n✅ Dry run finished: {} package(s)", report.packages.len());
    } else {
        println!(
            "\n✅ Published {} package(s) in {:.1}s",
            report.packages.len(),
            report.duration_ms as f64 / 1000.0
        );
    }
    Ok(0)
}

async fn plan_command(config: &ConfigArgs) -> Result<i32> {
    let publisher = load_publisher(config, config.overrides()).await?;
    let plan = publisher.plan().await?;

    if plan.is_empty() {
        println!("⚠️  No publishable packages found");
        return Ok(0);
    }

    println!("\nPublish order:\n");
    for (i, package) in plan.iter().enumerate() {
        println!(
            "  {:>3}. {}@{}  (tag: {}, branch: {})",
            i + 1,
            package.name,
            package.version,
            package.tag,
            package.branch
        );
    }
    Ok(0)
}
