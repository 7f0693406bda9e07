//! kaddons CLI

mod interpreter;

use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use interpreter::CommandInterpreter;
use kaddons_core::evidence::classify_matrix_tier;
use kaddons_core::validate::{
    link_tasks, render_problems_markdown, validate_stored_data, LinkMode, LinkOutcome, LinkReport,
};
use kaddons_core::{
    Catalog, CoreError, CoreResult, DetectedWorkload, EvidencePruner, MatcherTables, NameMatcher,
    PipelineConfig, PruneBudget, ResolutionPipeline,
};
use kaddons_fetch::{FetchConfig, HttpFetcher};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Links checked in parallel by `validate`
const LINK_CHECK_CONCURRENCY: usize = 10;

#[derive(Parser)]
#[command(name = "kaddons")]
#[command(about = "Kubernetes addon compatibility checker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check detected workloads against a Kubernetes version
    Check {
        /// Target Kubernetes version (X.Y)
        #[arg(short, long = "k8s")]
        k8s_version: String,

        /// Detected workloads as a JSON array ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        workloads: String,

        /// Catalog file (defaults to the built-in catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Only check these addons (comma-separated)
        #[arg(short, long)]
        addons: Option<String>,

        /// Resolve from stored data only, no network access
        #[arg(long)]
        offline: bool,

        /// Command that interprets fetched evidence
        #[arg(long, env = "KADDONS_INTERPRETER")]
        interpreter: Option<String>,

        /// Addons resolved in parallel
        #[arg(long, default_value = "10")]
        concurrency: usize,

        /// Evidence byte ceiling per addon
        #[arg(long, default_value = "6000")]
        max_chars: usize,

        /// Evidence line ceiling per addon
        #[arg(long, default_value = "80")]
        max_lines: usize,

        /// Output file (defaults to stdout)
        #[arg(short = 'O', long)]
        output_file: Option<PathBuf>,
    },

    /// Show which catalog entries a workload name matches
    Match {
        /// Workload name
        name: String,

        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Prune a document to a bounded evidence excerpt
    Prune {
        /// Text file ("-" for stdin)
        file: String,

        #[arg(long, default_value = "6000")]
        max_chars: usize,

        #[arg(long, default_value = "80")]
        max_lines: usize,
    },

    /// Validate stored data and every catalog link
    Validate {
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Only check that links are reachable (no matrix classification)
        #[arg(long, conflicts_with_all = ["matrix", "stored"])]
        links: bool,

        /// Only check compatibility matrix pages
        #[arg(long, conflicts_with = "stored")]
        matrix: bool,

        /// Only check stored compatibility data (no network access)
        #[arg(long)]
        stored: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let result = match cli.command {
        Commands::Check {
            k8s_version,
            workloads,
            catalog,
            addons,
            offline,
            interpreter,
            concurrency,
            max_chars,
            max_lines,
            output_file,
        } => {
            let mut config = PipelineConfig::new(&k8s_version);
            if let Some(filter) = addons {
                config = config.with_addon_filter(&filter);
            }
            config.concurrency = concurrency;
            config.prune = PruneBudget::new(max_chars, max_lines);
            cmd_check(config, &workloads, catalog, offline, interpreter, output_file).await
        }
        Commands::Match { name, catalog } => cmd_match(&name, catalog),
        Commands::Prune {
            file,
            max_chars,
            max_lines,
        } => cmd_prune(&file, PruneBudget::new(max_chars, max_lines)),
        Commands::Validate {
            catalog,
            links,
            matrix,
            stored,
        } => {
            let mode = if stored {
                None
            } else if links {
                Some(LinkMode::LinksOnly)
            } else if matrix {
                Some(LinkMode::MatrixOnly)
            } else {
                Some(LinkMode::All)
            };
            cmd_validate(catalog, mode).await
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn load_catalog(path: Option<PathBuf>) -> CoreResult<Catalog> {
    match path {
        Some(path) => {
            info!("Loading catalog: {}", path.display());
            Catalog::from_path(&path)
        }
        None => Catalog::embedded(),
    }
}

fn read_input(source: &str) -> CoreResult<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    Ok(std::fs::read_to_string(Path::new(source))?)
}

fn build_fetcher() -> CoreResult<Arc<HttpFetcher>> {
    Ok(Arc::new(HttpFetcher::new(FetchConfig::default())?))
}

async fn cmd_check(
    config: PipelineConfig,
    workloads_source: &str,
    catalog: Option<PathBuf>,
    offline: bool,
    interpreter: Option<String>,
    output_file: Option<PathBuf>,
) -> CoreResult<()> {
    let catalog = load_catalog(catalog)?;
    let workloads: Vec<DetectedWorkload> = serde_json::from_str(&read_input(workloads_source)?)?;
    info!(
        "Checking {} workloads against Kubernetes {} ({} catalog entries)",
        workloads.len(),
        config.target_platform_version,
        catalog.len()
    );

    let mut pipeline = ResolutionPipeline::new(catalog, config);
    if offline {
        info!("Offline mode: no documentation or EOL lookups");
    } else {
        let fetcher = build_fetcher()?;
        pipeline = pipeline
            .with_fetcher(fetcher.clone())
            .with_eol_provider(fetcher);
    }
    if let Some(command) = interpreter.filter(|c| !c.trim().is_empty()) {
        pipeline = pipeline.with_interpreter(Arc::new(CommandInterpreter::parse(&command)?));
    }

    let report = pipeline.run(workloads).await?;
    info!(
        "Done: {} compatible, {} incompatible, {} unknown",
        report.summary.compatible, report.summary.incompatible, report.summary.unknown
    );

    let json = report.to_json()?;
    if let Some(out_path) = output_file {
        std::fs::write(&out_path, &json)?;
        info!("Report written to: {}", out_path.display());
    } else {
        println!("{}", json);
    }
    Ok(())
}

fn cmd_match(name: &str, catalog: Option<PathBuf>) -> CoreResult<()> {
    let catalog = load_catalog(catalog)?;
    let matcher = NameMatcher::new(catalog.entries(), MatcherTables::default());
    let result = matcher.find(name);

    println!("\nMatches for '{}'\n{}", name, "=".repeat(50));
    match result.pass {
        Some(pass) => {
            println!("Pass: {}", pass);
            for entry in &result.entries {
                let source = entry.source_url().unwrap_or("-");
                println!("  - {} ({})", entry.name, source);
            }
        }
        None => println!("No catalog entry matches"),
    }
    Ok(())
}

fn cmd_prune(file: &str, budget: PruneBudget) -> CoreResult<()> {
    let text = read_input(file)?;
    let pruned = EvidencePruner::new().prune(&text, budget);
    info!(
        "Pruned {} bytes to {} bytes, {} lines",
        text.len(),
        pruned.len(),
        pruned.line_count()
    );
    println!("{}", pruned);
    Ok(())
}

/// `mode` is `None` for stored data only.
async fn cmd_validate(catalog: Option<PathBuf>, mode: Option<LinkMode>) -> CoreResult<()> {
    let catalog = load_catalog(catalog)?;
    let problems = validate_stored_data(catalog.entries());
    let mut failed = !problems.is_empty();

    if problems.is_empty() {
        println!("Stored data: no problems in {} entries", catalog.len());
    } else {
        println!("{}", render_problems_markdown(&problems));
    }

    if let Some(mode) = mode {
        failed |= !check_links(&catalog, mode).await?;
    }

    if failed {
        return Err(CoreError::Catalog("validation failed".to_string()));
    }
    Ok(())
}

/// Check every catalog link the mode selects. Returns whether all passed.
async fn check_links(catalog: &Catalog, mode: LinkMode) -> CoreResult<bool> {
    let tasks = link_tasks(catalog.entries(), mode);
    if tasks.is_empty() {
        println!("No URLs to validate.");
        return Ok(true);
    }

    let fetcher = build_fetcher()?;
    info!(
        "Validating {} unique URLs across {} addons",
        tasks.len(),
        catalog.len()
    );

    let outcomes: Vec<LinkOutcome> = stream::iter(tasks.iter())
        .map(|task| {
            let fetcher = fetcher.clone();
            async move {
                let outcome = if task.needs_content {
                    fetcher
                        .fetch_document(&task.url)
                        .await
                        .map(|text| Some(classify_matrix_tier(&text)))
                } else {
                    fetcher.check_link(&task.url).await.map(|()| None)
                };
                match outcome {
                    Ok(tier) => LinkOutcome::Reachable(tier),
                    Err(e) => {
                        warn!("{}: {}", task.url, e);
                        LinkOutcome::Unreachable(e.to_string())
                    }
                }
            }
        })
        .buffered(LINK_CHECK_CONCURRENCY)
        .collect()
        .await;

    let report = LinkReport::new(&tasks, &outcomes);
    println!("{}", report.render_markdown(mode));
    Ok(report.is_clean())
}
