use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use formpilot::mapping::JsonFileCache;
use formpilot::pipeline::{PipelineDefinition, PipelineRunner};
use formpilot::profile::{load_job_urls, ProfileData};
use formpilot::{
    summarize, BatchRunner, BrowserTrait, ChromeBrowser, Config, ElementInspector, HeuristicMapper,
    LlmClassifier, PageDriver, RunSummary,
};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "formpilot", version, about = "Fill job application forms from a profile")]
struct Cli {
    /// JSON config file; environment variables and flags override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show the browser window.
    #[arg(long, global = true)]
    headed: bool,

    /// Raise log level to debug.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every URL in the jobs file.
    Run {
        #[arg(long)]
        jobs: Option<PathBuf>,
        #[arg(long)]
        profile: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Map and fill but never submit.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a YAML task pipeline.
    Pipeline {
        file: PathBuf,
        /// Variable override, `key.path=value`.
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },
    /// Print what the inspector and heuristic mapper make of a page.
    Inspect {
        url: String,
        #[arg(long)]
        profile: Option<PathBuf>,
    },
    /// Rebuild summary.json from an output directory.
    Summarize { dir: PathBuf },
    /// Manage the classification cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete the cache file.
    Clear {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.headed {
        config.browser.headless = false;
    }

    match cli.command {
        Command::Run {
            jobs,
            profile,
            out,
            dry_run,
        } => {
            if let Some(jobs) = jobs {
                config.run.jobs_file = jobs;
            }
            if let Some(profile) = profile {
                config.run.profile_dir = profile;
            }
            if let Some(out) = out {
                config.run.output_dir = out;
            }
            if dry_run {
                config.run.submit = false;
            }
            run_batch(&config).await
        }
        Command::Pipeline { file, vars } => run_pipeline(&config, &file, &vars).await,
        Command::Inspect { url, profile } => {
            let profile_dir = profile.unwrap_or_else(|| config.run.profile_dir.clone());
            inspect(&config, &url, &profile_dir).await
        }
        Command::Summarize { dir } => {
            let summary = summarize(&dir).await?;
            print_summary(&summary);
            Ok(())
        }
        Command::Cache {
            action: CacheAction::Clear { path },
        } => {
            let path = path.unwrap_or_else(|| config.llm.cache_path.clone());
            if JsonFileCache::clear(&path)? {
                info!("removed {}", path.display());
            } else {
                info!("no cache at {}", path.display());
            }
            Ok(())
        }
    }
}

async fn run_batch(config: &Config) -> anyhow::Result<()> {
    let profile = ProfileData::load(&config.run.profile_dir)
        .await
        .with_context(|| format!("loading profile from {}", config.run.profile_dir.display()))?;
    let urls = load_job_urls(&config.run.jobs_file)
        .await
        .with_context(|| format!("reading {}", config.run.jobs_file.display()))?;
    if urls.is_empty() {
        bail!("no job URLs in {}", config.run.jobs_file.display());
    }

    let mut classifier = match LlmClassifier::from_config(&config.llm) {
        Ok(classifier) => classifier,
        Err(e) => {
            warn!("field classifier disabled: {}", e);
            LlmClassifier::disabled()
        }
    };
    info!(
        jobs = urls.len(),
        submit = config.run.submit,
        classifier = classifier.is_enabled(),
        "starting run"
    );

    let batch = BatchRunner::new(config, &profile, ChromeBrowser::new);
    let summary = batch.run(&urls, &mut classifier).await?;
    print_summary(&summary);
    Ok(())
}

async fn run_pipeline(config: &Config, file: &Path, vars: &[String]) -> anyhow::Result<()> {
    let definition = PipelineDefinition::load(file).await?;
    let mut overrides = Value::Object(Map::new());
    for var in vars {
        let Some((key, value)) = var.split_once('=') else {
            bail!("expected KEY=VALUE, got '{}'", var);
        };
        let mut nested = Value::String(value.to_string());
        for part in key.rsplit('.') {
            let mut map = Map::new();
            map.insert(part.to_string(), nested);
            nested = Value::Object(map);
        }
        formpilot::profile::deep_merge(&mut overrides, nested);
    }

    let runner = PipelineRunner::new(definition, overrides).with_error_dir(&config.run.output_dir);
    let mut browser = ChromeBrowser::new();
    let report = runner.run(&mut browser, config).await?;
    info!(
        "pipeline complete: {} steps, {} optional steps skipped",
        report.completed.len(),
        report.skipped.len()
    );
    Ok(())
}

async fn inspect(config: &Config, url: &str, profile_dir: &Path) -> anyhow::Result<()> {
    let profile = match ProfileData::load(profile_dir).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!("inspecting without a profile: {}", e);
            ProfileData::from_value(json!({}))
        }
    };

    let mut browser = ChromeBrowser::new();
    browser.launch(config).await?;
    let page = browser.new_page().await?;
    page.navigate(url, config.session.navigation_timeout()).await?;
    tokio::time::sleep(config.session.settle_delay()).await;

    let descriptors = ElementInspector::new().inspect(&page).await;
    let mapping = HeuristicMapper::new().map(&descriptors, &profile);
    let report = json!({
        "url": url,
        "elements": descriptors,
        "mappings": mapping.mappings,
        "unmapped": mapping.unmapped.iter().map(|d| d.field_key()).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    page.close().await?;
    browser.close().await?;
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "\n{} jobs: {} succeeded, {} failed",
        summary.total, summary.succeeded, summary.failed
    );
    for job in &summary.jobs {
        println!(
            "  [{}] {:03} {} ({} filled, {} skipped) -> {}",
            if job.success { "ok" } else { "FAIL" },
            job.index,
            job.url,
            job.fields_filled,
            job.fields_skipped,
            job.directory.display()
        );
        for error in job.errors.iter().take(3) {
            println!("        {}", error);
        }
        if let Some(screenshot) = &job.screenshot {
            println!("        screenshot: {}", screenshot.display());
        }
    }
}
