use alert_subjects::config::Config;
use alert_subjects::fetch::{DataFetcher, HttpBrokerClient, JsonDirFetcher, LasairFetcher};
use alert_subjects::media::generators_from_config;
use alert_subjects::subject::{SubjectGenerator, SubjectManifest};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Generate citizen-science subjects from alert-broker objects
#[derive(Parser, Debug)]
#[command(name = "alert-subjects", version, about)]
struct Cli {
    /// Config file (default: ~/.config/alert-subjects/config.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the subject media is written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Comma-separated generator roles: json, triplet, science, template, difference
    #[arg(long, value_delimiter = ',')]
    generators: Vec<String>,

    /// Generation index of the first object ID
    #[arg(long)]
    start_index: Option<u64>,

    /// Stop after this many subjects
    #[arg(long)]
    limit: Option<usize>,

    /// Read records from <DIR>/<object id>.json instead of the broker
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Broker API token
    #[arg(long, env = "LASAIR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    /// Object IDs to generate subjects for, in order
    #[arg(required = true)]
    object_ids: Vec<String>,
}

/// Result of one run
#[derive(Debug, Default)]
struct RunSummary {
    generated: usize,
    skipped: usize,
    incomplete: usize,
    save_failures: usize,
}

/// Written next to the media for an upload client to pick up
#[derive(Serialize)]
struct RunManifest {
    generated_at: String,
    subjects: Vec<SubjectManifest>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if !cli.generators.is_empty() {
        config.generators = cli.generators.clone();
    }
    if let Some(start) = cli.start_index {
        config.start_index = start;
    }
    if cli.token.is_some() {
        config.broker.token = cli.token.clone();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Output: {}", config.output_dir.display());

    let summary = match &cli.input_dir {
        Some(dir) => {
            info!("Reading records from {}", dir.display());
            run(&cli, &config, JsonDirFetcher::new(dir))?
        }
        None => {
            let client = HttpBrokerClient::new(&config.broker)
                .context("Failed to create broker HTTP client")?;
            info!("Querying broker at {}", client.base_url());
            run(&cli, &config, LasairFetcher::new(client))?
        }
    };

    info!(
        "Run complete: {} subjects, {} skipped, {} with missing media, {} failed writes",
        summary.generated, summary.skipped, summary.incomplete, summary.save_failures
    );
    Ok(())
}

/// Generate, save and record every subject
fn run<F: DataFetcher>(cli: &Cli, config: &Config, fetcher: F) -> Result<RunSummary> {
    let generators = generators_from_config(config)?;
    let mut generator = SubjectGenerator::new(cli.object_ids.iter().map(String::as_str), fetcher, generators)?
        .with_start_index(config.start_index)?;

    let mut summary = RunSummary::default();
    let mut manifests = Vec::new();
    let limit = cli.limit.unwrap_or(usize::MAX);

    for mut subject in generator.by_ref().take(limit) {
        if !subject.is_complete() {
            summary.incomplete += 1;
            for (role, message) in subject.failures() {
                warn!("{} is missing {}: {}", subject.object_id(), role, message);
            }
        }

        let report = subject.save(&config.output_dir);
        summary.save_failures += report.failed.len();
        summary.generated += 1;
        manifests.push(subject.manifest());
    }
    summary.skipped = generator.fetch_failures().len();

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;
    let manifest_path = config.output_dir.join("manifest.json");
    let manifest = RunManifest {
        generated_at: Utc::now().to_rfc3339(),
        subjects: manifests,
    };
    std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
    info!("Manifest: {}", manifest_path.display());

    Ok(summary)
}
