//! republish - mirror CDN-hosted package versions onto a package registry
//!
//! Single-shot entry point meant for a scheduled CI job: every invocation
//! performs one full mirror run and exits.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use republish_core::cdn::HttpCdn;
use republish_core::packager::TarballPackager;
use republish_core::pipeline::NO_ACTION_NOTICE;
use republish_core::registry::NpmRegistry;
use republish_core::{FirstPublishPolicy, MirrorConfig, Pipeline, RunOptions, RunReport};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// First-publish behaviour accepted on the command line
#[derive(Debug, Clone, ValueEnum)]
enum FirstPublishArg {
    Fail,
    PublishWindow,
}

impl From<FirstPublishArg> for FirstPublishPolicy {
    fn from(arg: FirstPublishArg) -> Self {
        match arg {
            FirstPublishArg::Fail => FirstPublishPolicy::Fail,
            FirstPublishArg::PublishWindow => FirstPublishPolicy::PublishWindow,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "republish",
    about = "Republish new CDN versions of a package to the registry under a different name",
    version
)]
struct Cli {
    /// Configuration file (defaults to ./republish.yaml when present)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Set log level
    #[clap(long, default_value = "info")]
    log_level: LogLevel,

    /// Emit logs as JSON lines on stderr
    #[clap(long)]
    log_json: bool,

    /// Override the staging directory
    #[clap(long)]
    staging_dir: Option<PathBuf>,

    /// Override how many trailing CDN versions are considered
    #[clap(long)]
    window_size: Option<usize>,

    /// Publish prerelease versions above the baseline
    #[clap(long)]
    include_prerelease: bool,

    /// Behaviour when the target package has never been published
    #[clap(long, value_enum)]
    first_publish: Option<FirstPublishArg>,

    /// Stage and pack every version without publishing
    #[clap(long)]
    dry_run: bool,

    /// Leave the staging directory in place after a successful run
    #[clap(long)]
    keep_staging: bool,

    /// Print the run report as JSON on stdout
    #[clap(long)]
    json: bool,
}

impl Cli {
    /// Resolve the configuration and apply command-line overrides
    fn mirror_config(&self) -> Result<MirrorConfig> {
        let mut config = MirrorConfig::load(self.config.as_deref())?;

        if let Some(dir) = &self.staging_dir {
            config.staging_dir = dir.clone();
        }
        if let Some(size) = self.window_size {
            config.window_size = size;
        }
        if self.include_prerelease {
            config.include_prerelease = true;
        }
        if let Some(policy) = &self.first_publish {
            config.first_publish = policy.clone().into();
        }

        config.validate()?;
        Ok(config)
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            keep_staging: self.keep_staging,
        }
    }
}

/// Initialize tracing with CLI flags
///
/// Logs always go to stderr; stdout carries only the notice or the report.
fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.log_json);

    let config = cli.mirror_config().context("Invalid configuration")?;
    debug!("Using configuration: {:?}", config);

    let pipeline = Pipeline::new(
        config.clone(),
        Box::new(HttpCdn::new(&config)?),
        Box::new(NpmRegistry::new(&config)?),
        Box::new(TarballPackager::new()),
    );

    let report = match pipeline.run(cli.run_options()).await {
        Ok(report) => report,
        Err(e) => {
            error!("Mirror run failed: {:#}", anyhow::Error::from(e));
            let staging = pipeline.staging().root();
            if staging.exists() {
                error!("Staging left in place at {}", staging.display());
            }
            std::process::exit(1);
        }
    };

    print_report(
        &report,
        cli.json,
        &mut std::io::stdout().lock(),
        &mut std::io::stderr().lock(),
    )
}

/// Write the run outcome
///
/// With `json` the report owns `out`, so the CI notice moves to `err`.
fn print_report(
    report: &RunReport,
    json: bool,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(report)?)?;
        if report.is_noop() {
            writeln!(err, "{NO_ACTION_NOTICE}")?;
        }
        return Ok(());
    }

    if report.is_noop() {
        writeln!(out, "{NO_ACTION_NOTICE}")?;
        return Ok(());
    }

    if report.dry_run {
        info!(
            "Dry run complete: {} versions packed, none published",
            report.publish_set.len()
        );
    } else {
        info!("Published {} versions", report.published.len());
    }
    for version in &report.publish_set {
        writeln!(out, "{version}")?;
    }
    Ok(())
}
