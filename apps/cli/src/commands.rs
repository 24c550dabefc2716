//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use leadscout_core::{LeadPipeline, ProgressReporter, RunReport};
use leadscout_shared::{
    AppConfig, LeadQuery, Settings, init_config, load_config, load_config_from,
};
use leadscout_sources::SourceRegistry;
use leadscout_storage::CacheStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// leadscout: find, enrich, and rank business leads.
#[derive(Parser)]
#[command(
    name = "leadscout",
    version,
    about = "Discover, enrich, score, and export business leads for an industry and location.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.leadscout/leadscout.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Discover, enrich, rank, and export leads.
    Generate {
        /// Industry term, e.g. "dentist".
        #[arg(short, long)]
        industry: String,

        /// Location, e.g. "Austin, TX". Empty matches everywhere.
        #[arg(short, long, default_value = "")]
        location: String,

        /// Maximum number of leads to return.
        #[arg(short = 'n', long, default_value = "25")]
        limit: usize,

        /// Only run these connectors (comma-separated).
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Output directory (overrides `[defaults] output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the ranked leads as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Delete expired cache entries.
    Purge,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadscout=info",
        1 => "leadscout=debug",
        _ => "leadscout=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    match cli.command {
        Command::Generate {
            industry,
            location,
            limit,
            sources,
            out,
            json,
        } => {
            let args = GenerateArgs {
                industry,
                location,
                limit,
                sources,
                out,
                json,
            };
            cmd_generate(config_path.as_deref(), args).await
        }
        Command::Cache { action } => match action {
            CacheAction::Purge => cmd_cache_purge(config_path.as_deref()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

struct GenerateArgs {
    industry: String,
    location: String,
    limit: usize,
    sources: Vec<String>,
    out: Option<PathBuf>,
    json: bool,
}

async fn cmd_generate(config_path: Option<&std::path::Path>, args: GenerateArgs) -> Result<()> {
    let config = resolve_config(config_path)?;
    let mut settings = Settings::from_config(&config);
    if let Some(out) = args.out {
        settings.output_dir = out;
    }

    let mut registry = SourceRegistry::with_defaults();
    if !args.sources.is_empty() {
        registry.retain(&args.sources)?;
    }

    let query = LeadQuery::new(args.industry, args.location, args.limit)?;
    info!(
        industry = %query.industry,
        location = %query.location,
        limit = query.limit,
        sources = ?registry.connector_names(),
        "generating leads"
    );

    let pipeline = LeadPipeline::new(settings, registry);
    let reporter = CliProgress::new(args.json);
    let result = pipeline
        .generate_with_report(&query, &reporter)
        .await
        .wrap_err("lead generation failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.leads)?);
        return Ok(());
    }

    print_report(&result.report);
    if result.leads.is_empty() {
        println!("  No leads found.");
        println!();
        return Ok(());
    }

    println!("  {:>5}  {:<32}  {:<36}  {}", "score", "name", "domain", "email");
    for lead in &result.leads {
        println!(
            "  {:>5.2}  {:<32}  {:<36}  {}",
            lead.score,
            truncate(&lead.name, 32),
            truncate(&lead.domain, 36),
            lead.email.as_deref().unwrap_or("-"),
        );
    }
    println!();

    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    for c in &report.connectors {
        match &c.error {
            Some(err) => println!("  {:<14} failed: {err}", c.name),
            None => println!("  {:<14} {} leads", c.name, c.leads),
        }
    }
    println!("  Discovered:   {}", report.discovered);
    println!("  Merged:       {}", report.duplicates_merged);
    println!("  Already seen: {}", report.already_seen);
    println!("  Enriched:     {}", report.enriched);
    println!("  Returned:     {}", report.returned);
    if let Some(path) = &report.exported_to {
        println!("  Exported:     {}", path.display());
    }
    println!("  Time:         {:.1}s", report.elapsed_ms as f64 / 1000.0);
    println!();
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

async fn cmd_cache_purge(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let settings = Settings::without_secrets(&config);
    let path = settings.cache_path();

    if !path.exists() {
        println!("No cache at {}", path.display());
        return Ok(());
    }

    let cache = CacheStore::open(&path, settings.default_cache_ttl()).await?;
    let purged = cache.purge_expired().await?;
    let remaining = cache.len().await?;
    println!("Purged {purged} expired entries ({remaining} remaining) from {}", path.display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(hidden: bool) -> Self {
        let spinner = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn connector_finished(&self, name: &str, leads: usize) {
        self.spinner.set_message(format!("Discovering leads ({name}: {leads})"));
    }

    fn lead_enriched(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Enriching [{current}/{total}]"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
