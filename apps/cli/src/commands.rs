//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use feedbuilder_core::{ProgressReporter, RunConfig, RunResult};
use feedbuilder_fetch::{FtpSource, LocalSource};
use feedbuilder_shared::{
    AppConfig, FeedBuilderError, FtpCredentials, OutputConfig, init_config, load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// FeedBuilder: turn vendor XML catalogs into static feeds.
#[derive(Parser)]
#[command(
    name = "feedbuilder",
    version,
    about = "Convert vendor XML catalogs fetched over FTP into CSV, an XML feed and a status marker.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./feedbuilder.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Fetch, convert and publish once.
    Run {
        /// FTP host, optionally with `:port`.
        #[arg(long, env = "BB_HOST")]
        host: Option<String>,

        /// FTP user name.
        #[arg(long, env = "BB_USER")]
        user: Option<String>,

        /// FTP password.
        #[arg(long, env = "BB_PASS", hide_env_values = true)]
        password: Option<String>,

        /// Read the listed files from a local directory instead of FTP.
        #[arg(long)]
        from_dir: Option<PathBuf>,

        /// Output directory (overrides `[output] dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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
        0 => "feedbuilder=info",
        1 => "feedbuilder=debug",
        _ => "feedbuilder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
pub(crate) fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Run {
            host,
            user,
            password,
            from_dir,
            out,
        } => {
            let credentials = CredentialArgs {
                host: host.as_deref(),
                user: user.as_deref(),
                password: password.as_deref(),
            };
            cmd_run(config_path, credentials, from_dir.as_deref(), out)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Config file plus environment overrides.
fn resolve_config(path: Option<&Path>) -> feedbuilder_shared::Result<AppConfig> {
    let mut config = load_config(path)?;
    config.apply_env_overrides();
    Ok(config)
}

struct CredentialArgs<'a> {
    host: Option<&'a str>,
    user: Option<&'a str>,
    password: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_run(
    config_path: Option<&Path>,
    credentials: CredentialArgs<'_>,
    from_dir: Option<&Path>,
    out: Option<PathBuf>,
) -> Result<()> {
    let run_config = prepare_run(config_path, out, std::env::current_dir())?;

    let reporter = CliProgress::new();

    let result = match from_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "reading vendor files from local directory");
            feedbuilder_core::run_feed(&run_config, || Ok(LocalSource::new(dir)), &reporter)
        }
        None => {
            let ftp = &run_config.app.ftp;
            feedbuilder_core::run_feed(
                &run_config,
                || {
                    // Missing credentials are recorded as a failed run too.
                    let creds = FtpCredentials::new(
                        credentials.host,
                        credentials.user,
                        credentials.password,
                    )?;
                    FtpSource::connect(&creds, ftp)
                },
                &reporter,
            )
        }
    };

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            reporter.fail();
            return Err(e.into());
        }
    };

    println!();
    println!("  Feed published!");
    println!("  Files:     {}", result.files);
    if result.skipped_files > 0 {
        println!("  Skipped:   {} file(s)", result.skipped_files);
    }
    println!("  Items:     {}", result.candidates);
    println!("  Products:  {}", result.products);
    println!(
        "  Dropped:   {} incomplete, {} filtered, {} over cap",
        result.incomplete, result.rejected, result.truncated
    );
    println!("  Output:    {}", run_config.out_dir.display());
    for file in &result.published {
        println!(
            "    {} ({} bytes)",
            file.path.file_name().map_or_else(
                || file.path.display().to_string(),
                |n| n.to_string_lossy().into_owned()
            ),
            file.size_bytes
        );
    }
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Resolve the run settings. A failure here is recorded in `last_run.txt`
/// under `--out`, or the default output directory, like any failed run.
fn prepare_run(
    config_path: Option<&Path>,
    out: Option<PathBuf>,
    cwd: std::io::Result<PathBuf>,
) -> feedbuilder_shared::Result<RunConfig> {
    let fallback_out = out.clone().unwrap_or_else(|| {
        let dir = PathBuf::from(OutputConfig::default().dir);
        match &cwd {
            Ok(cwd) => cwd.join(dir),
            Err(_) => dir,
        }
    });

    let prepared = cwd
        .map_err(|e| FeedBuilderError::io(".", e))
        .and_then(|cwd| {
            let mut run_config = RunConfig::new(resolve_config(config_path)?, cwd);
            if let Some(out) = out {
                run_config.out_dir = out;
            }
            Ok(run_config)
        });

    if let Err(e) = &prepared {
        feedbuilder_core::record_failure(&fallback_out, e);
    }
    prepared
}

fn cmd_config_init() -> Result<()> {
    let cwd =
        std::env::current_dir().map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    let path = init_config(&cwd)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
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
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn fail(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_extracted(&self, name: &str, records: usize, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Parsing [{current}/{total}] {name}: {records} products"));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}
