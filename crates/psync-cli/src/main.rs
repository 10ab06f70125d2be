//! psync: photo bucket sync CLI
//!
//! Commands:
//!   sync [--dry-run]            - fetch new objects into the archive and inbox
//!   decrypt-name <path>...      - decode rclone-encrypted object names
//!   decrypt-file <in> <out>     - decode one rclone-encrypted body
//!   check                       - verify the bucket is reachable
//!   config show                 - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use psync_core::config::{expand_tilde, PsyncConfig};
use psync_crypt::{resolve_path, CryptError, Decrypter};
use psync_storage::{BucketOperators, Credentials};
use psync_sync::ProgressFn;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "psync",
    version,
    about = "Photo bucket sync",
    long_about = "psync: fetch phone uploads from S3 into a local archive and inbox, \
                  decoding rclone crypt names and bodies"
)]
struct Cli {
    /// Path to config.toml
    #[arg(long, short = 'c', env = "PSYNC_CONFIG", default_value = "/etc/psync/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "PSYNC_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "PSYNC_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Prompt for an extra rclone crypt password
    #[arg(long, global = true)]
    ask_password: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch new objects from the bucket
    ///
    /// Credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY
    /// (or PSYNC_ACCESS_KEY_ID / PSYNC_SECRET_ACCESS_KEY). Without them the
    /// default AWS credential chain is used.
    Sync {
        /// List what would be fetched without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode rclone-encrypted object names
    #[command(name = "decrypt-name")]
    DecryptName {
        /// Encrypted paths, `/`-separated as in the bucket
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Decode one rclone-encrypted file body
    #[command(name = "decrypt-file")]
    DecryptFile {
        input: PathBuf,
        output: PathBuf,
    },

    /// Check that the bucket is reachable
    Check,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PsyncConfig::load(&cli.config)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or_else(|| {
        if config.log.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });
    init_logging(&level, &format);
    if !cli.config.exists() {
        tracing::warn!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Sync { dry_run, json } => {
            cmd_sync(&config, cli.ask_password, dry_run, json).await
        }
        Commands::DecryptName { paths } => {
            cmd_decrypt_name(&config, cli.ask_password, &paths).await
        }
        Commands::DecryptFile { input, output } => {
            cmd_decrypt_file(&config, cli.ask_password, &input, &output).await
        }
        Commands::Check => cmd_check(&config).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

const NO_PASSWORDS: &str =
    "no crypt passwords configured (crypt.password_files, PSYNC_PASSWORD or --ask-password)";

fn credentials_from_env() -> Result<Option<Credentials>> {
    let access_key = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("PSYNC_ACCESS_KEY_ID"));
    let Ok(access_key_id) = access_key else {
        tracing::debug!("no static S3 credentials in environment, using default chain");
        return Ok(None);
    };
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("PSYNC_SECRET_ACCESS_KEY"))
        .context(
            "AWS_ACCESS_KEY_ID is set but AWS_SECRET_ACCESS_KEY is not\n\
             Example:\n\
             \texport AWS_ACCESS_KEY_ID=your-key\n\
             \texport AWS_SECRET_ACCESS_KEY=your-secret",
        )?;
    Ok(Some(Credentials {
        access_key_id,
        secret_access_key,
    }))
}

fn build_operators_from_env(config: &PsyncConfig) -> Result<BucketOperators> {
    psync_storage::build_from_core_config(&config.storage, credentials_from_env()?)
        .context("building storage operators")
}

/// First line of `path`, trimmed
fn read_password_file(path: &Path) -> Result<SecretString> {
    let path = expand_tilde(path);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading password file: {}", path.display()))?;
    let line = content.lines().next().unwrap_or_default().trim();
    if line.is_empty() {
        anyhow::bail!("password file is empty: {}", path.display());
    }
    Ok(SecretString::from(line))
}

/// Password files in config order, then PSYNC_PASSWORD, then the prompt.
fn collect_passwords(config: &PsyncConfig, ask: bool) -> Result<Vec<SecretString>> {
    let mut passwords = config
        .crypt
        .password_files
        .iter()
        .map(|p| read_password_file(p))
        .collect::<Result<Vec<_>>>()?;

    if let Ok(pw) = std::env::var("PSYNC_PASSWORD") {
        if !pw.is_empty() {
            passwords.push(SecretString::from(pw));
        }
    }
    if ask {
        let pw = rpassword::prompt_password("rclone crypt password: ")
            .context("reading password from terminal")?;
        passwords.push(SecretString::from(pw.trim().to_string()));
    }
    Ok(passwords)
}

/// Run scrypt for each password off the async executor.
async fn build_decrypters(config: &PsyncConfig, ask: bool) -> Result<Vec<Decrypter>> {
    let passwords = collect_passwords(config, ask)?;
    let count = passwords.len();
    let decrypters = tokio::task::spawn_blocking(move || {
        passwords
            .iter()
            .map(Decrypter::new)
            .collect::<std::result::Result<Vec<_>, _>>()
    })
    .await
    .context("key derivation task panicked")?
    .context("deriving keys")?;
    tracing::debug!(count, "decrypters ready");
    Ok(decrypters)
}

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) =
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

// ── `psync sync` ──────────────────────────────────────────────────────────────

async fn cmd_sync(config: &PsyncConfig, ask: bool, dry_run: bool, json: bool) -> Result<()> {
    let operators = build_operators_from_env(config)?;
    let decrypters = build_decrypters(config, ask).await?;
    if decrypters.is_empty() {
        tracing::warn!("no crypt passwords configured; encrypted objects are copied as-is");
    }
    let ctx = psync_sync::SyncContext::from_config(config, operators, decrypters)?;

    if dry_run {
        let plan = psync_sync::plan_sync(&ctx, SystemTime::now()).await?;
        for target in &plan.targets {
            let kind = match target.body {
                psync_core::types::BodyMode::Plain => "plain",
                psync_core::types::BodyMode::Encrypted(_) => "encrypted",
            };
            println!("{} → {} ({kind})", target.key, target.inbox_path.display());
        }
        println!();
        println!(
            "Dry run: {} listed, {} skipped, {} to fetch",
            plan.report.listed,
            plan.report.skipped,
            plan.targets.len()
        );
        return Ok(());
    }

    println!(
        "Syncing s3://{}/{} → {}",
        config.storage.bucket,
        config.storage.prefix,
        ctx.inbox_dir.display()
    );

    let pb = make_progress_bar(0, "sync");
    let pb_clone = pb.clone();
    let progress: ProgressFn = Box::new(move |done, total, msg| {
        pb_clone.set_length(total);
        pb_clone.set_position(done);
        pb_clone.set_message(msg.to_string());
    });

    let report = psync_sync::run_sync(&ctx, Some(&progress)).await?;
    pb.finish_with_message("done".to_string());

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serializing report")?
        );
    } else {
        println!();
        println!("Sync complete:");
        println!("  listed:    {}", report.listed);
        println!("  fetched:   {} ({})", report.fetched, fmt_bytes(report.bytes));
        println!("  decrypted: {}", report.decrypted);
        println!("  skipped:   {}", report.skipped);
        println!("  failed:    {}", report.failed);
    }

    if !report.is_clean() {
        anyhow::bail!("{} object(s) failed; see log for details", report.failed);
    }
    Ok(())
}

// ── `psync decrypt-name` ──────────────────────────────────────────────────────

async fn cmd_decrypt_name(config: &PsyncConfig, ask: bool, paths: &[String]) -> Result<()> {
    let decrypters = build_decrypters(config, ask).await?;
    if decrypters.is_empty() {
        anyhow::bail!(NO_PASSWORDS);
    }
    for path in paths {
        match resolve_path(&decrypters, path) {
            Some((index, decoded, _)) => println!("{path} → {decoded}  [password {}]", index + 1),
            None => println!("{path} → no match"),
        }
    }
    Ok(())
}

// ── `psync decrypt-file` ──────────────────────────────────────────────────────

async fn cmd_decrypt_file(
    config: &PsyncConfig,
    ask: bool,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let decrypters = build_decrypters(config, ask).await?;
    if decrypters.is_empty() {
        anyhow::bail!(NO_PASSWORDS);
    }
    let encrypted = tokio::fs::read(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let target = output.to_path_buf();

    let n = tokio::task::spawn_blocking(move || decrypt_with_any(&decrypters, &encrypted, &target))
        .await
        .context("decrypt task panicked")??;

    println!("{} → {} ({})", input.display(), output.display(), fmt_bytes(n));
    Ok(())
}

/// Bodies carry no key hint, so each password is tried until one
/// authenticates.
fn decrypt_with_any(decrypters: &[Decrypter], encrypted: &[u8], output: &Path) -> Result<u64> {
    let mut last_err = None;
    for decrypter in decrypters {
        match psync_sync::fetch::decrypt_to_file(decrypter, encrypted, output) {
            Ok(n) => return Ok(n),
            Err(e) if matches!(e.downcast_ref::<CryptError>(), Some(CryptError::MacMismatch)) => {
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| anyhow::anyhow!("no decrypter"))
        .context("no configured password authenticates this file"))
}

// ── `psync check` ─────────────────────────────────────────────────────────────

async fn cmd_check(config: &PsyncConfig) -> Result<()> {
    let operators = build_operators_from_env(config)?;
    psync_storage::check_health(&operators.live).await?;
    println!(
        "storage: ok (bucket {}, region {})",
        config.storage.bucket, config.storage.region
    );
    Ok(())
}

// ── `psync config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &PsyncConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
