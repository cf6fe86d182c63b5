//! qmd: QuickMD manifest integrity CLI
//!
//! Commands:
//!   create <files>... -o <artifact>   - fingerprint files and save a (sealed) manifest
//!   check <artifact>                  - re-check files on disk against a manifest
//!   edit <artifact>                   - mutate a manifest and re-save it under fresh keys
//!   unpack <artifact>                 - export `path:fingerprint` lines to <artifact>.qmdu
//!   config show                       - display current configuration

mod capture;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use qmd_core::config::QmdConfig;
use qmd_core::{Protection, Status};
use qmd_crypto::{DecryptKey, KeyPair, VerifyKey};
use qmd_manifest::{is_protected, read_artifact, Credential, KeyRegistry, Manifest, Session};

use crate::capture::PathDisplay;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "qmd",
    version,
    about = "QuickMD manifest integrity tool",
    long_about = "qmd: build sealed path → MD5 manifests and check files on disk against them"
)]
struct Cli {
    /// Path to qmd.toml configuration file
    #[arg(long, short = 'c', env = "QMD_CONFIG", default_value = "~/.config/qmd/config.toml")]
    config: PathBuf,

    /// Key registry file (overrides config; default: keys.json beside the artifact)
    #[arg(long, env = "QMD_REGISTRY", global = true)]
    registry: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error; overrides config)
    #[arg(long, env = "QMD_LOG", global = true)]
    log: Option<String>,

    /// Log format (overrides config)
    #[arg(long, env = "QMD_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

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
    /// Fingerprint files and save a new manifest
    ///
    /// Encrypted manifests print a verify key and a decrypt key once.
    Create {
        /// Files to include
        files: Vec<String>,
        /// Capture every file under this folder as well
        #[arg(long)]
        folder: Option<PathBuf>,
        /// How folder paths are recorded
        #[arg(long, value_enum, default_value = "absolute", requires = "folder")]
        display: PathDisplay,
        /// Artifact to write (.qmd)
        #[arg(long, short = 'o')]
        out: PathBuf,
        /// Write plain JSON instead of a sealed envelope
        #[arg(long)]
        plain: bool,
    },

    /// Check files on disk against a manifest
    ///
    /// Protected manifests need the verify key; it is prompted for if not given.
    Check {
        artifact: PathBuf,
        #[arg(long, env = "QMD_VERIFY_KEY", hide_env_values = true)]
        verify_key: Option<String>,
    },

    /// Edit a manifest and save it under fresh keys
    ///
    /// Protected manifests need the decrypt key; it is prompted for if not given.
    Edit {
        artifact: PathBuf,
        #[arg(long, env = "QMD_DECRYPT_KEY", hide_env_values = true)]
        decrypt_key: Option<String>,
        /// Add a file (no-op if already listed)
        #[arg(long, value_name = "FILE")]
        add: Vec<String>,
        /// Remove an entry
        #[arg(long, value_name = "PATH")]
        remove: Vec<String>,
        /// Rename an entry, keeping its fingerprint
        #[arg(long, value_name = "OLD=NEW", value_parser = parse_rename)]
        rename: Vec<(String, String)>,
        /// Recompute fingerprints of entries present on disk
        #[arg(long)]
        refresh: bool,
        /// Write to a different artifact (default: overwrite the input)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        /// Write plain JSON instead of a sealed envelope
        #[arg(long)]
        plain: bool,
    },

    /// Export `path:fingerprint` lines to <artifact>.qmdu
    Unpack {
        artifact: PathBuf,
        #[arg(long, env = "QMD_DECRYPT_KEY", hide_env_values = true)]
        decrypt_key: Option<String>,
    },

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

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path)?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "qmd starting"
    );

    let ctx = Ctx {
        config: &config,
        registry_override: cli.registry.as_deref(),
    };

    match cli.command {
        Commands::Create { files, folder, display, out, plain } => {
            cmd_create(&ctx, &files, folder.as_deref(), display, &out, plain).map(|_| ())
        }
        Commands::Check { artifact, verify_key } => {
            cmd_check(&ctx, &artifact, verify_key.map(SecretString::from))
        }
        Commands::Edit { artifact, decrypt_key, add, remove, rename, refresh, out, plain } => {
            let edits = Edits { add, remove, rename, refresh };
            let decrypt_key = decrypt_key.map(SecretString::from);
            cmd_edit(&ctx, &artifact, decrypt_key, &edits, out.as_deref(), plain).map(|_| ())
        }
        Commands::Unpack { artifact, decrypt_key } => {
            cmd_unpack(&ctx, &artifact, decrypt_key.map(SecretString::from)).map(|_| ())
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<QmdConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(QmdConfig::default())
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
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

/// Settings shared by every command.
struct Ctx<'a> {
    config: &'a QmdConfig,
    registry_override: Option<&'a Path>,
}

impl Ctx<'_> {
    /// Resolve the registry: CLI flag > config > `keys.json` beside the artifact
    fn registry_for(&self, artifact: &Path) -> KeyRegistry {
        match self.registry_override {
            Some(p) => KeyRegistry::new(expand_tilde(p)),
            None => KeyRegistry::new(expand_tilde(&self.config.registry.path_for(artifact))),
        }
    }

    fn protection(&self, plain: bool) -> Protection {
        if plain {
            Protection::Plain
        } else {
            self.config.manifest.protection
        }
    }

    fn session(&self) -> Session {
        Session::new().with_settings(
            Manifest::new().with_read_buffer(self.config.manifest.read_buffer_bytes()),
        )
    }
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_callback(pb: &ProgressBar) -> qmd_manifest::ProgressFn {
    let pb = pb.clone();
    Box::new(move |done, total, msg: &str| {
        pb.set_length(total);
        pb.set_position(done);
        pb.set_message(msg.to_string());
    })
}

// ── Credentials ───────────────────────────────────────────────────────────────

fn prompt_secret(prompt: &str) -> Result<SecretString> {
    let entered = rpassword::prompt_password(prompt).context("reading key from terminal")?;
    Ok(SecretString::from(entered))
}

/// Returns `None` for plain artifacts, which need no key.
fn verify_key_for(artifact_bytes: &[u8], given: Option<SecretString>) -> Result<Option<VerifyKey>> {
    if !is_protected(artifact_bytes) {
        return Ok(None);
    }
    let secret = match given {
        Some(s) => s,
        None => prompt_secret("Verify key: ")?,
    };
    let key = VerifyKey::from_base64(secret.expose_secret()).context("invalid verify key")?;
    Ok(Some(key))
}

fn decrypt_key_for(artifact_bytes: &[u8], given: Option<SecretString>) -> Result<Option<DecryptKey>> {
    if !is_protected(artifact_bytes) {
        return Ok(None);
    }
    let secret = match given {
        Some(s) => s,
        None => prompt_secret("Decrypt key: ")?,
    };
    let key = DecryptKey::from_base64(secret.expose_secret()).context("invalid decrypt key")?;
    Ok(Some(key))
}

/// Summary printed after a save; the only place keys are ever shown.
fn key_banner(artifact: &Path, entries: usize, keys: Option<&KeyPair>) -> String {
    match keys {
        Some(keys) => format!(
            "Saved {} ({} entries, encrypted)\n  \
             verify key:  {}\n  \
             decrypt key: {}\n\n\
             These keys are shown once. The verify key allows checking only;\n\
             the decrypt key allows editing. Any earlier keys for this name are void.",
            artifact.display(),
            entries,
            keys.verify.to_base64(),
            keys.decrypt.to_base64()
        ),
        None => format!("Saved {} ({} entries, plain)", artifact.display(), entries),
    }
}

// ── `qmd create` ──────────────────────────────────────────────────────────────

fn cmd_create(
    ctx: &Ctx<'_>,
    files: &[String],
    folder: Option<&Path>,
    display: PathDisplay,
    out: &Path,
    plain: bool,
) -> Result<Option<KeyPair>> {
    if files.is_empty() && folder.is_none() {
        anyhow::bail!("nothing to add: pass files and/or --folder");
    }

    let read_buffer = ctx.config.manifest.read_buffer_bytes();
    let mut session = ctx.session();

    let pb = make_progress_bar(files.len() as u64, "hash");
    let progress = progress_callback(&pb);

    let mut manifest = match folder {
        Some(dir) => capture::capture_folder(dir, display, read_buffer, Some(&progress))?,
        None => Manifest::new().with_read_buffer(read_buffer),
    };
    manifest
        .extend_from_paths(files, Some(&progress))
        .context("fingerprinting files")?;
    pb.finish_and_clear();

    session.create_from(manifest);
    let entries = session.manifest().len();

    let registry = ctx.registry_for(out);
    let keys = session
        .save(out, ctx.protection(plain), &registry)
        .with_context(|| format!("saving {}", out.display()))?;

    println!("{}", key_banner(out, entries, keys.as_ref()));
    Ok(keys)
}

// ── `qmd check` ───────────────────────────────────────────────────────────────

fn cmd_check(ctx: &Ctx<'_>, artifact: &Path, verify_key: Option<SecretString>) -> Result<()> {
    let bytes = read_artifact(artifact)?;
    let key = verify_key_for(&bytes, verify_key)?;
    let registry = ctx.registry_for(artifact);

    let mut session = ctx.session();
    let report = session
        .check_bytes(artifact, &bytes, key.as_ref(), &registry)
        .with_context(|| format!("checking {}", artifact.display()))?;

    for (path, status) in &report.entries {
        println!("{:<8} {}", status.to_string(), path);
    }
    println!();
    println!(
        "{} ok, {} failed, {} missing ({} total)",
        report.count(Status::Match),
        report.count(Status::Mismatch),
        report.count(Status::Missing),
        report.len()
    );

    if !report.all_match() {
        anyhow::bail!(
            "{} of {} entries did not match",
            report.len() - report.count(Status::Match),
            report.len()
        );
    }
    Ok(())
}

// ── `qmd edit` ────────────────────────────────────────────────────────────────

struct Edits {
    add: Vec<String>,
    remove: Vec<String>,
    rename: Vec<(String, String)>,
    refresh: bool,
}

fn cmd_edit(
    ctx: &Ctx<'_>,
    artifact: &Path,
    decrypt_key: Option<SecretString>,
    edits: &Edits,
    out: Option<&Path>,
    plain: bool,
) -> Result<Option<KeyPair>> {
    let bytes = read_artifact(artifact)?;
    let key = decrypt_key_for(&bytes, decrypt_key)?;
    let source_registry = ctx.registry_for(artifact);

    let mut session = ctx.session();
    session
        .edit_bytes(artifact, &bytes, key.as_ref(), &source_registry)
        .with_context(|| format!("opening {}", artifact.display()))?;

    for path in &edits.add {
        if !session.add(path).with_context(|| format!("adding {path}"))? {
            println!("already listed: {path}");
        }
    }
    for path in &edits.remove {
        if session.remove(path)?.is_none() {
            println!("not listed: {path}");
        }
    }
    for (old, new) in &edits.rename {
        if !session.rename(old, new)? {
            println!("not listed: {old}");
        }
    }
    if edits.refresh {
        let n = session.refresh_all().context("refreshing fingerprints")?;
        println!("refreshed {n} fingerprint(s)");
    }

    let dest = out.unwrap_or(artifact);
    let entries = session.manifest().len();
    let registry = ctx.registry_for(dest);
    let keys = session
        .save(dest, ctx.protection(plain), &registry)
        .with_context(|| format!("saving {}", dest.display()))?;

    println!("{}", key_banner(dest, entries, keys.as_ref()));
    Ok(keys)
}

fn parse_rename(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((old, new)) if !old.is_empty() && !new.is_empty() => {
            Ok((old.to_string(), new.to_string()))
        }
        _ => Err(format!("expected OLD=NEW, got '{s}'")),
    }
}

// ── `qmd unpack` ──────────────────────────────────────────────────────────────

fn cmd_unpack(
    ctx: &Ctx<'_>,
    artifact: &Path,
    decrypt_key: Option<SecretString>,
) -> Result<PathBuf> {
    let bytes = read_artifact(artifact)?;
    let key = decrypt_key_for(&bytes, decrypt_key)?;
    let credential = key.as_ref().map_or(Credential::None, Credential::Decrypt);
    let registry = ctx.registry_for(artifact);

    let out = qmd_manifest::unpack::unpack_bytes(artifact, &bytes, credential, &registry)
        .with_context(|| format!("unpacking {}", artifact.display()))?;
    println!("Unpacked fingerprints to {}", out.display());
    Ok(out)
}

// ── `qmd config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &QmdConfig, config_path: &Path) -> Result<()> {
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
