//! ddrop: end-to-end encrypted dead drops
//!
//! Commands:
//!   send <files>...     - encrypt, upload and finalize; prints the short code and secret
//!   pickup <code>       - download, verify and decrypt a drop (needs the secret)
//!   resolve <code>      - show the drop behind a short code
//!   burn <drop-id>      - burn a drop immediately
//!   demo <files>...     - send and pick up against an in-process backend
//!   config show         - display the active configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ddrop_core::config::DropConfig;
use ddrop_core::types::{ReceivePhase, SendPhase};
use ddrop_core::BurnSchedule;
use ddrop_crypto::DropSecret;
use ddrop_sync::{
    burn_now, complete_burn, pickup_drop, resolve, send_drop, BurnCountdown, PhaseFn, PickupArgs,
    ProgressFn, ReceiveHooks, ReceiveOptions, SendHooks, SendOptions, SendResult,
};
use ddrop_transfer::{DropBackend, HttpBackend, HttpTransport, ObjectTransport, SimulatedBackend};

const USER_AGENT: &str = concat!("ddrop/", env!("CARGO_PKG_VERSION"));

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "ddrop",
    version,
    about = "End-to-end encrypted, self-destructing file drops",
    long_about = "ddrop: send files as encrypted drops over presigned URLs and pick them up by short code"
)]
struct Cli {
    /// Path to ddrop.toml configuration file
    #[arg(long, short = 'c', env = "DDROP_CONFIG", default_value = "ddrop.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "DDROP_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "DDROP_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt and upload up to five files as one drop
    ///
    /// Prints a short code and a secret. Share them over different channels:
    /// the code finds the drop, the secret decrypts it.
    Send {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Drop lifetime: 60min, 2hrs, 6hrs, 12hrs or 24hrs (default: backend policy)
        #[arg(long)]
        burn: Option<BurnSchedule>,
        /// Burn the drop shortly after its first successful pickup
        #[arg(long)]
        burn_after_read: bool,
        /// Chunk uploads in flight at once (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Do not record a whole-payload digest in the manifest
        #[arg(long)]
        no_digest: bool,
    },

    /// Download, verify and decrypt a drop
    Pickup {
        /// 6-character short code (case-insensitive)
        code: String,
        /// Drop secret printed by `ddrop send`
        #[arg(long, env = "DDROP_SECRET", hide_env_values = true)]
        secret: Option<String>,
        /// Destination directory
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,
        /// Unpack multi-file drops and remove the archive
        #[arg(long)]
        extract: bool,
    },

    /// Show the drop behind a short code
    Resolve { code: String },

    /// Burn a drop now
    Burn {
        drop_id: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Send and pick up in one process against an in-memory backend
    Demo {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, short = 'o', default_value = "ddrop-demo")]
        out: PathBuf,
        #[arg(long)]
        burn_after_read: bool,
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

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, from_file) = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| LogFormat::from_config(&config.log.format));
    init_logging(&level, &format);

    if !from_file {
        warn!("config file not found: {}  (using defaults)", cli.config.display());
    }
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Send {
            files,
            burn,
            burn_after_read,
            concurrency,
            no_digest,
        } => {
            let (backend, transport) = connect(&config)?;
            let mut opts = SendOptions::from_config(&config);
            opts.burn_schedule = burn;
            opts.burn_after_read = burn_after_read;
            opts.payload_digest = !no_digest;
            if let Some(n) = concurrency {
                opts.concurrency = n.max(1);
            }
            let sent = run_send(backend.as_ref(), transport, &files, &opts).await?;
            print_sent(&sent, burn);
            Ok(())
        }
        Commands::Pickup {
            code,
            secret,
            out,
            extract,
        } => {
            let (backend, transport) = connect(&config)?;
            let secret = secret
                .as_deref()
                .map(DropSecret::parse)
                .transpose()
                .context("parsing drop secret")?;
            let mut opts = ReceiveOptions::from_config(&config);
            opts.extract = extract;
            run_pickup(backend, transport.as_ref(), &code, secret.as_ref(), &out, &opts).await
        }
        Commands::Resolve { code } => {
            let (backend, _) = connect(&config)?;
            let resp = resolve(backend.as_ref(), &code)
                .await
                .with_context(|| format!("resolving {code}"))?;
            println!("  code:    {}", resp.short_code);
            println!("  drop id: {}", resp.drop_id);
            println!("  status:  {}", resp.status);
            Ok(())
        }
        Commands::Burn { drop_id, reason } => {
            let (backend, _) = connect(&config)?;
            let resp = burn_now(backend.as_ref(), &drop_id, reason.as_deref())
                .await
                .with_context(|| format!("burning {drop_id}"))?;
            println!("Drop {} is {}: {}", resp.drop_id, resp.status, resp.message);
            Ok(())
        }
        Commands::Demo {
            files,
            out,
            burn_after_read,
        } => cmd_demo(&config, &files, &out, burn_after_read).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config, from_file),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Parse the config file, or fall back to defaults when it does not exist.
/// Validation runs later, once logging is up.
async fn load_config(path: &Path) -> Result<(DropConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((DropConfig::default(), false))
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the short code and secret; logs go to stderr
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

fn connect(config: &DropConfig) -> Result<(Arc<dyn DropBackend>, Arc<dyn ObjectTransport>)> {
    let backend = HttpBackend::new(&config.backend)
        .with_context(|| format!("connecting to drop API {}", config.backend.api_base_url))?;
    let transport = HttpTransport::new(Duration::from_secs(config.backend.timeout_secs))
        .context("building HTTP transport")?;
    Ok((Arc::new(backend), Arc::new(transport)))
}

// ── Progress display ──────────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-");
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_into(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |done, total, _msg| {
        pb.set_length(total);
        pb.set_position(done);
    })
}

/// Cancels its token on Ctrl-C for as long as it is alive.
struct Interrupt {
    token: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl Interrupt {
    fn listen() -> Self {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.cancel();
            }
        });
        Self { token, task }
    }
}

impl Drop for Interrupt {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ── `ddrop send` ──────────────────────────────────────────────────────────────

async fn run_send(
    backend: &dyn DropBackend,
    transport: Arc<dyn ObjectTransport>,
    files: &[PathBuf],
    opts: &SendOptions,
) -> Result<SendResult> {
    let pb = make_progress_bar(0, "send");
    let pb_phase = pb.clone();
    let on_phase: PhaseFn<SendPhase> = Box::new(move |p| pb_phase.set_message(format!("{p:?}")));
    let progress = progress_into(&pb);
    let interrupt = Interrupt::listen();

    let hooks = SendHooks {
        on_phase: Some(&on_phase),
        progress: Some(&progress),
        cancel: Some(interrupt.token.clone()),
    };
    let result = send_drop(backend, transport, files, opts, &hooks).await;

    match result {
        Ok(sent) => {
            pb.finish_with_message("done");
            Ok(sent)
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            if e.requires_restart() {
                warn!("presigned URLs expired; run `ddrop send` again");
            }
            Err(e).context("sending drop")
        }
    }
}

fn print_sent(sent: &SendResult, burn: Option<BurnSchedule>) {
    let files = sent.manifest.display_files();
    println!();
    println!("Drop ready:");
    println!("  code:    {}", sent.short_code);
    println!("  secret:  {}", sent.secret.expose());
    println!("  drop id: {}", sent.drop_id);
    println!(
        "  files:   {} ({})",
        files.len(),
        fmt_bytes(files.iter().map(|f| f.size).sum())
    );
    println!("  chunks:  {}", sent.manifest.chunks.len());
    match burn {
        Some(b) => println!("  burns:   after {b}"),
        None => println!("  burns:   per backend policy"),
    }
    if sent.manifest.burn_after_read() {
        println!("  burn after read: yes");
    }
    println!();
    println!("Share the code and the secret over different channels.");
}

// ── `ddrop pickup` ────────────────────────────────────────────────────────────

async fn run_pickup(
    backend: Arc<dyn DropBackend>,
    transport: &dyn ObjectTransport,
    code: &str,
    secret: Option<&DropSecret>,
    out: &Path,
    opts: &ReceiveOptions,
) -> Result<()> {
    let pb = make_progress_bar(0, "pickup");
    let pb_phase = pb.clone();
    let on_phase: PhaseFn<ReceivePhase> =
        Box::new(move |p| pb_phase.set_message(format!("{p:?}")));
    let progress = progress_into(&pb);
    let interrupt = Interrupt::listen();

    let hooks = ReceiveHooks {
        on_phase: Some(&on_phase),
        progress: Some(&progress),
        cancel: Some(interrupt.token.clone()),
    };
    let args = PickupArgs {
        code,
        secret,
        dest_dir: out,
        user_agent: Some(USER_AGENT),
    };
    let outcome = match pickup_drop(backend, transport, args, opts, &hooks).await {
        Ok(outcome) => outcome,
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(e).with_context(|| format!("picking up {code}"));
        }
    };
    pb.finish_with_message("done");
    drop(interrupt);

    println!();
    println!("Downloaded:");
    println!("  local:  {}", outcome.download.path.display());
    println!("  bytes:  {}", fmt_bytes(outcome.download.bytes));
    if let Some(files) = &outcome.download.extracted {
        for f in files {
            println!("    {} ({})", f.name, fmt_bytes(f.size));
        }
    }

    if let Some(countdown) = outcome.burn {
        wait_for_burn(countdown, &hooks).await?;
    }
    Ok(())
}

async fn wait_for_burn(countdown: BurnCountdown, hooks: &ReceiveHooks<'_>) -> Result<()> {
    let spinner = make_spinner("burn");
    spinner.set_message(format!(
        "burning drop in {}s (Ctrl-C keeps it until it expires)",
        countdown.delay().as_secs()
    ));
    let interrupt = Interrupt::listen();

    tokio::select! {
        _ = interrupt.token.cancelled() => countdown.cancel(),
        _ = tokio::time::sleep(countdown.delay()) => {}
    }

    let drop_id = countdown.drop_id().to_string();
    match complete_burn(countdown, hooks).await.context("burning drop")? {
        Some(resp) => {
            spinner.finish_with_message(format!("drop {} burned", resp.drop_id));
            info!(drop_id = %resp.drop_id, status = %resp.status, "burn after read");
        }
        None => spinner.finish_with_message(format!("burn cancelled; {drop_id} stays until it expires")),
    }
    Ok(())
}

// ── `ddrop demo` ──────────────────────────────────────────────────────────────

async fn cmd_demo(config: &DropConfig, files: &[PathBuf], out: &Path, burn_after_read: bool) -> Result<()> {
    let sim = Arc::new(SimulatedBackend::new().context("starting in-process backend")?);
    println!("Demo: in-process backend, nothing leaves this machine.");

    let mut send_opts = SendOptions::from_config(config);
    send_opts.burn_after_read = burn_after_read;
    let sent = run_send(&*sim, sim.clone(), files, &send_opts).await?;
    print_sent(&sent, None);

    let mut recv_opts = ReceiveOptions::from_config(config);
    recv_opts.extract = true;
    run_pickup(
        sim.clone(),
        &*sim,
        sent.short_code.as_str(),
        Some(&sent.secret),
        out,
        &recv_opts,
    )
    .await?;

    if let Some(status) = sim.drop_status(&sent.drop_id) {
        println!("  drop status: {status}");
    }
    Ok(())
}

// ── `ddrop config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &DropConfig, config_path: &Path, from_file: bool) -> Result<()> {
    if from_file {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
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
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_parses_burn_schedule() {
        let cli = Cli::try_parse_from(["ddrop", "send", "a.txt", "--burn", "6hrs", "--burn-after-read"])
            .unwrap();
        match cli.command {
            Commands::Send { files, burn, burn_after_read, .. } => {
                assert_eq!(files, [PathBuf::from("a.txt")]);
                assert_eq!(burn, Some(BurnSchedule::Hours6));
                assert!(burn_after_read);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["ddrop", "send", "a.txt", "--burn", "3days"]).is_err());
        assert!(Cli::try_parse_from(["ddrop", "send"]).is_err());
    }

    #[tokio::test]
    async fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, from_file) = load_config(&dir.path().join("nope.toml")).await.unwrap();
        assert!(!from_file);
        assert_eq!(config.limits.max_files, 5);
    }

    #[tokio::test]
    async fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ddrop.toml");
        std::fs::write(&path, "[transfer]\nconcurrency = 3\n[log]\nformat = \"json\"\n").unwrap();
        let (config, from_file) = load_config(&path).await.unwrap();
        assert!(from_file);
        assert_eq!(config.transfer.concurrency, 3);
        assert_eq!(config.transfer.chunk_size, 1024 * 1024);
        assert!(matches!(LogFormat::from_config(&config.log.format), LogFormat::Json));
    }

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2 * 1024 * 1024 + 512 * 1024), "2.5 MB");
    }
}
