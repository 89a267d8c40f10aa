//! Binary entrypoint for the fierycms CLI.
//!
//! Commands:
//! - `start [--bind <addr>]` - run the API server
//! - `bridge [--dry-run]` - forward game events from Redis to Discord
//! - `init` - create a starter `config.toml` and the data directory
//! - `status` - print store counts
//!
//! See the library crate docs for module-level details: `fierycms::`.
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use fierycms::api::{Api, ApiOptions};
use fierycms::bridge;
use fierycms::bridge::discord::{DiscordNotifier, RecordingNotifier};
use fierycms::cms::{CmsStore, CmsStoreBuilder};
use fierycms::config::Config;

#[derive(Parser)]
#[command(name = "fierycms")]
#[command(about = "World content management and Discord bridge for FieryMUD")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Start {
        /// Listen address, overriding server.bind
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Forward game events from Redis to Discord
    Bridge {
        /// Log messages instead of posting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a default configuration file
    Init,
    /// Show store counts
    Status,
}

fn open_store(config: &Config) -> Result<CmsStore> {
    let path = std::path::Path::new(&config.storage.data_dir).join("cms");
    let mut builder = CmsStoreBuilder::new(path);
    if let Some(admin) = &config.storage.bootstrap_admin {
        builder = builder.with_bootstrap_admin(admin.clone());
    }
    Ok(builder.open()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start { bind } => {
            let mut config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            if let Some(bind) = bind {
                config.server.bind = bind;
                config.validate()?;
            }
            info!("Starting fierycms v{}", env!("CARGO_PKG_VERSION"));
            let store = open_store(&config)?;
            let options = ApiOptions {
                playground: config.api.playground,
                debug: config.api.debug,
            };
            if options.playground {
                warn!("Operation listing enabled (GRAPHQL_PLAYGROUND)");
            }
            let api = Arc::new(Api::new(Arc::new(store), options));
            fierycms::api::server::run(api, config.bind_addr()?, config.server.max_line_bytes).await?;
        }
        Commands::Bridge { dry_run } => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting Discord bridge against {}", config.redis.url);
            let result = if dry_run {
                let notifier = RecordingNotifier::new();
                tokio::select! {
                    r = bridge::run(&config, &notifier) => r,
                    _ = tokio::signal::ctrl_c() => Ok(()),
                }
            } else {
                let notifier = DiscordNotifier::new(&config.discord)?;
                tokio::select! {
                    r = bridge::run(&config, &notifier) => r,
                    _ = tokio::signal::ctrl_c() => Ok(()),
                }
            };
            let snap = fierycms::metrics::snapshot();
            info!(
                "Bridge totals: forwarded={} dropped={} duplicates={} reconnects={}",
                snap.bridge_forwarded, snap.bridge_dropped, snap.bridge_duplicates, snap.bridge_reconnects
            );
            result?;
        }
        Commands::Init => {
            info!("Initializing new fierycms configuration");
            Config::create_default(&cli.config).await?;
            let config = Config::default();
            tokio::fs::create_dir_all(&config.storage.data_dir).await?;
            let store = open_store(&config)?;
            store.flush()?;
            info!(
                "Configuration file created at {}; store initialized in {}",
                cli.config, config.storage.data_dir
            );
        }
        Commands::Status => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let store = open_store(&config)?;
            let counts = store.counts();
            println!("fierycms v{}", env!("CARGO_PKG_VERSION"));
            println!("data dir: {}", config.storage.data_dir);
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let file = config.as_ref().and_then(|c| c.logging.file.clone());
    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());
    let opened = file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    if let Some(f) = opened {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Console echo only in the foreground.
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if record.target() == "security" {
                if let Some(ref sec_path) = security_path {
                    if let Ok(mut sf) = std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(sec_path)
                    {
                        let _ = writeln!(sf, "{}", line);
                    }
                }
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
