//! Directory server identity tooling.
//!
//! Generates and derives entry unique ids, and checks root identity
//! credentials against the configured root DN.

mod config;

use crate::config::AppConfig;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dirsrv_bind::{BindResolver, PlaintextComparator, RootDnConfig, SuffixRouter};
use dirsrv_types::Dn;
use dirsrv_uniqueid::{MemoryEntryStore, StateLocation, UniqueId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "dirsrv-tool")]
#[command(about = "Directory server identity tooling", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./dirsrv.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter, overrides the configured value
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Entry unique id operations
    Uniqueid {
        #[command(subcommand)]
        action: UniqueIdCommands,
    },
    /// Check a password against the configured root identity
    VerifyRoot {
        /// Bind DN
        #[arg(long)]
        dn: String,
        /// Password to check
        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum UniqueIdCommands {
    /// Generate time-based ids
    Generate {
        /// Number of ids to print
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// State directory, overrides the configured location
        #[arg(long)]
        state_dir: Option<String>,
        /// Run the generator in single-threaded mode
        #[arg(long)]
        single_threaded: bool,
    },
    /// Derive a name-based id
    Derive {
        /// Name to derive from
        #[arg(long)]
        name: String,
        /// Base id in nsUniqueId form (defaults to the nil id)
        #[arg(long)]
        base: Option<String>,
    },
    /// Validate an id and print its raw bytes
    Parse {
        /// Id in nsUniqueId form
        id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(&config)?;

    match cli.command {
        Commands::Uniqueid { action } => handle_uniqueid_command(action, config),
        Commands::VerifyRoot { dn, password } => handle_verify_root(&config, &dn, &password),
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Logs go to stderr so command output stays pipeable.
    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("failed to install log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("failed to install log subscriber")?;
    }

    Ok(())
}

fn handle_uniqueid_command(cmd: UniqueIdCommands, mut config: AppConfig) -> Result<()> {
    let generator = dirsrv_uniqueid::global();

    match cmd {
        UniqueIdCommands::Generate {
            count,
            state_dir,
            single_threaded,
        } => {
            if let Some(dir) = state_dir {
                config.uniqueid_state_dir = Some(dir);
                config.uniqueid_state_entry = None;
            }
            if single_threaded {
                config.uniqueid_multi_threaded = false;
            }

            let location = config.state_location()?;
            if let StateLocation::Entry(dn) = &location {
                warn!("state entry {dn} is held in memory and will not outlive this process");
                generator.set_entry_store(Arc::new(MemoryEntryStore::new()));
            }
            generator
                .initialize(location, config.thread_mode())
                .context("failed to initialize the unique id generator")?;

            let result = (0..count).try_for_each(|_| {
                let id = generator.generate_formatted()?;
                println!("{id}");
                Ok::<_, dirsrv_uniqueid::UniqueIdError>(())
            });
            generator.cleanup();
            result.context("failed to generate unique id")?;
            info!("generated {count} unique id(s)");
        }
        UniqueIdCommands::Derive { name, base } => {
            let id = generator
                .derive_from_name_formatted(base.as_deref(), name.as_bytes())
                .context("failed to derive unique id")?;
            println!("{id}");
        }
        UniqueIdCommands::Parse { id } => {
            let parsed = UniqueId::parse(&id).with_context(|| format!("invalid unique id `{id}`"))?;
            println!("id:      {parsed}");
            println!("bytes:   {}", hex::encode(parsed.as_bytes()));
            println!("version: {}", parsed.version());
        }
    }

    Ok(())
}

fn handle_verify_root(config: &AppConfig, dn: &str, password: &str) -> Result<()> {
    let target = Dn::parse(dn).with_context(|| format!("invalid bind DN `{dn}`"))?;
    if config.root_pw.is_none() {
        warn!("no root_pw configured; root binds cannot succeed");
    }

    let resolver = BindResolver::new(
        Arc::new(SuffixRouter::new()),
        Arc::new(PlaintextComparator),
        Arc::new(RootDnConfig {
            root_dn: config.root_dn.clone(),
            root_pw: config.root_pw.clone(),
        }),
    );

    let outcome = resolver.verify_root_identity(&target, password.as_bytes());
    println!("{outcome} (LDAP result code {})", outcome.ldap_result_code());
    if !outcome.is_success() {
        bail!("root identity check failed for {target}");
    }
    Ok(())
}
