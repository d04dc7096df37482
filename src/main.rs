//! localca CLI.
//!
//! Provisions, checks, or lazily ensures the certificate material for a local
//! mutual-TLS video streaming server.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use localca::config::{PASSPHRASE_ENV, ProvisionConfig};
use localca::error::Result;
use localca::key::KeyAlgorithm;
use localca::workflow::{self, EnsureOutcome};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "localca")]
#[command(about = "Local CA, server certificate and client archive for mTLS streaming", long_about = None)]
struct Cli {
    /// Log debug detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the CA, server certificate and client archive from scratch
    Provision {
        #[command(flatten)]
        options: Options,

        /// Remove existing managed files first
        #[arg(long)]
        force: bool,
    },

    /// Provision only if nothing exists yet, otherwise verify what exists
    Ensure {
        #[command(flatten)]
        options: Options,
    },

    /// Verify an already provisioned directory
    Check {
        #[command(flatten)]
        options: Options,
    },
}

#[derive(Args)]
struct Options {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Key directory
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Server hostname, used as common name and subject alternative name
    #[arg(long)]
    hostname: Option<String>,

    /// Extra subject alternative name for the server (repeatable)
    #[arg(long = "san")]
    sans: Vec<String>,

    /// Client archive passphrase
    #[arg(long, env = PASSPHRASE_ENV, hide_env_values = true)]
    passphrase: Option<String>,

    /// Certificate validity in days
    #[arg(long)]
    days: Option<u32>,

    /// RSA key size
    #[arg(long, conflicts_with = "ecdsa")]
    key_bits: Option<usize>,

    /// Use ECDSA P-256 keys instead of RSA
    #[arg(long)]
    ecdsa: bool,
}

impl Options {
    fn into_config(self) -> Result<ProvisionConfig> {
        let mut config = match &self.config {
            Some(path) => ProvisionConfig::from_json_file(path)?,
            None => ProvisionConfig::default(),
        };

        if let Some(dir) = self.dir {
            config.key_dir = dir;
        }
        if let Some(hostname) = self.hostname {
            config.hostname = hostname;
        }
        config.extra_subject_alt_names.extend(self.sans);
        if self.passphrase.is_some() {
            config.passphrase = self.passphrase;
        }
        if let Some(days) = self.days {
            config.validity_days = days;
        }
        if let Some(bits) = self.key_bits {
            config.key_algorithm = KeyAlgorithm::Rsa { bits };
        }
        if self.ecdsa {
            config.key_algorithm = KeyAlgorithm::EcdsaP256;
        }
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "localca=debug" } else { "localca=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Provision { options, force } => {
            let report = workflow::provision(&options.into_config()?, force)?;
            println!("Provisioned {}", report.key_dir.display());
            for (identity, serial) in &report.serials {
                println!("  {identity} serial {serial}");
            }
            for path in &report.persisted {
                println!("  kept    {}", path.display());
            }
            for artifact in &report.removed {
                println!("  removed {artifact}");
            }
        }
        Commands::Ensure { options } => match workflow::ensure(&options.into_config()?)? {
            EnsureOutcome::AlreadyProvisioned(report) => {
                println!(
                    "{} already provisioned, valid until {}",
                    report.key_dir.display(),
                    report.expires
                );
            }
            EnsureOutcome::Provisioned(report) => {
                println!("Provisioned {}", report.key_dir.display());
            }
        },
        Commands::Check { options } => {
            let report = workflow::check(&options.into_config()?)?;
            println!("{} verifies", report.key_dir.display());
            println!("  root   {}", report.root_subject.common_name);
            println!("  server {}", report.server_subject.common_name);
            println!("  client {}", report.client_subject.common_name);
            println!("  valid until {}", report.expires);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
