// src/main.rs

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use repogen::config::{ConfigOptions, DistroVariant};
use repogen::signing::{GpgSigner, RsaSigner};
use repogen::{generate_repositories, CancellationToken, SigningKeys};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "repogen")]
#[command(author, version, about = "Generate APT, yum/dnf, Alpine, pacman and Homebrew repositories from a directory of packages", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory of packages and generate repository trees
    Generate(GenerateArgs),

    /// Print the public key matching a signing key
    ExportKey {
        /// OpenPGP secret key (armored or binary)
        #[arg(long, conflicts_with = "rsa_key", required_unless_present = "rsa_key")]
        gpg_key: Option<PathBuf>,

        /// RSA private key in PEM format
        #[arg(long)]
        rsa_key: Option<PathBuf>,

        /// Passphrase for an encrypted key
        #[arg(long)]
        passphrase: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Directory to scan for packages
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Directory the repositories are written to
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Repository origin (APT Origin, RPM repo id)
    #[arg(long)]
    origin: Option<String>,

    /// Repository label (defaults to the origin)
    #[arg(long)]
    label: Option<String>,

    /// APT codename
    #[arg(long)]
    codename: Option<String>,

    /// APT suite (defaults to the codename)
    #[arg(long)]
    suite: Option<String>,

    /// APT component; repeat or separate with commas
    #[arg(long = "component", value_delimiter = ',')]
    components: Vec<String>,

    /// Only publish these architectures; repeat or separate with commas
    #[arg(long = "arch", value_delimiter = ',')]
    architectures: Vec<String>,

    /// Pacman database name (required for pacman packages)
    #[arg(long)]
    repo_name: Option<String>,

    /// RPM distribution: fedora, centos or rhel
    #[arg(long)]
    distro: Option<String>,

    /// RPM release directory (e.g. 40); inferred from packages when omitted
    #[arg(long = "version")]
    release_version: Option<String>,

    /// Public URL of the output directory (.repo files, Homebrew bottle URLs)
    #[arg(long)]
    base_url: Option<String>,

    /// URL of the public GPG key, written as gpgkey= in .repo files
    #[arg(long)]
    gpg_key_url: Option<String>,

    /// OpenPGP secret key for APT, RPM and pacman signatures
    #[arg(long)]
    gpg_key: Option<PathBuf>,

    /// Passphrase for the OpenPGP key
    #[arg(long)]
    gpg_passphrase: Option<String>,

    /// RSA private key for Alpine index signatures
    #[arg(long)]
    rsa_key: Option<PathBuf>,

    /// Passphrase for the RSA key
    #[arg(long)]
    rsa_passphrase: Option<String>,

    /// Key name used in the Alpine signature file name
    #[arg(long)]
    key_name: Option<String>,

    /// Merge with the repositories already in the output directory
    #[arg(long)]
    incremental: bool,

    /// Abort after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

impl GenerateArgs {
    fn into_options(self) -> repogen::Result<ConfigOptions> {
        let distro = self
            .distro
            .as_deref()
            .map(str::parse::<DistroVariant>)
            .transpose()?;
        Ok(ConfigOptions {
            input_dir: Some(self.input_dir),
            output_dir: Some(self.output_dir),
            origin: self.origin,
            label: self.label,
            codename: self.codename,
            suite: self.suite,
            components: self.components,
            architectures: self.architectures,
            repo_name: self.repo_name,
            distro,
            version: self.release_version,
            base_url: self.base_url,
            gpg_key_url: self.gpg_key_url,
            gpg_key: self.gpg_key,
            gpg_passphrase: self.gpg_passphrase,
            rsa_key: self.rsa_key,
            rsa_passphrase: self.rsa_passphrase,
            rsa_key_name: self.key_name,
            incremental: self.incremental,
        })
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let timeout = args.timeout;
    let config = args.into_options()?.resolve()?;
    let keys = SigningKeys::load(&config).context("Failed to load signing keys")?;

    let cancel = match timeout {
        Some(secs) => CancellationToken::with_timeout(Duration::from_secs(secs)),
        None => CancellationToken::new(),
    };

    info!(
        "Generating repositories from {} into {}",
        config.input_dir.display(),
        config.output_dir.display()
    );
    let report = generate_repositories(&config, &keys, &cancel)?;

    if report.summaries.is_empty() {
        println!("No packages found in {}", config.input_dir.display());
        return Ok(());
    }

    for summary in &report.summaries {
        println!(
            "{:<9} {:>4} packages ({} copied, {} unchanged, {} without local file){}",
            summary.package_type.to_string(),
            summary.packages,
            summary.copied,
            summary.up_to_date,
            summary.missing,
            if summary.signed { ", signed" } else { "" }
        );
    }
    if report.skipped > 0 {
        println!("Skipped {} unparseable file(s)", report.skipped);
    }
    println!("Repositories written to {}", config.output_dir.display());
    Ok(())
}

fn run_export_key(
    gpg_key: Option<PathBuf>,
    rsa_key: Option<PathBuf>,
    passphrase: Option<String>,
) -> Result<()> {
    let public = match (gpg_key, rsa_key) {
        (Some(path), _) => GpgSigner::load(&path, passphrase.as_deref())?.public_key()?,
        (None, Some(path)) => RsaSigner::load(&path, passphrase.as_deref())?.public_key()?,
        (None, None) => anyhow::bail!("either --gpg-key or --rsa-key is required"),
    };

    io::stdout()
        .write_all(&public)
        .context("Failed to write public key")?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Generate(args) => run_generate(args),
        Commands::ExportKey {
            gpg_key,
            rsa_key,
            passphrase,
        } => run_export_key(gpg_key, rsa_key, passphrase),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "repogen", &mut io::stdout());
            Ok(())
        }
    }
}
