//! attest - verify Sigstore attestations attached to a container image
//!
//! Prints the first verified statement to stdout. Logs go to stderr.

use attest::{Error, Pipeline, VerificationOptions, VerificationReport, GITHUB_ACTIONS_ISSUER};
use attest_registry::{OciRegistry, RegistryAuth, RegistryConfig, DEFAULT_REFERRER_LIMIT};
use attest_trust_root::{StaticTrustRoot, TrustRootProvider, TufConfig, TufTrustRoot};
use attest_verify::VerifierOptions;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Verify Sigstore attestations attached to a container image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Image reference, by tag or digest
    #[arg(long)]
    image: String,

    /// Predicate type the attestation must carry; empty accepts any
    #[arg(long, default_value = "")]
    predicate_type: String,

    /// Refuse images with more referrers than this
    #[arg(long, default_value_t = DEFAULT_REFERRER_LIMIT)]
    limit: usize,

    /// OIDC issuer expected in the signing certificate
    #[arg(long, default_value = GITHUB_ACTIONS_ISSUER)]
    issuer: String,

    /// Expected certificate identity; a value containing `*` is a pattern
    #[arg(long)]
    subject: String,

    /// Trusted root file, used instead of TUF
    #[arg(long, conflicts_with_all = ["tuf_url", "tuf_root"])]
    trusted_root: Option<PathBuf>,

    /// TUF repository to fetch the trusted root from
    #[arg(long, requires = "tuf_root")]
    tuf_url: Option<String>,

    /// Bootstrap root.json for --tuf-url
    #[arg(long, requires = "tuf_url")]
    tuf_root: Option<PathBuf>,

    /// Directory for cached TUF metadata
    #[arg(long)]
    tuf_cache_dir: Option<PathBuf>,

    /// Registry (host[:port]) reached over plain HTTP; may be repeated
    #[arg(long)]
    insecure_registry: Vec<String>,

    /// Minimum number of verified RFC 3161 timestamps
    #[arg(long, default_value_t = 1)]
    signed_timestamps: usize,

    /// Minimum number of verified transparency log entries
    #[arg(long, default_value_t = 0)]
    tlog_entries: usize,

    /// Minimum number of verified times from either source
    #[arg(long, default_value_t = 0)]
    observer_timestamps: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    output: OutputFormat,

    #[arg(long, env = "REGISTRY_USERNAME", hide_env_values = true)]
    registry_username: Option<String>,

    #[arg(long, env = "REGISTRY_PASSWORD", hide_env_values = true)]
    registry_password: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Indented statement
    Pretty,
    /// Every verified statement, one JSON document per line
    Json,
}

fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

impl Cli {
    fn registry_config(&self) -> RegistryConfig {
        let mut config = RegistryConfig::default();
        if let (Some(username), Some(password)) = (&self.registry_username, &self.registry_password) {
            config = config.with_auth(RegistryAuth::Basic(username.clone(), password.clone()));
        }
        for registry in &self.insecure_registry {
            config = config.with_insecure_registry(registry);
        }
        config
    }

    fn verification_options(&self) -> VerificationOptions {
        VerificationOptions::new(&self.subject)
            .with_predicate_type(&self.predicate_type)
            .with_limit(self.limit)
            .with_issuer(&self.issuer)
            .with_verifier_options(
                VerifierOptions::default()
                    .with_signed_timestamps(self.signed_timestamps)
                    .with_transparency_log_entries(self.tlog_entries)
                    .with_observer_timestamps(self.observer_timestamps),
            )
    }

    fn tuf_config(&self) -> attest::Result<TufConfig> {
        let mut config = match (&self.tuf_url, &self.tuf_root) {
            (Some(url), Some(root)) => {
                let root = std::fs::read(root).map_err(|e| {
                    attest_trust_root::Error::Io(format!("{}: {}", root.display(), e))
                })?;
                TufConfig::custom(url, root)
            }
            _ => TufConfig::github(),
        };
        if let Some(dir) = &self.tuf_cache_dir {
            config = config.with_cache_dir(dir.clone());
        }
        Ok(config)
    }
}

async fn verify_with<T: TrustRootProvider>(
    cli: &Cli,
    trust_root: T,
) -> attest::Result<VerificationReport> {
    let registry = OciRegistry::new(cli.registry_config())?;
    Pipeline::new(registry, trust_root, cli.verification_options())
        .run(&cli.image)
        .await
}

async fn run(cli: &Cli) -> attest::Result<VerificationReport> {
    match &cli.trusted_root {
        Some(path) => verify_with(cli, StaticTrustRoot::from_file(path)).await,
        None => verify_with(cli, TufTrustRoot::new(cli.tuf_config()?)).await,
    }
}

fn render(report: &VerificationReport, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Pretty => match report.first_verified() {
            Some(verified) => serde_json::to_string_pretty(&verified.statement),
            None => Ok(String::new()),
        },
        OutputFormat::Json => {
            let lines = report
                .verified()
                .map(serde_json::to_string)
                .collect::<serde_json::Result<Vec<_>>>()?;
            Ok(lines.join("\n"))
        }
    }
}

fn exit_with(err: &Error) -> ! {
    eprintln!("Error: {}", err);
    process::exit(err.exit_code());
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let report = match run(&cli).await {
        Ok(report) => report,
        Err(e) => exit_with(&e),
    };
    tracing::info!(
        verified = report.results.len() - report.failed(),
        rejected = report.failed(),
        "verification finished"
    );

    match render(&report, cli.output) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error: failed to render statement: {}", e);
            process::exit(1);
        }
    }
}
