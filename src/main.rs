mod keys;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use jade_core::config::{Config, DEFAULT_CONFIG_PATH};
use jade_core::{
    FileReport, HistorySource, NoHistory, ValidationResult, Verdict, Verifier, VerifyContext,
    collect_inputs, load_history, verify_batch,
};
use jade_trust::{CertificateRequest, issue_certificate};

/// Static safety gate for declarative agent skill descriptors.
#[derive(Parser)]
#[command(name = "jadegate", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to `JADE_CONFIG`, then config/default.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Rule table file replacing the built-in rules.
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Trust anchor file (TOML or JSON).
    #[arg(long, global = true)]
    anchors: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify descriptor files or directories of them.
    Verify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Treat a `Warning` verdict as failure.
        #[arg(long)]
        strict: bool,

        /// Require a valid signature from a trusted signer.
        #[arg(long)]
        check_signature: bool,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// JSON map of skill id to `{successes, failures}`.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Files verified concurrently.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print the validated execution graph of one descriptor as JSON.
    Graph { path: PathBuf },
    /// Show the active rule table version and sizes.
    Rules,
    /// Generate an Ed25519 key pair.
    Keygen {
        /// Role embedded in the key text: `root`, `org-<id>` or `community`.
        #[arg(long, default_value = "root")]
        role: String,

        /// Secret key file; the public key is written to `<out>.pub`.
        #[arg(long)]
        out: PathBuf,

        /// Replace existing key files.
        #[arg(long)]
        force: bool,
    },
    /// Sign descriptor files (or directories of them) in place.
    Sign {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Secret key file; defaults to the `JADE_SIGNING_KEY` variable.
        #[arg(long)]
        key: Option<PathBuf>,

        /// How verifiers find the key: `root`, `org:<id>` or `community:<id>`.
        #[arg(long, default_value = "root")]
        key_ref: String,

        #[arg(long, default_value = "jadegate-root")]
        signer_id: String,

        /// Comma-separated skill id patterns the signature vouches for.
        #[arg(long, default_value = "*")]
        scope: String,

        /// RFC 3339 expiry of the signature.
        #[arg(long)]
        expires_at: Option<DateTime<Utc>>,

        /// Also write the signature to `<name>.sig.json`.
        #[arg(long)]
        detached: bool,
    },
    /// Certify an org public key with the root key and print the anchor entry.
    IssueOrgCert {
        /// Root secret key file.
        #[arg(long)]
        root_key: PathBuf,

        #[arg(long)]
        org_id: String,

        /// Org public key, inline or as a file holding it.
        #[arg(long)]
        org_public_key: String,

        #[arg(long, default_value = "*")]
        scope: String,

        #[arg(long)]
        expires_at: DateTime<Utc>,

        #[arg(long)]
        not_before: Option<DateTime<Utc>>,

        /// `text` prints a TOML `[[orgs]]` block.
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn resolve_config_path(cli: &Cli) -> PathBuf {
    if let Some(path) = &cli.config {
        return path.clone();
    }
    if let Ok(path) = std::env::var("JADE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let path = resolve_config_path(cli);
    let mut config = Config::load(&path)?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    if let Some(rules) = &cli.rules {
        config.paths.rules = Some(rules.clone());
    }
    if let Some(anchors) = &cli.anchors {
        config.paths.anchors = Some(anchors.clone());
    }
    Ok(config)
}

fn passes(result: &ValidationResult, strict: bool) -> bool {
    match result.verdict {
        Verdict::Verified => true,
        Verdict::Warning => !strict,
        Verdict::Locked | Verdict::Rejected => false,
    }
}

fn render_text(reports: &[FileReport], strict: bool) -> String {
    let mut out = String::new();
    for report in reports {
        let result = &report.result;
        let status = if passes(result, strict) { "PASS" } else { "FAIL" };
        let _ = writeln!(
            out,
            "{status} {} {} confidence={:.3} layers={}/{} trust={:?}",
            report.path.display(),
            result.verdict,
            result.confidence,
            result.layers_passed,
            result.total_layers,
            result.trust_level,
        );
        for issue in &result.issues {
            let _ = writeln!(out, "  {issue}");
        }
    }
    out
}

async fn run_verify(
    config: Config,
    paths: &[PathBuf],
    strict: bool,
    format: Format,
    history: Option<&Path>,
) -> anyhow::Result<bool> {
    let inputs = collect_inputs(paths);
    if inputs.is_empty() {
        bail!("no descriptor files found");
    }
    let history: Arc<dyn HistorySource> = match history.or(config.paths.history.as_deref()) {
        Some(path) => Arc::new(load_history(path).context("failed to load execution history")?),
        None => Arc::new(NoHistory),
    };
    let verifier = Arc::new(Verifier::from_config(&config)?);
    let reports = verify_batch(
        verifier,
        inputs,
        history,
        config.batch.workers,
        chrono::Utc::now(),
    )
    .await;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        Format::Text => print!("{}", render_text(&reports, strict)),
    }
    Ok(reports.iter().all(|r| passes(&r.result, strict)))
}

fn run_graph(config: &Config, path: &Path) -> anyhow::Result<bool> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let verifier = Verifier::from_config(config)?;
    let verification = verifier.verify_str(&text, &VerifyContext::at(chrono::Utc::now()));
    if let Some(dag) = verification.dag {
        println!("{}", serde_json::to_string_pretty(&dag)?);
        return Ok(true);
    }
    for issue in &verification.result.issues {
        eprintln!("{issue}");
    }
    Ok(false)
}

fn run_rules(config: &Config) -> anyhow::Result<()> {
    let verifier = Verifier::from_config(config)?;
    let rules = verifier.rules();
    println!("rules {}", rules.version());
    println!("  actions    {}", rules.actions().len());
    println!("  injection  {}", rules.injection().len());
    println!("  dangerous  {}", rules.dangerous().len());
    println!("  secrets    {}", rules.secrets().len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_subscriber();
    let mut config = load_config(&cli)?;

    let ok = match &cli.command {
        Command::Verify {
            paths,
            strict,
            check_signature,
            format,
            history,
            workers,
        } => {
            if *check_signature {
                config.verifier.strict_mode = true;
            }
            if let Some(workers) = workers {
                config.batch.workers = (*workers).max(1);
            }
            run_verify(config, paths, *strict, *format, history.as_deref()).await?
        }
        Command::Graph { path } => run_graph(&config, path)?,
        Command::Rules => {
            run_rules(&config)?;
            true
        }
        Command::Keygen { role, out, force } => {
            let public = keys::keygen(role, out, *force)?;
            println!("{public}");
            true
        }
        Command::Sign {
            paths,
            key,
            key_ref,
            signer_id,
            scope,
            expires_at,
            detached,
        } => {
            let signing_key = keys::load_signing_key(key.as_deref())?;
            let options = keys::SignOptions {
                signer_id: signer_id.clone(),
                key_ref: key_ref.clone(),
                terms: keys::terms(scope, Utc::now(), *expires_at),
                detached: *detached,
            };
            keys::sign_paths(&signing_key, paths, &options)?
        }
        Command::IssueOrgCert {
            root_key,
            org_id,
            org_public_key,
            scope,
            expires_at,
            not_before,
            format,
        } => {
            let root = keys::load_signing_key(Some(root_key.as_path()))?;
            let cert = issue_certificate(
                &root,
                CertificateRequest {
                    org_id: org_id.clone(),
                    public_key: keys::read_public_key_arg(org_public_key)?,
                    scope: scope.clone(),
                    expires_at: *expires_at,
                    not_before: *not_before,
                },
            )?;
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&cert)?),
                Format::Text => print!("{}", keys::cert_toml(&cert)?),
            }
            true
        }
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
