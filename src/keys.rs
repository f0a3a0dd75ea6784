//! Key generation, descriptor signing and org certificate issuing.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use jade_core::{Signature, attach_signature, collect_inputs, skill_hash};
use jade_trust::key::{decode_secret_key, encode_public_key, encode_secret_key, generate_key};
use jade_trust::{OrgCertificate, SignatureTerms};
use serde::Serialize;
use serde_json::Value;

/// Environment variable holding a `jade-sk-…` key when `--key` is not given.
pub const SIGNING_KEY_ENV: &str = "JADE_SIGNING_KEY";

const DETACHED_SUFFIX: &str = ".sig.json";

fn write_new(path: &Path, text: &str, secret: bool, force: bool) -> anyhow::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    if secret {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = secret;
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn public_key_path(secret: &Path) -> PathBuf {
    let mut name = secret.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

/// Write a fresh secret key to `out` and its public key to `out.pub`.
///
/// Returns the encoded public key.
pub fn keygen(role: &str, out: &Path, force: bool) -> anyhow::Result<String> {
    if role.is_empty() || role.chars().any(|c| c.is_whitespace()) {
        bail!("key role must be non-empty and contain no whitespace");
    }
    let key = generate_key();
    let public = encode_public_key(role, &key.verifying_key());
    write_new(out, &format!("{}\n", encode_secret_key(role, &key)), true, force)?;
    write_new(&public_key_path(out), &format!("{public}\n"), false, force)?;
    tracing::info!(role, path = %out.display(), "key pair written");
    Ok(public)
}

/// Secret key from `path`, or from [`SIGNING_KEY_ENV`] when no path is given.
pub fn load_signing_key(path: Option<&Path>) -> anyhow::Result<SigningKey> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => std::env::var(SIGNING_KEY_ENV)
            .with_context(|| format!("no --key given and {SIGNING_KEY_ENV} is not set"))?,
    };
    Ok(decode_secret_key(&text)?)
}

#[derive(Debug, Clone)]
pub struct SignOptions {
    pub signer_id: String,
    pub key_ref: String,
    pub terms: SignatureTerms,
    pub detached: bool,
}

fn detached_path(path: &Path) -> PathBuf {
    let name = path.to_string_lossy();
    let stem = name.strip_suffix(".json").unwrap_or(&name);
    PathBuf::from(format!("{stem}{DETACHED_SUFFIX}"))
}

fn sign_file(key: &SigningKey, path: &Path, options: &SignOptions) -> anyhow::Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let hash = skill_hash(&value);
    let signature = Signature::create(
        key,
        options.signer_id.as_str(),
        options.key_ref.as_str(),
        &hash,
        &options.terms,
    )?;
    attach_signature(&mut value, &signature)?;
    std::fs::write(path, format!("{}\n", serde_json::to_string_pretty(&value)?))
        .with_context(|| format!("failed to write {}", path.display()))?;
    if options.detached {
        let sig_path = detached_path(path);
        let body = serde_json::to_string_pretty(&signature)?;
        std::fs::write(&sig_path, format!("{body}\n"))
            .with_context(|| format!("failed to write {}", sig_path.display()))?;
    }
    Ok(hash)
}

/// Sign every descriptor under `paths` in place.
///
/// Files that fail are reported and skipped; returns whether all succeeded.
pub fn sign_paths(
    key: &SigningKey,
    paths: &[PathBuf],
    options: &SignOptions,
) -> anyhow::Result<bool> {
    let inputs = collect_inputs(paths);
    if inputs.is_empty() {
        bail!("no descriptor files found");
    }
    let mut failed = 0usize;
    for path in &inputs {
        match sign_file(key, path, options) {
            Ok(hash) => println!("signed {} sha256={hash}", path.display()),
            Err(e) => {
                failed += 1;
                eprintln!("failed {}: {e:#}", path.display());
            }
        }
    }
    tracing::info!(
        signed = inputs.len() - failed,
        failed,
        key_ref = %options.key_ref,
        "signing finished"
    );
    Ok(failed == 0)
}

/// Org public key given inline or as a file holding it.
pub fn read_public_key_arg(arg: &str) -> anyhow::Result<String> {
    let path = Path::new(arg);
    if path.is_file() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(text.trim().to_owned());
    }
    Ok(arg.trim().to_owned())
}

#[derive(Serialize)]
struct OrgEntry<'a> {
    orgs: [&'a OrgCertificate; 1],
}

/// `[[orgs]]` block ready to append to a TOML anchor file.
pub fn cert_toml(cert: &OrgCertificate) -> anyhow::Result<String> {
    Ok(toml::to_string(&OrgEntry { orgs: [cert] })?)
}

#[must_use]
pub fn terms(
    scope: &str,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> SignatureTerms {
    let terms = SignatureTerms::new(issued_at).with_scope(scope);
    match expires_at {
        Some(at) => terms.expiring(at),
        None => terms,
    }
}
