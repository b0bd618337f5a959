//! LastKeypair Authority - SSH certificate authority function
//!
//! Reads one certificate request event on stdin and writes the response on
//! stdout. Failures are written to stdout as `{errorType, errorMessage}` with
//! exit status 1, so the caller can tell a function error from a response.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lkp_auth::{now_secs, Keyring, LocalEnvelope, ProcessInvoker};
use lkp_authority::config::{ENV_KEYRING, ENV_PARAMETER_DIR};
use lkp_authority::{
    handle_event, AuthorityConfig, AuthorityError, FileParameterStore, ParameterStore,
    SecretSources, Services,
};
use rand::rngs::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey};
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Definition
// ============================================================================

/// LastKeypair Authority - Serverless SSH certificate authority
#[derive(Parser)]
#[command(name = "lkp-authority", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle one event from stdin (the function entry point)
    Invoke,

    /// Generate a local keyring and CA key for development
    Init {
        /// Directory to write keyring.toml, ca_key and ca_key.pub into
        #[arg(long)]
        dir: PathBuf,

        /// Canonical id of the token key
        #[arg(long, default_value = "local:key/LastKeypair")]
        key_id: String,

        /// Alias clients use for the token key
        #[arg(long, default_value = "alias/LastKeypair")]
        alias: String,

        /// Encrypt the CA key with the passphrase in this environment variable
        #[arg(long, value_name = "VAR")]
        passphrase_env: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Invoke => {
            if let Err(e) = cmd_invoke() {
                let failure = serde_json::to_string(&e.to_failure()).unwrap_or_default();
                println!("{failure}");
                std::process::exit(1);
            }
        }
        Commands::Init {
            dir,
            key_id,
            alias,
            passphrase_env,
        } => {
            if let Err(e) = cmd_init(&dir, &key_id, &alias, passphrase_env.as_deref()) {
                eprintln!("error: {e:#}");
                std::process::exit(1);
            }
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_invoke() -> Result<(), AuthorityError> {
    let mut event = Vec::new();
    std::io::stdin()
        .read_to_end(&mut event)
        .map_err(|e| AuthorityError::InvalidRequest(format!("reading event: {e}")))?;

    let env = |name: &str| std::env::var(name).ok();

    let envelope = load_envelope(&env)?;
    let parameters = env(ENV_PARAMETER_DIR).map(FileParameterStore::new);
    let sources = SecretSources {
        parameters: parameters.as_ref().map(|p| p as &dyn ParameterStore),
        envelope: Some(&envelope),
    };

    let config = AuthorityConfig::from_env(&env, sources)?;
    tracing::debug!(?config, "loaded configuration");

    let invoker = ProcessInvoker;
    let services = Services {
        envelope: &envelope,
        invoker: &invoker,
    };

    let response = handle_event(&event, &config, services, now_secs())?;

    let mut stdout = std::io::stdout();
    stdout
        .write_all(&response)
        .and_then(|_| stdout.write_all(b"\n"))
        .map_err(|e| AuthorityError::TransportFailure(format!("writing response: {e}")))
}

fn load_envelope(env: &dyn Fn(&str) -> Option<String>) -> Result<LocalEnvelope, AuthorityError> {
    let path = env(ENV_KEYRING)
        .ok_or_else(|| AuthorityError::ConfigurationMissing(format!("{ENV_KEYRING} is not set")))?;
    let content = std::fs::read_to_string(&path)
        .map_err(|e| AuthorityError::ConfigurationMissing(format!("keyring {path}: {e}")))?;
    let keyring = Keyring::from_toml(&content)
        .map_err(|e| AuthorityError::ConfigurationMissing(format!("keyring {path}: {e}")))?;
    LocalEnvelope::from_keyring(&keyring)
        .map_err(|e| AuthorityError::ConfigurationMissing(format!("keyring {path}: {e}")))
}

fn cmd_init(dir: &Path, key_id: &str, alias: &str, passphrase_env: Option<&str>) -> Result<()> {
    std::fs::create_dir_all(dir).context("Failed to create output directory")?;

    let keyring_path = dir.join("keyring.toml");
    let ca_key_path = dir.join("ca_key");
    for path in [&keyring_path, &ca_key_path] {
        if path.exists() {
            anyhow::bail!("{} already exists, refusing to overwrite", path.display());
        }
    }

    let keyring = Keyring::generate(key_id, Some(alias.to_string()));
    write_private(&keyring_path, keyring.to_toml()?.as_bytes())?;
    tracing::info!(path = %keyring_path.display(), key_id, alias, "wrote keyring");

    let mut ca_key =
        PrivateKey::random(&mut OsRng, Algorithm::Ed25519).context("Failed to generate CA key")?;
    if let Some(var) = passphrase_env {
        let passphrase = std::env::var(var).with_context(|| format!("{var} is not set"))?;
        ca_key = ca_key
            .encrypt(&mut OsRng, passphrase)
            .context("Failed to encrypt CA key")?;
    }
    let pem = ca_key
        .to_openssh(LineEnding::LF)
        .context("Failed to encode CA key")?;
    write_private(&ca_key_path, pem.as_bytes())?;

    let public = ca_key.public_key().to_openssh()?;
    std::fs::write(dir.join("ca_key.pub"), format!("{public}\n"))?;
    tracing::info!(path = %ca_key_path.display(), "wrote CA key");

    // Script-friendly: the environment the authority needs, on stdout.
    println!("export {ENV_KEYRING}={}", keyring_path.display());
    println!("export LKP_KEY_ID={key_id}");
    println!("export PSTORE_LKP_CA_KEY_BYTES=/ca_key");
    println!("export {ENV_PARAMETER_DIR}={}", dir.display());
    if let Some(var) = passphrase_env {
        println!("export LKP_CA_KEY_PASSPHRASE_BYTES=\"${var}\"");
    }
    eprintln!("Trust user certificates on hosts with: TrustedUserCAKeys {}/ca_key.pub", dir.display());

    Ok(())
}

fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
