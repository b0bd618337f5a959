//! LastKeypair CLI - request SSH certificates, vouch for peers, and tunnel connections

mod bridge;
mod client;
mod commands;
mod config;
mod keys;
mod session;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::host::HostArgs;
use crate::commands::sign::SignArgs;
use crate::commands::token::CreateArgs;
use crate::commands::ClientContext;
use crate::config::AuthorityArgs;
use crate::session::{LoginParams, SessionPaths};

/// LastKeypair - SSH certificates on demand
#[derive(Parser)]
#[command(name = "lkp", version, about)]
struct Cli {
    #[command(flatten)]
    authority: AuthorityArgs,

    /// Directory for the client key and cached logins (default ~/.lkp)
    #[arg(long, env = "LKP_HOME", global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Vouch for another identity and print the encoded voucher
    Vouch {
        /// Principal id of the identity being vouched for
        #[arg(long)]
        vouchee: String,

        /// Free-form context, e.g. a ticket number
        #[arg(long, default_value = "")]
        context: String,
    },

    /// Obtain a host certificate for this machine
    Host {
        #[arg(long, default_value = "/etc/ssh/ssh_host_ed25519_key.pub")]
        host_key_path: PathBuf,

        #[arg(long, default_value = "/etc/ssh/ssh_host_ed25519_key-cert.pub")]
        signed_host_key_path: PathBuf,

        /// ARN of this instance
        #[arg(long)]
        instance_arn: String,

        /// OpenSSH public key of the CA (e.g. the ca_key.pub from `lkp-authority init`)
        #[arg(long)]
        ca_public_key: Option<PathBuf>,

        /// Where to install the CA public key for TrustedUserCAKeys
        #[arg(long, default_value = "/etc/ssh/cert_authority.pub")]
        cert_authority_path: PathBuf,

        /// Also write the instance ARN as the only authorized principal here
        #[arg(long)]
        authorized_principals_path: Option<PathBuf>,

        /// Append HostCertificate, TrustedUserCAKeys and AuthorizedPrincipalsFile
        /// (as configured) to this sshd config
        #[arg(long)]
        sshd_config_path: Option<PathBuf>,
    },

    /// Create or check tokens by hand
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Commands invoked by the ssh client
    Ssh {
        #[command(subcommand)]
        command: SshCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Print a token for the caller as JSON
    Create {
        #[arg(long, conflicts_with = "host_instance_arn")]
        remote_instance_arn: Option<String>,

        #[arg(long)]
        host_instance_arn: Option<String>,

        #[arg(long)]
        ssh_username: Option<String>,

        /// Principal to request (repeatable)
        #[arg(long = "principal")]
        principals: Vec<String>,
    },

    /// Check a token (JSON) or encoded voucher against the token key
    Validate {
        /// Read from this file instead of stdin
        #[arg(long)]
        token_file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SshCommands {
    /// Decide whether lkp handles a host, and if so obtain certificates for it
    Match {
        #[arg(long)]
        instance_arn: String,

        #[arg(long, default_value = "ec2-user")]
        ssh_username: String,

        /// Encoded voucher to attach (repeatable)
        #[arg(long = "voucher")]
        vouchers: Vec<String>,
    },

    /// Rewrite the ssh config for a cached login and print its path
    Config {
        #[arg(long)]
        instance_arn: String,
    },

    /// Connect stdin/stdout to the target (for use as ProxyCommand)
    Proxy {
        #[arg(long)]
        instance_arn: String,

        #[arg(long, default_value_t = 22)]
        port: u16,
    },

    /// Sign a user key locally with a CA private key, bypassing the authority
    Sign {
        #[arg(long)]
        ca_key_path: PathBuf,

        /// Environment variable holding the CA key passphrase
        #[arg(long, value_name = "VAR")]
        passphrase_env: Option<String>,

        #[arg(long)]
        user_key_path: PathBuf,

        /// Key id recorded in the certificate
        #[arg(long)]
        cert_key_id: String,

        /// Validity in seconds
        #[arg(long, default_value_t = 3600)]
        duration: u64,

        /// Comma-separated principals
        #[arg(long, value_delimiter = ',', required = true)]
        principals: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        // Not an error: the host just isn't ours.
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command declined without failing.
async fn run(cli: Cli) -> Result<bool> {
    let paths = match &cli.home {
        Some(home) => SessionPaths::new(home),
        None => SessionPaths::default_root()?,
    };

    match cli.command {
        Commands::Vouch { vouchee, context } => {
            let ctx = ClientContext::from_args(&cli.authority)?;
            commands::vouch::run(&ctx, &vouchee, &context)?;
        }

        Commands::Host {
            host_key_path,
            signed_host_key_path,
            instance_arn,
            ca_public_key,
            cert_authority_path,
            authorized_principals_path,
            sshd_config_path,
        } => {
            let ctx = ClientContext::from_args(&cli.authority)?;
            commands::host::run(
                &ctx,
                &HostArgs {
                    host_key_path,
                    signed_host_key_path,
                    instance_arn,
                    ca_public_key,
                    cert_authority_path,
                    authorized_principals_path,
                    sshd_config_path,
                },
            )?;
        }

        Commands::Token { command } => match command {
            TokenCommands::Create {
                remote_instance_arn,
                host_instance_arn,
                ssh_username,
                principals,
            } => {
                let ctx = ClientContext::from_args(&cli.authority)?;
                commands::token::create(
                    &ctx,
                    &CreateArgs {
                        remote_instance_arn,
                        host_instance_arn,
                        ssh_username,
                        principals,
                    },
                )?;
            }
            TokenCommands::Validate { token_file } => {
                commands::token::validate(&cli.authority, token_file.as_deref())?;
            }
        },

        Commands::Ssh { command } => match command {
            SshCommands::Match {
                instance_arn,
                ssh_username,
                vouchers,
            } => {
                let login = LoginParams {
                    vouchers,
                    ..LoginParams::new(instance_arn, ssh_username)
                };
                // Decided before any configuration is read: ssh runs this for every host.
                if !utils::is_lkp_target(&login.instance_arn) {
                    tracing::debug!(instance_arn = %login.instance_arn, "not an lkp target");
                    return Ok(false);
                }
                let ctx = ClientContext::from_args(&cli.authority)?;
                commands::ssh::match_target(&ctx, &paths, login)?;
            }
            SshCommands::Config { instance_arn } => {
                commands::ssh::config(&paths, &instance_arn)?;
            }
            SshCommands::Proxy { instance_arn, port } => {
                commands::ssh::proxy(&paths, &instance_arn, port).await?;
            }
            SshCommands::Sign {
                ca_key_path,
                passphrase_env,
                user_key_path,
                cert_key_id,
                duration,
                principals,
            } => {
                commands::sign::run(&SignArgs {
                    ca_key_path,
                    passphrase_env,
                    user_key_path,
                    key_id: cert_key_id,
                    duration,
                    principals,
                })?;
            }
        },
    }

    Ok(true)
}
