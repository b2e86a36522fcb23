//! CADENAS - a local credential vault.
//!
//! Binary entry point: argument parsing, logging setup and exit codes.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

mod commands;
mod prompt;
mod shell;

use std::path::PathBuf;
use std::process::ExitCode;

use cadenas_crypto_core::CryptoError;
use cadenas_vault::VaultError;
use clap::{Parser, Subcommand};

/// Environment variable overriding the vault directory.
pub const VAULT_DIR_ENV_VAR: &str = "CADENAS_VAULT_DIR";

/// CADENAS - a local credential vault.
#[derive(Parser, Debug)]
#[command(name = "cadenas", version, about, long_about = None)]
struct Cli {
    /// Vault directory (default: ~/.cadenas).
    #[arg(long, global = true, env = VAULT_DIR_ENV_VAR)]
    vault_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new vault and set its master password.
    Init,
    /// Store a new credential.
    Add {
        #[arg(long)]
        service: String,
        #[arg(long)]
        email: String,
        /// Generate the password instead of prompting for it.
        #[arg(long)]
        generate: bool,
    },
    /// List stored credentials.
    List {
        /// Only show credentials whose service or email contains this text.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Show one credential, password included.
    Show { id: i64 },
    /// Change a stored credential.
    Edit {
        id: i64,
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Prompt for a new password.
        #[arg(long, conflicts_with = "generate")]
        password: bool,
        /// Generate a new password.
        #[arg(long)]
        generate: bool,
    },
    /// Delete a credential.
    Delete { id: i64 },
    /// Print a random password without touching the vault.
    Generate {
        /// Password length (default from settings, normally 16).
        #[arg(long)]
        length: Option<usize>,
        /// Letters and digits only.
        #[arg(long)]
        no_symbols: bool,
        /// Keep look-alike characters such as `l`, `1`, `O` and `0`.
        #[arg(long)]
        allow_ambiguous: bool,
    },
    /// Change the master password and re-encrypt every credential.
    Rotate,
    /// Interactive session that locks itself after inactivity.
    Shell,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("{0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// 2 for storage failures, 1 for everything else.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Vault(e) if e.is_storage() => 2,
            Self::Io(_) => 2,
            _ => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(e) = cadenas_crypto_core::disable_core_dumps() {
        tracing::warn!(error = %e, "could not disable core dumps");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cadenas: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let vault_dir = match cli.vault_dir {
        Some(dir) => dir,
        None => default_vault_dir()?,
    };
    let mut prompt = prompt::TerminalPrompt;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Init => commands::init(&vault_dir, &mut prompt, &mut out),
        Commands::Add {
            service,
            email,
            generate,
        } => {
            commands::add(&vault_dir, &service, &email, generate, &mut prompt, &mut out)
        }
        Commands::List { filter } => {
            commands::list(&vault_dir, filter.as_deref(), &mut prompt, &mut out)
        }
        Commands::Show { id } => commands::show(&vault_dir, id, &mut prompt, &mut out),
        Commands::Edit {
            id,
            service,
            email,
            password,
            generate,
        } => {
            let change = commands::EditRequest {
                service,
                email,
                password: if generate {
                    commands::PasswordChange::Generate
                } else if password {
                    commands::PasswordChange::Prompt
                } else {
                    commands::PasswordChange::Keep
                },
            };
            commands::edit(&vault_dir, id, &change, &mut prompt, &mut out)
        }
        Commands::Delete { id } => commands::delete(&vault_dir, id, &mut prompt, &mut out),
        Commands::Generate {
            length,
            no_symbols,
            allow_ambiguous,
        } => commands::generate(&vault_dir, length, !no_symbols, !allow_ambiguous, &mut out),
        Commands::Rotate => commands::rotate(&vault_dir, &mut prompt, &mut out),
        Commands::Shell => shell::run(&vault_dir, &mut prompt),
    }
}

fn default_vault_dir() -> Result<PathBuf, CliError> {
    dirs::home_dir()
        .map(|home| home.join(".cadenas"))
        .ok_or_else(|| {
            CliError::Input(format!(
                "cannot locate a home directory; pass --vault-dir or set {VAULT_DIR_ENV_VAR}"
            ))
        })
}

/// Install a stderr subscriber. `RUST_LOG` wins over `--log-level`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("cadenas_vault={log_level},cadenas={log_level},warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_edit_with_generate() {
        let cli = Cli::try_parse_from(["cadenas", "edit", "7", "--generate", "--email", "a@b"])
            .unwrap();
        match cli.command {
            Commands::Edit {
                id,
                email,
                generate,
                password,
                ..
            } => {
                assert_eq!(id, 7);
                assert_eq!(email.as_deref(), Some("a@b"));
                assert!(generate);
                assert!(!password);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn edit_password_and_generate_conflict() {
        assert!(Cli::try_parse_from(["cadenas", "edit", "1", "--password", "--generate"]).is_err());
    }

    #[test]
    fn vault_dir_flag_is_global() {
        let cli = Cli::try_parse_from(["cadenas", "list", "--vault-dir", "/tmp/v"]).unwrap();
        assert_eq!(cli.vault_dir, Some(PathBuf::from("/tmp/v")));
    }

    #[test]
    fn storage_errors_exit_with_two() {
        assert_eq!(
            CliError::Vault(VaultError::Storage("x".into())).exit_code(),
            2
        );
        assert_eq!(CliError::Vault(VaultError::Authentication).exit_code(), 1);
        assert_eq!(CliError::Input("bad".into()).exit_code(), 1);
    }
}
