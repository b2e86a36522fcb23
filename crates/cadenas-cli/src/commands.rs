//! One function per subcommand.
//!
//! Each opens the vault, does its work and drops the engine, which releases
//! the directory lock and zeroizes the session key. Output goes to a caller
//! supplied writer so the commands can be exercised against a temp dir.

use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use cadenas_crypto_core::{generate_random_password, CharsetConfig};
use cadenas_vault::{CredentialSummary, VaultEngine, VaultSettings};
use secrecy::{ExposeSecret, SecretString};

use crate::prompt::PasswordSource;
use crate::CliError;

/// What `edit` does with the stored password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordChange {
    Keep,
    Prompt,
    Generate,
}

/// Fields `edit` should change; `None` keeps the stored value.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub service: Option<String>,
    pub email: Option<String>,
    pub password: PasswordChange,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Open the vault and unlock it with the master password.
pub fn open_unlocked(
    vault_dir: &Path,
    prompt: &mut impl PasswordSource,
) -> Result<(VaultEngine, VaultSettings), CliError> {
    let settings = VaultSettings::load(vault_dir)?;
    let mut engine = VaultEngine::open(vault_dir, &settings)?;
    let master = prompt.master_password()?;
    engine.unlock(master.expose_secret())?;
    Ok((engine, settings))
}

fn generated(settings: &VaultSettings) -> Result<SecretString, CliError> {
    let password = generate_random_password(settings.generator_length, &CharsetConfig::default())?;
    Ok(SecretString::from(password))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// "today", "1 day ago", "12 days ago".
pub fn describe_age(changed_at: u64, now: u64) -> String {
    match now.saturating_sub(changed_at) / 86_400 {
        0 => "today".to_string(),
        1 => "1 day ago".to_string(),
        days => format!("{days} days ago"),
    }
}

pub fn write_summaries(
    rows: &[CredentialSummary],
    out: &mut impl Write,
) -> Result<(), CliError> {
    if rows.is_empty() {
        writeln!(out, "No credentials.")?;
        return Ok(());
    }
    let width = rows.iter().map(|r| r.service.len()).max().unwrap_or(0);
    for row in rows {
        writeln!(out, "{:>5}  {:<width$}  {}", row.id, row.service, row.email)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands on an unlocked engine
// ---------------------------------------------------------------------------

pub fn add_to(
    engine: &mut VaultEngine,
    settings: &VaultSettings,
    service: &str,
    email: &str,
    generate: bool,
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let password = if generate {
        generated(settings)?
    } else {
        prompt.credential_password()?
    };
    let id = engine.add_credential(service, email, password.expose_secret())?;
    writeln!(out, "Added credential {id}.")?;
    if generate {
        writeln!(out, "Generated password: {}", password.expose_secret())?;
    }
    Ok(())
}

pub fn list_from(
    engine: &VaultEngine,
    filter: Option<&str>,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let rows = match filter {
        Some(term) => engine.filter_credentials(term)?,
        None => engine.list_credentials()?,
    };
    write_summaries(&rows, out)
}

pub fn show_from(engine: &VaultEngine, id: i64, out: &mut impl Write) -> Result<(), CliError> {
    let record = engine.credential(id)?;
    let password = engine.reveal_password(id)?;
    let changed_at = engine.password_changed_at(id)?;
    writeln!(out, "Service:  {}", record.service)?;
    writeln!(out, "Email:    {}", record.email)?;
    writeln!(out, "Password: {}", password.expose_secret())?;
    writeln!(
        out,
        "Changed:  {}",
        describe_age(changed_at, now_secs())
    )?;
    Ok(())
}

pub fn edit_in(
    engine: &mut VaultEngine,
    settings: &VaultSettings,
    id: i64,
    change: &EditRequest,
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let record = engine.credential(id)?;
    let service = change.service.as_deref().unwrap_or(&record.service);
    let email = change.email.as_deref().unwrap_or(&record.email);
    let password = match change.password {
        PasswordChange::Keep => engine.reveal_password(id)?,
        PasswordChange::Prompt => prompt.credential_password()?,
        PasswordChange::Generate => generated(settings)?,
    };
    engine.update_credential(id, service, email, password.expose_secret())?;
    writeln!(out, "Updated credential {id}.")?;
    if change.password == PasswordChange::Generate {
        writeln!(out, "Generated password: {}", password.expose_secret())?;
    }
    Ok(())
}

pub fn delete_from(engine: &mut VaultEngine, id: i64, out: &mut impl Write) -> Result<(), CliError> {
    engine.delete_credential(id)?;
    writeln!(out, "Deleted credential {id}.")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

pub fn init(
    vault_dir: &Path,
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let settings = VaultSettings::load(vault_dir)?;
    let mut engine = VaultEngine::open(vault_dir, &settings)?;
    let password = prompt.new_master_password()?;
    engine.bootstrap(password.expose_secret())?;
    writeln!(out, "Vault created in {}.", vault_dir.display())?;
    Ok(())
}

pub fn add(
    vault_dir: &Path,
    service: &str,
    email: &str,
    generate: bool,
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let (mut engine, settings) = open_unlocked(vault_dir, prompt)?;
    add_to(&mut engine, &settings, service, email, generate, prompt, out)
}

pub fn list(
    vault_dir: &Path,
    filter: Option<&str>,
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let (engine, _) = open_unlocked(vault_dir, prompt)?;
    list_from(&engine, filter, out)
}

pub fn show(
    vault_dir: &Path,
    id: i64,
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let (engine, _) = open_unlocked(vault_dir, prompt)?;
    show_from(&engine, id, out)
}

pub fn edit(
    vault_dir: &Path,
    id: i64,
    change: &EditRequest,
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let (mut engine, settings) = open_unlocked(vault_dir, prompt)?;
    edit_in(&mut engine, &settings, id, change, prompt, out)
}

pub fn delete(
    vault_dir: &Path,
    id: i64,
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let (mut engine, _) = open_unlocked(vault_dir, prompt)?;
    delete_from(&mut engine, id, out)
}

/// Print a password. Reads settings for the default length but never opens
/// the vault itself.
pub fn generate(
    vault_dir: &Path,
    length: Option<usize>,
    symbols: bool,
    exclude_ambiguous: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let settings = VaultSettings::load(vault_dir)?;
    let charsets = CharsetConfig {
        symbols,
        exclude_ambiguous,
        ..CharsetConfig::default()
    };
    let password = generate_random_password(length.unwrap_or(settings.generator_length), &charsets)?;
    writeln!(out, "{password}")?;
    Ok(())
}

pub fn rotate(
    vault_dir: &Path,
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let settings = VaultSettings::load(vault_dir)?;
    let mut engine = VaultEngine::open(vault_dir, &settings)?;
    let old = prompt.master_password()?;
    // Reject a wrong current password before asking for the new one.
    engine.unlock(old.expose_secret())?;
    let new = prompt.new_master_password()?;
    engine.rotate(old.expose_secret(), new.expose_secret())?;
    writeln!(
        out,
        "Master password changed; {} credential(s) re-encrypted.",
        engine.credential_count()?
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
