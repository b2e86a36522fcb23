//! Interactive session.
//!
//! The vault stays unlocked between commands until the idle window from the
//! settings elapses. The next command after that locks the engine and asks
//! for the master password again before running.

use std::io::{BufRead, Write};
use std::path::Path;

use cadenas_vault::{IdleTracker, VaultEngine, VaultSettings, VaultState};
use secrecy::ExposeSecret;
use tracing::info;

use crate::commands::{self, EditRequest, PasswordChange};
use crate::prompt::PasswordSource;
use crate::CliError;

const HELP: &str = "\
Commands:
  list [TERM]                     list credentials, optionally filtered
  show ID                         show one credential
  add SERVICE EMAIL [--generate]  store a credential
  edit ID [--generate]            replace a credential's password
  delete ID                       delete a credential
  generate [LENGTH]               print a random password
  lock                            lock the vault now
  help                            this text
  quit                            leave the shell";

/// Open the vault and run the shell on stdin/stdout.
pub fn run(vault_dir: &Path, prompt: &mut impl PasswordSource) -> Result<(), CliError> {
    let settings = VaultSettings::load(vault_dir)?;
    let mut engine = VaultEngine::open(vault_dir, &settings)?;
    let master = prompt.master_password()?;
    engine.unlock(master.expose_secret())?;

    let mut tracker = IdleTracker::new(settings.idle_timeout());
    let stdin = std::io::stdin();
    let mut out = std::io::stdout().lock();
    session(
        &mut engine,
        &settings,
        &mut tracker,
        stdin.lock(),
        prompt,
        &mut out,
    )
}

/// Read commands from `input` until EOF or `quit`.
pub fn session(
    engine: &mut VaultEngine,
    settings: &VaultSettings,
    tracker: &mut IdleTracker,
    mut input: impl BufRead,
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let mut line = String::new();
    loop {
        write!(out, "cadenas> ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            continue;
        };
        if matches!(name, "quit" | "exit") {
            break;
        }

        if tracker.is_expired() && engine.state() == VaultState::Unlocked {
            engine.lock();
            info!(timeout_secs = tracker.timeout().as_secs(), "idle timeout, vault locked");
            writeln!(out, "Vault locked after inactivity.")?;
        }
        let needs_vault = !matches!(name, "help" | "generate" | "lock");
        if needs_vault && engine.state() != VaultState::Unlocked {
            let unlocked = prompt
                .master_password()
                .and_then(|master| engine.unlock(master.expose_secret()).map_err(CliError::from));
            if let Err(e) = unlocked {
                writeln!(out, "error: {e}")?;
                continue;
            }
            tracker.record_activity();
        }

        match dispatch(engine, settings, name, args, prompt, out) {
            Ok(Flow::Continue) => tracker.record_activity(),
            Ok(Flow::Locked) => {}
            Err(e) => writeln!(out, "error: {e}")?,
        }
    }
    engine.lock();
    Ok(())
}

enum Flow {
    Continue,
    Locked,
}

fn dispatch(
    engine: &mut VaultEngine,
    settings: &VaultSettings,
    name: &str,
    args: &[&str],
    prompt: &mut impl PasswordSource,
    out: &mut impl Write,
) -> Result<Flow, CliError> {
    match (name, args) {
        ("help", _) => writeln!(out, "{HELP}")?,
        ("list", []) => commands::list_from(engine, None, out)?,
        ("list", [term]) => commands::list_from(engine, Some(*term), out)?,
        ("show", [id]) => commands::show_from(engine, parse_id(id)?, out)?,
        ("add", [service, email]) => {
            commands::add_to(engine, settings, service, email, false, prompt, out)?;
        }
        ("add", [service, email, "--generate"]) => {
            commands::add_to(engine, settings, service, email, true, prompt, out)?;
        }
        ("edit", [id, rest @ ..]) if rest.len() <= 1 => {
            let password = match rest {
                [] => PasswordChange::Prompt,
                ["--generate"] => PasswordChange::Generate,
                _ => return Err(usage(name)),
            };
            let change = EditRequest {
                service: None,
                email: None,
                password,
            };
            commands::edit_in(engine, settings, parse_id(id)?, &change, prompt, out)?;
        }
        ("delete", [id]) => commands::delete_from(engine, parse_id(id)?, out)?,
        ("generate", []) => commands::generate(engine.vault_dir(), None, true, true, out)?,
        ("generate", [len]) => {
            let length = len
                .parse()
                .map_err(|_| CliError::Input(format!("not a length: {len}")))?;
            commands::generate(engine.vault_dir(), Some(length), true, true, out)?;
        }
        ("lock", []) => {
            engine.lock();
            writeln!(out, "Vault locked.")?;
            return Ok(Flow::Locked);
        }
        _ => return Err(usage(name)),
    }
    Ok(Flow::Continue)
}

fn parse_id(raw: &str) -> Result<i64, CliError> {
    raw.parse()
        .map_err(|_| CliError::Input(format!("not a credential id: {raw}")))
}

fn usage(name: &str) -> CliError {
    CliError::Input(format!("bad command `{name}`; type `help`"))
}
