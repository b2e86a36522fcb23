//! Password acquisition via TTY prompt or environment variables.

use std::io::{BufRead, IsTerminal};

use secrecy::{ExposeSecret, SecretString};

use crate::CliError;

/// Master password for non-interactive use.
pub const MASTER_PASSWORD_ENV_VAR: &str = "CADENAS_MASTER_PASSWORD";

/// Replacement master password for non-interactive `init` and `rotate`.
pub const NEW_MASTER_PASSWORD_ENV_VAR: &str = "CADENAS_NEW_MASTER_PASSWORD";

/// Where commands get their secrets from.
pub trait PasswordSource {
    /// The current master password.
    ///
    /// # Errors
    ///
    /// [`CliError::Input`] if none can be obtained.
    fn master_password(&mut self) -> Result<SecretString, CliError>;

    /// A new master password, confirmed.
    ///
    /// # Errors
    ///
    /// [`CliError::Input`] if none can be obtained or the two entries differ.
    fn new_master_password(&mut self) -> Result<SecretString, CliError>;

    /// The password of a credential being stored.
    ///
    /// # Errors
    ///
    /// [`CliError::Input`] if none can be obtained.
    fn credential_password(&mut self) -> Result<SecretString, CliError>;
}

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

/// Environment first, then a hidden prompt when stdin is a terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl PasswordSource for TerminalPrompt {
    fn master_password(&mut self) -> Result<SecretString, CliError> {
        if let Some(password) = from_env(MASTER_PASSWORD_ENV_VAR) {
            return Ok(password);
        }
        if std::io::stdin().is_terminal() {
            return read_hidden("Master password: ");
        }
        Err(no_tty(MASTER_PASSWORD_ENV_VAR))
    }

    fn new_master_password(&mut self) -> Result<SecretString, CliError> {
        if let Some(password) = from_env(NEW_MASTER_PASSWORD_ENV_VAR) {
            return Ok(password);
        }
        if std::io::stdin().is_terminal() {
            let first = read_hidden("New master password: ")?;
            let second = read_hidden("Confirm master password: ")?;
            return confirm(first, &second);
        }
        Err(no_tty(NEW_MASTER_PASSWORD_ENV_VAR))
    }

    fn credential_password(&mut self) -> Result<SecretString, CliError> {
        if std::io::stdin().is_terminal() {
            return read_hidden("Password: ");
        }
        // Piped input: one line.
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Err(CliError::Input("empty password not allowed".to_string()));
        }
        Ok(SecretString::from(trimmed.to_string()))
    }
}

fn from_env(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

fn read_hidden(label: &str) -> Result<SecretString, CliError> {
    let value = rpassword::prompt_password(label)
        .map_err(|e| CliError::Input(format!("failed to read password: {e}")))?;
    if value.is_empty() {
        return Err(CliError::Input("empty password not allowed".to_string()));
    }
    Ok(SecretString::from(value))
}

fn no_tty(var: &str) -> CliError {
    CliError::Input(format!(
        "no password provided. Set {var} or run interactively."
    ))
}

/// Accept `first` only if `second` is identical.
pub fn confirm(first: SecretString, second: &SecretString) -> Result<SecretString, CliError> {
    if first.expose_secret() != second.expose_secret() {
        return Err(CliError::Input("passwords do not match".to_string()));
    }
    Ok(first)
}

// ---------------------------------------------------------------------------
// Scripted
// ---------------------------------------------------------------------------

/// Fixed answers, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    pub master: Vec<String>,
    pub new_master: Vec<String>,
    pub credential: Vec<String>,
}

#[cfg(test)]
impl ScriptedPrompt {
    fn next(queue: &mut Vec<String>) -> Result<SecretString, CliError> {
        if queue.is_empty() {
            return Err(CliError::Input("no scripted answer left".to_string()));
        }
        Ok(SecretString::from(queue.remove(0)))
    }
}

#[cfg(test)]
impl PasswordSource for ScriptedPrompt {
    fn master_password(&mut self) -> Result<SecretString, CliError> {
        Self::next(&mut self.master)
    }

    fn new_master_password(&mut self) -> Result<SecretString, CliError> {
        Self::next(&mut self.new_master)
    }

    fn credential_password(&mut self) -> Result<SecretString, CliError> {
        Self::next(&mut self.credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_accepts_identical_entries() {
        let ok = confirm(
            SecretString::from("Abcdefg1".to_string()),
            &SecretString::from("Abcdefg1".to_string()),
        )
        .unwrap();
        assert_eq!(ok.expose_secret(), "Abcdefg1");
    }

    #[test]
    fn confirm_rejects_mismatch() {
        let err = confirm(
            SecretString::from("Abcdefg1".to_string()),
            &SecretString::from("Abcdefg2".to_string()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("do not match"));
    }

    #[test]
    fn scripted_prompt_runs_out() {
        let mut prompt = ScriptedPrompt {
            master: vec!["one".into()],
            ..ScriptedPrompt::default()
        };
        assert_eq!(prompt.master_password().unwrap().expose_secret(), "one");
        assert!(prompt.master_password().is_err());
        assert!(prompt.credential_password().is_err());
    }
}
