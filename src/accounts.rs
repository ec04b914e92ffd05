use crate::error::{BotError, Result};
use crate::models::Credential;
use std::io::ErrorKind;
use std::path::Path;

/// Every trimmed, non-blank line is one credential.
pub fn parse_accounts(contents: &str) -> Vec<Credential> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Credential::new)
        .collect()
}

/// Read the account list.
///
/// A missing or empty file is [`BotError::Accounts`]; other read failures are
/// passed through as [`BotError::Io`].
pub fn load_accounts(path: impl AsRef<Path>) -> Result<Vec<Credential>> {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(BotError::Accounts(format!("{} not found", path.display())))
        }
        Err(e) => return Err(e.into()),
    };

    let accounts = parse_accounts(&contents);
    if accounts.is_empty() {
        return Err(BotError::Accounts(format!("{} is empty", path.display())));
    }
    Ok(accounts)
}
