//! CLI Commands
//!
//! Implementation of all wallet CLI commands.

pub mod balance;
pub mod history;
pub mod info;
pub mod send;
pub mod wallet;

use anyhow::{anyhow, Result};
use std::io::{self, Write};
use zeroize::Zeroizing;

use crate::chain::{ChainError, JsonRpcClient};
use crate::config::Config;
use crate::error::ErrorClass;
use crate::history::HistoryError;
use crate::intent::TransferError;
use crate::tracker::TrackerError;
use crate::validate::ValidationError;
use crate::vault::{Vault, VaultError};

/// Minimum length for a new wallet password
pub const MIN_PASSWORD_LEN: usize = 8;

/// Prompt for password input (hidden)
pub fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let password = rpassword::read_password()?;
    Ok(Zeroizing::new(password))
}

/// Prompt for confirmation
pub fn prompt_confirm(message: &str) -> Result<bool> {
    print!("{} [y/N]: ", message);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y") || input.trim().eq_ignore_ascii_case("yes"))
}

/// Prompt for a line of visible input
pub fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Err(anyhow!("No input"));
    }
    Ok(input.trim().to_string())
}

/// Prompt for a new password with confirmation
pub fn prompt_new_password() -> Result<Zeroizing<String>> {
    loop {
        let password = prompt_password("Enter a password to encrypt the wallet: ")?;

        if password.len() < MIN_PASSWORD_LEN {
            print_error(&format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            ));
            continue;
        }

        let confirm = prompt_password("Confirm password: ")?;

        if *password != *confirm {
            print_error("Passwords do not match");
            continue;
        }

        return Ok(password);
    }
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("\x1b[31mError:\x1b[0m {}", message);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("\x1b[32m{}\x1b[0m", message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("\x1b[33mWarning:\x1b[0m {}", message);
}

pub fn open_vault(config: &Config) -> Vault {
    Vault::new(&config.wallets_dir, config.kdf)
}

pub fn connect(config: &Config) -> Result<JsonRpcClient> {
    Ok(JsonRpcClient::new(&config.rpc_url)?)
}

/// Find the component error behind `error`, if any, and report its class.
pub fn error_class(error: &anyhow::Error) -> ErrorClass {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<TransferError>() {
            return e.class();
        }
        if let Some(e) = cause.downcast_ref::<VaultError>() {
            return e.class();
        }
        if let Some(e) = cause.downcast_ref::<ValidationError>() {
            return e.class();
        }
        if let Some(e) = cause.downcast_ref::<ChainError>() {
            return e.class();
        }
        if let Some(e) = cause.downcast_ref::<TrackerError>() {
            return e.class();
        }
        if let Some(e) = cause.downcast_ref::<HistoryError>() {
            return e.class();
        }
        if cause.downcast_ref::<io::Error>().is_some() {
            return ErrorClass::Storage;
        }
    }
    ErrorClass::Internal
}
