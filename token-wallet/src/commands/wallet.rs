//! Wallet management commands: create, import, list

use anyhow::{Context, Result};

use crate::config::Config;
use crate::keys::KeyMaterials;
use crate::vault::{Vault, VaultError};

use super::{
    open_vault, print_error, print_success, print_warning, prompt_confirm, prompt_line,
    prompt_new_password, prompt_password,
};

/// Generate a new wallet, show its recovery phrase and optionally save it
pub async fn create(config: &Config) -> Result<()> {
    println!("Creating new wallet...");
    let materials = KeyMaterials::generate().context("Failed to generate wallet")?;

    println!();
    print_success("Wallet created successfully!");
    println!();
    println!("Address: {}", materials.address());
    println!();
    println!("Your recovery phrase ({} words):", materials.mnemonic_words().len());
    println!();

    // Display in 4 columns
    for (i, word) in materials.mnemonic_words().iter().enumerate() {
        print!("{:>2}. {:<12}", i + 1, word);
        if (i + 1) % 4 == 0 {
            println!();
        }
    }
    println!();
    print_warning("IMPORTANT: Save your mnemonic phrase securely!");
    print_warning("Anyone with this phrase can access your funds.");
    println!();

    offer_to_save(config, &materials)
}

/// Import a wallet from a private key or recovery phrase
pub async fn import(config: &Config) -> Result<()> {
    let input = prompt_password("Enter private key (0x...) or mnemonic phrase: ")?;
    let materials = KeyMaterials::import(&input)?;

    println!();
    if materials.mnemonic_phrase().is_some() {
        print_success("Wallet imported from mnemonic!");
    } else {
        print_success("Wallet imported from private key!");
    }
    println!("Address: {}", materials.address());
    println!();

    offer_to_save(config, &materials)
}

/// List saved wallets without decrypting them
pub async fn list(config: &Config) -> Result<()> {
    let vault = open_vault(config);
    let wallets = vault.list()?;

    if wallets.is_empty() {
        println!("No saved wallets found.");
        println!("Create a new wallet with: token-wallet wallet create");
        return Ok(());
    }

    println!("Found {} saved wallet(s):", wallets.len());
    println!();
    for (i, wallet) in wallets.iter().enumerate() {
        println!("{}. {}", i + 1, wallet.name);
        println!("   Address: {}", wallet.address);
        println!("   Created: {}", wallet.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}

fn offer_to_save(config: &Config, materials: &KeyMaterials) -> Result<()> {
    if !prompt_confirm("Do you want to save this wallet (encrypted)?")? {
        print_warning("Wallet not saved. Make sure to securely store your mnemonic phrase!");
        return Ok(());
    }

    let vault = open_vault(config);
    let name = prompt_wallet_name(&vault)?;
    let password = prompt_new_password()?;

    vault
        .encrypt_and_store(materials, &name, &password)
        .context("Failed to save wallet")?;

    println!();
    print_success(&format!(
        "Wallet saved to: {}",
        vault.record_path(&name)?.display()
    ));
    Ok(())
}

/// Ask until the name is usable and not taken. Existing records are never
/// overwritten.
fn prompt_wallet_name(vault: &Vault) -> Result<String> {
    loop {
        let name = prompt_line("Enter a name for this wallet: ")?;
        match vault.exists(&name) {
            Ok(false) => return Ok(name),
            Ok(true) => print_error(&VaultError::DuplicateName(name).to_string()),
            Err(e) => print_error(&e.to_string()),
        }
    }
}
