//! Balance command

use anyhow::{Context, Result};
use futures::join;

use crate::balance::{native_balance, token_balances};
use crate::config::Config;
use crate::units::{format_amount, NATIVE_DECIMALS};
use crate::validate::validate_address;

use super::{connect, print_warning};

/// Show the native balance of `address` and its balance in each of `tokens`
pub async fn run(config: &Config, address: &str, tokens: &[String]) -> Result<()> {
    // Reject bad input before touching the network
    let address = validate_address(address)?;
    let tokens = tokens
        .iter()
        .map(|token| validate_address(token))
        .collect::<Result<Vec<_>, _>>()?;

    let chain = connect(config)?;

    println!(
        "Fetching {} balance for {}...",
        config.currency(),
        address
    );
    if !tokens.is_empty() {
        println!("Querying {} token contract(s)", tokens.len());
    }

    let (native, token_results) = join!(
        native_balance(&chain, address),
        token_balances(&chain, address, &tokens)
    );
    let native = native.context("Failed to fetch balance")?;

    println!();
    println!(
        "Balance: {}",
        format_amount(native, NATIVE_DECIMALS, config.currency())
    );

    if !token_results.is_empty() {
        println!();
        println!("Token balances:");
        for entry in &token_results {
            println!(
                "  {:<12} {}",
                entry.token.symbol,
                format_amount(entry.balance, entry.token.decimals, &entry.token.symbol)
            );
            println!("  {:<12} {}", "", entry.token.address);
        }
    }

    if token_results.len() < tokens.len() {
        print_warning(&format!(
            "{} of {} token balance(s) could not be fetched",
            tokens.len() - token_results.len(),
            tokens.len()
        ));
    }

    println!();
    println!("Network: {}", config.params().name);
    println!("View on explorer: {}", config.explorer_address_url(&address));

    Ok(())
}
