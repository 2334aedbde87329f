//! Transaction history command

use anyhow::{Context, Result};

use crate::config::Config;
use crate::history::{fetch_history, EtherscanClient, HistoryPage};
use crate::record::{Direction, TransactionRecord};
use crate::validate::validate_address;

use super::print_warning;

/// Show recent transactions and token transfers, or only transfers of
/// `token` when it is set
pub async fn run(config: &Config, address: &str, limit: usize, token: Option<&str>) -> Result<()> {
    let address = validate_address(address)?;
    let token = token.map(validate_address).transpose()?;

    let provider = EtherscanClient::new(
        config.params().chain_id,
        config.etherscan_api_key.clone(),
        config.currency(),
    )?;

    if token.is_some() {
        println!("Fetching token transfer history for {}...", address);
    } else {
        println!("Fetching transaction history for {}...", address);
    }

    let page = fetch_history(&provider, address, token, limit)
        .await
        .context("Failed to fetch transaction history")?;

    print_page(config, &page);

    println!();
    println!("View all transactions: {}", config.explorer_address_url(&address));
    Ok(())
}

fn print_page(config: &Config, page: &HistoryPage) {
    if page.degraded && page.transactions.is_empty() {
        println!();
        print_warning("No Etherscan API key configured.");
        println!("Transaction history requires an API key.");
        println!("Get a free key at: https://etherscan.io/apis");
        println!("Then set ETHERSCAN_API_KEY or pass --etherscan-api-key");
        return;
    }

    if page.incomplete {
        println!();
        print_warning("Part of the history could not be fetched; the list may be incomplete.");
    }

    if page.transactions.is_empty() {
        println!();
        println!("No transactions found for this address.");
        return;
    }

    println!();
    println!("Found {} transaction(s):", page.transactions.len());
    println!();
    for (i, record) in page.transactions.iter().enumerate() {
        print_record(config, i + 1, record);
    }
}

fn print_record(config: &Config, index: usize, record: &TransactionRecord) {
    let label = match record.direction {
        Direction::Sent => "To:  ",
        Direction::Received => "From:",
    };

    println!("{}. {}", index, record.direction);
    println!("   {}    {}", label, record.counterparty);
    println!("   Amount:   {}", record.display_amount());
    if let Some(timestamp) = record.timestamp {
        println!("   Date:     {}", timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("   Status:   {}", record.status);
    if let Some(block) = record.block_number {
        println!("   Block:    {}", block);
    }
    println!("   Tx Hash:  {}", record.hash);
    println!("   {}", config.explorer_tx_url(&record.hash));
    println!();
}
