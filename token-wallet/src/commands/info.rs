//! Network and configuration info command

use anyhow::Result;

use crate::config::{Config, Network};

use super::open_vault;

/// Print the active network, endpoints and local wallet state
pub async fn run(config: &Config) -> Result<()> {
    let params = config.params();

    println!("Network:       {} ({})", params.name, config.network);
    println!("Chain ID:      {}", params.chain_id);
    println!("Currency:      {}", params.currency);
    println!("RPC URL:       {}", config.rpc_url);
    println!("Explorer:      {}", params.explorer_url);
    println!(
        "Etherscan key: {}",
        if config.has_history_credentials() {
            "configured"
        } else {
            "not set (history unavailable)"
        }
    );

    let vault = open_vault(config);
    let wallets = vault.list()?;
    println!("Wallets dir:   {}", vault.dir().display());
    println!("Saved wallets: {}", wallets.len());

    println!();
    println!("Available networks:");
    for network in Network::ALL {
        let marker = if network == config.network { "*" } else { " " };
        let kind = if network.is_testnet() { "testnet" } else { "mainnet" };
        println!(
            "  {} {:<8} chain {:<9} {}",
            marker,
            network.id(),
            network.params().chain_id,
            kind
        );
    }

    Ok(())
}
