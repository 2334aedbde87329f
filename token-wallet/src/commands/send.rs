//! Send command

use anyhow::{anyhow, Context, Result};

use crate::config::Config;
use crate::intent::{
    FeeEstimate, TransferBuilder, TransferDraft, TransferError, TransferIntent, TransferKind,
};
use crate::record::TxStatus;
use crate::tracker::{TrackerError, TransactionTracker};
use crate::units::{format_amount, format_units, NATIVE_DECIMALS};
use crate::vault::{Vault, WalletSummary};

use super::{
    connect, open_vault, print_error, print_success, print_warning, prompt_confirm, prompt_line,
    prompt_password,
};

/// Transfer native currency, or an ERC-20 token when `token` is set
pub async fn run(
    config: &Config,
    to: &str,
    amount: &str,
    token: Option<&str>,
    from: Option<&str>,
    skip_confirm: bool,
) -> Result<()> {
    let vault = open_vault(config);
    let wallet = select_wallet(&vault, from)?;

    // Validate before asking for a password or touching the network
    let draft = TransferDraft::new(wallet.address, to, amount, token)?;

    let password = prompt_password("Enter wallet password: ")?;
    let signer = vault
        .unlock(&wallet.slug, &password)
        .context("Failed to unlock wallet")?;
    drop(password);

    let chain = connect(config)?;
    let builder = TransferBuilder::new(&chain, config.currency());

    println!();
    println!("Preparing transaction...");
    let estimated = builder.estimate(draft).await?;

    let review = |intent: &TransferIntent, estimate: &FeeEstimate| {
        print_preview(config, intent, estimate);
        decide(skip_confirm, || {
            println!();
            prompt_confirm("Send this transaction?")
        })
    };
    let confirmed = match estimated.confirm(&review) {
        Ok(confirmed) => confirmed,
        Err(TransferError::UserRejected) => {
            println!();
            println!("Transaction cancelled.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!();
    println!("Sending transaction...");
    let record = match builder.submit(confirmed, &signer).await {
        Ok(record) => record,
        Err(TransferError::UserRejected) => {
            println!();
            println!("Transaction cancelled.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!();
    print_success("Transaction sent!");
    println!("Transaction hash: {}", record.hash);
    println!("{}", config.explorer_tx_url(&record.hash));

    println!();
    println!("Waiting for confirmation...");
    let tracker = TransactionTracker::new(&chain, record, config.tracker);

    tokio::select! {
        result = tracker.await_confirmation() => match result {
            Ok(record) if record.status == TxStatus::Confirmed => {
                println!();
                print_success("Transaction confirmed!");
                if let Some(block) = record.block_number {
                    println!("Block number: {}", block);
                }
                Ok(())
            }
            Ok(record) => {
                println!();
                print_error("Transaction failed on chain");
                if let Some(block) = record.block_number {
                    println!("Block number: {}", block);
                }
                Err(anyhow!("Transaction {} reverted", record.hash))
            }
            Err(e @ TrackerError::Timeout(_)) => {
                print_warning(&e.to_string());
                println!("Check its status on the explorer.");
                Err(e.into())
            }
            Err(e) => Err(e).context("Lost track of the transaction"),
        },
        _ = tokio::signal::ctrl_c() => {
            println!();
            print_warning("Stopped waiting. The transaction was already broadcast and may still be mined.");
            Ok(())
        }
    }
}

/// `--yes` approves without asking; a failed read counts as a refusal
fn decide(skip_confirm: bool, ask: impl FnOnce() -> Result<bool>) -> bool {
    if skip_confirm {
        return true;
    }
    ask().unwrap_or_else(|e| {
        print_error(&format!("Failed to read confirmation: {e}"));
        false
    })
}

/// Pick the sending wallet: by name, the only one saved, or by prompt
fn select_wallet(vault: &Vault, from: Option<&str>) -> Result<WalletSummary> {
    let wallets = vault.list()?;
    if wallets.is_empty() {
        return Err(anyhow!(
            "No saved wallets found. Create one with: token-wallet wallet create"
        ));
    }

    if let Some(name) = from {
        let record = vault.load(name)?;
        return wallets
            .into_iter()
            .find(|w| w.address == record.address && w.name == record.name)
            .ok_or_else(|| anyhow!("Wallet {:?} not found", name));
    }

    if let [only] = wallets.as_slice() {
        return Ok(only.clone());
    }

    println!("Select a wallet:");
    for (i, wallet) in wallets.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, wallet.name, wallet.address);
    }

    loop {
        let input = prompt_line(&format!("Wallet [1-{}]: ", wallets.len()))?;
        match input.parse::<usize>() {
            Ok(n) if (1..=wallets.len()).contains(&n) => return Ok(wallets[n - 1].clone()),
            _ => print_error("Invalid selection"),
        }
    }
}

fn print_preview(config: &Config, intent: &TransferIntent, estimate: &FeeEstimate) {
    let currency = config.currency();

    println!("From:   {}", intent.source());
    println!("To:     {}", intent.recipient());
    println!(
        "Amount: {}",
        format_amount(intent.amount(), intent.decimals(), intent.asset_symbol())
    );
    if let TransferKind::Token(token) = intent.kind() {
        println!("Token:  {}", token);
    }

    println!();
    println!("Estimated gas: {}", estimate.gas_limit);
    println!("Gas price: {} Gwei", format_units(estimate.gas_price, 9));
    println!(
        "Gas cost: ~{}",
        format_amount(estimate.fee, NATIVE_DECIMALS, currency)
    );
    println!(
        "Total cost: ~{}",
        format_amount(estimate.total_cost, NATIVE_DECIMALS, currency)
    );
}
