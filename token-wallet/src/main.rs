//! Token Wallet CLI
//!
//! A thin wallet for Ethereum-compatible networks.

use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use token_wallet::commands::{self, error_class, print_error};
use token_wallet::config::{Config, Network, DEFAULT_WALLETS_DIR};

#[derive(Parser)]
#[command(name = "token-wallet")]
#[command(about = "Thin wallet for ETH and ERC-20 tokens on EVM networks")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Network to use
    #[arg(long, global = true, env = "NETWORK", value_enum, default_value_t = Network::Sepolia)]
    network: Network,

    /// Override the network's default RPC endpoint
    #[arg(long, global = true, env = "ETHEREUM_RPC_URL")]
    rpc_url: Option<String>,

    /// Etherscan API key, needed for transaction history
    #[arg(long, global = true, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    etherscan_api_key: Option<String>,

    /// Directory holding encrypted wallet files
    #[arg(long, global = true, env = "WALLETS_DIR", default_value = DEFAULT_WALLETS_DIR)]
    wallets_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, import or list wallets
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },

    /// Check the balance of an address
    Balance {
        /// Address to query
        address: String,

        /// ERC-20 token contract; may be repeated
        #[arg(short, long = "token")]
        tokens: Vec<String>,
    },

    /// Send ETH or an ERC-20 token
    Send {
        /// Recipient address
        to: String,

        /// Amount in whole units, e.g. 0.01
        amount: String,

        /// ERC-20 token contract to transfer instead of ETH
        #[arg(short, long)]
        token: Option<String>,

        /// Name of the saved wallet to send from
        #[arg(short, long)]
        from: Option<String>,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show transaction history
    History {
        /// Address to query
        address: String,

        /// Maximum number of transactions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Show transfers of this ERC-20 token instead
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Show network and configuration
    Info,
}

#[derive(Subcommand)]
enum WalletAction {
    /// Create a new wallet
    Create,

    /// Import a wallet from a private key or mnemonic phrase
    Import,

    /// List saved wallets
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures
            let failed = e.use_stderr();
            let _ = e.print();
            return if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Config::new(cli.network)
        .with_rpc_url(cli.rpc_url)
        .with_etherscan_api_key(cli.etherscan_api_key)
        .with_wallets_dir(cli.wallets_dir);

    let result = match cli.command {
        Commands::Wallet { action } => match action {
            WalletAction::Create => commands::wallet::create(&config).await,
            WalletAction::Import => commands::wallet::import(&config).await,
            WalletAction::List => commands::wallet::list(&config).await,
        },
        Commands::Balance { address, tokens } => {
            commands::balance::run(&config, &address, &tokens).await
        }
        Commands::Send {
            to,
            amount,
            token,
            from,
            yes,
        } => {
            commands::send::run(
                &config,
                &to,
                &amount,
                token.as_deref(),
                from.as_deref(),
                yes,
            )
            .await
        }
        Commands::History {
            address,
            limit,
            token,
        } => commands::history::run(&config, &address, limit, token.as_deref()).await,
        Commands::Info => commands::info::run(&config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(class = %error_class(&e), "Command failed");
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
