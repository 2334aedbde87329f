//! Wallet configuration.
//!
//! Everything the wallet needs to know about its environment is carried in
//! an explicit [`Config`]; nothing is read from globals. The binary fills
//! it from command-line flags with environment-variable fallbacks.

use std::{fmt, path::PathBuf};
use tw_crypto_secp256k1::Address;

use crate::chain::TxHash;
use crate::tracker::TrackerConfig;
use crate::vault::KdfParams;

/// Default wallets directory, relative to the working directory.
pub const DEFAULT_WALLETS_DIR: &str = "./wallets";

/// Supported networks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Network {
    #[default]
    Sepolia,
    Goerli,
    Mainnet,
}

/// Static parameters of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub name: &'static str,
    pub chain_id: u64,
    pub default_rpc_url: &'static str,
    pub explorer_url: &'static str,
    pub currency: &'static str,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Sepolia, Network::Goerli, Network::Mainnet];

    pub fn params(&self) -> NetworkParams {
        match self {
            Network::Sepolia => NetworkParams {
                name: "Sepolia Testnet",
                chain_id: 11155111,
                default_rpc_url: "https://rpc.sepolia.org",
                explorer_url: "https://sepolia.etherscan.io",
                currency: "ETH",
            },
            Network::Goerli => NetworkParams {
                name: "Goerli Testnet",
                chain_id: 5,
                default_rpc_url: "https://rpc.goerli.eth.gateway.fm",
                explorer_url: "https://goerli.etherscan.io",
                currency: "ETH",
            },
            Network::Mainnet => NetworkParams {
                name: "Ethereum Mainnet",
                chain_id: 1,
                default_rpc_url: "https://eth.llamarpc.com",
                explorer_url: "https://etherscan.io",
                currency: "ETH",
            },
        }
    }

    /// Identifier used on the command line and in `NETWORK`.
    pub fn id(&self) -> &'static str {
        match self {
            Network::Sepolia => "sepolia",
            Network::Goerli => "goerli",
            Network::Mainnet => "mainnet",
        }
    }

    pub fn is_testnet(&self) -> bool {
        !matches!(self, Network::Mainnet)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub network: Network,
    pub rpc_url: String,
    pub etherscan_api_key: Option<String>,
    pub wallets_dir: PathBuf,
    pub tracker: TrackerConfig,
    pub kdf: KdfParams,
}

impl Config {
    /// Defaults for `network`.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            rpc_url: network.params().default_rpc_url.to_string(),
            etherscan_api_key: None,
            wallets_dir: PathBuf::from(DEFAULT_WALLETS_DIR),
            tracker: TrackerConfig::default(),
            kdf: KdfParams::default(),
        }
    }

    /// Override the RPC URL. Empty values keep the network default.
    pub fn with_rpc_url(mut self, rpc_url: Option<String>) -> Self {
        if let Some(url) = rpc_url.filter(|u| !u.trim().is_empty()) {
            self.rpc_url = url;
        }
        self
    }

    /// Set the Etherscan API key. Empty values count as unset.
    pub fn with_etherscan_api_key(mut self, key: Option<String>) -> Self {
        self.etherscan_api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_wallets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.wallets_dir = dir.into();
        self
    }

    pub fn params(&self) -> NetworkParams {
        self.network.params()
    }

    pub fn currency(&self) -> &'static str {
        self.params().currency
    }

    pub fn has_history_credentials(&self) -> bool {
        self.etherscan_api_key.is_some()
    }

    pub fn explorer_tx_url(&self, hash: &TxHash) -> String {
        format!("{}/tx/{}", self.params().explorer_url, hash)
    }

    pub fn explorer_address_url(&self, address: &Address) -> String {
        format!("{}/address/{}", self.params().explorer_url, address)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Network::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_params() {
        assert_eq!(Network::Sepolia.params().chain_id, 11155111);
        assert_eq!(Network::Goerli.params().chain_id, 5);
        assert_eq!(Network::Mainnet.params().chain_id, 1);
        assert_eq!(Network::Mainnet.params().explorer_url, "https://etherscan.io");
        assert!(Network::ALL.iter().all(|n| n.params().currency == "ETH"));
    }

    #[test]
    fn test_network_cli_values() {
        use clap::ValueEnum;

        assert_eq!(Network::from_str("sepolia", false), Ok(Network::Sepolia));
        assert_eq!(Network::from_str("MAINNET", true), Ok(Network::Mainnet));
        assert!(Network::from_str("ropsten", true).is_err());
        for network in Network::ALL {
            assert_eq!(Network::from_str(network.id(), false), Ok(network));
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network, Network::Sepolia);
        assert_eq!(config.rpc_url, "https://rpc.sepolia.org");
        assert_eq!(config.wallets_dir, PathBuf::from("./wallets"));
        assert!(!config.has_history_credentials());
    }

    #[test]
    fn test_overrides() {
        let config = Config::new(Network::Mainnet)
            .with_rpc_url(Some("http://localhost:8545".into()))
            .with_etherscan_api_key(Some("KEY".into()))
            .with_wallets_dir("/tmp/w");
        assert_eq!(config.rpc_url, "http://localhost:8545");
        assert!(config.has_history_credentials());
        assert_eq!(config.wallets_dir, PathBuf::from("/tmp/w"));

        let blank = Config::new(Network::Mainnet)
            .with_rpc_url(Some("".into()))
            .with_etherscan_api_key(Some(" ".into()));
        assert_eq!(blank.rpc_url, "https://eth.llamarpc.com");
        assert!(!blank.has_history_credentials());
    }

    #[test]
    fn test_explorer_urls() {
        let config = Config::new(Network::Sepolia);
        let hash = TxHash([0xab; 32]);
        assert_eq!(
            config.explorer_tx_url(&hash),
            format!("https://sepolia.etherscan.io/tx/0x{}", "ab".repeat(32))
        );
        let address = Address::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(
            config.explorer_address_url(&address),
            "https://sepolia.etherscan.io/address/0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }
}
