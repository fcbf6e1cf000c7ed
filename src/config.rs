use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;
pub const UNISWAP_V3_ROUTER: &str = "0xE592427A0AEce92De3Edee1F18E0157C05861564";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_sec: u32,
    #[serde(default = "default_dexscreener_url")]
    pub dexscreener_api_url: String,
    #[serde(default = "default_zora_url")]
    pub zora_api_url: String,
    #[serde(default)]
    pub zora_api_key: Option<String>,
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_swap_router")]
    pub swap_router: String,
}

fn default_poll_interval() -> u32 {
    30
}

fn default_dexscreener_url() -> String {
    "https://api.dexscreener.com".to_string()
}

fn default_zora_url() -> String {
    "https://api-sdk.zora.engineering".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("bdv_storage.json")
}

fn default_chain_id() -> u64 {
    BASE_SEPOLIA_CHAIN_ID
}

fn default_swap_router() -> String {
    UNISWAP_V3_ROUTER.to_string()
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let toml_str = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_str)?;

        Ok(config)
    }
}
