use anyhow::bail;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use futures_util::future::join_all;
use log::{debug, error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const BASE_CHAIN_ID: &str = "base";
const MIN_SEARCH_LEN: usize = 2;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairToken {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
    pub base: Option<f64>,
    pub quote: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairInfo {
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    #[serde(default)]
    pub chain_id: String,
    #[serde(default)]
    pub dex_id: String,
    pub url: Option<String>,
    pub pair_address: String,
    #[serde(default)]
    pub base_token: PairToken,
    #[serde(default)]
    pub quote_token: PairToken,
    pub price_native: Option<String>,
    pub price_usd: Option<String>,
    #[serde(default)]
    pub price_change: PriceChange,
    pub volume: Option<PriceChange>,
    pub liquidity: Option<Liquidity>,
    pub fdv: Option<f64>,
    pub market_cap: Option<f64>,
    pub pair_created_at: Option<i64>,
    pub info: Option<PairInfo>,
}

impl Pair {
    /// USD price, `None` when DexScreener did not report one or it is not a number.
    pub fn price_usd(&self) -> Option<BigDecimal> {
        self.price_usd
            .as_deref()
            .and_then(|p| BigDecimal::from_str(p.trim()).ok())
    }

    pub fn image_url(&self) -> Option<&str> {
        self.info.as_ref().and_then(|i| i.image_url.as_deref())
    }
}

/// Pair addresses are interpolated into DexScreener paths, so only plain alphanumerics pass.
pub fn validate_pair_address(pair_address: &str) -> anyhow::Result<&str> {
    let pair_address = pair_address.trim();
    if pair_address.is_empty() {
        bail!("pair address is required");
    }
    if !pair_address.chars().all(|c| c.is_ascii_alphanumeric()) {
        bail!("pair address {pair_address} must be alphanumeric");
    }
    Ok(pair_address)
}

#[derive(Debug, Deserialize)]
struct PairsResponse {
    #[serde(default)]
    pairs: Option<Vec<Pair>>,
}

#[async_trait]
pub trait PairSource: Send + Sync {
    async fn search_pairs(&self, query: &str) -> anyhow::Result<Vec<Pair>>;
    async fn get_pair(&self, pair_address: &str) -> anyhow::Result<Option<Pair>>;
    async fn latest_pairs(&self) -> anyhow::Result<Vec<Pair>>;

    /// Resolves every address, dropping the ones that fail or are unknown.
    async fn get_pairs(&self, pair_addresses: &[String]) -> Vec<Pair> {
        let results = join_all(pair_addresses.iter().map(|a| self.get_pair(a))).await;

        results
            .into_iter()
            .zip(pair_addresses)
            .filter_map(|(result, address)| match result {
                Ok(Some(pair)) => Some(pair),
                Ok(None) => {
                    debug!("Pair {address} not found");
                    None
                }
                Err(e) => {
                    warn!("Error fetching pair {address}: {e}");
                    None
                }
            })
            .collect()
    }
}

pub struct DexScreenerClient {
    client: Client,
    base_api_url: String,
}

impl DexScreenerClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_api_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_pairs(&self, url: &str, query: &[(&str, &str)]) -> anyhow::Result<Vec<Pair>> {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            error!("DexScreener returned {status} for {url}");
            bail!("DexScreener request failed with status {status}")
        }

        let body = response.json::<PairsResponse>().await?;
        Ok(body.pairs.unwrap_or_default())
    }
}

#[async_trait]
impl PairSource for DexScreenerClient {
    async fn search_pairs(&self, query: &str) -> anyhow::Result<Vec<Pair>> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LEN {
            return Ok(vec![]);
        }

        let base_url = &self.base_api_url;
        let url = format!("{base_url}/latest/dex/search");
        let pairs = self.fetch_pairs(&url, &[("q", query)]).await?;

        Ok(pairs
            .into_iter()
            .filter(|p| p.chain_id == BASE_CHAIN_ID)
            .collect())
    }

    async fn get_pair(&self, pair_address: &str) -> anyhow::Result<Option<Pair>> {
        let pair_address = validate_pair_address(pair_address)?;
        let base_url = &self.base_api_url;
        let url = format!("{base_url}/latest/dex/pairs/{BASE_CHAIN_ID}/{pair_address}");
        let pairs = self.fetch_pairs(&url, &[]).await?;

        Ok(pairs.into_iter().next())
    }

    async fn latest_pairs(&self) -> anyhow::Result<Vec<Pair>> {
        let base_url = &self.base_api_url;
        let url = format!("{base_url}/latest/dex/pairs/{BASE_CHAIN_ID}");
        let mut pairs = self.fetch_pairs(&url, &[]).await?;

        sort_newest_first(&mut pairs);
        Ok(pairs)
    }
}

fn sort_newest_first(pairs: &mut [Pair]) {
    pairs.sort_by(|a, b| {
        b.pair_created_at
            .unwrap_or(0)
            .cmp(&a.pair_created_at.unwrap_or(0))
    });
}
