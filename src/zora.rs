use anyhow::bail;
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const LOOKUP_COUNT: u32 = 100;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewImage {
    pub small: Option<String>,
    pub medium: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContent {
    pub mime_type: Option<String>,
    pub preview_image: Option<PreviewImage>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coin {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub address: String,
    #[serde(default)]
    pub symbol: String,
    pub total_supply: Option<String>,
    pub total_volume: Option<String>,
    pub volume_24h: Option<String>,
    pub created_at: Option<String>,
    pub creator_address: Option<String>,
    pub market_cap: Option<String>,
    pub media_content: Option<MediaContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CoinEdge {
    node: Option<Coin>,
}

#[derive(Debug, Default, Deserialize)]
struct ExploreList {
    #[serde(default)]
    edges: Vec<CoinEdge>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExploreResponse {
    #[serde(default)]
    explore_list: Option<ExploreList>,
}

#[async_trait]
pub trait CoinSource: Send + Sync {
    async fn most_valuable(&self, count: u32) -> anyhow::Result<Vec<Coin>>;

    /// Looks the coin up among the most valuable ones, ignoring address case.
    async fn find_coin(&self, address: &str) -> anyhow::Result<Option<Coin>> {
        let coins = self.most_valuable(LOOKUP_COUNT).await?;
        Ok(coins
            .into_iter()
            .find(|c| c.address.eq_ignore_ascii_case(address.trim())))
    }
}

pub struct ZoraClient {
    client: Client,
    base_api_url: String,
    api_key: Option<String>,
}

impl ZoraClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_api_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl CoinSource for ZoraClient {
    async fn most_valuable(&self, count: u32) -> anyhow::Result<Vec<Coin>> {
        let base_url = &self.base_api_url;
        let url = format!("{base_url}/explore");
        let count = count.to_string();
        let mut request = self
            .client
            .get(&url)
            .query(&[("listType", "MOST_VALUABLE"), ("count", count.as_str())]);
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            error!("Zora returned {status} for {url}");
            bail!("Zora request failed with status {status}")
        }

        let body = response.json::<ExploreResponse>().await?;
        let coins = body
            .explore_list
            .map(|list| list.edges.into_iter().filter_map(|e| e.node).collect::<Vec<_>>())
            .unwrap_or_default();
        debug!("Fetched {} coins from Zora", coins.len());

        Ok(coins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, mock};

    const EXPLORE_BODY: &str = r#"{
        "exploreList": {
            "edges": [
                {"node": {"id": "1", "name": "Higher", "description": "up", "address": "0xAbCdEf0000000000000000000000000000000001",
                          "symbol": "HIGHER", "totalSupply": "1000000000", "totalVolume": "52.5", "volume24h": "3.1",
                          "marketCap": "120000.5", "createdAt": "2025-04-01T10:00:00Z",
                          "mediaContent": {"previewImage": {"medium": "https://img/higher.png"}}}},
                {"node": {"id": "2", "name": "Enjoy", "description": "", "address": "0x0000000000000000000000000000000000000002",
                          "symbol": "ENJOY"}},
                {"node": null}
            ],
            "pageInfo": {"hasNextPage": false}
        }
    }"#;

    #[tokio::test]
    async fn test_most_valuable() {
        let _m = mock("GET", "/explore")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("listType".into(), "MOST_VALUABLE".into()),
                Matcher::UrlEncoded("count".into(), "10".into()),
            ]))
            .match_header("api-key", "zora-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(EXPLORE_BODY)
            .create();

        let client = ZoraClient::new(mockito::server_url(), Some("zora-key".to_string()));
        let coins = client.most_valuable(10).await.unwrap();

        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].symbol, "HIGHER");
        assert_eq!(coins[0].total_volume.as_deref(), Some("52.5"));
        let preview = coins[0]
            .media_content
            .as_ref()
            .and_then(|m| m.preview_image.as_ref())
            .and_then(|p| p.medium.as_deref());
        assert_eq!(preview, Some("https://img/higher.png"));
        assert!(coins[1].market_cap.is_none());
    }

    #[tokio::test]
    async fn test_find_coin_ignores_case() {
        let _m = mock("GET", "/explore")
            .match_query(Matcher::UrlEncoded("count".into(), "100".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(EXPLORE_BODY)
            .create();

        let client = ZoraClient::new(mockito::server_url(), None);
        let coin = client
            .find_coin("0xabcdef0000000000000000000000000000000001")
            .await
            .unwrap();

        assert_eq!(coin.map(|c| c.name), Some("Higher".to_string()));
    }

    #[tokio::test]
    async fn test_missing_explore_list_is_empty() {
        let _m = mock("GET", "/explore")
            .match_query(Matcher::UrlEncoded("count".into(), "7".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create();

        let client = ZoraClient::new(mockito::server_url(), None);
        assert!(client.most_valuable(7).await.unwrap().is_empty());
    }
}
