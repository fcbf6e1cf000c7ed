use crate::alerts::Alert;
use crate::dexscreener::Pair;
use serde::{Deserialize, Serialize};

/// Pushed to websocket subscribers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    WatchlistSnapshot {
        timestamp: u64,
        pairs: Vec<Pair>,
    },
    AlertTriggered {
        timestamp: u64,
        alert: Alert,
        price: String,
    },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStatus {
    #[serde(flatten)]
    pub alert: Alert,
    pub current_price: Option<String>,
    pub image_url: Option<String>,
    pub met: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStatus {
    pub pair_address: String,
    pub watched: bool,
}
