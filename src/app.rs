use crate::alerts::AlertMonitor;
use crate::config::Config;
use crate::data::Event;
use crate::dexscreener::PairSource;
use crate::persistence::PreferenceStore;
use crate::tx::TxBuilder;
use crate::web::{AppState, run_web_server};
use crate::zora::CoinSource;
use bigdecimal::BigDecimal;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::Sender;
use tokio_util::sync::CancellationToken;

pub struct App<P: PairSource, C: CoinSource, S: PreferenceStore> {
    config: Config,
    pairs: Arc<P>,
    coins: Arc<C>,
    store: Arc<S>,
    tx_builder: Arc<TxBuilder>,
    event_sender: Sender<Event>,
    monitor: AlertMonitor,
}

impl<P, C, S> App<P, C, S>
where
    P: PairSource + 'static,
    C: CoinSource + 'static,
    S: PreferenceStore + 'static,
{
    pub fn new(config: Config, pairs: Arc<P>, coins: Arc<C>, store: Arc<S>) -> anyhow::Result<Self> {
        let tx_builder = Arc::new(TxBuilder::new(config.chain_id, &config.swap_router)?);
        let (event_sender, _event_receiver) = tokio::sync::broadcast::channel::<Event>(100);

        Ok(Self {
            config,
            pairs,
            coins,
            store,
            tx_builder,
            event_sender,
            monitor: AlertMonitor::default(),
        })
    }

    pub async fn run(&mut self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let poll_duration = std::time::Duration::from_secs(self.config.poll_interval_sec as u64);
        let mut poll_interval = tokio::time::interval(poll_duration);

        let state = AppState {
            pairs: self.pairs.clone(),
            coins: self.coins.clone(),
            store: self.store.clone(),
            tx_builder: self.tx_builder.clone(),
        };
        let server_fut = run_web_server(
            cancellation_token.clone(),
            self.event_sender.clone(),
            state,
            self.config.host.clone(),
            self.config.port,
        );

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Cancellation requested, exiting...");
                    break;
                }
                _ = poll_interval.tick() => {
                    self.poll_once().await;
                },
            }
        }

        server_fut.await?;

        Ok(())
    }

    async fn poll_once(&mut self) {
        let timestamp = chrono::Utc::now().timestamp() as u64;

        match self.store.watchlist().await {
            Ok(watchlist) => {
                let pairs = self.pairs.get_pairs(watchlist.addresses()).await;
                debug!("Refreshed {} watched pairs", pairs.len());
                self.publish(Event::WatchlistSnapshot { timestamp, pairs });
            }
            Err(e) => error!("Error loading watchlist: {e}"),
        }

        let book = match self.store.alerts().await {
            Ok(book) => book,
            Err(e) => {
                error!("Error loading alerts: {e}");
                return;
            }
        };
        if book.is_empty() {
            return;
        }

        let addresses = book.pair_addresses();
        let pairs = self.pairs.get_pairs(&addresses).await;
        let prices: HashMap<String, BigDecimal> = addresses
            .into_iter()
            .filter_map(|address| {
                pairs
                    .iter()
                    .find(|p| p.pair_address.eq_ignore_ascii_case(&address))
                    .and_then(|p| p.price_usd())
                    .map(|price| (address, price))
            })
            .collect();

        for (alert, price) in self.monitor.check(&book, &prices) {
            info!(
                "Alert triggered: {} {} {} (price {price})",
                alert.token_symbol, alert.direction, alert.target_price
            );
            self.publish(Event::AlertTriggered {
                timestamp,
                alert,
                price: price.to_string(),
            });
        }
    }

    fn publish(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event) {
            debug!("No subscribers for event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{Alert, Direction};
    use crate::dexscreener::{Pair, PairToken};
    use crate::persistence::JsonFileStore;
    use crate::zora::Coin;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tokio::sync::Mutex;
    use tracing_unwrap::ResultExt;

    struct MockPairSource {
        pub prices: Mutex<HashMap<String, String>>,
    }

    impl MockPairSource {
        pub fn with_price(address: &str, price: &str) -> Self {
            Self {
                prices: Mutex::new(HashMap::from([(address.to_string(), price.to_string())])),
            }
        }

        fn pair(address: &str, price: &str) -> Pair {
            Pair {
                chain_id: "base".to_string(),
                pair_address: address.to_string(),
                base_token: PairToken {
                    address: "0xbase".to_string(),
                    name: "Brett".to_string(),
                    symbol: "BRETT".to_string(),
                },
                price_usd: Some(price.to_string()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PairSource for MockPairSource {
        async fn search_pairs(&self, _query: &str) -> anyhow::Result<Vec<Pair>> {
            Ok(vec![])
        }

        async fn get_pair(&self, pair_address: &str) -> anyhow::Result<Option<Pair>> {
            Ok(self
                .prices
                .lock()
                .await
                .get(pair_address)
                .map(|price| Self::pair(pair_address, price)))
        }

        async fn latest_pairs(&self) -> anyhow::Result<Vec<Pair>> {
            Ok(vec![])
        }
    }

    struct NoCoins;

    #[async_trait]
    impl CoinSource for NoCoins {
        async fn most_valuable(&self, _count: u32) -> anyhow::Result<Vec<Coin>> {
            Ok(vec![])
        }
    }

    fn test_config(storage_path: PathBuf) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            poll_interval_sec: 1,
            dexscreener_api_url: "".to_string(),
            zora_api_url: "".to_string(),
            zora_api_key: None,
            storage_path,
            chain_id: crate::config::BASE_SEPOLIA_CHAIN_ID,
            swap_router: crate::config::UNISWAP_V3_ROUTER.to_string(),
        }
    }

    fn above(pair: &str, target: f64) -> Alert {
        Alert {
            pair_address: pair.to_string(),
            token_name: "Brett".to_string(),
            token_symbol: "BRETT".to_string(),
            target_price: target,
            direction: Direction::Above,
        }
    }

    #[tokio::test]
    async fn test_poll_publishes_snapshot_and_triggers_once() {
        let dir = tempfile::tempdir().unwrap_or_log();
        let token = CancellationToken::new();
        let store = Arc::new(
            JsonFileStore::new(token.clone(), dir.path().join("prefs.json"))
                .await
                .unwrap_or_log(),
        );
        store.toggle_watch("0xpair").await.unwrap_or_log();
        store.add_alert(above("0xpair", 1.0)).await.unwrap_or_log();

        let pairs = Arc::new(MockPairSource::with_price("0xpair", "2.5"));
        let mut app = App::new(
            test_config(dir.path().join("prefs.json")),
            pairs.clone(),
            Arc::new(NoCoins),
            store.clone(),
        )
        .unwrap_or_log();
        let mut events = app.event_sender.subscribe();

        app.poll_once().await;
        match events.try_recv().unwrap_or_log() {
            Event::WatchlistSnapshot { pairs, .. } => {
                assert_eq!(pairs.len(), 1);
                assert_eq!(pairs[0].pair_address, "0xpair");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match events.try_recv().unwrap_or_log() {
            Event::AlertTriggered { alert, price, .. } => {
                assert_eq!(alert.target_price, 1.0);
                assert_eq!(price, "2.5");
            }
            other => panic!("unexpected event {other:?}"),
        }

        app.poll_once().await;
        assert!(matches!(
            events.try_recv().unwrap_or_log(),
            Event::WatchlistSnapshot { .. }
        ));
        assert!(events.try_recv().is_err());

        pairs
            .prices
            .lock()
            .await
            .insert("0xpair".to_string(), "0.5".to_string());
        app.poll_once().await;
        pairs
            .prices
            .lock()
            .await
            .insert("0xpair".to_string(), "1.5".to_string());
        app.poll_once().await;
        let triggered = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| matches!(e, Event::AlertTriggered { .. }))
            .count();
        assert_eq!(triggered, 1);

        assert!(store.remove_watch("0xpair").await.unwrap_or_log());
        app.poll_once().await;
        match events.try_recv().unwrap_or_log() {
            Event::WatchlistSnapshot { pairs, .. } => assert!(pairs.is_empty()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let dir = tempfile::tempdir().unwrap_or_log();
        let token = CancellationToken::new();
        let store = Arc::new(
            JsonFileStore::new(token.clone(), dir.path().join("prefs.json"))
                .await
                .unwrap_or_log(),
        );
        store.toggle_watch("0xpair").await.unwrap_or_log();

        let mut app = App::new(
            test_config(dir.path().join("prefs.json")),
            Arc::new(MockPairSource::with_price("0xpair", "1")),
            Arc::new(NoCoins),
            store,
        )
        .unwrap_or_log();
        let mut events = app.event_sender.subscribe();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            cancel.cancel();
        });

        app.run(token).await.unwrap_or_log();
        assert!(matches!(
            events.try_recv().unwrap_or_log(),
            Event::WatchlistSnapshot { .. }
        ));
    }
}
