use crate::alerts::{Alert, AlertBook, AlertKey};
use crate::watchlist::Watchlist;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

pub const WATCHLIST_KEY: &str = "bdv_watchlist";
pub const ALERTS_KEY: &str = "bdv_alerts";

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn watchlist(&self) -> anyhow::Result<Watchlist>;
    async fn toggle_watch(&self, pair_address: &str) -> anyhow::Result<bool>;
    async fn remove_watch(&self, pair_address: &str) -> anyhow::Result<bool>;
    async fn alerts(&self) -> anyhow::Result<AlertBook>;
    async fn add_alert(&self, alert: Alert) -> anyhow::Result<bool>;
    async fn remove_alert(&self, key: &AlertKey) -> anyhow::Result<usize>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Preferences {
    pub watchlist: Watchlist,
    pub alerts: AlertBook,
}

impl Preferences {
    /// Storage maps keys to JSON text, the way browser local storage does.
    fn from_storage(storage: &BTreeMap<String, String>) -> Self {
        Self {
            watchlist: read_key(storage, WATCHLIST_KEY),
            alerts: read_key(storage, ALERTS_KEY),
        }
    }

    fn to_storage(&self) -> anyhow::Result<BTreeMap<String, String>> {
        let mut storage = BTreeMap::new();
        storage.insert(
            WATCHLIST_KEY.to_string(),
            serde_json::to_string(&self.watchlist)?,
        );
        storage.insert(ALERTS_KEY.to_string(), serde_json::to_string(&self.alerts)?);
        Ok(storage)
    }
}

fn read_key<T: DeserializeOwned + Default>(storage: &BTreeMap<String, String>, key: &str) -> T {
    match storage.get(key) {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!("Stored value for {key} is unreadable, starting empty: {e}");
            T::default()
        }),
        None => T::default(),
    }
}

async fn load_preferences(path: &Path) -> anyhow::Result<Preferences> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No preference file at {}, starting empty", path.display());
            return Ok(Preferences::default());
        }
        Err(e) => return Err(e.into()),
    };

    let storage = serde_json::from_str::<BTreeMap<String, String>>(&raw).unwrap_or_else(|e| {
        warn!("Preference file {} is unreadable, starting empty: {e}", path.display());
        BTreeMap::new()
    });
    Ok(Preferences::from_storage(&storage))
}

async fn write_preferences(path: &Path, preferences: &Preferences) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(&preferences.to_storage()?)?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, body).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Preferences held in memory and mirrored to a JSON file by a writer actor.
pub struct JsonFileStore {
    state: Mutex<Preferences>,
    actor_sender: Sender<Preferences>,
}

impl JsonFileStore {
    pub async fn new(cancellation_token: CancellationToken, path: PathBuf) -> anyhow::Result<Self> {
        let preferences = load_preferences(&path).await?;
        let actor = StoreWriterActor::new(cancellation_token, path);
        let actor_sender = actor.run().await?;

        Ok(Self {
            state: Mutex::new(preferences),
            actor_sender,
        })
    }

    /// Applies `f` to the state and queues the result for writing when it changed something.
    async fn mutate<R: Send>(
        &self,
        f: impl FnOnce(&mut Preferences) -> anyhow::Result<R> + Send,
    ) -> anyhow::Result<R> {
        let mut state = self.state.lock().await;
        let before = state.clone();
        let result = f(&mut state)?;

        if *state != before {
            self.actor_sender.send(state.clone()).await.map_err(|e| {
                error!("Failed to send preferences to writer: {e}");
                anyhow::anyhow!("Failed to send preferences to writer")
            })?;
        }
        Ok(result)
    }
}

#[async_trait]
impl PreferenceStore for JsonFileStore {
    async fn watchlist(&self) -> anyhow::Result<Watchlist> {
        Ok(self.state.lock().await.watchlist.clone())
    }

    async fn toggle_watch(&self, pair_address: &str) -> anyhow::Result<bool> {
        self.mutate(|p| Ok(p.watchlist.toggle(pair_address))).await
    }

    async fn remove_watch(&self, pair_address: &str) -> anyhow::Result<bool> {
        self.mutate(|p| Ok(p.watchlist.remove(pair_address))).await
    }

    async fn alerts(&self) -> anyhow::Result<AlertBook> {
        Ok(self.state.lock().await.alerts.clone())
    }

    async fn add_alert(&self, alert: Alert) -> anyhow::Result<bool> {
        self.mutate(|p| p.alerts.add(alert)).await
    }

    async fn remove_alert(&self, key: &AlertKey) -> anyhow::Result<usize> {
        self.mutate(|p| Ok(p.alerts.remove(key))).await
    }
}

struct StoreWriterActor {
    cancellation_token: CancellationToken,
    path: PathBuf,
}

impl StoreWriterActor {
    pub fn new(cancellation_token: CancellationToken, path: PathBuf) -> Self {
        Self {
            cancellation_token,
            path,
        }
    }

    pub async fn run(&self) -> anyhow::Result<Sender<Preferences>> {
        let (sender, mut receiver) = tokio::sync::mpsc::channel::<Preferences>(100);

        let cancellation_token = self.cancellation_token.clone();
        let path = self.path.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = receiver.recv() => {
                        let Some(mut preferences) = received else {
                            debug!("Preference store dropped, stopping writer");
                            break;
                        };
                        // Only the newest snapshot matters.
                        while let Ok(newer) = receiver.try_recv() {
                            preferences = newer;
                        }
                        debug!("Writing preferences to {}", path.display());
                        if let Err(e) = write_preferences(&path, &preferences).await {
                            error!("Failed to write preferences: {e}");
                        }
                    }
                    _ = cancellation_token.cancelled() => {
                        info!("Cancellation requested, stopping preference writer...");
                        break;
                    }
                }
            }
        });

        Ok(sender)
    }
}
