use crate::alerts::{Alert, AlertKey, Direction};
use crate::data::{AlertStatus, Event, WatchStatus};
use crate::dexscreener::{Pair, PairSource, validate_pair_address};
use crate::persistence::PreferenceStore;
use crate::tx::{SwapParams, TransactionRequest, TxBuilder};
use crate::zora::{Coin, CoinSource};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

const DEFAULT_COIN_COUNT: u32 = 100;

pub struct AppState<P: PairSource, C: CoinSource, S: PreferenceStore> {
    pub pairs: Arc<P>,
    pub coins: Arc<C>,
    pub store: Arc<S>,
    pub tx_builder: Arc<TxBuilder>,
}

impl<P: PairSource, C: CoinSource, S: PreferenceStore> Clone for AppState<P, C, S> {
    fn clone(&self) -> Self {
        AppState {
            pairs: self.pairs.clone(),
            coins: self.coins.clone(),
            store: self.store.clone(),
            tx_builder: self.tx_builder.clone(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    NotFound(&'static str),
    Upstream,
    Storage,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            ApiError::Upstream => (
                StatusCode::BAD_GATEWAY,
                "Upstream price service failed".to_string(),
            ),
            ApiError::Storage => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Preference storage failed".to_string(),
            ),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn upstream(e: anyhow::Error) -> ApiError {
    error!("Upstream request failed: {e}");
    ApiError::Upstream
}

fn storage(e: anyhow::Error) -> ApiError {
    error!("Preference store failed: {e}");
    ApiError::Storage
}

fn invalid(e: anyhow::Error) -> ApiError {
    debug!("Rejected request: {e}");
    ApiError::InvalidInput(e.to_string())
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
struct CoinsQuery {
    count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewAlert {
    pair_address: String,
    target_price: f64,
    direction: Direction,
}

#[derive(Debug, Serialize)]
struct RemovedAlerts {
    removed: usize,
}

#[derive(Debug, Deserialize)]
struct TipRequest {
    to: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    token: String,
    to: String,
    amount: String,
    decimals: u32,
}

pub fn run_web_server<P, C, S>(
    cancellation_token: CancellationToken,
    event_sender: Sender<Event>,
    state: AppState<P, C, S>,
    host: String,
    port: u32,
) -> JoinHandle<()>
where
    P: PairSource + 'static,
    C: CoinSource + 'static,
    S: PreferenceStore + 'static,
{
    let router = build_router(cancellation_token.clone(), event_sender, state);

    let _cancellation_token = cancellation_token.clone();
    let url = format!("{host}:{port}");

    tokio::spawn(async move {
        serve(_cancellation_token, router, url).await;
    })
}

pub fn build_router<P, C, S>(
    cancellation_token: CancellationToken,
    event_sender: Sender<Event>,
    state: AppState<P, C, S>,
) -> Router
where
    P: PairSource + 'static,
    C: CoinSource + 'static,
    S: PreferenceStore + 'static,
{
    let mut router = Router::new()
        .route("/api/v1/pairs/new", get(new_pairs_handler))
        .route("/api/v1/pairs/search", get(search_pairs_handler))
        .route("/api/v1/pairs/:address", get(get_pair_handler))
        .route("/api/v1/coins", get(coins_handler))
        .route("/api/v1/coins/:address", get(get_coin_handler))
        .route("/api/v1/watchlist", get(watchlist_handler))
        .route(
            "/api/v1/watchlist/:address",
            get(watch_status_handler).delete(remove_watch_handler),
        )
        .route("/api/v1/watchlist/:address/toggle", post(toggle_watch_handler))
        .route(
            "/api/v1/alerts",
            get(alerts_handler)
                .post(add_alert_handler)
                .delete(remove_alert_handler),
        )
        .route("/api/v1/tx/tip", post(tip_handler))
        .route("/api/v1/tx/transfer", post(transfer_handler))
        .route("/api/v1/tx/swap", post(swap_handler))
        .with_state(state);

    router = configure_ws(router, cancellation_token, event_sender);
    serve_static_dir(router)
}

fn serve_static_dir(router: Router) -> Router {
    router.fallback_service(ServeDir::new("static"))
}

async fn new_pairs_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
) -> Result<Json<Vec<Pair>>, ApiError> {
    let pairs = state.pairs.latest_pairs().await.map_err(upstream)?;
    Ok(Json(pairs))
}

async fn search_pairs_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Pair>>, ApiError> {
    let pairs = state.pairs.search_pairs(&query.q).await.map_err(upstream)?;
    Ok(Json(pairs))
}

async fn get_pair_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Path(address): Path<String>,
) -> Result<Json<Pair>, ApiError> {
    let address = validate_pair_address(&address).map_err(invalid)?;
    state
        .pairs
        .get_pair(address)
        .await
        .map_err(upstream)?
        .map(Json)
        .ok_or(ApiError::NotFound("Pair"))
}

async fn coins_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Query(query): Query<CoinsQuery>,
) -> Result<Json<Vec<Coin>>, ApiError> {
    let count = query
        .count
        .unwrap_or(DEFAULT_COIN_COUNT)
        .clamp(1, DEFAULT_COIN_COUNT);
    let coins = state.coins.most_valuable(count).await.map_err(upstream)?;
    Ok(Json(coins))
}

async fn get_coin_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Path(address): Path<String>,
) -> Result<Json<Coin>, ApiError> {
    state
        .coins
        .find_coin(&address)
        .await
        .map_err(upstream)?
        .map(Json)
        .ok_or(ApiError::NotFound("Coin"))
}

async fn watchlist_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
) -> Result<Json<Vec<Pair>>, ApiError> {
    let watchlist = state.store.watchlist().await.map_err(storage)?;
    let pairs = state.pairs.get_pairs(watchlist.addresses()).await;
    Ok(Json(pairs))
}

async fn watch_status_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Path(address): Path<String>,
) -> Result<Json<WatchStatus>, ApiError> {
    let watchlist = state.store.watchlist().await.map_err(storage)?;
    Ok(Json(WatchStatus {
        watched: watchlist.contains(&address),
        pair_address: address,
    }))
}

async fn toggle_watch_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Path(address): Path<String>,
) -> Result<Json<WatchStatus>, ApiError> {
    validate_pair_address(&address).map_err(invalid)?;
    let watched = state.store.toggle_watch(&address).await.map_err(storage)?;
    info!("Pair {address} watched: {watched}");
    Ok(Json(WatchStatus {
        pair_address: address,
        watched,
    }))
}

async fn remove_watch_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Path(address): Path<String>,
) -> Result<Json<WatchStatus>, ApiError> {
    if !state.store.remove_watch(&address).await.map_err(storage)? {
        return Err(ApiError::NotFound("Watched pair"));
    }
    Ok(Json(WatchStatus {
        pair_address: address,
        watched: false,
    }))
}

async fn alerts_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
) -> Result<Json<Vec<AlertStatus>>, ApiError> {
    let book = state.store.alerts().await.map_err(storage)?;
    let pairs = state.pairs.get_pairs(&book.pair_addresses()).await;

    let statuses = book
        .alerts()
        .iter()
        .map(|alert| {
            let pair = pairs
                .iter()
                .find(|p| p.pair_address.eq_ignore_ascii_case(&alert.pair_address));
            let price = pair.and_then(|p| p.price_usd());
            AlertStatus {
                alert: alert.clone(),
                met: price.as_ref().is_some_and(|p| alert.is_met(p)),
                current_price: price.map(|p| p.to_string()),
                image_url: pair.and_then(|p| p.image_url()).map(str::to_string),
            }
        })
        .collect();

    Ok(Json(statuses))
}

async fn add_alert_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Json(request): Json<NewAlert>,
) -> Result<(StatusCode, Json<Alert>), ApiError> {
    let mut alert = Alert {
        pair_address: request.pair_address.trim().to_string(),
        token_name: String::new(),
        token_symbol: String::new(),
        target_price: request.target_price,
        direction: request.direction,
    };
    alert.validate().map_err(invalid)?;
    validate_pair_address(&alert.pair_address).map_err(invalid)?;

    let pair = state
        .pairs
        .get_pair(&alert.pair_address)
        .await
        .map_err(upstream)?
        .ok_or(ApiError::NotFound("Pair"))?;
    alert.token_name = pair.base_token.name;
    alert.token_symbol = pair.base_token.symbol;

    let added = state
        .store
        .add_alert(alert.clone())
        .await
        .map_err(storage)?;
    if added {
        info!(
            "Added alert on {} {} {}",
            alert.pair_address, alert.direction, alert.target_price
        );
        Ok((StatusCode::CREATED, Json(alert)))
    } else {
        Ok((StatusCode::OK, Json(alert)))
    }
}

async fn remove_alert_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Json(key): Json<AlertKey>,
) -> Result<Json<RemovedAlerts>, ApiError> {
    let removed = state.store.remove_alert(&key).await.map_err(storage)?;
    if removed == 0 {
        return Err(ApiError::NotFound("Alert"));
    }
    Ok(Json(RemovedAlerts { removed }))
}

async fn tip_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Json(request): Json<TipRequest>,
) -> Result<Json<TransactionRequest>, ApiError> {
    let tx = state
        .tx_builder
        .tip(&request.to, &request.amount)
        .map_err(invalid)?;
    Ok(Json(tx))
}

async fn transfer_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransactionRequest>, ApiError> {
    let tx = state
        .tx_builder
        .transfer(&request.token, &request.to, &request.amount, request.decimals)
        .map_err(invalid)?;
    Ok(Json(tx))
}

async fn swap_handler(
    State(state): State<AppState<impl PairSource, impl CoinSource, impl PreferenceStore>>,
    Json(params): Json<SwapParams>,
) -> Result<Json<Vec<TransactionRequest>>, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let txs = state.tx_builder.swap(&params, now).map_err(invalid)?;
    Ok(Json(txs))
}

fn configure_ws(
    router: Router,
    cancellation_token: CancellationToken,
    event_sender: Sender<Event>,
) -> Router {
    router.route(
        "/ws/events",
        get(
            |ws: WebSocketUpgrade, ConnectInfo(addr): ConnectInfo<SocketAddr>| async move {
                debug!("Event stream requested by {addr}");
                let events = event_sender.subscribe();
                ws.on_upgrade(move |socket| stream_events(socket, events, cancellation_token, addr))
            },
        ),
    )
}

async fn stream_events(
    mut socket: WebSocket,
    mut events: Receiver<Event>,
    cancellation_token: CancellationToken,
    addr: SocketAddr,
) {
    if let Err(e) = socket.send(Message::Ping(Vec::new())).await {
        warn!("Event stream to {addr} failed before the first event: {e}");
        return;
    }
    info!("Streaming events to {addr}");

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Error serializing event: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = socket.send(Message::Text(text)).await {
                        debug!("Event stream to {addr} closed: {e}");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream to {addr} lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            },
            _ = cancellation_token.cancelled() => {
                if let Err(e) = socket.close().await {
                    debug!("Error closing event stream to {addr}: {e}");
                }
                break;
            }
        }
    }

    info!("Stopped streaming events to {addr}");
}

async fn serve(cancellation_token: CancellationToken, app: Router, addr: String) {
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Could not bind {addr}: {e}");
            return;
        }
    };
    match listener.local_addr() {
        Ok(local_addr) => info!("listening on {local_addr}"),
        Err(e) => warn!("listening on {addr}, local address unknown: {e}"),
    }

    tokio::select! {
        _ = cancellation_token.cancelled() => {
            info!("Cancellation requested, exiting...");
        }
        _ = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            info!("Server stopped");
        }
    }
}
