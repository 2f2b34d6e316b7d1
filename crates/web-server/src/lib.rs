// In crates/web-server/src/lib.rs

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
};
use app_config::ServerSettings;
use core_types::{AccountId, PositionId, Symbol};
use events::LedgerEvent;
use execution::{AmendPosition, CloseOutcome, OpenPosition, TradeLedger};
use futures::stream::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use types::{
    CloseResponse, DashboardResponse, FundsAction, FundsRequest, FundsResponse, MarginRateRequest,
    PositionView, QuoteParams, QuoteResponse, TotalsResponse,
};

pub mod error;
pub mod types;

// Re-export our custom error type for convenience.
pub use error::{Error, Result};

/// Header naming the account on whose behalf an operator request is made.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// The maximum number of events kept for replay to newly connected websocket clients.
const WS_CACHE_SIZE: usize = 200;

type WsCache = Arc<Mutex<VecDeque<LedgerEvent>>>;

/// The shared application state that is available to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: TradeLedger,
    ws_cache: WsCache,
}

impl AppState {
    pub fn new(ledger: TradeLedger) -> Self {
        Self {
            ledger,
            ws_cache: Arc::new(Mutex::new(VecDeque::with_capacity(WS_CACHE_SIZE))),
        }
    }

    fn recent_events(&self) -> Vec<LedgerEvent> {
        let cache = self.ws_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.iter().cloned().collect()
    }

    fn remember(&self, event: LedgerEvent) {
        let mut cache = self.ws_cache.lock().unwrap_or_else(|e| e.into_inner());
        if cache.len() == WS_CACHE_SIZE {
            cache.pop_front();
        }
        cache.push_back(event);
    }
}

/// Creates the main application router with all routes and middleware.
pub fn create_router(app_state: AppState) -> Router {
    // In a production environment, you would restrict the origin to your actual frontend domain.
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let api_router = Router::new()
        .route("/quotes", get(get_quote_handler))
        .route("/accounts/{account_id}/trades", post(open_trade_handler))
        .route("/accounts/{account_id}/dashboard", get(dashboard_handler))
        .route("/accounts/{account_id}/totals", get(totals_handler))
        .route("/accounts/{account_id}/funds", post(funds_handler))
        .route("/accounts/{account_id}/margin-rate", put(margin_rate_handler))
        .route("/trades/{trade_id}/close", post(close_trade_handler))
        .route("/trades/{trade_id}/amend", post(amend_trade_handler));

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check_handler))
        .nest("/api", api_router)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn health_check_handler() -> &'static str {
    "OK"
}

/// `GET /api/quotes?symbol=EUR/USD`. A query parameter, since pair symbols contain a slash.
async fn get_quote_handler(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<QuoteResponse>> {
    let symbol = Symbol::parse(&params.symbol).map_err(execution::Error::from)?;
    let price = state.ledger.get_price(symbol.as_str()).await?;
    Ok(Json(QuoteResponse { symbol, price }))
}

async fn open_trade_handler(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
    Json(request): Json<OpenPosition>,
) -> Result<(StatusCode, Json<PositionView>)> {
    let position = state.ledger.open_position(account_id, request).await?;
    Ok((StatusCode::CREATED, Json(PositionView::from(&position))))
}

async fn close_trade_handler(
    State(state): State<AppState>,
    Path(trade_id): Path<PositionId>,
) -> Result<Json<CloseResponse>> {
    let outcome = state.ledger.close_position(trade_id).await?;
    Ok(Json(CloseResponse {
        closed_now: matches!(outcome, CloseOutcome::Closed(_)),
        position: PositionView::from(outcome.position()),
    }))
}

/// Revalues the account's open positions and returns the marked-to-market view.
async fn dashboard_handler(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<DashboardResponse>> {
    let valuation = state.ledger.revalue_account(account_id).await?;
    Ok(Json(valuation.into()))
}

async fn totals_handler(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<TotalsResponse>> {
    let totals = state.ledger.compute_account_totals(account_id).await?;
    Ok(Json(totals.into()))
}

async fn funds_handler(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
    headers: HeaderMap,
    Json(request): Json<FundsRequest>,
) -> Result<Json<FundsResponse>> {
    let actor = actor_id(&headers)?;
    let movement = match request.action {
        FundsAction::Deposit => state.ledger.deposit(actor, account_id, request.amount).await?,
        FundsAction::Withdraw => state.ledger.withdraw(actor, account_id, request.amount).await?,
    };
    Ok(Json(FundsResponse { movement }))
}

async fn amend_trade_handler(
    State(state): State<AppState>,
    Path(trade_id): Path<PositionId>,
    headers: HeaderMap,
    Json(amendment): Json<AmendPosition>,
) -> Result<Json<PositionView>> {
    let actor = actor_id(&headers)?;
    let position = state.ledger.amend_position(actor, trade_id, amendment).await?;
    Ok(Json(PositionView::from(&position)))
}

async fn margin_rate_handler(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
    Json(request): Json<MarginRateRequest>,
) -> Result<StatusCode> {
    state.ledger.set_margin_rate(account_id, request.margin_rate).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn actor_id(headers: &HeaderMap) -> Result<AccountId> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| Error::BadRequest(format!("missing or malformed {ACTOR_HEADER} header")))
}

/// The handler for `GET /ws`.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Replays recent ledger events, then streams live ones until the client goes away.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    tracing::info!("New WebSocket client connected.");

    for event in state.recent_events() {
        if send_event(&mut socket, &event).await.is_err() {
            tracing::info!("WebSocket client disconnected during replay.");
            return;
        }
    }

    let mut rx = state.ledger.subscribe();
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        tracing::info!("WebSocket client disconnected.");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "WebSocket client lagged behind the event stream.");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::info!("WebSocket client connection closed.");
}

async fn send_event(socket: &mut WebSocket, event: &LedgerEvent) -> std::result::Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize ledger event.");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

/// Keeps the replay cache filled with the most recent ledger events.
fn spawn_event_recorder(state: AppState, shutdown: CancellationToken) {
    let mut rx = state.ledger.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => state.remember(event),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });
}

/// The main entry point for running the web server.
///
/// Serves until `shutdown` is cancelled, then drains in-flight requests.
pub async fn run(settings: &ServerSettings, state: AppState, shutdown: CancellationToken) -> Result<()> {
    spawn_event_recorder(state.clone(), shutdown.clone());
    let app = create_router(state);

    let address = format!("{}:{}", settings.host, settings.port);
    let listener = TcpListener::bind(&address).await.map_err(Error::ServerBindError)?;
    tracing::info!(%address, "Web server listening.");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(Error::ServeError)?;

    tracing::info!("Web server stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::PriceSource;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use database::{Db, NewAccount};
    use market_data::{ManualClock, QuoteStore};
    use risk::{MarginTiers, PnlEngine};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    /// Quotes AAPL at 100 and EUR/USD at 1.085; everything else is unavailable.
    struct FixedMarket;

    #[async_trait]
    impl PriceSource for FixedMarket {
        async fn fetch(&self, symbol: &Symbol) -> api_client::Result<Decimal> {
            match symbol.as_str() {
                "AAPL" => Ok(dec!(100)),
                "EUR/USD" => Ok(dec!(1.085)),
                _ => Err(api_client::Error::MissingPrice),
            }
        }
    }

    struct TestApp {
        router: Router,
        client: AccountId,
        desk: AccountId,
    }

    fn test_app() -> TestApp {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (tx, _) = broadcast::channel(16);
        let quotes = QuoteStore::new(Arc::new(FixedMarket), clock.clone(), Duration::from_secs(300));
        let db = Db::in_memory();
        let client = db.create_account(NewAccount::regular("client", dec!(1000)), Utc::now()).id;
        let desk = db.create_account(NewAccount::admin("desk"), Utc::now()).id;
        let ledger = TradeLedger::new(db, quotes, PnlEngine::default(), MarginTiers::default(), clock, tx);

        TestApp {
            router: create_router(AppState::new(ledger)),
            client,
            desk,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();

        let (status, body) = send(&app.router, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_quote_lookup_accepts_pair_symbols() {
        let app = test_app();

        let (status, body) = send(&app.router, get("/api/quotes?symbol=eur%2Fusd")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "EUR/USD");
        assert_eq!(body["price"], "1.085");
    }

    #[tokio::test]
    async fn test_unavailable_quote_is_bad_gateway() {
        let app = test_app();

        let (status, body) = send(&app.router, get("/api/quotes?symbol=NOPE")).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("NOPE"));
    }

    #[tokio::test]
    async fn test_open_then_close_trade() {
        let app = test_app();

        let (status, opened) = send(
            &app.router,
            post_json(
                &format!("/api/accounts/{}/trades", app.client),
                json!({ "symbol": "AAPL", "side": "buy", "quantity": "2" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(opened["margin_used"], "200.00");
        assert_eq!(opened["pnl"], "0.00");

        let trade_id = opened["id"].as_u64().unwrap();
        let close_uri = format!("/api/trades/{trade_id}/close");
        let (status, closed) = send(&app.router, post_json(&close_uri, json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed["closed_now"], true);
        assert_eq!(closed["position"]["status"], "closed");

        let (status, again) = send(&app.router, post_json(&close_uri, json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["closed_now"], false);

        let (_, totals) = send(&app.router, get(&format!("/api/accounts/{}/totals", app.client))).await;
        assert_eq!(totals["closed_count"], 1);
        assert_eq!(totals["balance"], "800.00");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = test_app();
        let trades = format!("/api/accounts/{}/trades", app.client);

        let (bad_side, _) = send(&app.router, post_json(&trades, json!({ "symbol": "AAPL", "side": "hold", "quantity": 1 }))).await;
        let (too_big, _) = send(&app.router, post_json(&trades, json!({ "symbol": "AAPL", "side": "buy", "quantity": 50 }))).await;
        let (missing, _) = send(&app.router, post_json("/api/trades/404/close", json!({}))).await;

        assert_eq!(bad_side, StatusCode::BAD_REQUEST);
        assert_eq!(too_big, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(missing, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_funds_require_admin_actor() {
        let app = test_app();
        let uri = format!("/api/accounts/{}/funds", app.client);
        let body = json!({ "action": "deposit", "amount": "250.5" });

        let mut no_actor = post_json(&uri, body.clone());
        no_actor.headers_mut().remove(ACTOR_HEADER);
        let (status, _) = send(&app.router, no_actor).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut as_client = post_json(&uri, body.clone());
        as_client.headers_mut().insert(ACTOR_HEADER, app.client.into());
        let (status, _) = send(&app.router, as_client).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let mut as_desk = post_json(&uri, body);
        as_desk.headers_mut().insert(ACTOR_HEADER, app.desk.into());
        let (status, moved) = send(&app.router, as_desk).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(moved["movement"]["kind"], "deposit");

        let (_, totals) = send(&app.router, get(&format!("/api/accounts/{}/totals", app.client))).await;
        assert_eq!(totals["total_deposits"], "250.50");
        assert_eq!(totals["balance"], "1250.50");
    }

    #[tokio::test]
    async fn test_dashboard_reports_equity() {
        let app = test_app();
        send(
            &app.router,
            post_json(
                &format!("/api/accounts/{}/trades", app.client),
                json!({ "symbol": "EUR/USD", "side": "sell", "quantity": 1 }),
            ),
        )
        .await;

        let (status, body) = send(&app.router, get(&format!("/api/accounts/{}/dashboard", app.client))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["positions"].as_array().unwrap().len(), 1);
        assert!(body["warnings"].as_array().unwrap().is_empty());
        assert_eq!(body["balance"], "900.00");
        assert_eq!(body["equity"], "900.00");
    }

    #[tokio::test]
    async fn test_margin_rate_update() {
        let app = test_app();
        let uri = format!("/api/accounts/{}/margin-rate", app.client);

        let put = |rate: u32| {
            Request::put(uri.as_str())
                .header("content-type", "application/json")
                .body(Body::from(json!({ "margin_rate": rate }).to_string()))
                .unwrap()
        };

        let (ok, _) = send(&app.router, put(2)).await;
        let (invalid, _) = send(&app.router, put(3)).await;

        assert_eq!(ok, StatusCode::NO_CONTENT);
        assert_eq!(invalid, StatusCode::BAD_REQUEST);
    }
}
