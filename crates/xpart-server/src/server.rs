// crates/xpart-server/src/server.rs
// ============================================================================
// Module: Aggregate Server
// Description: HTTP routes returning count aggregates and their cost.
// Purpose: Map `GET {prefix}/{aggregate}` onto the configured executors.
// Dependencies: xpart-core, xpart-config, xpart-store-http, axum, tokio
// ============================================================================

//! ## Overview
//! [`AggregateServer`] owns one [`AggregateExecutor`] per configured
//! aggregate, all sharing a single lazily constructed store client. Each
//! request reads the aggregate's query parameter, matched case-insensitively,
//! as the optional filter and answers `{"totalRUs": f64, "count": i64}`.
//!
//! Status mapping: success is 200 JSON; configuration, format, and execution
//! failures are 500 with a plain-text diagnostic; an unknown aggregate is 404;
//! a request cancelled by shutdown is 503.
//!
//! Security posture: query values are untrusted and only ever reach the store
//! as bound parameters; they are not logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use xpart_config::StoreConfig;
use xpart_config::StoreKind;
use xpart_config::XpartConfig;
use xpart_core::AggregateError;
use xpart_core::AggregateExecutor;
use xpart_core::AggregateResult;
use xpart_core::SharedClient;
use xpart_store_http::HttpStoreConfig;
use xpart_store_http::HttpStoreFactory;
use xpart_store_http::RetryPolicy;

// ============================================================================
// SECTION: Response Types
// ============================================================================

/// JSON body returned for a successful aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateResponse {
    /// Cost units consumed across every page.
    #[serde(rename = "totalRUs")]
    pub total_rus: f64,
    /// Aggregate count.
    pub count: i64,
}

impl From<AggregateResult> for AggregateResponse {
    fn from(result: AggregateResult) -> Self {
        Self {
            total_rus: result.total_cost_units,
            count: result.count,
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// One routable aggregate.
struct AggregateRoute {
    /// Query string parameter carrying the filter value.
    query_param: String,
    /// Executor bound to the aggregate's dimension.
    executor: AggregateExecutor,
}

/// State shared by every request handler.
struct ServerState {
    /// Routes keyed by aggregate name.
    routes: BTreeMap<String, AggregateRoute>,
    /// Parent token for in-flight aggregate requests.
    shutdown: CancellationToken,
}

/// HTTP server exposing the configured aggregates.
pub struct AggregateServer {
    /// Validated configuration.
    config: XpartConfig,
    /// Shared handler state.
    state: Arc<ServerState>,
}

impl AggregateServer {
    /// Builds a server and its store client from configuration.
    ///
    /// The HTTP store client is not constructed until the first request. A
    /// memory store holds no data of its own, so memory-backed servers are
    /// built with [`AggregateServer::with_client`] over a seeded store.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration is invalid or names the
    /// memory store.
    pub fn from_config(mut config: XpartConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let client = build_client(&config)?;
        Self::with_client(config, client)
    }

    /// Builds a server over an existing shared client.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration is invalid.
    pub fn with_client(mut config: XpartConfig, client: Arc<SharedClient>) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let collection =
            config.store.collection_ref().map_err(|err| ServerError::Config(err.to_string()))?;
        let dimensions = config.dimensions().map_err(|err| ServerError::Config(err.to_string()))?;
        let mut routes = BTreeMap::new();
        for (aggregate, dimension) in config.aggregates.iter().zip(dimensions) {
            let executor = AggregateExecutor::new(
                Arc::clone(&client),
                collection.clone(),
                dimension,
                config.feed,
            );
            routes.insert(
                aggregate.name.clone(),
                AggregateRoute {
                    query_param: aggregate.query_param.clone(),
                    executor,
                },
            );
        }
        Ok(Self {
            config,
            state: Arc::new(ServerState {
                routes,
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Returns the token that stops the server and cancels in-flight requests.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Returns the configured aggregate names.
    pub fn aggregate_names(&self) -> impl Iterator<Item = &str> {
        self.state.routes.keys().map(String::as_str)
    }

    /// Builds the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        let path = format!("{}/{{aggregate}}", self.config.server.route_prefix);
        Router::new().route(&path, get(handle_aggregate)).with_state(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until the shutdown token fires.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("http bind {addr} failed: {err}")))?;
        self.serve_on(listener).await
    }

    /// Serves on a bound listener until the shutdown token fires.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when the server fails.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), ServerError> {
        let app = self.router();
        let shutdown = self.shutdown_token();
        if let Ok(addr) = listener.local_addr() {
            info!(
                %addr,
                prefix = self.config.server.route_prefix.as_str(),
                aggregates = self.state.routes.len(),
                "aggregate server listening"
            );
        }
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))?;
        info!("aggregate server stopped");
        Ok(())
    }

    /// Serves until Ctrl-C, then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve_until_ctrl_c(self) -> Result<(), ServerError> {
        let shutdown = self.shutdown_token();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown requested"),
                Err(err) => warn!(error = %err, "ctrl-c handler failed; shutting down"),
            }
            shutdown.cancel();
        });
        self.serve().await
    }
}

/// Builds the shared client for the configured store kind.
fn build_client(config: &XpartConfig) -> Result<Arc<SharedClient>, ServerError> {
    match config.store.kind {
        StoreKind::Memory => Err(ServerError::Config(
            "store.kind 'memory' has no backing data; serve a seeded store through \
             AggregateServer::with_client"
                .to_string(),
        )),
        StoreKind::Http => {
            let write_concurrency = usize::try_from(config.loader.max_concurrency).unwrap_or(1);
            let factory = HttpStoreFactory::new(http_store_config(&config.store, write_concurrency));
            Ok(Arc::new(SharedClient::new(config.store.connection_source(), factory)))
        }
    }
}

/// Maps store settings onto HTTP transport settings.
#[must_use]
pub fn http_store_config(store: &StoreConfig, max_write_concurrency: usize) -> HttpStoreConfig {
    HttpStoreConfig {
        connect_timeout: Duration::from_millis(store.connect_timeout_ms),
        request_timeout: Duration::from_millis(store.request_timeout_ms),
        allow_http: store.allow_http,
        retry: RetryPolicy {
            max_attempts_on_throttled: store.retry.max_attempts_on_throttled,
            max_wait: Duration::from_millis(store.retry.max_wait_ms),
        },
        max_write_concurrency,
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `GET {prefix}/{aggregate}`.
async fn handle_aggregate(
    State(state): State<Arc<ServerState>>,
    Path(aggregate): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(route) = state.routes.get(&aggregate) else {
        return (StatusCode::NOT_FOUND, format!("unknown aggregate '{aggregate}'")).into_response();
    };
    let filter = query_value(&params, &route.query_param);
    let cancel = state.shutdown.child_token();
    match route.executor.count(filter, &cancel).await {
        Ok(result) => (StatusCode::OK, Json(AggregateResponse::from(result))).into_response(),
        Err(AggregateError::Cancelled) => {
            debug!(aggregate = aggregate.as_str(), "aggregate request cancelled");
            (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response()
        }
        Err(err) => {
            error!(aggregate = aggregate.as_str(), error = %err, "aggregate request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// Looks up a query parameter, preferring an exact key and otherwise matching
/// the name case-insensitively.
fn query_value<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .or_else(|| {
            params.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value)
        })
        .map(String::as_str)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Aggregate server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
