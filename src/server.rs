//! HTTP surface: the public search endpoint and the signed fetch endpoint.
//!
//! Both routes live under `/api/v{N}` where `N` is the configured API
//! version. A node started with `only_slave = true` serves the fetch
//! endpoint alone.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query as QueryParams, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metase_engine::sources::{self, SogouSource};
use metase_engine::{
    DispatchRouter, EngineError, FetchService, MetaSearch, Query, RecentDays, SearchResponse,
    SignedParams, Signer, SourceRegistry,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::config::MetaseConfig;
use crate::error::{Result, ServerError};

#[derive(Clone)]
struct AppState {
    search: Option<MetaSearch>,
    fetch: Arc<FetchService>,
}

/// Query string of `GET /api/v{N}/search`.
#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
    sources: Option<String>,
    data_source_results: Option<String>,
    recent_days: Option<String>,
    site: Option<String>,
}

/// Query string of `POST /api/v{N}/fetch`. Every field is required; a
/// missing one fails authentication.
#[derive(Debug, Default, Deserialize)]
struct FetchParams {
    name: Option<String>,
    rtype: Option<String>,
    timestamp: Option<String>,
    nonce: Option<String>,
    signature: Option<String>,
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Engine error rendered as a JSON error body.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let (status, code) = match &err {
            EngineError::UnknownSource(_) => (StatusCode::BAD_REQUEST, "unknown_source"),
            EngineError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid_query"),
            EngineError::Auth(_) => (StatusCode::FORBIDDEN, "forbidden"),
            EngineError::Downstream(_) => (StatusCode::SERVICE_UNAVAILABLE, "downstream_unreachable"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ Request parsing ============

impl SearchParams {
    fn into_query(self) -> std::result::Result<Query, EngineError> {
        let text = self.query.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidQuery("query must not be empty".into()));
        }
        let mut query = Query::new(text)
            .with_sources(parse_source_list(self.sources.as_deref()))
            .with_site_filter(self.site);
        if let Some(raw) = non_empty(self.data_source_results.as_deref()) {
            let n: usize = raw.parse().map_err(|_| {
                EngineError::InvalidQuery(format!("data_source_results is not a number: {raw}"))
            })?;
            query = query.with_max_results_per_source(n);
        }
        if let Some(raw) = non_empty(self.recent_days.as_deref()) {
            let days: u32 = raw.parse().map_err(|_| {
                EngineError::InvalidQuery(format!("recent_days is not a number: {raw}"))
            })?;
            query = query.with_recent_days(Some(RecentDays::try_from(days)?));
        }
        Ok(query)
    }
}

impl FetchParams {
    fn into_signed(self) -> std::result::Result<SignedParams, EngineError> {
        let (Some(name), Some(rtype), Some(timestamp), Some(nonce), Some(signature)) =
            (self.name, self.rtype, self.timestamp, self.nonce, self.signature)
        else {
            return Err(EngineError::Auth("missing signature parameters".into()));
        };
        Ok(SignedParams {
            name,
            rtype: rtype
                .parse()
                .map_err(|_| EngineError::Auth("unknown request kind".into()))?,
            timestamp,
            nonce,
            signature,
        })
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Split a comma list of source names. An empty list means every source.
fn parse_source_list(raw: Option<&str>) -> Option<Vec<String>> {
    let names: Vec<String> = non_empty(raw)?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!names.is_empty()).then_some(names)
}

// ============ Handlers ============

async fn search(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<SearchParams>,
) -> std::result::Result<Json<SearchResponse>, AppError> {
    let Some(engine) = state.search else {
        return Err(EngineError::Config("search is disabled on this node".into()).into());
    };
    let query = params.into_query()?;
    tracing::trace!(query = %query.text, "search request");
    let response = engine.search(query).await?;
    Ok(Json(response))
}

async fn fetch(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<FetchParams>,
    body: Bytes,
) -> std::result::Result<Json<serde_json::Value>, AppError> {
    let params = params.into_signed()?;
    match state.fetch.handle(&params, &body).await {
        Ok(reply) => Ok(Json(serde_json::json!({ "data": reply }))),
        Err(e) => {
            tracing::warn!(source = %params.name, rtype = %params.rtype, error = %e, "fetch request failed");
            Err(e.into())
        }
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

fn app(state: AppState, api_version: u32) -> Router {
    let base = format!("/api/v{api_version}");
    let mut router = Router::new().route(&format!("{base}/fetch"), post(fetch));
    if state.search.is_some() {
        router = router.route(&format!("{base}/search"), get(search));
    }
    router.layer(cors_layer()).with_state(state)
}

/// Address other nodes and this node's own orchestrator use to reach the
/// bound listener. An unspecified bind address is reached over loopback.
fn reachable_addr(local: SocketAddr) -> SocketAddr {
    if local.ip().is_unspecified() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port())
    } else {
        local
    }
}

// ============ Server ============

/// A bound, not yet serving, metase node.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    app: Router,
    refresh: Option<JoinHandle<()>>,
}

impl Server {
    /// Bind with the bundled sources and start the Sogou cookie refresh.
    ///
    /// # Errors
    ///
    /// See [`Server::bind_with_registry`].
    pub async fn bind(config: &MetaseConfig) -> Result<Self> {
        let sogou = Arc::new(SogouSource::new());
        let registry = Arc::new(sources::registry_with(Arc::clone(&sogou)));
        let (mut server, fetch) = Self::build(config, registry).await?;
        server.refresh = Some(sogou.spawn_refresh(fetch.page_client().clone(), config.engine.timeout()));
        Ok(server)
    }

    /// Bind with a caller-supplied source registry.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be bound, and
    /// [`ServerError::Config`] or [`ServerError::Engine`] if the
    /// configuration is invalid for `registry`.
    pub async fn bind_with_registry(config: &MetaseConfig, registry: Arc<SourceRegistry>) -> Result<Self> {
        Self::build(config, registry).await.map(|(server, _)| server)
    }

    async fn build(config: &MetaseConfig, registry: Arc<SourceRegistry>) -> Result<(Self, Arc<FetchService>)> {
        config.validate(&registry)?;
        let engine = &config.engine;

        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{addr}: {e}")))?;
        let local_addr = listener.local_addr()?;

        let mut fetch = FetchService::new(
            Arc::clone(&registry),
            Signer::new(engine.api_secret.clone()),
            engine.timeout(),
        )?
        .with_default_headers(engine.default_headers.clone());
        if let Some(user_agent) = &engine.user_agent {
            fetch = fetch.with_user_agent(user_agent.clone());
        }
        let fetch = Arc::new(fetch);

        let search = if config.only_slave {
            tracing::info!("only_slave set, search endpoint disabled");
            None
        } else {
            let local = reachable_addr(local_addr).to_string();
            let router = DispatchRouter::build(&engine.slaves, &registry, &local)?;
            Some(MetaSearch::from_config(engine, registry, router)?)
        };

        let state = AppState {
            search,
            fetch: Arc::clone(&fetch),
        };
        let server = Self {
            listener,
            local_addr,
            app: app(state, engine.api_version),
            refresh: None,
        };
        Ok((server, fetch))
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the process receives Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the server fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the server fails.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::info!("metase listening on http://{}", self.local_addr);
        let result = axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await;
        if let Some(refresh) = self.refresh {
            refresh.abort();
        }
        tracing::info!("metase stopped");
        result.map_err(ServerError::from)
    }
}
