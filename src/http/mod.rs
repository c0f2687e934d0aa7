//! HTTP and WebSocket front end.

pub mod handlers;
pub mod ws;

use anyhow::Context;
use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::deid::DeidentificationCoordinator;
use crate::error::{AppError, ErrorKind};
use crate::metrics::Metrics;
use crate::reporting::ErrorReporter;
use crate::storage::{CloudStorageBucket, CloudStorageService};

/// Route excluded from request metrics; its connections stay open for the whole session
const WS_ROUTE: &str = "/ws";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub storage: CloudStorageService,
    pub coordinator: DeidentificationCoordinator,
    pub metrics: Metrics,
    pub reporter: Arc<dyn ErrorReporter>,
    /// Bucket every signed URL is issued for
    pub bucket: CloudStorageBucket,
}

/// Build the public router with all routes and middleware
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::OPTIONS, Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ACCEPT_CHARSET,
            header::ACCEPT_LANGUAGE,
            header::ACCEPT_ENCODING,
            header::ORIGIN,
            header::HOST,
            header::USER_AGENT,
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
        ])
        .allow_credentials(true);

    Router::new()
        .route("/get_presigned_url", post(handlers::get_presigned_url))
        .route("/start_anonymisation", post(handlers::start_anonymisation))
        .route("/jobs", get(handlers::list_jobs))
        .route(
            "/jobs/:id",
            get(handlers::get_job).delete(handlers::cancel_job),
        )
        .route(WS_ROUTE, get(ws::ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .with_state(state)
        // Middleware layers (order matters - applied bottom to top)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Router for the debug listener
pub fn debug_router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<Metrics>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
        .into_response()
}

/// Count requests per route and errors per code; report internal errors
async fn track_metrics(
    State(state): State<AppState>,
    matched: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let template = matched.map(|m| m.as_str().to_string());

    let response = next.run(request).await;

    if let Some(err) = response.extensions().get::<AppError>() {
        state.metrics.record_error(err.kind.code());
        if err.kind == ErrorKind::Internal {
            state
                .reporter
                .report(method.as_str(), &path, &err.to_string());
        }
    }

    if let Some(template) = template.filter(|t| t != WS_ROUTE) {
        state
            .metrics
            .record_request(method.as_str(), &template, start.elapsed());
    }

    response
}

/// A bound listener plus the router it serves
pub struct Server {
    listener: TcpListener,
    router: Router,
    domain: Option<String>,
    shutdown_timeout: Duration,
}

impl Server {
    pub async fn bind(
        addr: &str,
        router: Router,
        domain: Option<String>,
        shutdown_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("could not initialise listener on {}", addr))?;
        Ok(Self {
            listener,
            router,
            domain,
            shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Local base URL, using the configured domain when there is one
    pub fn url(&self) -> anyhow::Result<String> {
        let port = self.local_addr()?.port();
        let host = self.domain.as_deref().unwrap_or("localhost");
        if port == 80 {
            Ok(format!("http://{}", host))
        } else {
            Ok(format!("http://{}:{}", host, port))
        }
    }

    /// Serve until `shutdown` resolves, then give in-flight requests at most the
    /// shutdown timeout to finish before dropping them.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Listening on {}", self.url()?);
        let Server {
            listener,
            router,
            shutdown_timeout,
            ..
        } = self;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        tokio::select! {
            joined = &mut task => {
                joined.context("server task failed")?.context("server error")?;
                return Ok(());
            }
            _ = shutdown => {}
        }

        info!("Shutting down, draining for up to {:?}", shutdown_timeout);
        let _ = stop_tx.send(());

        match tokio::time::timeout(shutdown_timeout, &mut task).await {
            Ok(joined) => {
                joined.context("server task failed")?.context("server error")?;
            }
            Err(_) => {
                warn!("Requests still in flight after {:?}, dropping them", shutdown_timeout);
                task.abort();
            }
        }
        Ok(())
    }
}
