//! Credit-metered frontend for queue-based video generation.
//!
//! vgctl sits between account-holding clients and an async video generation
//! queue. Submitting a job resolves a price from the pricing table, debits a
//! funding source (credit grant or legacy account balance) and forwards the
//! job to the provider queue in a single pipeline; a background reconciler
//! polls in-flight jobs and settles them, refunding credits for failures.
//!
//! The main pieces:
//!
//! - [`pricing`]: price resolution and credit quoting
//! - [`funding`]: funding source selection (grants before legacy balance)
//! - [`pipeline`]: the submission pipeline
//! - [`reconciler`]: background settlement of in-flight jobs
//! - [`provider`]: the queue provider client
//! - [`storage`]: the persistence seam, implemented on PostgreSQL
//! - [`api`]: the HTTP surface

pub mod api;
pub mod config;
pub mod errors;
pub mod funding;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod pricing;
pub mod provider;
pub mod reconciler;
pub mod storage;
pub mod telemetry;
pub mod types;
pub mod upload;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::get;
use bon::Builder;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::pipeline::GenerationPipeline;
use crate::provider::{QueueClient, VideoProvider};
use crate::reconciler::Reconciler;
use crate::storage::{PostgresStorage, Storage};
use crate::upload::{S3Uploader, Uploader};

/// Shared state handed to every handler.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub provider: Arc<dyn VideoProvider>,
    pub pipeline: Arc<GenerationPipeline>,
    pub reconciler: Arc<Reconciler>,
    pub uploader: Option<Arc<dyn Uploader>>,
}

/// Get the database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors_allowed_origins {
        origins.push(origin.parse::<HeaderValue>()?);
    }

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any))
}

/// Build the application router: API routes, health check, OpenAPI docs,
/// CORS and tracing middleware.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = create_cors_layer(&state.config)?;

    let router = Router::new()
        .merge(api::routes())
        .route("/healthz", get(|| async { "ok" }))
        .merge(Scalar::with_url("/docs", api::ApiDoc::openapi()))
        .route(
            "/api-docs/openapi.json",
            get(|| async { axum::Json(api::ApiDoc::openapi()) }),
        )
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Background tasks and their lifecycle.
///
/// Currently just the reconciliation loop. The drop guard cancels the
/// shutdown token if the struct is dropped without an explicit shutdown.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// The assembled application.
///
/// 1. [`Application::new`] connects to the database, runs migrations and
///    starts background services
/// 2. [`Application::serve`] binds the listener and handles requests until
///    the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.pool.max_connections)
            .min_connections(config.database.pool.min_connections)
            .acquire_timeout(Duration::from_secs(config.database.pool.acquire_timeout_secs))
            .connect(&config.database.url)
            .await?;
        migrator().run(&pool).await?;

        let storage: Arc<dyn Storage> = Arc::new(PostgresStorage::new(pool.clone()));
        let provider: Arc<dyn VideoProvider> = Arc::new(
            QueueClient::new(&config.provider.base_url, config.provider.timeout)
                .map_err(|e| anyhow::anyhow!("provider client setup failed: {e}"))?,
        );
        let pipeline = Arc::new(GenerationPipeline::new(storage.clone(), provider.clone()));
        let reconciler = Arc::new(Reconciler::new(
            storage.clone(),
            provider.clone(),
            config.reconciler.batch_size,
            config.reconciler.concurrency,
            config.reconciler.stale_after,
        ));

        let uploader: Option<Arc<dyn Uploader>> = match &config.uploads {
            Some(upload_config) => Some(Arc::new(S3Uploader::new(upload_config).await)),
            None => None,
        };

        let shutdown_token = CancellationToken::new();
        let drop_guard = shutdown_token.clone().drop_guard();
        let mut background_tasks = Vec::new();
        if config.reconciler.enabled {
            let loop_reconciler = reconciler.clone();
            let poll_interval = config.reconciler.poll_interval;
            let loop_shutdown = shutdown_token.clone();
            background_tasks.push(tokio::spawn(async move {
                loop_reconciler.run(poll_interval, loop_shutdown).await;
            }));
            info!(
                poll_interval = ?config.reconciler.poll_interval,
                "reconciliation loop started"
            );
        } else {
            info!("reconciliation loop disabled; rely on POST /api/v1/reconcile");
        }

        let state = AppState::builder()
            .config(Arc::new(config.clone()))
            .storage(storage)
            .provider(provider)
            .pipeline(pipeline)
            .reconciler(reconciler)
            .maybe_uploader(uploader)
            .build();

        let router = build_router(state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services: BackgroundServices {
                background_tasks,
                shutdown_token,
                drop_guard: Some(drop_guard),
            },
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("listening on http://{bind_addr}");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.bg_services.shutdown().await;

        info!("closing database connections");
        self.pool.close().await;

        telemetry::shutdown_telemetry();

        Ok(())
    }
}
