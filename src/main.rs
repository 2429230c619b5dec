// Main entry point for the manuscript symbol extraction service

use scriptorium::{
    core::{errors::{JobError, PipelineError, RepositoryError}, types::*, Config},
    orchestration::{JobManager, PagePipeline},
    repository::SymbolRepository,
    services::{ClassificationService, InMemoryPageStore, PageCache, PageStore},
    utils::{crop_and_encode_png_async, Metrics},
};

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    jobs: JobManager,
    repository: SymbolRepository,
    classifier: Arc<ClassificationService>,
    pages: Arc<InMemoryPageStore>,
    page_cache: Arc<PageCache>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().expect("Failed to load configuration"));

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "scriptorium={}",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== MANUSCRIPT SYMBOL EXTRACTION SERVICE ===");

    let metrics = Metrics::new();

    // Symbol repository with debounced snapshot persistence
    let save_interval = match config.save_interval_secs() {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let repository = SymbolRepository::new(config.data_dir(), save_interval).await?;
    info!("Repository ready ({} symbols)", repository.count());

    // Page inventory from the upload subsystem's directory
    let pages = Arc::new(InMemoryPageStore::new());
    if let Some(dir) = config.pages_dir() {
        let loaded = pages.load_directory(dir).await?;
        info!("Loaded {} pages from {}", loaded, dir);
    } else {
        warn!("PAGES_DIR not set; starting with an empty page inventory");
    }
    let page_cache = Arc::new(PageCache::new(
        Arc::clone(&pages) as Arc<dyn PageStore>,
        config.decoded_cache_size(),
    ));

    let pipeline = PagePipeline::new(
        Arc::clone(&config),
        Arc::clone(&page_cache),
        repository.clone(),
        metrics.clone(),
    );
    let jobs = JobManager::new(
        Arc::clone(&config),
        pipeline,
        Arc::clone(&pages) as Arc<dyn PageStore>,
        metrics.clone(),
    );
    let classifier = Arc::new(ClassificationService::new(
        repository.clone(),
        metrics.clone(),
    ));

    let state = AppState {
        jobs,
        repository,
        classifier,
        pages,
        page_cache,
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create router with monitoring endpoints
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/pages", get(list_pages))
        .route("/pages/:id/symbols", get(symbols_for_page))
        .route("/extractions", post(start_extraction).get(list_jobs))
        .route("/extractions/:id", get(get_job))
        .route("/extractions/:id/cancel", post(cancel_job))
        .route("/symbols/:id", get(get_symbol))
        .route("/symbols/:id/similar", get(similar_symbols))
        .route("/symbols/:id/thumbnail", get(symbol_thumbnail))
        .route(
            "/symbols/:id/category",
            post(categorize_symbol).delete(clear_category),
        )
        .route("/symbols/categorize", post(categorize_bulk))
        .route("/symbols/resolve", post(resolve_symbols))
        .route("/reports/frequency", get(frequency_report))
        .route("/reports/categories", get(category_distribution))
        .with_state(state)
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET    /health                 - Health check");
    info!("  GET    /metrics                - Prometheus metrics");
    info!("  GET    /stats                  - Detailed statistics");
    info!("  GET    /pages                  - Page inventory");
    info!("  GET    /pages/:id/symbols      - Symbols on a page");
    info!("  POST   /extractions            - Start extraction job");
    info!("  GET    /extractions            - List jobs (newest first)");
    info!("  GET    /extractions/:id        - Poll job status/progress");
    info!("  POST   /extractions/:id/cancel - Cancel a job");
    info!("  GET    /symbols/:id            - Symbol by id");
    info!("  GET    /symbols/:id/similar    - Same-signature symbols");
    info!("  GET    /symbols/:id/thumbnail  - PNG crop as data URL");
    info!("  POST   /symbols/:id/category   - Categorize one symbol");
    info!("  DELETE /symbols/:id/category   - Clear a category");
    info!("  POST   /symbols/categorize     - Bulk categorize");
    info!("  POST   /symbols/resolve        - Resolve filter to symbol ids");
    info!("  GET    /reports/frequency      - Signature frequency report");
    info!("  GET    /reports/categories     - Category distribution");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Manuscript Symbol Extraction Service"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

async fn list_pages(State(state): State<AppState>) -> Json<Vec<Page>> {
    state.metrics.record_endpoint_request("list_pages");
    Json(state.pages.list())
}

async fn symbols_for_page(
    State(state): State<AppState>,
    Path(page_id): Path<PageId>,
) -> Result<Json<Vec<Symbol>>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("symbols_for_page");
    if state.pages.get(page_id).is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("page {page_id} not found"),
        ));
    }
    Ok(Json(state.repository.for_page(page_id)))
}

#[derive(Debug, Deserialize)]
struct StartExtractionRequest {
    start_page: PageId,
    end_page: PageId,
    /// Omitted parameters fall back to the defaults.
    #[serde(default)]
    parameters: Option<ExtractionParameters>,
}

async fn start_extraction(
    State(state): State<AppState>,
    Json(request): Json<StartExtractionRequest>,
) -> Result<(StatusCode, Json<ExtractionJob>), (StatusCode, String)> {
    state.metrics.record_endpoint_request("start_extraction");

    let parameters = request.parameters.unwrap_or_default();
    let job = state
        .jobs
        .start(request.start_page, request.end_page, parameters)
        .map_err(job_error_response)?;

    Ok((StatusCode::ACCEPTED, Json(job)))
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<ExtractionJob>> {
    state.metrics.record_endpoint_request("list_jobs");
    Json(state.jobs.list())
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<ExtractionJob>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("get_job");
    state.jobs.get(job_id).map(Json).map_err(job_error_response)
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<ExtractionJob>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("cancel_job");
    state
        .jobs
        .cancel(job_id)
        .map(Json)
        .map_err(job_error_response)
}

async fn get_symbol(
    State(state): State<AppState>,
    Path(symbol_id): Path<SymbolId>,
) -> Result<Json<Symbol>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("get_symbol");
    state
        .repository
        .get(symbol_id)
        .map(Json)
        .map_err(repository_error_response)
}

async fn similar_symbols(
    State(state): State<AppState>,
    Path(symbol_id): Path<SymbolId>,
) -> Result<Json<Vec<Symbol>>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("similar_symbols");
    state
        .repository
        .similar_to(symbol_id)
        .map(Json)
        .map_err(repository_error_response)
}

#[derive(Debug, Serialize)]
struct ThumbnailResponse {
    symbol_id: SymbolId,
    data_url: String,
}

/// PNG crop of the symbol's bounding box, as a base64 data URL.
async fn symbol_thumbnail(
    State(state): State<AppState>,
    Path(symbol_id): Path<SymbolId>,
) -> Result<Json<ThumbnailResponse>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("symbol_thumbnail");

    let symbol = state
        .repository
        .get(symbol_id)
        .map_err(repository_error_response)?;

    let img = state
        .page_cache
        .decoded_image(symbol.page_id)
        .await
        .map_err(pipeline_error_response)?;

    let png_bytes = crop_and_encode_png_async(img.as_ref().clone(), symbol.bounding_box)
        .await
        .map_err(|e| {
            error!("thumbnail encoding failed for symbol {symbol_id}: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "thumbnail encoding failed".to_string(),
            )
        })?;

    let base64_image = general_purpose::STANDARD.encode(&png_bytes);
    Ok(Json(ThumbnailResponse {
        symbol_id,
        data_url: format!("data:image/png;base64,{}", base64_image),
    }))
}

#[derive(Debug, Deserialize)]
struct CategorizeRequest {
    category: String,
}

async fn categorize_symbol(
    State(state): State<AppState>,
    Path(symbol_id): Path<SymbolId>,
    Json(request): Json<CategorizeRequest>,
) -> Result<Json<Symbol>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("categorize_symbol");
    state
        .classifier
        .categorize(symbol_id, &request.category)
        .map(Json)
        .map_err(repository_error_response)
}

async fn clear_category(
    State(state): State<AppState>,
    Path(symbol_id): Path<SymbolId>,
) -> Result<Json<Symbol>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("clear_category");
    state
        .classifier
        .clear(symbol_id)
        .map(Json)
        .map_err(repository_error_response)
}

#[derive(Debug, Deserialize)]
struct BulkCategorizeRequest {
    symbol_ids: Vec<SymbolId>,
    category: String,
}

/// Bulk categorization: per-id outcomes, never an all-or-nothing failure.
async fn categorize_bulk(
    State(state): State<AppState>,
    Json(request): Json<BulkCategorizeRequest>,
) -> Json<Vec<BulkCategorizeOutcome>> {
    state.metrics.record_endpoint_request("categorize_bulk");
    Json(
        state
            .classifier
            .categorize_bulk(&request.symbol_ids, &request.category),
    )
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    symbol_ids: Vec<SymbolId>,
}

/// Resolve a filter to concrete ids (the query half of query-then-act).
async fn resolve_symbols(
    State(state): State<AppState>,
    Json(filter): Json<SymbolFilter>,
) -> Json<ResolveResponse> {
    state.metrics.record_endpoint_request("resolve_symbols");
    Json(ResolveResponse {
        symbol_ids: state.classifier.resolve(&filter),
    })
}

async fn frequency_report(State(state): State<AppState>) -> Json<Vec<SignatureCount>> {
    state.metrics.record_endpoint_request("frequency_report");
    Json(state.repository.frequency_report())
}

async fn category_distribution(State(state): State<AppState>) -> Json<Vec<CategoryCount>> {
    state.metrics.record_endpoint_request("category_distribution");
    Json(state.repository.category_distribution())
}

fn job_error_response(e: JobError) -> (StatusCode, String) {
    let status = match &e {
        JobError::InvalidParameters(_) | JobError::InvalidPageRange { .. } => {
            StatusCode::BAD_REQUEST
        }
        JobError::PageBusy { .. } | JobError::AlreadyTerminal { .. } => StatusCode::CONFLICT,
        JobError::JobNotFound(_) => StatusCode::NOT_FOUND,
        JobError::IllegalTransition { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::CONFLICT {
        warn!("{e}");
    } else if status.is_server_error() {
        error!("{e}");
    }
    (status, e.to_string())
}

fn repository_error_response(e: RepositoryError) -> (StatusCode, String) {
    let status = match &e {
        RepositoryError::SymbolNotFound(_) => StatusCode::NOT_FOUND,
        RepositoryError::EmptyCategory => StatusCode::BAD_REQUEST,
        RepositoryError::Persistence { .. } | RepositoryError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!("{e}");
    }
    (status, e.to_string())
}

fn pipeline_error_response(e: PipelineError) -> (StatusCode, String) {
    let status = match &e {
        PipelineError::PageNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("{e}");
    }
    (status, e.to_string())
}
