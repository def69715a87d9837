use axum::{
    Router,
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use carbon_atlas::config::Config;
use carbon_atlas::services::orchestrator::{HttpChatBackend, Orchestrator, RetryPolicy};
use carbon_atlas::services::tools::stdio;
use carbon_atlas::services::{
    BaselineProvider, Catalog, EntityResolver, QueryEngine, ResponseAssembler, ToolSurface,
    WarehouseGateway,
};
use carbon_atlas::utils::ApiError;
use carbon_atlas::{AppState, handlers, middleware, models, services};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,

        handlers::datasets::list_files,
        handlers::datasets::get_schema,
        handlers::datasets::get_data_quality,

        handlers::query::query,
        handlers::query::smart_query,
        handlers::query::batch_query,

        handlers::metrics::yoy,
        handlers::metrics::compare_emissions,
        handlers::metrics::analyze_emissions_trend,
        handlers::metrics::analyze_monthly_trends,
        handlers::metrics::detect_seasonal_patterns,
        handlers::metrics::aggregate_across_sectors,

        handlers::quality::get_quality_filtered_data,
        handlers::quality::get_validated_records,
        handlers::quality::get_uncertainty_analysis,

        handlers::ask::ask,

        handlers::cache_admin::cache_stats,
        handlers::cache_admin::cache_clear,
    ),
    components(
        schemas(
            handlers::ask::AskRequest,
            models::AnswerEnvelope,
            models::AnswerHeader,
            models::QualityMetadata,
            models::Sector,
            models::Level,
            models::Grain,
            models::ColumnKind,
            models::ColumnDescriptor,
            models::ConfidenceTier,
            models::SectorQuality,
            models::IntentKind,
            models::Persona,
            models::ResolvedEntity,
            models::FallbackStatus,
            models::FallbackStep,
            services::CacheStats,
            services::PoolStatus,
            carbon_atlas::utils::ErrorKind,
        )
    ),
    tags(
        (name = "System", description = "Health and cache administration"),
        (name = "Datasets", description = "Dataset catalog and quality metadata"),
        (name = "Query", description = "Direct warehouse queries"),
        (name = "Analytics", description = "Comparative and temporal analytics"),
        (name = "Quality", description = "Quality-aware data access"),
        (name = "Ask", description = "Natural-language question answering"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is a development convenience; real deployments set the
    // environment directly.
    let _ = dotenvy::dotenv();

    let (config, cli_args) = match Config::load() {
        Ok(loaded) => loaded,
        Err(e) => {
            // Single structured line, non-zero exit: never start
            // half-configured.
            eprintln!("{}", serde_json::json!({"fatal": "configuration", "error": e.to_string()}));
            std::process::exit(1);
        },
    };

    let production = config.server.environment.is_production();
    ApiError::set_production_mode(production);
    init_tracing(&config, production);

    tracing::info!("CarbonAtlas starting up");

    let catalog = match Catalog::load(&config.warehouse.manifest_path) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("{}", serde_json::json!({"fatal": "catalog", "error": e.to_string()}));
            std::process::exit(1);
        },
    };

    let resolver = match EntityResolver::from_config(&config.resolver) {
        Ok(resolver) => Arc::new(resolver),
        Err(e) => {
            eprintln!("{}", serde_json::json!({"fatal": "resolver", "error": e.to_string()}));
            std::process::exit(1);
        },
    };

    let gateway = Arc::new(WarehouseGateway::open(&config.warehouse, &config.cache).await?);
    gateway.probe().await?;
    tracing::info!("warehouse probe succeeded");

    let engine = Arc::new(QueryEngine::new(
        Arc::clone(&catalog),
        Arc::clone(&resolver),
        Arc::clone(&gateway),
    ));
    let tool_surface = Arc::new(ToolSurface::new(Arc::clone(&engine)));

    if cli_args.stdio {
        // Tool-server mode for local LLM drivers; no HTTP, no orchestrator.
        return stdio::run(tool_surface).await.map_err(Into::into);
    }

    let baseline = Arc::new(BaselineProvider::new());
    let backend = Arc::new(HttpChatBackend::from_config(&config.llm)?);
    let orchestrator = Arc::new(Orchestrator::new(
        backend,
        Arc::clone(&tool_surface),
        Arc::clone(&baseline),
        config.llm.concurrency_limit,
        RetryPolicy::from_config(&config.llm),
        config.llm.max_tool_calls,
    ));
    let assembler = Arc::new(ResponseAssembler::new(Arc::clone(&baseline)));
    tracing::info!("orchestrator initialized");

    let app_state = Arc::new(AppState {
        config: config.clone(),
        catalog: Arc::clone(&catalog),
        resolver: Arc::clone(&resolver),
        gateway: Arc::clone(&gateway),
        engine: Arc::clone(&engine),
        tool_surface: Arc::clone(&tool_surface),
        baseline: Arc::clone(&baseline),
        orchestrator: Arc::clone(&orchestrator),
        assembler: Arc::clone(&assembler),
    });

    let rate_limit_state = middleware::RateLimitState {
        limiter: Arc::new(middleware::SlidingWindowLimiter::new(&config.rate_limit)),
    };

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/list_files", get(handlers::datasets::list_files))
        .route("/get_schema/:file_id", get(handlers::datasets::get_schema))
        .route("/get_data_quality", get(handlers::datasets::get_data_quality))
        .route("/query", post(handlers::query::query))
        .route("/smart_query", post(handlers::query::smart_query))
        .route("/batch/query", post(handlers::query::batch_query))
        .route("/metrics/yoy", post(handlers::metrics::yoy))
        .route("/compare_emissions", post(handlers::metrics::compare_emissions))
        .route("/analyze_emissions_trend", post(handlers::metrics::analyze_emissions_trend))
        .route("/analyze_monthly_trends", post(handlers::metrics::analyze_monthly_trends))
        .route("/detect_seasonal_patterns", post(handlers::metrics::detect_seasonal_patterns))
        .route("/aggregate_across_sectors", post(handlers::metrics::aggregate_across_sectors))
        .route("/get_quality_filtered_data", post(handlers::quality::get_quality_filtered_data))
        .route("/get_validated_records", post(handlers::quality::get_validated_records))
        .route("/get_uncertainty_analysis", post(handlers::quality::get_uncertainty_analysis))
        .route("/ask", post(handlers::ask::ask))
        .route("/cache/stats", get(handlers::cache_admin::cache_stats))
        .route("/cache/clear", delete(handlers::cache_admin::cache_clear))
        .with_state(Arc::clone(&app_state))
        .layer(axum_middleware::from_fn_with_state(
            rate_limit_state,
            middleware::rate_limit_middleware,
        ));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(build_cors(&config));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    gateway.close().await;
    Ok(())
}

fn init_tracing(config: &Config, production: bool) {
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("carbonatlas.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Keep the appender guard alive for the process lifetime.
        Box::leak(Box::new(guard));

        if production {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    } else if production {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// CORS is fail-closed: no configured origins means no browser origins are
/// allowed. The wildcard is only honoured outside production (config
/// validation already rejects it there).
fn build_cors(config: &Config) -> CorsLayer {
    use axum::http::{HeaderValue, Method};

    if config.server.allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .server
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::HeaderName::from_static("x-request-id"),
        ])
}
