use crate::cli::ServeArgs;
use crate::infra::{load_catalog, AppState, SeatingRegistry};
use crate::routes::with_assignment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use exam_seating::assignment::AssignmentService;
use exam_seating::config::AppConfig;
use exam_seating::error::AppError;
use exam_seating::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = Arc::new(load_catalog(config.seating.seed_path.as_deref())?);
    let registry = Arc::new(SeatingRegistry::open(config.seating.registry_path.as_deref())?);
    info!(
        exams = catalog.exams.len(),
        rooms = catalog.rooms.len(),
        algorithms = catalog.algorithms.len(),
        registry = %registry.describe(),
        "seating directories loaded"
    );

    let assignment_service = Arc::new(AssignmentService::new(
        catalog,
        registry,
        &config.seating,
    )?);

    let app = with_assignment_routes(assignment_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "exam seating service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
