use crate::cli::ServeArgs;
use crate::infra::{AppState, LogListener};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use payables_engine::config::AppConfig;
use payables_engine::error::AppError;
use payables_engine::ingestion::JobOrchestrator;
use payables_engine::notifications::NotificationBus;
use payables_engine::telemetry;
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let bus = Arc::new(NotificationBus::new());
    // The bus holds listeners weakly; this binding keeps the log listener alive while serving.
    let log_listener = Arc::new(LogListener);
    bus.subscribe(&log_listener);
    let orchestrator = Arc::new(JobOrchestrator::new(bus));

    let app = with_service_routes(orchestrator)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        due_soon_days = config.decisions.due_soon_days,
        "payables decision service ready"
    );

    axum::serve(listener, app).await?;
    drop(log_listener);
    Ok(())
}
