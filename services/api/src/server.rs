use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use applicant_pipeline::config::AppConfig;
use applicant_pipeline::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::info;

use crate::cli::ServeArgs;
use crate::error::AppError;
use crate::infra::{build_pipeline, AppState};
use crate::routes::{pipeline_router, with_operational_routes};

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

    let pipeline = build_pipeline(config.pipeline.clone())?;
    let app = with_operational_routes(pipeline_router(pipeline))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        environment = ?config.environment,
        %addr,
        max_bulk_items = config.pipeline.max_bulk_items,
        "applicant pipeline ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
