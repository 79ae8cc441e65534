use std::{future::Future, sync::Arc};

use axum::{
    Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    clients::{health::HealthChecker, rbmq::MessagePublisher},
    error::{AppError, BrokerError},
    models::{
        health::HealthStatus,
        message::{QueueMessage, QueueNames},
        notification::{ACCEPTED_MESSAGE, NotificationRecord, NotifyAccepted, NotifyRequest},
    },
    store::StatusStore,
};

#[derive(Clone)]
pub struct AppState {
    store: Arc<StatusStore>,
    publisher: Arc<dyn MessagePublisher>,
    entry_queue: String,
    health_checker: Arc<HealthChecker>,
}

impl AppState {
    pub fn new(
        store: Arc<StatusStore>,
        publisher: Arc<dyn MessagePublisher>,
        queues: &QueueNames,
    ) -> Self {
        let health_checker = Arc::new(HealthChecker::new(
            Arc::clone(&publisher),
            Arc::clone(&store),
        ));

        Self {
            store,
            publisher,
            entry_queue: queues.entry.clone(),
            health_checker,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/notify", post(notify))
        .route("/api/notification/status/{trace_id}", get(notification_status))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server<F>(port: u16, state: AppState, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Notification API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Notification API server stopped");

    Ok(())
}

async fn notify(
    State(state): State<AppState>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<NotifyAccepted>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let notification = request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let trace_id = Uuid::new_v4();

    state
        .store
        .create(NotificationRecord::received(trace_id, &notification))
        .await?;

    let body = serde_json::to_vec(&QueueMessage::new(trace_id, &notification))
        .map_err(BrokerError::from)?;

    if let Err(e) = state.publisher.publish(&state.entry_queue, &body).await {
        state.store.remove(&trace_id).await;
        error!(
            trace_id = %trace_id,
            queue = %state.entry_queue,
            error = %e,
            "Failed to publish notification, request not accepted"
        );
        return Err(e.into());
    }

    info!(
        trace_id = %trace_id,
        message_id = %notification.message_id,
        type_notification = %notification.type_notification,
        "Notification accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(NotifyAccepted {
            message_id: notification.message_id,
            trace_id,
            status: ACCEPTED_MESSAGE.to_string(),
        }),
    ))
}

async fn notification_status(
    State(state): State<AppState>,
    trace_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<NotificationRecord>, AppError> {
    let Path(trace_id) = trace_id.map_err(|e| {
        warn!(error = %e, "Malformed trace id in status query");
        AppError::Validation(e.body_text())
    })?;

    state
        .store
        .get(&trace_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No notification with traceId {}", trace_id)))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}
