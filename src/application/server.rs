#[cfg(test)]
#[path = "server_test.rs"]
mod tests;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::SecondsFormat;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domain::models::ConnectionState;
use crate::domain::models::SendRequest;
use crate::domain::models::SendResult;
use crate::domain::models::SessionUser;
use crate::domain::models::UnauthorizedWebhook;
use crate::domain::services::SessionContext;

pub const SERVICE_NAME: &str = "whatsapp-service";

#[derive(Debug, Serialize)]
struct QrResponse {
    qr: Option<String>,
    status: ConnectionState,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    connected: bool,
    status: ConnectionState,
    user: Option<SessionUser>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    connection: ConnectionState,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    received: usize,
}

async fn qr(State(session): State<SessionContext>) -> Json<QrResponse> {
    let state = session.state();
    return Json(QrResponse {
        qr: state.qr().map(|e| return e.to_string()),
        status: state.status,
    });
}

async fn status(State(session): State<SessionContext>) -> Json<StatusResponse> {
    let state = session.state();
    return Json(StatusResponse {
        connected: state.is_connected(),
        status: state.status,
        user: state.user,
    });
}

async fn health(State(session): State<SessionContext>) -> Json<HealthResponse> {
    return Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        connection: session.state().status,
        timestamp: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });
}

async fn send(State(session): State<SessionContext>, body: Bytes) -> Response {
    let req = match SendRequest::parse(&body) {
        Some(req) => req,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SendResult::failed(SendRequest::MISSING_FIELDS)),
            )
                .into_response();
        }
    };

    let res = session.send(&req.phone_number, &req.message).await;
    return Json(res).into_response();
}

async fn webhook(State(session): State<SessionContext>, body: Bytes) -> Response {
    match session.ingest_webhook(&body) {
        Ok(received) => {
            return Json(WebhookResponse { received }).into_response();
        }
        Err(err) if err.downcast_ref::<UnauthorizedWebhook>().is_some() => {
            return (StatusCode::UNAUTHORIZED, err.to_string()).into_response();
        }
        Err(err) => {
            tracing::warn!(error = ?err, "Unable to decode webhook delivery");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    }
}

pub fn router(session: SessionContext) -> Router {
    return Router::new()
        .route("/qr", get(qr))
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/send", post(send))
        .route("/webhook", post(webhook))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(session);
}

pub async fn serve(listener: TcpListener, session: SessionContext) -> Result<()> {
    tracing::info!(addr = ?listener.local_addr()?, "HTTP API listening");
    axum::serve(listener, router(session)).await?;
    return Ok(());
}
