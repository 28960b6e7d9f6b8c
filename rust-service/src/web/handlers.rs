//! Endpoint handlers.
//!
//! Error mapping follows the workflow's propagation policy: configuration
//! and backend failures before the sending phase surface as 5xx, bad
//! client input as 4xx, and "no pending issue" as a machine-readable 404.
//! Once sending has begun, failures are absorbed into the returned counts
//! and the response stays 200.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dispatch::{self, DispatchOutcome};
use crate::google::Authenticator;
use crate::sheet::SheetsClient;
use crate::token;

/// Largest batch override a caller may request. A service-local cap on
/// typo-sized requests; none of the upstream APIs impose one.
const MAX_BATCH_SIZE: usize = 500;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

// =============================================================================
// Response types
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Generic error body with a machine-readable message.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Dispatch trigger
// =============================================================================

/// Dispatch trigger request body (optional).
#[derive(Debug, Default, Deserialize)]
pub struct DispatchRequest {
    #[serde(rename = "batchSize")]
    pub batch_size: Option<usize>,
}

/// Dispatch trigger response.
#[derive(Serialize)]
pub struct DispatchResponse {
    pub success: bool,
    pub sent: usize,
    pub failed: usize,
    pub message: String,
}

/// Newsletter dispatch endpoint, invoked by the external scheduler.
pub async fn dispatch_newsletter(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<DispatchRequest>, JsonRejection>,
) -> Response {
    if let Some(response) = check_auth(&state.config, &headers) {
        return response;
    }

    // An absent body means "use defaults"; a body that is present but does
    // not deserialize is a client error, not a silent fallback.
    let request = match body {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => DispatchRequest::default(),
        Err(rejection) => {
            warn!(error = %rejection, "newsletter_request_body_invalid");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let batch_size = match request.batch_size {
        Some(0) => {
            return error_response(StatusCode::BAD_REQUEST, "batchSize must be at least 1")
        }
        Some(n) if n > MAX_BATCH_SIZE => {
            return error_response(StatusCode::BAD_REQUEST, "batchSize is too large")
        }
        Some(n) => n,
        None => state.config.batch_size,
    };

    info!(batch_size = batch_size, "newsletter_trigger_received");

    match dispatch::run_with_config(&state.config, batch_size).await {
        Ok(DispatchOutcome::NoContent) => {
            error_response(StatusCode::NOT_FOUND, "No newsletter data found")
        }
        Ok(DispatchOutcome::Completed(report)) => (
            StatusCode::OK,
            Json(DispatchResponse {
                success: true,
                sent: report.sent,
                failed: report.failed,
                message: format!("Newsletter sent to {} recipients", report.sent),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = ?e, "newsletter_dispatch_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send newsletter")
        }
    }
}

/// Verify the optional shared bearer token on the trigger endpoint.
fn check_auth(config: &Config, headers: &HeaderMap) -> Option<Response> {
    let expected = config.dispatch_auth_token.as_deref()?;

    let provided = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => None,
        Some(_) => {
            warn!("newsletter_auth_invalid");
            Some(error_response(StatusCode::UNAUTHORIZED, "unauthorized"))
        }
        None => {
            warn!("newsletter_auth_missing");
            Some(error_response(StatusCode::UNAUTHORIZED, "unauthorized"))
        }
    }
}

// =============================================================================
// Subscriber flows
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}

#[derive(Serialize)]
struct SubscribeResponse {
    success: bool,
}

/// Subscribe endpoint: append a pending subscriber row.
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Response {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return error_response(StatusCode::BAD_REQUEST, "Valid email is required");
    }

    match sheets_client(&state.config).await {
        Ok(client) => match client.append_subscriber(&email).await {
            Ok(()) => {
                info!(email = %email, "subscriber_added");
                (StatusCode::OK, Json(SubscribeResponse { success: true })).into_response()
            }
            Err(e) => {
                error!(error = ?e, "subscribe_failed");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to save email. Please try again.",
                )
            }
        },
        Err(e) => {
            error!(error = ?e, "subscribe_config_invalid");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Serialize)]
struct VerifyResponse {
    success: bool,
    message: String,
}

/// Verification endpoint: flip the subscriber's status to `done`.
pub async fn verify(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> Response {
    let Some(raw_token) = query.token else {
        return error_response(StatusCode::BAD_REQUEST, "Verification token is required");
    };

    let email = match token::decode_email(&raw_token) {
        Ok(email) => email,
        Err(_) => {
            warn!("verify_token_malformed");
            return error_response(StatusCode::BAD_REQUEST, "Invalid verification token");
        }
    };

    let client = match sheets_client(&state.config).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = ?e, "verify_config_invalid");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error");
        }
    };

    match client.find_by_email(&email).await {
        Ok(Some((schema, record))) => {
            if let Err(e) = client.set_status(&schema, record.row, "done").await {
                error!(email = %email, error = ?e, "verify_update_failed");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to verify email. Please try again.",
                );
            }
            info!(email = %email, "subscriber_verified");
            (
                StatusCode::OK,
                Json(VerifyResponse {
                    success: true,
                    message: "Email verified successfully".to_string(),
                }),
            )
                .into_response()
        }
        Ok(None) => {
            warn!(email = %email, "verify_subscriber_not_found");
            error_response(StatusCode::BAD_REQUEST, "Invalid or expired verification token")
        }
        Err(e) => {
            error!(error = ?e, "verify_lookup_failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to verify email. Please try again.",
            )
        }
    }
}

#[derive(Serialize)]
struct UnsubscribeResponse {
    success: bool,
    email: String,
}

/// Unsubscribe endpoint: delete the subscriber's row.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Response {
    let Some(raw_token) = query.token else {
        return error_response(StatusCode::BAD_REQUEST, "Missing token");
    };

    let email = match token::decode_email(&raw_token) {
        Ok(email) => email,
        Err(_) => {
            warn!("unsubscribe_token_malformed");
            return error_response(StatusCode::BAD_REQUEST, "Invalid token");
        }
    };

    let client = match sheets_client(&state.config).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = ?e, "unsubscribe_config_invalid");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error");
        }
    };

    match client.find_by_email(&email).await {
        Ok(Some((_, record))) => match client.delete_row(record.row).await {
            Ok(()) => {
                info!(email = %email, "subscriber_removed");
                (
                    StatusCode::OK,
                    Json(UnsubscribeResponse {
                        success: true,
                        email,
                    }),
                )
                    .into_response()
            }
            Err(e) => {
                error!(email = %email, error = ?e, "unsubscribe_delete_failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to unsubscribe")
            }
        },
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Subscriber not found"),
        Err(e) => {
            error!(error = ?e, "unsubscribe_lookup_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to unsubscribe")
        }
    }
}

/// Build a Sheets client from validated configuration.
async fn sheets_client(config: &Config) -> Result<SheetsClient> {
    let validated = config.validate().context("Server configuration error")?;
    let timeout = Duration::from_millis(config.request_timeout_ms);
    let auth = Arc::new(Authenticator::new(&validated, timeout)?);

    SheetsClient::new(
        auth,
        validated.sheet_id,
        config.marker_column.clone(),
        config.status_column.clone(),
        timeout,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    use crate::config::DEFAULT_BATCH_SIZE;

    fn test_config() -> Config {
        Config {
            sheet_id: None,
            service_account_email: None,
            private_key: None,
            drive_folder_id: None,
            marker_column: "learncode".to_string(),
            status_column: "verification".to_string(),
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 465,
            smtp_user: "no-reply@learnif.example".to_string(),
            smtp_password: "secret".to_string(),
            website_url: "https://learnif.example".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout_ms: 8000,
            smtp_timeout_ms: 15000,
            code_image_service_url: None,
            port: 8080,
            dispatch_auth_token: None,
        }
    }

    fn app(config: Config) -> Router {
        Router::new()
            .route("/api/newsletter", post(dispatch_newsletter))
            .with_state(AppState::new(config))
    }

    fn json_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/newsletter")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_rejects_malformed_json_body() {
        let response = app(test_config())
            .oneshot(json_request("{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_negative_batch_size() {
        let response = app(test_config())
            .oneshot(json_request(r#"{"batchSize": -5}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_zero_batch_size() {
        let response = app(test_config())
            .oneshot(json_request(r#"{"batchSize": 0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_oversized_batch_size() {
        let response = app(test_config())
            .oneshot(json_request(r#"{"batchSize": 100000}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dispatch_accepts_absent_body() {
        // No body and no content type selects the default batch size; the
        // request then fails on the unconfigured backend, not as bad input.
        let request = Request::builder()
            .method("POST")
            .uri("/api/newsletter")
            .body(Body::empty())
            .unwrap();
        let response = app(test_config()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_dispatch_requires_configured_token() {
        let mut config = test_config();
        config.dispatch_auth_token = Some("shared-secret".to_string());

        let request = Request::builder()
            .method("POST")
            .uri("/api/newsletter")
            .body(Body::empty())
            .unwrap();
        let response = app(config).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_wrong_token() {
        let mut config = test_config();
        config.dispatch_auth_token = Some("shared-secret".to_string());

        let request = Request::builder()
            .method("POST")
            .uri("/api/newsletter")
            .header(header::AUTHORIZATION, "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        let response = app(config).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
