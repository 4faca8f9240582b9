use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use tracing::{error, info, warn};

use crate::reconciler::{self, NotificationOutcome};
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Receives signed checkout notifications from the payment gateway.
///
/// The body must be the exact bytes the gateway signed. Any handled or
/// ignored event is acknowledged with 200; a failed signature gets 400 and a
/// store failure gets 500 so the gateway redelivers.
#[utoipa::path(
    post,
    path = "/purchase/webhook",
    request_body(content = String, description = "Raw gateway event payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 400, description = "Invalid signature"),
        (status = 500, description = "Processing failed, gateway should retry")
    ),
    tag = "Purchase"
)]
pub async fn handle_payment_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
    else {
        warn!("webhook request without signature header");
        return (StatusCode::BAD_REQUEST, "Invalid signature");
    };

    let event = match app_state.gateway.verify_and_parse_event(&body, signature) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "webhook signature verification failed");
            return (StatusCode::BAD_REQUEST, "Invalid signature");
        }
    };

    let mut conn = match app_state.get_db_connection().await {
        Ok(conn) => conn,
        Err(e) => {
            error!(error = %e, session_id = ?event.session_id, "webhook could not reach the store");
            sentry::capture_error(&e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Server error");
        }
    };

    match reconciler::apply_notification(&mut conn, &event).await {
        Ok(outcome) => {
            info!(session_id = ?event.session_id, outcome = ?outcome, "webhook processed");
            (StatusCode::OK, acknowledgement(&outcome))
        }
        Err(e) => {
            error!(error = %e, session_id = ?event.session_id, "webhook processing failed");
            sentry::capture_error(&e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}

fn acknowledgement(outcome: &NotificationOutcome) -> &'static str {
    match outcome {
        NotificationOutcome::PurchaseNotFound => "Purchase not found",
        NotificationOutcome::MissingUserOrCourse => "User or Course not found",
        NotificationOutcome::SelfEnrollmentSkipped => "Skipped self-enrollment",
        NotificationOutcome::Ignored
        | NotificationOutcome::AlreadyCompleted
        | NotificationOutcome::Enrolled => "Webhook received",
    }
}
