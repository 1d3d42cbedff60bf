use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::AuthError;
use crate::response::json_error;
use crate::state::AppState;

/// Verifies the request token and stores the resolved [`crate::auth::AuthUser`]
/// in the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = crate::auth::extract_token(req.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing auth token")
            .into_response();
    };

    match crate::auth::verify_request_token(&token, state.config().jwt_secret.as_deref()) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(AuthError::MissingSecret) => {
            tracing::error!("JWT_SECRET is not configured, rejecting authenticated request");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Authentication is not configured",
            )
            .into_response()
        }
        Err(err) => {
            tracing::debug!(error = %err, "token rejected");
            json_error(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication failed, please sign in again",
            )
            .into_response()
        }
    }
}
