//! Authentication middleware for admin endpoints

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::info;

use crate::state::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-metrics-token";

/// Admin routes answer 404 unless a token is configured, and 401 unless the
/// request carries it.
pub async fn admin_auth(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = app_state.metrics_token.as_deref() else {
        return Err(StatusCode::NOT_FOUND);
    };

    let provided = extract_admin_token(&headers)?;
    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        info!("Rejected admin request to {}", request.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

pub fn extract_admin_token(headers: &HeaderMap) -> Result<&str, StatusCode> {
    headers
        .get(ADMIN_TOKEN_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::BAD_REQUEST)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
