use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use academia_auth::extract_bearer;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::AuthContext;

#[derive(Clone)]
pub struct AuthState {
    pub services: Arc<AppServices>,
}

/// Verify the bearer token and bind the request's tenant scope.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = bearer_token(req.headers()).ok_or_else(|| {
        errors::json_error(StatusCode::UNAUTHORIZED, "invalid_token", "missing or malformed bearer token")
    })?;

    let claims = state
        .services
        .auth
        .authenticate(token, Utc::now())
        .map_err(errors::auth_error_to_response)?;

    req.extensions_mut().insert(AuthContext::from_claims(claims));

    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    extract_bearer(header.to_str().ok()?)
}
