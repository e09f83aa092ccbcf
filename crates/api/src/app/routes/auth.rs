use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use crate::app::dto::{
    self, AccountLookupRequest, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
    ResetPasswordRequest, SessionResponse,
};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::AuthContext;

/// Endpoints reachable without a bearer token.
pub fn public_router() -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/refresh", post(refresh))
        .route("/request-password-reset", post(request_password_reset))
        .route("/reset-password", post(reset_password))
        .route("/verify-email/:token", get(verify_email))
        .route("/resend-verification", post(resend_verification))
}

/// Endpoints behind the bearer middleware; they read [`AuthContext`].
pub fn protected_router() -> Router {
    Router::new()
        .route("/change-password", post(change_password))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let req = dto::parse_body(body)?;
    let session = services
        .auth
        .login(req.into(), Utc::now())
        .await
        .map_err(errors::auth_error_to_response)?;
    Ok(dto::json_ok(StatusCode::OK, Some(SessionResponse::from(session)), "login successful"))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let input = dto::parse_body(body)?.into_input()?;
    let session = services
        .auth
        .register(input, Utc::now())
        .await
        .map_err(errors::auth_error_to_response)?;
    Ok(dto::json_ok(
        StatusCode::CREATED,
        Some(SessionResponse::from(session)),
        "registration successful; check your email to verify the account",
    ))
}

pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let req = dto::parse_body(body)?;
    let pair = services
        .auth
        .refresh_token(&req.refresh_token, Utc::now())
        .await
        .map_err(errors::auth_error_to_response)?;
    Ok(dto::json_ok(StatusCode::OK, Some(pair), "token refreshed"))
}

pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let req = dto::parse_body(body)?;
    services
        .auth
        .change_password(ctx.principal(), &req.current_password, &req.new_password, Utc::now())
        .await
        .map_err(errors::auth_error_to_response)?;
    Ok(dto::json_ok::<()>(StatusCode::OK, None, "password changed"))
}

/// Always 200 once the body validates, whether or not the account exists.
pub async fn request_password_reset(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<AccountLookupRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let req = dto::parse_body(body)?;
    services
        .auth
        .request_password_reset(&req.email, &req.tenant_domain, Utc::now())
        .await
        .map_err(errors::auth_error_to_response)?;
    Ok(dto::json_ok::<()>(
        StatusCode::OK,
        None,
        "if the account exists, a password reset email has been sent",
    ))
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let req = dto::parse_body(body)?;
    services
        .auth
        .reset_password(&req.token, &req.new_password, Utc::now())
        .await
        .map_err(|e| errors::auth_error_response(e, StatusCode::BAD_REQUEST))?;
    Ok(dto::json_ok::<()>(StatusCode::OK, None, "password has been reset"))
}

pub async fn verify_email(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
) -> Result<Response, Response> {
    services
        .auth
        .verify_email(&token)
        .await
        .map_err(|e| errors::auth_error_response(e, StatusCode::BAD_REQUEST))?;
    Ok(dto::json_ok::<()>(StatusCode::OK, None, "email verified"))
}

pub async fn resend_verification(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<AccountLookupRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let req = dto::parse_body(body)?;
    services
        .auth
        .resend_email_verification(&req.email, &req.tenant_domain)
        .await
        .map_err(errors::auth_error_to_response)?;
    Ok(dto::json_ok::<()>(
        StatusCode::OK,
        None,
        "if the account exists and is unverified, a verification email has been sent",
    ))
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    let revoked = services.auth.logout(ctx.claims());
    dto::json_ok(StatusCode::OK, Some(serde_json::json!({ "revoked": revoked })), "logged out")
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Response, Response> {
    let identity = services
        .auth
        .current_identity(ctx.principal())
        .await
        .map_err(errors::auth_error_to_response)?;
    Ok(dto::json_ok(StatusCode::OK, Some(identity), "current identity"))
}
