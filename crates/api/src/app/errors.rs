use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use academia_auth::AuthError;

/// Map an [`AuthError`] using the default status for token failures (401).
pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    auth_error_response(err, StatusCode::UNAUTHORIZED)
}

/// Map an [`AuthError`]; `token_status` is used for `InvalidToken` and
/// `InvalidOrExpiredToken`, which are 400 on the verify/reset endpoints.
pub fn auth_error_response(err: AuthError, token_status: StatusCode) -> axum::response::Response {
    let status = match &err {
        AuthError::TenantNotFound => StatusCode::UNAUTHORIZED,
        AuthError::TenantInactive | AuthError::LicenseExpired => StatusCode::FORBIDDEN,
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::AccountSuspended | AuthError::AccountInactive | AuthError::AccountPending => {
            StatusCode::FORBIDDEN
        }
        AuthError::UserExists => StatusCode::CONFLICT,
        AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::AlreadyVerified => StatusCode::BAD_REQUEST,
        AuthError::InvalidToken | AuthError::InvalidOrExpiredToken => token_status,
        AuthError::InsufficientPermissions | AuthError::TenantMismatch => StatusCode::FORBIDDEN,
        AuthError::Validation(fields) => return json_validation_error(fields),
        AuthError::Internal(detail) => {
            tracing::error!(error = %detail, "internal error");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.code(),
                "internal server error",
            );
        }
    };
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn json_validation_error(fields: &BTreeMap<String, String>) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "success": false,
            "error": "validation_error",
            "message": "validation failed",
            "details": fields,
        })),
    )
        .into_response()
}
