use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use academia_auth::{AuthSession, LoginInput, PublicUser, RegisterInput, Role, Tenant};
use academia_core::{BranchId, FieldErrors};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub tenant_domain: String,
}

impl From<LoginRequest> for LoginInput {
    fn from(req: LoginRequest) -> Self {
        LoginInput {
            email: req.email,
            password: req.password,
            tenant_domain: req.tenant_domain,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub tenant_domain: String,
    pub branch_id: Option<String>,
}

impl RegisterRequest {
    /// Parse the loosely-typed fields; other fields are checked by the service.
    pub fn into_input(self) -> Result<RegisterInput, axum::response::Response> {
        let mut invalid = FieldErrors::new();

        let role = match self.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            None => Role::Student,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                invalid.add("role", "must be one of student, coach, branch_manager, system_manager");
                Role::Student
            }),
        };
        let branch_id = match self.branch_id.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<BranchId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    invalid.add("branchId", "must be a UUID");
                    None
                }
            },
        };

        if let Err(academia_core::DomainError::Validation(fields)) = invalid.into_result() {
            return Err(errors::json_validation_error(&fields));
        }

        Ok(RegisterInput {
            email: self.email,
            password: self.password,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            role,
            tenant_domain: self.tenant_domain,
            branch_id,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Body of the reset-request and resend-verification endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountLookupRequest {
    pub email: String,
    pub tenant_domain: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: PublicUser,
    pub tenant: Tenant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl From<AuthSession> for SessionResponse {
    fn from(session: AuthSession) -> Self {
        let (access_token, refresh_token, expires_in) = match session.tokens {
            Some(t) => (Some(t.access_token), Some(t.refresh_token), Some(t.expires_in)),
            None => (None, None, None),
        };
        SessionResponse {
            user: session.user,
            tenant: session.tenant,
            access_token,
            refresh_token,
            expires_in,
        }
    }
}

// -------------------------
// Mapping helpers
// -------------------------

/// Unwrap a JSON body; malformed JSON is a 400 `validation_error`.
pub fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            rejection.body_text(),
        )),
    }
}

/// Success envelope: `{ success: true, data?, message? }`.
pub fn json_ok<T: Serialize>(status: StatusCode, data: Option<T>, message: &str) -> axum::response::Response {
    let mut body = json!({ "success": true, "message": message });
    if let Some(data) = data {
        body["data"] = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "response serialization failed");
                return errors::json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error",
                );
            }
        };
    }
    (status, Json(body)).into_response()
}
