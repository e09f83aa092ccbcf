//! Process configuration loaded from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `BIND_ADDR` | `0.0.0.0:8080` |
//! | `DATABASE_URL` | unset (in-memory storage) |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |
//! | `TOKEN_DENYLIST` | `false` |
//! | `JWT_ACCESS_SECRET` / `JWT_REFRESH_SECRET` | insecure dev defaults (warned) |
//! | `JWT_ISSUER` / `JWT_AUDIENCE` | `academia` / `academia-api` |
//! | `ACCESS_TOKEN_TTL_SECS` | 7 days |
//! | `REFRESH_TOKEN_TTL_SECS` | 30 days |
//! | `PASSWORD_RESET_TTL_SECS` | 1 hour |
//! | `ARGON2_MEMORY_KIB` / `ARGON2_ITERATIONS` / `ARGON2_PARALLELISM` | 19456 / 2 / 1 |
//! | `PASSWORD_MIN_LENGTH` | `8` |
//! | `AUTO_LOGIN_ON_REGISTER` | `true` |
//! | `SELF_REGISTRATION_MAX_ROLE` | `student` |

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use academia_auth::{AuthConfig, Role};

const DEV_ACCESS_SECRET: &str = "dev-access-secret";
const DEV_REFRESH_SECRET: &str = "dev-refresh-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is invalid ({expected}): {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub token_denylist: bool,
    pub auth: AuthConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source (tests pass a map).
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AuthConfig::default();

        let access_token_secret = secret(&get, "JWT_ACCESS_SECRET", DEV_ACCESS_SECRET);
        let refresh_token_secret = secret(&get, "JWT_REFRESH_SECRET", DEV_REFRESH_SECRET);

        let mut password_params = defaults.password_params;
        password_params.memory_kib = parse_or(&get, "ARGON2_MEMORY_KIB", "a positive integer", password_params.memory_kib)?;
        password_params.iterations = parse_or(&get, "ARGON2_ITERATIONS", "a positive integer", password_params.iterations)?;
        password_params.parallelism =
            parse_or(&get, "ARGON2_PARALLELISM", "a positive integer", password_params.parallelism)?;

        let auth = AuthConfig {
            access_token_secret,
            refresh_token_secret,
            issuer: get("JWT_ISSUER").unwrap_or(defaults.issuer),
            audience: get("JWT_AUDIENCE").unwrap_or(defaults.audience),
            access_token_lifetime_secs: parse_or(
                &get,
                "ACCESS_TOKEN_TTL_SECS",
                "seconds",
                defaults.access_token_lifetime_secs,
            )?,
            refresh_token_lifetime_secs: parse_or(
                &get,
                "REFRESH_TOKEN_TTL_SECS",
                "seconds",
                defaults.refresh_token_lifetime_secs,
            )?,
            password_reset_lifetime_secs: parse_or(
                &get,
                "PASSWORD_RESET_TTL_SECS",
                "seconds",
                defaults.password_reset_lifetime_secs,
            )?,
            password_params,
            min_password_length: parse_or(&get, "PASSWORD_MIN_LENGTH", "a positive integer", defaults.min_password_length)?,
            issue_tokens_on_register: parse_bool_or(&get, "AUTO_LOGIN_ON_REGISTER", defaults.issue_tokens_on_register)?,
            self_registration_max_role: parse_or(
                &get,
                "SELF_REGISTRATION_MAX_ROLE",
                "one of student, coach, branch_manager, system_manager",
                Role::Student,
            )?,
        };

        Ok(Self {
            bind_addr: parse_or(&get, "BIND_ADDR", "host:port", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            database_url: get("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", "a positive integer", 10)?,
            token_denylist: parse_bool_or(&get, "TOKEN_DENYLIST", false)?,
            auth,
        })
    }
}

fn secret<F>(get: &F, name: &'static str, dev_default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match get(name).filter(|v| !v.is_empty()) {
        Some(value) => value,
        None => {
            tracing::warn!(variable = name, "secret not set; using insecure dev default");
            dev_default.to_string()
        }
    }
}

fn parse_or<F, T>(get: &F, name: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value: raw,
        }),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(get: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                expected: "a boolean",
                value: raw,
            }),
        },
        None => Ok(default),
    }
}
