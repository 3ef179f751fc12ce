use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MANAGER: &str = "manager";
pub const ROLE_VIEWER: &str = "viewer";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub role: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    email: Option<String>,
    role: Option<String>,
    #[allow(dead_code)]
    exp: usize,
}

/// Resolve the calling user from the Authorization header.
///
/// Tokens are issued by the auth service; this backend only verifies them.
/// Outside production, `x-user-id`/`x-user-role` headers can stand in for a
/// token when dev overrides are enabled.
pub fn require_user(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user_id) = header_str(headers, "x-user-id") {
            let role = header_str(headers, "x-user-role").unwrap_or_else(|| ROLE_ADMIN.to_string());
            return Ok(AuthUser {
                id: user_id,
                email: None,
                role,
            });
        }
    }

    let token = bearer_token(headers).ok_or_else(|| {
        AppError::Unauthorized("Missing or malformed Authorization header.".to_string())
    })?;

    let secret = state.config.jwt_secret.as_deref().ok_or_else(|| {
        AppError::Dependency("JWT_SECRET is not configured.".to_string())
    })?;

    let data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|error| AppError::Unauthorized(format!("Invalid token: {error}")))?;

    Ok(AuthUser {
        id: data.claims.sub,
        email: data.claims.email,
        role: data
            .claims
            .role
            .unwrap_or_else(|| ROLE_VIEWER.to_string()),
    })
}

pub fn require_role(user: &AuthUser, allowed_roles: &[&str]) -> Result<(), AppError> {
    if allowed_roles.contains(&user.role.as_str()) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "Forbidden: role '{}' is not allowed for this action.",
        user.role
    )))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::{bearer_token, require_role, AuthUser, ROLE_ADMIN, ROLE_MANAGER};
    use axum::http::HeaderMap;

    fn user_with_role(role: &str) -> AuthUser {
        AuthUser {
            id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            email: None,
            role: role.to_string(),
        }
    }

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));

        let mut bad = HeaderMap::new();
        bad.insert("authorization", "Token abc".parse().unwrap());
        assert!(bearer_token(&bad).is_none());
    }

    #[test]
    fn role_guard() {
        assert!(require_role(&user_with_role(ROLE_ADMIN), &[ROLE_ADMIN, ROLE_MANAGER]).is_ok());
        assert!(require_role(&user_with_role("viewer"), &[ROLE_ADMIN, ROLE_MANAGER]).is_err());
    }
}
