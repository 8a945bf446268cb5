// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, models::approval::Role};

/// JWT Claims issued by the authentication service.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the user id, as a string.
    pub sub: String,
    /// One of reader, writer, sub_editor, editor, admin.
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// Signs a token the way the authentication service does.
/// Used by operators and tests; this service never logs anyone in.
pub fn sign_jwt(
    id: i64,
    role: Role,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        role: role.as_str().to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header and injects the
/// `Claims` into the request extensions. Anything else is a 401.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header.and_then(|header| header.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return Err(AppError::AuthError("Missing bearer token".to_string())),
    };

    let claims = verify_jwt(token, &config.jwt_secret)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Axum Middleware: Admin Authorization.
///
/// Must be used AFTER `auth_middleware`. Anyone but an admin gets a 403.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))?;

    CurrentUser::try_from(claims)?.require(&[Role::Admin])?;
    Ok(next.run(req).await)
}

/// The authenticated actor: who they are and which role they act in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub role: Role,
}

impl CurrentUser {
    /// 403 unless the actor holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::unauthorized_role())
        }
    }

    pub fn require_editorial(&self) -> Result<(), AppError> {
        self.require(&[Role::Editor, Role::Admin])
    }

    /// Any of the three approval tiers.
    pub fn require_reviewer(&self) -> Result<(), AppError> {
        self.require(&[Role::SubEditor, Role::Editor, Role::Admin])
    }
}

impl TryFrom<&Claims> for CurrentUser {
    type Error = AppError;

    /// An unparsable subject or unknown role means the identity can't be trusted.
    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        let id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;
        let role = claims
            .role
            .parse::<Role>()
            .map_err(|_| AppError::AuthError("Invalid token role".to_string()))?;
        Ok(Self { id, role })
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))?;
        CurrentUser::try_from(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_identity() {
        let token = sign_jwt(42, Role::SubEditor, "secret", 60).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        let user = CurrentUser::try_from(&claims).unwrap();

        assert_eq!(user, CurrentUser { id: 42, role: Role::SubEditor });
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_jwt(1, Role::Admin, "secret", 60).unwrap();
        assert!(matches!(verify_jwt(&token, "other"), Err(AppError::AuthError(_))));
    }

    #[test]
    fn unknown_role_is_unauthenticated() {
        let claims = Claims {
            sub: "7".into(),
            role: "owner".into(),
            exp: usize::MAX,
        };
        assert!(matches!(CurrentUser::try_from(&claims), Err(AppError::AuthError(_))));

        let claims = Claims {
            sub: "abc".into(),
            role: "admin".into(),
            exp: usize::MAX,
        };
        assert!(matches!(CurrentUser::try_from(&claims), Err(AppError::AuthError(_))));
    }

    #[test]
    fn require_checks_role_membership() {
        let editor = CurrentUser { id: 1, role: Role::Editor };
        assert!(editor.require_editorial().is_ok());

        let writer = CurrentUser { id: 2, role: Role::Writer };
        assert!(matches!(writer.require_editorial(), Err(AppError::Forbidden(_))));
    }
}
