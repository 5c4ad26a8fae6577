use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};

use fete_types::api::Claims;

use crate::auth::decode_token;
use crate::error::ApiError;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn verify(state: &AppState, token: &str) -> Result<Claims, ApiError> {
    decode_token(&state.jwt_secret, token).map_err(|_| ApiError::Unauthorized("Token is not valid".into()))
}

/// Extract and validate the JWT from the Authorization header.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("No token, authorization denied".into()))?;
    let claims = verify(&state, token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Like `require_auth`, but a request without a token passes through as a
/// guest. A token that is present must still be valid.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(token) = bearer_token(req.headers()) {
        let claims = verify(&state, token)?;
        req.extensions_mut().insert(claims);
    }
    Ok(next.run(req).await)
}

/// Admin/planner gate. Must be layered inside `require_auth`.
pub async fn require_staff(req: Request, next: Next) -> Result<Response, ApiError> {
    let is_staff = req.extensions().get::<Claims>().is_some_and(|c| c.role.is_staff());
    if !is_staff {
        return Err(ApiError::Forbidden("Access denied. Admin or planner role required.".into()));
    }
    Ok(next.run(req).await)
}

/// Caller identity on routes behind `optional_auth`.
#[derive(Debug, Clone)]
pub struct MaybeClaims(pub Option<Claims>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeClaims {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Claims>().cloned()))
    }
}
