use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;
use uuid::Uuid;

use fete_db::{NewUser, is_constraint_violation};
use fete_types::api::{
    AuthResponse, Claims, Envelope, LoginRequest, RegisterRequest, SetRoleRequest,
    UpdateProfileRequest, UserBody,
};
use fete_types::models::{Role, User};

use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::state::{AppState, with_db};

const MIN_PASSWORD_LEN: usize = 6;
const TOKEN_TTL_DAYS: i64 = 30;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::validation("A valid email is required"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("Password must be at least 6 characters"));
    }

    let password_hash = hash_password(&req.password)?;
    let new = NewUser {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash,
        phone: req.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
        role: Role::Client,
    };

    let row = with_db(&state, move |s| match s.db.create_user(&new) {
        Ok(row) => Ok(row),
        Err(e) if is_constraint_violation(&e) => Err(ApiError::Conflict("User already exists".into())),
        Err(e) => Err(e.into()),
    })
    .await?;

    info!("Registered user {} ({})", row.user.email, row.user.id);
    let token = create_token(&state.jwt_secret, &row.user)?;

    Ok((StatusCode::CREATED, Json(Envelope::ok(AuthResponse { user: row.user, token }))))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = normalize_email(&req.email);
    let row = with_db(&state, move |s| Ok(s.db.get_user_by_email(&email)?))
        .await?
        .ok_or_else(invalid_credentials)?;

    verify_password(&req.password, &row.password_hash)?;

    let token = create_token(&state.jwt_secret, &row.user)?;
    Ok(Json(Envelope::ok(AuthResponse { user: row.user, token })))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let row = with_db(&state, move |s| Ok(s.db.get_user_by_id(claims.sub)?))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(Envelope::ok(UserBody { user: row.user })))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.map(|n| n.trim().to_string());
    if name.as_deref() == Some("") {
        return Err(ApiError::validation("Name cannot be empty"));
    }

    let row = with_db(&state, move |s| {
        Ok(s.db.update_profile(
            claims.sub,
            name.as_deref(),
            req.phone.as_deref(),
            req.avatar.as_deref(),
            req.preferences.as_ref(),
        )?)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(Envelope::ok(UserBody { user: row.user })))
}

/// Admin-only role change. Registration always creates clients, so this is
/// how planners and further admins come to exist.
pub async fn set_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SetRoleRequest>,
) -> ApiResult<impl IntoResponse> {
    if claims.role != Role::Admin {
        return Err(ApiError::Forbidden("Access denied. Admin role required.".into()));
    }

    let row = with_db(&state, move |s| Ok(s.db.set_user_role(user_id, req.role)?))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    info!("{} set role of {} to {}", claims.email, row.user.email, row.user.role);
    Ok(Json(Envelope::ok(UserBody { user: row.user })))
}

fn invalid_credentials() -> ApiError {
    ApiError::validation("Invalid credentials")
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Syntactic check only: one `@`, a non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Hash with Argon2id and a fresh salt.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored_hash: &str) -> ApiResult<()> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid_credentials())
}

pub fn create_token(secret: &str, user: &User) -> ApiResult<String> {
    let claims = Claims {
        sub: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ApiError::Internal(e.into()))
}

pub fn decode_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fete_types::models::Preferences;

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ana".into(),
            email: "ana@example.com".into(),
            phone: None,
            role,
            avatar: String::new(),
            is_verified: false,
            preferences: Preferences::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn token_round_trips_identity_and_role() {
        let planner = user(Role::Planner);
        let token = create_token("secret", &planner).unwrap();
        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, planner.id);
        assert_eq!(claims.role, Role::Planner);
        assert!(decode_token("other-secret", &token).is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hash).is_ok());
        assert!(verify_password("hunter23", &hash).is_err());
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("ana@example.com"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ana @example.com"));
        assert!(!is_valid_email("ana@@example.com"));
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }
}
