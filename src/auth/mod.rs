/*!
 * # Authentication and Authorization Module
 *
 * Bearer JWTs are issued by the warehouse's identity service; this module only
 * verifies them and turns their claims into an [`AuthUser`]. Access rules for
 * the goods-receipt workflow (module access, QC review, cross-user visibility)
 * live on [`AuthUser`] so every service applies them the same way.
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MANAGER: &str = "manager";
pub const ROLE_QC: &str = "qc";

/// Grants access to the multi-GRN screens
pub const PERM_MULTIPLE_GRN: &str = "multiple_grn";
/// Grants QC review rights without the `qc` role
pub const PERM_QC_DASHBOARD: &str = "qc_dashboard";

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,              // Subject (user ID)
    pub name: Option<String>,     // User's name
    pub email: Option<String>,    // User's email
    pub roles: Vec<String>,       // User's roles
    pub permissions: Vec<String>, // User's explicit permissions
    pub jti: String,              // JWT ID
    pub iat: i64,                 // Issued at time
    pub exp: i64,                 // Expiration time
    pub nbf: i64,                 // Not valid before time
    pub iss: String,              // Issuer
    pub aud: String,              // Audience
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    /// Check if the user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the user has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }

    /// Module gate for creating and working on batches
    pub fn require_grn_access(&self) -> Result<(), ServiceError> {
        if self.is_admin() || self.has_permission(PERM_MULTIPLE_GRN) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "Access denied - Multiple GRN permission required".to_string(),
            ))
        }
    }

    /// QC approve/reject and the QC dashboard
    pub fn require_qc_reviewer(&self) -> Result<(), ServiceError> {
        if self.has_permission(PERM_QC_DASHBOARD) || self.has_any_role(&[ROLE_ADMIN, ROLE_QC]) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "QC approval rights are required".to_string(),
            ))
        }
    }

    /// Re-posting failed purchase orders
    pub fn require_posting_retry(&self) -> Result<(), ServiceError> {
        if self.has_permission(PERM_QC_DASHBOARD)
            || self.has_any_role(&[ROLE_ADMIN, ROLE_QC, ROLE_MANAGER])
        {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "QC or manager rights are required to retry posting".to_string(),
            ))
        }
    }

    /// Owners can always act on their own batch; `roles` lists who else may.
    pub fn owns_or_has_role(&self, owner_id: &str, roles: &[&str]) -> bool {
        self.user_id == owner_id || self.has_any_role(roles)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_audience: String,
        jwt_issuer: String,
        access_token_expiration: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            access_token_expiration,
        }
    }
}

impl From<&crate::config::AppConfig> for AuthConfig {
    fn from(cfg: &crate::config::AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.auth_audience.clone(),
            cfg.auth_issuer.clone(),
            Duration::from_secs(30 * 60),
        )
    }
}

/// Verifies bearer tokens
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Validate a JWT token and extract the claims
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => {
                debug!(error = %e, "rejected bearer token");
                AuthError::InvalidToken
            }
        })
    }

    /// Mints an access token; used by operational tooling and tests.
    pub fn issue_token(
        &self,
        user_id: &str,
        name: Option<&str>,
        roles: &[&str],
        permissions: &[&str],
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            name: name.map(str::to_string),
            email: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.config.access_token_expiration.as_secs() as i64,
            nbf: now,
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingAuth)?;
        let claims = self.validate_token(token).await?;

        Ok(AuthUser {
            user_id: claims.sub,
            name: claims.name,
            email: claims.email,
            roles: claims.roles,
            permissions: claims.permissions,
            token_id: claims.jti,
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::TokenCreation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                msg.clone(),
            ),
            Self::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

/// Makes the auth service reachable from extractors regardless of router state.
pub async fn auth_service_middleware(
    auth: axum::extract::State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth.0.clone());
    next.run(request).await
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let auth_service = parts
            .extensions
            .get::<Arc<AuthService>>()
            .cloned()
            .ok_or_else(|| AuthError::InternalError("Authentication service not available".into()))?;

        let user = auth_service.authenticate(&parts.headers).await?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// Rejects callers without access to the multi-GRN module
pub async fn grn_access_middleware(user: AuthUser, request: Request, next: Next) -> Response {
    match user.require_grn_access() {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

pub trait AuthRouterExt {
    fn with_grn_access(self) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_grn_access(self) -> Self {
        self.layer(axum::middleware::from_fn(grn_access_middleware))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "unit_test_secret_value_with_enough_entropy_0123456789".into(),
            "multi-grn-auth".into(),
            "multi-grn-api".into(),
            Duration::from_secs(300),
        ))
    }

    fn user(roles: &[&str], permissions: &[&str]) -> AuthUser {
        AuthUser {
            user_id: "u-1".into(),
            name: None,
            email: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            token_id: "t".into(),
        }
    }

    #[tokio::test]
    async fn issued_tokens_round_trip_through_headers() {
        let svc = service();
        let token = svc
            .issue_token("clerk-1", Some("Clerk"), &["user"], &[PERM_MULTIPLE_GRN])
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let authed = svc.authenticate(&headers).await.unwrap();
        assert_eq!(authed.user_id, "clerk-1");
        assert!(authed.require_grn_access().is_ok());
        assert!(authed.require_qc_reviewer().is_err());
    }

    #[tokio::test]
    async fn tokens_for_another_audience_are_rejected() {
        let other = AuthService::new(AuthConfig::new(
            "unit_test_secret_value_with_enough_entropy_0123456789".into(),
            "someone-else".into(),
            "multi-grn-api".into(),
            Duration::from_secs(300),
        ));
        let token = other.issue_token("x", None, &[], &[]).unwrap();

        assert_matches!(
            service().validate_token(&token).await,
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn missing_header_is_missing_auth() {
        assert_matches!(
            service().authenticate(&HeaderMap::new()).await,
            Err(AuthError::MissingAuth)
        );
    }

    #[test]
    fn qc_rights_come_from_role_or_permission() {
        assert!(user(&[ROLE_QC], &[]).require_qc_reviewer().is_ok());
        assert!(user(&[], &[PERM_QC_DASHBOARD]).require_qc_reviewer().is_ok());
        assert!(user(&[ROLE_ADMIN], &[]).require_qc_reviewer().is_ok());
        assert!(user(&[ROLE_MANAGER], &[]).require_qc_reviewer().is_err());
        assert!(user(&[ROLE_MANAGER], &[]).require_posting_retry().is_ok());
    }

    #[test]
    fn ownership_check_allows_listed_roles() {
        let manager = user(&[ROLE_MANAGER], &[]);
        assert!(manager.owns_or_has_role("someone", &[ROLE_ADMIN, ROLE_MANAGER]));
        assert!(!manager.owns_or_has_role("someone", &[ROLE_ADMIN]));
        assert!(manager.owns_or_has_role("u-1", &[]));
    }
}
