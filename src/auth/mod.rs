/*!
 * # Authentication and Authorization Module
 *
 * Sign-in exchanges an access token issued by the external auth provider
 * (HS256 JWT) for a server-side session. Every other request carries the
 * session token as a bearer credential:
 *
 * - `auth_middleware` resolves the session into an [`AuthUser`]
 * - `permission_middleware` gates a route on a `resource:action` permission
 * - admins bypass permission checks and may act on another branch via `X-Branch-Id`
 */

use crate::config::AppConfig;
use crate::entities::{branch, profile};
use crate::errors::ServiceError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod permissions;
pub mod session;

pub use permissions::*;
pub use session::*;

pub const BRANCH_OVERRIDE_HEADER: &str = "x-branch-id";

/// Claims carried by the auth provider's access token
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderClaims {
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
}

/// The signed-in caller, resolved from the session on every request
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthUser {
    pub user_id: Uuid,
    /// Branch the profile belongs to
    pub home_branch_id: Uuid,
    /// Branch every read and write is scoped to
    pub branch_id: Uuid,
    pub role: profile::Role,
    pub permissions: Vec<String>,
    pub session_id: Uuid,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == profile::Role::Admin
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_admin()
            || self
                .permissions
                .iter()
                .any(|p| is_permission_implied(p, permission))
    }

    pub fn require_permission(&self, permission: &str) -> Result<(), ServiceError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermissions.into())
        }
    }
}

/// Bearer token of the current request, kept so the session can be revoked
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No session token provided")]
    MissingToken,

    #[error("Invalid access token")]
    InvalidToken,

    #[error("Session expired or revoked")]
    SessionExpired,

    #[error("No profile exists for this user")]
    ProfileNotFound,

    #[error("Profile is deactivated")]
    ProfileInactive,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Branch override is not allowed")]
    BranchOverrideDenied,

    #[error("Unknown branch {0}")]
    UnknownBranch(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Authentication service not available")]
    ServiceUnavailable,
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::SessionExpired
            | AuthError::ProfileNotFound => ServiceError::Unauthorized(err.to_string()),
            AuthError::ProfileInactive
            | AuthError::InsufficientPermissions
            | AuthError::BranchOverrideDenied => ServiceError::Forbidden(err.to_string()),
            AuthError::UnknownBranch(_) => ServiceError::BadRequest(err.to_string()),
            AuthError::DatabaseError(msg) => ServiceError::InternalError(msg),
            AuthError::ServiceUnavailable => ServiceError::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        AuthError::DatabaseError(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

/// Verifies provider tokens and owns the session store
pub struct AuthService {
    sessions: Arc<dyn SessionStore>,
    db: Arc<DatabaseConnection>,
    jwt_secret: String,
    audience: String,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        config: &AppConfig,
        db: Arc<DatabaseConnection>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            sessions,
            db,
            jwt_secret: config.auth_jwt_secret.clone(),
            audience: config.auth_jwt_audience.clone(),
            session_ttl: Duration::seconds(config.session_ttl_secs as i64),
        }
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        self.sessions.clone()
    }

    /// Validates signature, expiry and audience of a provider access token
    pub fn verify_access_token(&self, token: &str) -> Result<ProviderClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.audience.as_str()]);

        decode::<ProviderClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!(error = %e, "access token rejected");
            AuthError::InvalidToken
        })
    }

    /// Exchanges a provider token for a session bound to the user's active profile
    pub async fn sign_in(&self, access_token: &str) -> Result<(Session, profile::Model), AuthError> {
        let claims = self.verify_access_token(access_token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        let profile = profile::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or(AuthError::ProfileNotFound)?;
        if !profile.is_active {
            return Err(AuthError::ProfileInactive);
        }

        let session = self
            .sessions
            .create(profile.id, profile.branch_id, profile.role, self.session_ttl)
            .await;
        info!(user_id = %profile.id, session_id = %session.id, "session created");
        Ok((session, profile))
    }

    /// Resolves a session token, applying an admin branch override when present
    pub async fn authenticate(
        &self,
        token: &str,
        branch_override: Option<Uuid>,
    ) -> Result<AuthUser, AuthError> {
        let session = self
            .sessions
            .get(token)
            .await
            .ok_or(AuthError::SessionExpired)?;

        let branch_id = match branch_override {
            Some(requested) if requested != session.branch_id => {
                if session.role != profile::Role::Admin {
                    return Err(AuthError::BranchOverrideDenied);
                }
                branch::Entity::find_by_id(requested)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| AuthError::UnknownBranch(requested.to_string()))?;
                requested
            }
            _ => session.branch_id,
        };

        Ok(AuthUser {
            user_id: session.user_id,
            home_branch_id: session.branch_id,
            branch_id,
            role: session.role,
            permissions: permissions_for(session.role),
            session_id: session.id,
        })
    }

    pub async fn sign_out(&self, token: &str) -> bool {
        self.sessions.revoke(token).await
    }

    pub async fn revoke_user(&self, user_id: Uuid) -> usize {
        self.sessions.revoke_user(user_id).await
    }
}

/// Periodically drops expired sessions from the store
pub fn spawn_session_purge(
    sessions: Arc<dyn SessionStore>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired().await;
            if purged > 0 {
                debug!(purged, "expired sessions purged");
            }
        }
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn branch_override(headers: &HeaderMap) -> Result<Option<Uuid>, AuthError> {
    match headers.get(BRANCH_OVERRIDE_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(Some)
            .ok_or_else(|| AuthError::UnknownBranch(String::from_utf8_lossy(value.as_bytes()).into_owned())),
    }
}

/// Authentication middleware resolving the bearer session token
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            warn!("auth middleware installed without an AuthService extension");
            return AuthError::ServiceUnavailable.into_response();
        }
    };

    let token = match bearer_token(request.headers()) {
        Some(token) => token,
        None => return AuthError::MissingToken.into_response(),
    };
    let override_branch = match branch_override(request.headers()) {
        Ok(branch) => branch,
        Err(e) => return e.into_response(),
    };

    match auth_service.authenticate(&token, override_branch).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            request.extensions_mut().insert(SessionToken(token));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Permission middleware; admins have every permission
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingToken)?;

    if !user.has_permission(&required_permission) {
        debug!(
            user_id = %user.user_id,
            role = %user.role,
            permission = %required_permission,
            "permission denied"
        );
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
}

impl<S> AuthRouterExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignInRequest {
    pub access_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub profile: profile::Model,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentSessionResponse {
    pub user: AuthUser,
    pub profile: profile::Model,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/session",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Session created", body = SessionResponse),
        (status = 401, description = "Invalid access token", body = crate::errors::ErrorResponse),
        (status = 403, description = "Profile deactivated", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn create_session(
    Extension(auth): Extension<Arc<AuthService>>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<crate::ApiResponse<SessionResponse>>, ServiceError> {
    let (session, profile) = auth.sign_in(&payload.access_token).await?;
    Ok(Json(crate::ApiResponse::success(SessionResponse {
        session_token: session.token,
        expires_at: session.expires_at,
        profile,
    })))
}

pub async fn current_session(
    Extension(auth): Extension<Arc<AuthService>>,
    user: AuthUser,
) -> Result<Json<crate::ApiResponse<CurrentSessionResponse>>, ServiceError> {
    let profile = profile::Entity::find_by_id(user.user_id)
        .one(&*auth.db)
        .await?
        .ok_or(AuthError::ProfileNotFound)?;
    Ok(Json(crate::ApiResponse::success(CurrentSessionResponse {
        user,
        profile,
    })))
}

pub async fn delete_session(
    Extension(auth): Extension<Arc<AuthService>>,
    Extension(token): Extension<SessionToken>,
) -> Result<Json<crate::ApiResponse<bool>>, ServiceError> {
    Ok(Json(crate::ApiResponse::success(
        auth.sign_out(&token.0).await,
    )))
}

/// `/auth/session` routes. Signing in is the only unauthenticated route.
pub fn session_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/auth/session", post(create_session))
        .merge(
            Router::new()
                .route("/auth/session", get(current_session).delete(delete_session))
                .with_auth(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "k3Jw9QzT2mXv8LpR4nYc7HsB1dFg6Ua0";

    fn service() -> AuthService {
        AuthService {
            sessions: Arc::new(InMemorySessionStore::new()),
            db: Arc::new(DatabaseConnection::Disconnected),
            jwt_secret: SECRET.to_string(),
            audience: "authenticated".to_string(),
            session_ttl: Duration::hours(1),
        }
    }

    fn token(aud: &str, exp_offset: i64, secret: &str) -> String {
        let claims = ProviderClaims {
            sub: Uuid::new_v4().to_string(),
            aud: aud.to_string(),
            exp: Utc::now().timestamp() + exp_offset,
            email: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_provider_token() {
        let svc = service();
        let claims = svc
            .verify_access_token(&token("authenticated", 600, SECRET))
            .unwrap();
        assert!(Uuid::parse_str(&claims.sub).is_ok());
    }

    #[test]
    fn rejects_wrong_audience_secret_or_expiry() {
        let svc = service();
        assert!(svc
            .verify_access_token(&token("anon", 600, SECRET))
            .is_err());
        assert!(svc
            .verify_access_token(&token("authenticated", 600, "another-secret-entirely-0123456789"))
            .is_err());
        assert!(svc
            .verify_access_token(&token("authenticated", -600, SECRET))
            .is_err());
    }

    #[tokio::test]
    async fn non_admin_cannot_override_branch() {
        let svc = service();
        let session = svc
            .sessions
            .create(Uuid::new_v4(), Uuid::new_v4(), profile::Role::Sales, Duration::hours(1))
            .await;

        let own = svc.authenticate(&session.token, Some(session.branch_id)).await.unwrap();
        assert_eq!(own.branch_id, session.branch_id);

        let err = svc
            .authenticate(&session.token, Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BranchOverrideDenied));
    }

    #[tokio::test]
    async fn revoked_session_no_longer_authenticates() {
        let svc = service();
        let session = svc
            .sessions
            .create(Uuid::new_v4(), Uuid::new_v4(), profile::Role::Hr, Duration::hours(1))
            .await;
        let user = svc.authenticate(&session.token, None).await.unwrap();
        assert!(user.has_permission(consts::PAYROLL_WRITE));
        assert!(!user.has_permission(consts::ORDERS_READ));

        assert!(svc.sign_out(&session.token).await);
        assert!(matches!(
            svc.authenticate(&session.token, None).await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc123"));
        headers.insert(header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn missing_auth_service_is_reported_as_unavailable() {
        let response = AuthError::ServiceUnavailable.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            AuthError::SessionExpired.into_response().status(),
            axum::http::StatusCode::UNAUTHORIZED
        );
    }
}
