//! Access control: who is calling, and may they do it

use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{User, UserClaims},
    repository::Repository,
};

#[derive(Clone)]
pub struct AccessService {
    repository: Repository,
    config: AuthConfig,
}

impl AccessService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Issue a token for a user
    pub fn issue_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Validate a bearer token and return its claims
    pub fn authenticate(&self, token: &str) -> AppResult<UserClaims> {
        UserClaims::from_token(token, &self.config.jwt_secret).map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            AppError::Unauthorized("Invalid or expired token".to_string())
        })
    }

    /// Whether the user currently holds the admin role.
    ///
    /// Looked up in the store rather than trusted from the token, so a
    /// demotion takes effect on the next request.
    pub async fn is_admin(&self, user_id: i32) -> AppResult<bool> {
        Ok(self
            .repository
            .users
            .get(user_id)
            .await?
            .map(|u| u.is_admin())
            .unwrap_or(false))
    }

    pub async fn require_admin(&self, user_id: i32) -> AppResult<()> {
        if self.is_admin(user_id).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Administrator privileges required".to_string(),
            ))
        }
    }

    /// The caller may act on `user_id`'s borrow records
    pub async fn require_self_or_admin(&self, claims: &UserClaims, user_id: i32) -> AppResult<()> {
        if claims.user_id == user_id {
            return Ok(());
        }
        let is_admin = self.is_admin(claims.user_id).await?;
        claims.require_self_or(user_id, is_admin)
    }
}
