//! User accounts service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use validator::Validate;

use crate::{
    config::AdminConfig,
    error::{AppError, AppResult},
    models::user::{
        NewUser, ProfileChanges, Role, SigninRequest, SignupRequest, UpdateProfile, User,
    },
    repository::Repository,
    services::access::AccessService,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    access: AccessService,
}

impl UsersService {
    pub fn new(repository: Repository, access: AccessService) -> Self {
        Self { repository, access }
    }

    /// Register a new member; returns (token, user)
    pub async fn signup(&self, mut request: SignupRequest) -> AppResult<(String, User)> {
        request.normalize();
        request.validate()?;
        let SignupRequest { username, email, password } = request;

        if self.repository.users.username_exists(&username).await? {
            return Err(AppError::Duplicate("Username already taken".to_string()));
        }
        if self.repository.users.email_exists(&email, None).await? {
            return Err(AppError::Duplicate("Email already taken".to_string()));
        }

        let user = self
            .repository
            .users
            .create(&NewUser {
                username,
                email,
                password_hash: hash_password(&password)?,
                role: Role::Member,
            })
            .await?;

        tracing::info!(user_id = user.id, "User {} signed up", user.username);
        let token = self.access.issue_token(&user)?;
        Ok((token, user))
    }

    /// Authenticate by username and password; returns (token, user)
    pub async fn signin(&self, request: SigninRequest) -> AppResult<(String, User)> {
        request.validate()?;
        let user = self
            .repository
            .users
            .find_by_username(request.username.trim())
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid username or password".to_string()))?;

        if !verify_password(&user.password_hash, &request.password)? {
            return Err(AppError::Unauthorized("Invalid username or password".to_string()));
        }

        let token = self.access.issue_token(&user)?;
        Ok((token, user))
    }

    /// Create the configured administrator unless it already exists.
    ///
    /// Returns `None` when no admin password is configured.
    pub async fn ensure_admin(&self, config: &AdminConfig) -> AppResult<Option<User>> {
        if config.password.is_empty() {
            tracing::warn!("No admin password configured, skipping admin account");
            return Ok(None);
        }
        if config.password.len() < 6 {
            return Err(AppError::Validation(
                "Admin password must be at least 6 characters".to_string(),
            ));
        }

        let username = config.username.trim();
        if let Some(existing) = self.repository.users.find_by_username(username).await? {
            if !existing.is_admin() {
                tracing::warn!(user_id = existing.id, "Configured admin {} is not an administrator", username);
            }
            return Ok(Some(existing));
        }

        let admin = self
            .repository
            .users
            .create(&NewUser {
                username: username.to_string(),
                email: config.email.trim().to_lowercase(),
                password_hash: hash_password(&config.password)?,
                role: Role::Admin,
            })
            .await?;

        tracing::info!(user_id = admin.id, "Admin account {} created", admin.username);
        Ok(Some(admin))
    }

    pub async fn get_user(&self, user_id: i32) -> AppResult<User> {
        self.repository
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))
    }

    /// Update own e-mail and/or password
    pub async fn update_profile(&self, user_id: i32, mut profile: UpdateProfile) -> AppResult<User> {
        profile.normalize();
        profile.validate()?;
        let user = self.get_user(user_id).await?;
        let mut changes = ProfileChanges::default();

        if let Some(email) = profile.email {
            if self.repository.users.email_exists(&email, Some(user_id)).await? {
                return Err(AppError::Duplicate("Email already taken".to_string()));
            }
            changes.email = Some(email);
        }

        if let Some(new_password) = profile.new_password {
            let current = profile.current_password.ok_or_else(|| {
                AppError::Validation("Current password is required to set a new one".to_string())
            })?;
            if !verify_password(&user.password_hash, &current)? {
                return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
            }
            changes.password_hash = Some(hash_password(&new_password)?);
        }

        if changes.email.is_none() && changes.password_hash.is_none() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }

        let updated = self.repository.users.update_profile(user_id, &changes).await?;
        tracing::info!(user_id, "Profile updated");
        Ok(updated)
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
