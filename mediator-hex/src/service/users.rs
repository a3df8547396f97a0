//! Users, API keys and request authentication.

use chrono::Duration;
use mediator_repo::security::{API_KEY_PREFIX, generate_secret, hash_api_key, verify_api_key};
use mediator_types::{
    ApiKey, ApiKeyId, ApiKeySecretResponse, AppError, AuditAction, BootstrapRequest,
    BootstrapResponse, CreateApiKeyRequest, CreateUserRequest, ProviderGateway, Repository, Role,
    UpdateUserRequest, User, UserId, UserQuery,
};
use serde_json::json;

use super::{Caller, MediatorService, not_found};

const MAX_KEY_VALIDITY_DAYS: i64 = 3650;

impl<R: Repository, G: ProviderGateway> MediatorService<R, G> {
    // ─────────────────────────────────────────────────────────────────────────
    // Authentication
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates the first administrator and its API key.
    ///
    /// Only allowed while the system has no users at all.
    #[tracing::instrument(skip(self, req), fields(username = %req.username))]
    pub async fn bootstrap(
        &self,
        req: BootstrapRequest,
        ip_address: Option<String>,
    ) -> Result<BootstrapResponse, AppError> {
        if self.repo.count_users().await? > 0 {
            return Err(AppError::BadRequest(
                "Bootstrap not allowed: users already exist. Use an existing API key to create new ones.".into(),
            ));
        }

        let now = self.now();
        let user = User::new(req.username, req.email, Role::Admin, now)?;
        self.repo.insert_user(&user).await?;

        let raw_key = generate_secret(API_KEY_PREFIX);
        let key = ApiKey::new(user.id, "bootstrap".into(), &raw_key, hash_api_key(&raw_key), None, now);
        self.repo.insert_api_key(&key).await?;

        let caller = Caller::new(user.clone(), ip_address);
        self.audit(
            Some(&caller),
            AuditAction::Create,
            "user",
            user.id,
            json!({"username": user.username, "role": user.role, "bootstrap": true}),
        )
        .await;
        tracing::info!(user_id = %user.id, "Bootstrapped first administrator");

        Ok(BootstrapResponse {
            user_id: user.id,
            username: user.username,
            api_key_id: key.id,
            api_key: raw_key,
        })
    }

    /// Resolves a raw API key to its active owner and records the use.
    pub async fn authenticate(&self, raw_key: &str) -> Result<User, AppError> {
        let now = self.now();
        let key = self
            .repo
            .find_api_key_by_hash(&hash_api_key(raw_key))
            .await?
            .filter(|k| verify_api_key(raw_key, &k.key_hash) && k.is_valid(now))
            .ok_or_else(|| AppError::Unauthorized("Invalid API key".into()))?;

        let user = self
            .repo
            .get_user(key.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Unauthorized("User is inactive".into()))?;

        if let Err(e) = self.repo.touch_api_key(key.id, now).await {
            tracing::warn!(key_id = %key.id, "Failed to record API key use: {}", e);
        }
        Ok(user)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self, caller, req), fields(username = %req.username))]
    pub async fn create_user(
        &self,
        caller: &Caller,
        req: CreateUserRequest,
    ) -> Result<User, AppError> {
        caller.require_admin()?;
        let user = User::new(
            req.username,
            req.email,
            req.role.unwrap_or(Role::User),
            self.now(),
        )?;
        self.repo.insert_user(&user).await?;
        self.audit(
            Some(caller),
            AuditAction::Create,
            "user",
            user.id,
            json!({"username": user.username, "role": user.role}),
        )
        .await;
        Ok(user)
    }

    pub async fn list_users(&self, caller: &Caller, query: UserQuery) -> Result<Vec<User>, AppError> {
        caller.require_admin()?;
        self.repo.list_users(&query).await.map_err(Into::into)
    }

    pub async fn get_user(&self, caller: &Caller, id: UserId) -> Result<User, AppError> {
        if !caller.can_see(id) {
            return Err(not_found("User", id));
        }
        self.repo
            .get_user(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| not_found("User", id)))
    }

    /// The caller's own profile.
    pub async fn me(&self, caller: &Caller) -> Result<User, AppError> {
        self.get_user(caller, caller.id()).await
    }

    /// Users may change their own email; role and activation are admin-only.
    #[tracing::instrument(skip(self, caller, req), fields(user_id = %id))]
    pub async fn update_user(
        &self,
        caller: &Caller,
        id: UserId,
        req: UpdateUserRequest,
    ) -> Result<User, AppError> {
        let mut user = self.get_user(caller, id).await?;
        if (req.role.is_some() || req.is_active.is_some()) && !caller.is_admin() {
            return Err(AppError::Forbidden(
                "Only administrators can change role or activation".into(),
            ));
        }
        if id == caller.id() && (req.role == Some(Role::User) || req.is_active == Some(false)) {
            return Err(AppError::BadRequest(
                "Cannot remove your own administrator access".into(),
            ));
        }

        let now = self.now();
        if let Some(email) = req.email.clone() {
            user.set_email(email, now)?;
        }
        if let Some(role) = req.role {
            user.role = role;
            user.updated_at = now;
        }
        match req.is_active {
            Some(false) => user.deactivate(now),
            Some(true) => {
                user.is_active = true;
                user.updated_at = now;
            }
            None => {}
        }

        self.repo.update_user(&user).await?;
        self.audit(
            Some(caller),
            AuditAction::Update,
            "user",
            user.id,
            json!({"email": req.email, "role": req.role, "is_active": req.is_active}),
        )
        .await;
        Ok(user)
    }

    /// Users are never removed; deletion deactivates.
    #[tracing::instrument(skip(self, caller), fields(user_id = %id))]
    pub async fn deactivate_user(&self, caller: &Caller, id: UserId) -> Result<User, AppError> {
        caller.require_admin()?;
        if id == caller.id() {
            return Err(AppError::BadRequest("Cannot deactivate yourself".into()));
        }
        let mut user = self.get_user(caller, id).await?;
        user.deactivate(self.now());
        self.repo.update_user(&user).await?;
        self.audit(Some(caller), AuditAction::Deactivate, "user", user.id, json!({}))
            .await;
        Ok(user)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self, caller, req), fields(key_name = %req.name))]
    pub async fn create_api_key(
        &self,
        caller: &Caller,
        req: CreateApiKeyRequest,
    ) -> Result<ApiKeySecretResponse, AppError> {
        let owner = caller.owner_for(req.user_id)?;
        let name = req.name.trim().to_string();
        if name.is_empty() || name.len() > 100 {
            return Err(AppError::BadRequest(
                "name must be between 1 and 100 characters".into(),
            ));
        }
        let owner_user = self.get_user(caller, owner).await?;
        if !owner_user.is_active {
            return Err(AppError::BadRequest(format!("User {} is inactive", owner)));
        }

        let now = self.now();
        let expires_at = match req.expires_in_days {
            Some(days) if !(1..=MAX_KEY_VALIDITY_DAYS).contains(&days) => {
                return Err(AppError::BadRequest(format!(
                    "expires_in_days must be between 1 and {}",
                    MAX_KEY_VALIDITY_DAYS
                )));
            }
            Some(days) => Some(now + Duration::days(days)),
            None => None,
        };

        let raw_key = generate_secret(API_KEY_PREFIX);
        let key = ApiKey::new(owner, name, &raw_key, hash_api_key(&raw_key), expires_at, now);
        self.repo.insert_api_key(&key).await?;
        self.audit(
            Some(caller),
            AuditAction::Create,
            "api_key",
            key.id,
            json!({"user_id": owner, "name": key.name}),
        )
        .await;

        Ok(secret_response(key, raw_key))
    }

    pub async fn list_api_keys(
        &self,
        caller: &Caller,
        user_id: Option<UserId>,
    ) -> Result<Vec<ApiKey>, AppError> {
        self.repo
            .list_api_keys(caller.scope(user_id))
            .await
            .map_err(Into::into)
    }

    pub async fn get_api_key(&self, caller: &Caller, id: ApiKeyId) -> Result<ApiKey, AppError> {
        self.repo
            .get_api_key(id)
            .await?
            .filter(|k| caller.can_see(k.user_id))
            .ok_or_else(|| not_found("API key", id))
    }

    #[tracing::instrument(skip(self, caller), fields(key_id = %id))]
    pub async fn deactivate_api_key(
        &self,
        caller: &Caller,
        id: ApiKeyId,
    ) -> Result<ApiKey, AppError> {
        let mut key = self.get_api_key(caller, id).await?;
        key.is_active = false;
        self.repo.update_api_key(&key).await?;
        self.audit(Some(caller), AuditAction::Deactivate, "api_key", key.id, json!({}))
            .await;
        Ok(key)
    }

    /// Replaces the secret of an existing key; the old value stops working.
    #[tracing::instrument(skip(self, caller), fields(key_id = %id))]
    pub async fn regenerate_api_key(
        &self,
        caller: &Caller,
        id: ApiKeyId,
    ) -> Result<ApiKeySecretResponse, AppError> {
        let mut key = self.get_api_key(caller, id).await?;
        let raw_key = generate_secret(API_KEY_PREFIX);
        key.rotate(&raw_key, hash_api_key(&raw_key));
        self.repo.update_api_key(&key).await?;
        self.audit(
            Some(caller),
            AuditAction::Regenerate,
            "api_key",
            key.id,
            json!({"key_prefix": key.key_prefix}),
        )
        .await;
        Ok(secret_response(key, raw_key))
    }

    #[tracing::instrument(skip(self, caller), fields(key_id = %id))]
    pub async fn toggle_api_key(&self, caller: &Caller, id: ApiKeyId) -> Result<ApiKey, AppError> {
        let mut key = self.get_api_key(caller, id).await?;
        key.is_active = !key.is_active;
        self.repo.update_api_key(&key).await?;
        self.audit(
            Some(caller),
            AuditAction::Update,
            "api_key",
            key.id,
            json!({"is_active": key.is_active}),
        )
        .await;
        Ok(key)
    }
}

fn secret_response(key: ApiKey, raw_key: String) -> ApiKeySecretResponse {
    ApiKeySecretResponse {
        id: key.id,
        user_id: key.user_id,
        name: key.name,
        key_prefix: key.key_prefix,
        api_key: raw_key,
        expires_at: key.expires_at,
    }
}
