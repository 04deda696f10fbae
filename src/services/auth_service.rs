use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::{info, warn};

use crate::db::JsonStore;
use crate::web::error::AppError;
use crate::web::models::Claims;

/// The only account. There is no user management.
pub const ADMIN_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";
const MIN_PASSWORD_LEN: usize = 8;
const SESSION_HOURS: i64 = 24;

const HASH_COST: u32 = if cfg!(test) { 4 } else { DEFAULT_COST };

pub fn hash_password(plain: &str) -> Result<String, AppError> {
    hash(plain, HASH_COST).map_err(|e| AppError::PasswordHashingError(format!("密码哈希失败: {e}")))
}

fn stored_hash(store: &JsonStore) -> Result<String, AppError> {
    store
        .settings()
        .password_hash
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AppError::InternalServerError("系统错误，请联系管理员".to_string()))
}

pub fn set_password(store: &JsonStore, plain: &str) -> Result<(), AppError> {
    let password_hash = hash_password(plain)?;
    let mut settings = store.settings();
    settings.password_hash = Some(password_hash);
    // Sessions issued against the previous version stop validating.
    settings.password_version = settings.password_version.wrapping_add(1);
    store.save_settings(&settings)?;
    info!(password_version = settings.password_version, "Admin password updated.");
    Ok(())
}

/// Stores the default password when none is set. Returns whether it did.
pub fn ensure_default_password(store: &JsonStore) -> Result<bool, AppError> {
    if store.settings().password_hash.is_some_and(|h| !h.is_empty()) {
        return Ok(false);
    }
    set_password(store, DEFAULT_PASSWORD)?;
    warn!("No admin password was set. Initialized the default password, change it after logging in.");
    Ok(true)
}

pub fn login_user(
    store: &JsonStore,
    username: &str,
    password: &str,
    jwt_secret: &str,
) -> Result<String, AppError> {
    if username.is_empty() || password.is_empty() {
        return Err(AppError::InvalidInput("用户名和密码不能为空".to_string()));
    }
    let password_hash = stored_hash(store)?;
    if username != ADMIN_USERNAME || !verify_password(password, &password_hash)? {
        warn!(username, "Rejected login attempt.");
        return Err(AppError::InvalidCredentials);
    }
    create_jwt(username, store.settings().password_version, jwt_secret)
}

pub fn verify_password(plain: &str, password_hash: &str) -> Result<bool, AppError> {
    verify(plain, password_hash)
        .map_err(|e| AppError::InternalServerError(format!("密码验证过程中出错: {e}")))
}

pub fn change_password(store: &JsonStore, old_password: &str, new_password: &str) -> Result<(), AppError> {
    if old_password.is_empty() || new_password.is_empty() {
        return Err(AppError::InvalidInput("新旧密码均不能为空".to_string()));
    }
    if !verify_password(old_password, &stored_hash(store)?)? {
        return Err(AppError::InvalidInput("旧密码错误".to_string()));
    }
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "新密码长度至少需要{MIN_PASSWORD_LEN}个字符"
        )));
    }
    set_password(store, new_password)
}

pub fn create_jwt(username: &str, password_version: u64, jwt_secret: &str) -> Result<String, AppError> {
    let expiration = (Utc::now() + Duration::hours(SESSION_HOURS)).timestamp() as usize;
    let claims = Claims {
        sub: username.to_string(),
        pwv: password_version,
        exp: expiration,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_ref()))
        .map_err(|e| AppError::TokenCreationError(format!("生成Token失败: {e}")))
}

/// Decodes a session token and checks it against the current password.
pub fn validate_session(store: &JsonStore, token: &str, jwt_secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!(error = ?e, "JWT decoding error.");
        AppError::Unauthorized("请先登录".to_string())
    })?;

    if token_data.claims.pwv != store.settings().password_version {
        return Err(AppError::Unauthorized("请先登录".to_string()));
    }
    Ok(token_data.claims)
}
