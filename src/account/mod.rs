/// Account management
///
/// Login is mini-program style: the client hands over a short-lived
/// code, we exchange it with the platform for a stable open id, then
/// upsert the user row and issue a JWT. Profile fields are optional
/// and client-writable.
use crate::config::{AuthConfig, WechatConfig};
use crate::db::models::{MembershipTier, User};
use crate::error::{ApiError, ApiResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const CODE_EXCHANGE_URL: &str = "https://api.weixin.qq.com/sns/jscode2session";
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Deserialize)]
struct CodeSessionResponse {
    #[serde(default)]
    openid: Option<String>,
    #[serde(default)]
    errcode: Option<i64>,
    #[serde(default)]
    errmsg: Option<String>,
}

/// Login result: the user row plus a fresh token
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub user: User,
    pub token: String,
    pub is_new_user: bool,
}

/// Profile fields the client may update
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Account manager
pub struct AccountManager {
    db: SqlitePool,
    auth: AuthConfig,
    wechat: Option<WechatConfig>,
    http: reqwest::Client,
}

impl AccountManager {
    pub fn new(db: SqlitePool, auth: AuthConfig, wechat: Option<WechatConfig>) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            db,
            auth,
            wechat,
            http,
        })
    }

    /// Exchange a login code for a session, upsert the user and issue a
    /// token
    pub async fn login_with_code(&self, code: &str) -> ApiResult<LoginResult> {
        if code.trim().is_empty() {
            return Err(ApiError::Validation("Login code required".to_string()));
        }

        let open_id = self.exchange_code(code).await?;
        let (user, is_new_user) = self.upsert_by_open_id(&open_id).await?;
        let token = self.issue_token(&user.id)?;

        info!(user_id = %user.id, is_new_user, "user logged in");
        Ok(LoginResult {
            user,
            token,
            is_new_user,
        })
    }

    async fn exchange_code(&self, code: &str) -> ApiResult<String> {
        let Some(wechat) = &self.wechat else {
            return Err(ApiError::Upstream(
                "Login is not configured on this deployment".to_string(),
            ));
        };

        let response: CodeSessionResponse = self
            .http
            .get(CODE_EXCHANGE_URL)
            .query(&[
                ("appid", wechat.app_id.as_str()),
                ("secret", wechat.app_secret.as_str()),
                ("js_code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Code exchange failed: {}", e)))?
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Code exchange response malformed: {}", e)))?;

        match response.openid {
            Some(open_id) if !open_id.is_empty() => Ok(open_id),
            _ => Err(ApiError::Unauthorized(format!(
                "Login code rejected: {} {}",
                response.errcode.unwrap_or_default(),
                response.errmsg.unwrap_or_default()
            ))),
        }
    }

    /// Find or create the user for an open id
    pub async fn upsert_by_open_id(&self, open_id: &str) -> ApiResult<(User, bool)> {
        if let Some(user) = self.get_by_open_id(open_id).await? {
            return Ok((user, false));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let insert = sqlx::query(
            "INSERT OR IGNORE INTO users
             (id, open_id, membership_type, purchased_quota, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
        )
        .bind(&id)
        .bind(open_id)
        .bind(MembershipTier::Free)
        .bind(now)
        .execute(&self.db)
        .await?;

        // A concurrent login may have won the insert; re-read either way
        let user = self
            .get_by_open_id(open_id)
            .await?
            .ok_or_else(|| ApiError::Internal("User vanished after insert".to_string()))?;

        Ok((user, insert.rows_affected() == 1))
    }

    pub async fn get_by_open_id(&self, open_id: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE open_id = ?1")
            .bind(open_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn get_profile(&self, user_id: &str) -> ApiResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        Ok(user)
    }

    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> ApiResult<User> {
        sqlx::query(
            "UPDATE users SET
               nickname = COALESCE(?1, nickname),
               avatar_url = COALESCE(?2, avatar_url),
               updated_at = ?3
             WHERE id = ?4",
        )
        .bind(update.nickname)
        .bind(update.avatar_url)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.db)
        .await?;

        self.get_profile(user_id).await
    }

    /// Issue an HS256 token for a user id
    pub fn issue_token(&self, user_id: &str) -> ApiResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::days(self.auth.token_ttl_days)).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.auth.jwt_secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(format!("Token signing failed: {}", e)))
    }

    /// Verify a token and return the user id
    pub fn verify_token(&self, token: &str) -> ApiResult<String> {
        verify_token(token, &self.auth.jwt_secret)
    }
}

/// Verify an HS256 token against a secret and return its subject
pub fn verify_token(token: &str, secret: &str) -> ApiResult<String> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ApiError::Unauthorized(format!("Invalid token: {}", e)))?;

    Ok(data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(db: SqlitePool) -> AccountManager {
        AccountManager::new(
            db,
            AuthConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
                token_ttl_days: 7,
                admin_token: None,
            },
            None,
        )
        .unwrap()
    }

    async fn test_db() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_token_round_trip() {
        let manager = manager(test_db().await);
        let token = manager.issue_token("user-1").unwrap();
        assert_eq!(manager.verify_token(&token).unwrap(), "user-1");
    }

    #[tokio::test]
    async fn test_token_rejected_with_wrong_secret() {
        let manager = manager(test_db().await);
        let token = manager.issue_token("user-1").unwrap();
        assert!(verify_token(&token, "another-secret-another-secret!!").is_err());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let manager = manager(test_db().await);

        let (first, created) = manager.upsert_by_open_id("open-1").await.unwrap();
        assert!(created);

        let (second, created_again) = manager.upsert_by_open_id("open-1").await.unwrap();
        assert!(!created_again);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_profile_update_keeps_unset_fields() {
        let manager = manager(test_db().await);
        let (user, _) = manager.upsert_by_open_id("open-1").await.unwrap();

        manager
            .update_profile(
                &user.id,
                ProfileUpdate {
                    nickname: Some("Sam".to_string()),
                    avatar_url: None,
                },
            )
            .await
            .unwrap();

        let updated = manager
            .update_profile(
                &user.id,
                ProfileUpdate {
                    nickname: None,
                    avatar_url: Some("https://example.com/a.png".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.nickname.as_deref(), Some("Sam"));
        assert_eq!(
            updated.avatar_url.as_deref(),
            Some("https://example.com/a.png")
        );
    }
}
