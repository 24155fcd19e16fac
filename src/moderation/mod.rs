/// Content safety checks
///
/// Two layers run in order: the local keyword matcher (fast, always
/// available) and the platform's remote text-moderation API (optional,
/// needs platform credentials). The remote layer degrades to safe on
/// transport errors so an upstream outage never blocks generation;
/// anything short of a pass verdict blocks the content.

pub mod filter;
pub mod keywords;

use crate::config::WechatConfig;
use crate::error::{ApiError, ApiResult};
use keywords::KeywordIndex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

const ACCESS_TOKEN_URL: &str = "https://api.weixin.qq.com/cgi-bin/token";
const MSG_SEC_CHECK_URL: &str = "https://api.weixin.qq.com/wxa/msg_sec_check";
const REMOTE_TIMEOUT: Duration = Duration::from_secs(5);
// Refresh ahead of the platform's expiry so in-flight checks never
// race an expiring token
const TOKEN_EARLY_REFRESH: Duration = Duration::from_secs(300);

/// Safety verdict for a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Review,
    Risky,
}

/// Result of a safety check
#[derive(Debug, Clone)]
pub struct SafetyCheck {
    pub verdict: Verdict,
    pub matched_words: Vec<String>,
}

impl SafetyCheck {
    /// Only a pass verdict is safe; needs-review content is held back
    /// the same as risky content
    pub fn is_safe(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    fn pass() -> Self {
        Self {
            verdict: Verdict::Pass,
            matched_words: Vec::new(),
        }
    }
}

/// Moderation service: local matcher plus optional remote check
pub struct ModerationService {
    keywords: Arc<KeywordIndex>,
    remote: Option<RemoteModerationClient>,
}

impl ModerationService {
    pub fn new(keywords: Arc<KeywordIndex>, remote: Option<RemoteModerationClient>) -> Self {
        Self { keywords, remote }
    }

    pub fn keywords(&self) -> &Arc<KeywordIndex> {
        &self.keywords
    }

    /// Check text against the local keyword set only
    pub fn check_local(&self, text: &str) -> SafetyCheck {
        if text.trim().is_empty() {
            return SafetyCheck::pass();
        }

        let matcher = self.keywords.current();
        let matches = matcher.scan(text);
        if matches.is_empty() {
            return SafetyCheck::pass();
        }

        let mut words: Vec<String> = matches.into_iter().map(|m| m.word).collect();
        words.sort();
        words.dedup();

        SafetyCheck {
            verdict: Verdict::Risky,
            matched_words: words,
        }
    }

    /// Full check: local matcher first, then the remote API when
    /// configured. A local hit is final; the remote layer only runs on
    /// locally clean text.
    pub async fn check(&self, text: &str, user_open_id: Option<&str>) -> ApiResult<SafetyCheck> {
        let local = self.check_local(text);
        if local.verdict == Verdict::Risky {
            info!(
                matched = local.matched_words.len(),
                "text blocked by keyword matcher"
            );
            return Ok(local);
        }

        let Some(remote) = &self.remote else {
            return Ok(local);
        };

        match remote.check_text(text, user_open_id).await {
            Ok(verdict) => Ok(SafetyCheck {
                verdict,
                matched_words: Vec::new(),
            }),
            Err(e) => {
                // Outage of the moderation API must not block users
                warn!(error = %e, "remote moderation unavailable, passing text");
                Ok(local)
            }
        }
    }

    /// Redact local keyword matches from text
    pub fn redact(&self, text: &str) -> String {
        self.keywords.current().redact(text)
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    errcode: Option<i64>,
    #[serde(default)]
    errmsg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MsgSecCheckResponse {
    #[serde(default)]
    errcode: Option<i64>,
    #[serde(default)]
    errmsg: Option<String>,
    #[serde(default)]
    result: Option<MsgSecCheckResult>,
}

#[derive(Debug, Deserialize)]
struct MsgSecCheckResult {
    #[serde(default)]
    suggest: Option<String>,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Client for the platform's text moderation endpoint
pub struct RemoteModerationClient {
    http: reqwest::Client,
    config: WechatConfig,
    token: Mutex<Option<CachedToken>>,
}

impl RemoteModerationClient {
    pub fn new(config: WechatConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> ApiResult<String> {
        let mut guard = self.token.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.refresh_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }

        let response: AccessTokenResponse = self
            .http
            .get(ACCESS_TOKEN_URL)
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Access token request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Access token response malformed: {}", e)))?;

        let token = match response.access_token {
            Some(token) => token,
            None => {
                return Err(ApiError::Upstream(format!(
                    "Access token rejected: {} {}",
                    response.errcode.unwrap_or_default(),
                    response.errmsg.unwrap_or_default()
                )))
            }
        };

        let ttl = Duration::from_secs(response.expires_in.unwrap_or(7200));
        let refresh_at = Instant::now() + ttl.saturating_sub(TOKEN_EARLY_REFRESH);
        *guard = Some(CachedToken {
            token: token.clone(),
            refresh_at,
        });

        Ok(token)
    }

    /// Run the remote text check. Errors here mean the API was
    /// unreachable or misbehaving; the caller decides the fallback.
    pub async fn check_text(&self, text: &str, user_open_id: Option<&str>) -> ApiResult<Verdict> {
        let token = self.access_token().await?;

        let mut body = serde_json::json!({
            "content": text,
            "version": 2,
            "scene": 2,
        });
        if let Some(open_id) = user_open_id {
            body["openid"] = serde_json::Value::String(open_id.to_string());
        }

        let response: MsgSecCheckResponse = self
            .http
            .post(MSG_SEC_CHECK_URL)
            .query(&[("access_token", token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Moderation request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Moderation response malformed: {}", e)))?;

        match response.errcode.unwrap_or_default() {
            0 => {}
            87014 => return Ok(Verdict::Risky),
            code => {
                return Err(ApiError::Upstream(format!(
                    "Moderation API error {}: {}",
                    code,
                    response.errmsg.unwrap_or_default()
                )))
            }
        }

        let verdict = match response
            .result
            .and_then(|r| r.suggest)
            .as_deref()
        {
            Some("risky") => Verdict::Risky,
            Some("review") => Verdict::Review,
            _ => Verdict::Pass,
        };

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service_with(words: &[&str]) -> ModerationService {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let index = KeywordIndex::load(pool).await.unwrap();
        index
            .import(&words.iter().map(|w| w.to_string()).collect::<Vec<_>>())
            .await
            .unwrap();

        ModerationService::new(Arc::new(index), None)
    }

    #[tokio::test]
    async fn test_empty_text_passes() {
        let service = service_with(&["badword"]).await;
        let check = service.check("   ", None).await.unwrap();
        assert_eq!(check.verdict, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_keyword_hit_is_risky() {
        let service = service_with(&["badword"]).await;
        let check = service.check("this is a badword here", None).await.unwrap();
        assert_eq!(check.verdict, Verdict::Risky);
        assert_eq!(check.matched_words, vec!["badword".to_string()]);
        assert!(!check.is_safe());
    }

    #[tokio::test]
    async fn test_clean_text_passes_without_remote() {
        let service = service_with(&["badword"]).await;
        let check = service.check("perfectly fine copy", None).await.unwrap();
        assert_eq!(check.verdict, Verdict::Pass);
        assert!(check.is_safe());
    }

    #[test]
    fn test_review_verdict_is_not_safe() {
        let check = SafetyCheck {
            verdict: Verdict::Review,
            matched_words: Vec::new(),
        };
        assert!(!check.is_safe());
    }

    #[tokio::test]
    async fn test_redact_uses_current_keyword_set() {
        let service = service_with(&["badword"]).await;
        assert_eq!(service.redact("a badword here"), "a *** here");
    }
}
