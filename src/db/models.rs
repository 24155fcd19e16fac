/// Row models shared across services
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Membership tier, determines the daily generation allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MembershipTier {
    Free,
    Monthly,
    Yearly,
}

impl MembershipTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Free => "FREE",
            MembershipTier::Monthly => "MONTHLY",
            MembershipTier::Yearly => "YEARLY",
        }
    }
}

/// Order lifecycle state. Legal transitions:
/// PENDING -> PAID -> REFUNDED and PENDING -> CANCELLED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

/// What an order purchases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Membership,
    PayPerUse,
}

/// User account row
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: String,
    pub open_id: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub membership_type: MembershipTier,
    pub membership_expires_at: Option<DateTime<Utc>>,
    pub purchased_quota: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order row
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: String,
    pub order_no: String,
    pub user_id: String,
    pub order_type: OrderType,
    pub membership_type: Option<MembershipTier>,
    pub quantity: i64,
    pub amount_cents: i64,
    pub status: OrderStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    /// Set exactly once when the PAID order's grant is applied
    pub activated_at: Option<DateTime<Utc>>,
}

/// Content scenario row; `input_schema` holds the declared field list
/// as JSON. Rows round-trip through the catalog cache, hence the
/// `Deserialize`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub system_prompt: String,
    pub input_schema: String,
    pub default_tone: String,
    pub max_length: i64,
    pub created_at: DateTime<Utc>,
}

/// Tone style row; `prompt_modifier` is appended to the system prompt
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ToneStyle {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub prompt_modifier: String,
}

/// Generated artifact row; `user_input` is the structured key/value
/// input as JSON
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ContentRecord {
    pub id: String,
    pub user_id: String,
    pub scenario_id: String,
    pub tone_style: String,
    pub user_input: String,
    pub generated_content: String,
    pub edited_content: Option<String>,
    pub generation_ms: i64,
    pub model: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

/// User feedback row
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FeedbackEntry {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub content: String,
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Declared input field list for a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(default)]
    pub fields: Vec<InputField>,
}

/// One declared input field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max_length: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // The scenario catalog stores these rows in the cache as JSON
    #[test]
    fn test_catalog_rows_round_trip_through_json() {
        let scenario = Scenario {
            id: "s1".to_string(),
            slug: "product-intro".to_string(),
            name: "Product intro".to_string(),
            system_prompt: "You write product copy.".to_string(),
            input_schema: r#"{"fields":[]}"#.to_string(),
            default_tone: "neutral".to_string(),
            max_length: 300,
            created_at: Utc::now(),
        };
        let cached = serde_json::to_string(&vec![scenario]).unwrap();
        let back: Vec<Scenario> = serde_json::from_str(&cached).unwrap();
        assert_eq!(back[0].slug, "product-intro");

        let tone = ToneStyle {
            id: "t1".to_string(),
            slug: "lively".to_string(),
            name: "Lively".to_string(),
            prompt_modifier: "Use a lively voice.".to_string(),
        };
        let cached = serde_json::to_string(&vec![tone]).unwrap();
        let back: Vec<ToneStyle> = serde_json::from_str(&cached).unwrap();
        assert_eq!(back[0].slug, "lively");
    }
}
