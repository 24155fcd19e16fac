/// Payment gateway client
///
/// Speaks the WeChat-pay-shaped merchant protocol: XML key/value
/// bodies, an MD5 signature over the sorted non-empty parameter set,
/// and an asynchronous notify webhook that must be verified before any
/// state is touched. The gateway is treated as an opaque remote with a
/// request/response contract; everything here is wire plumbing.
use crate::config::WechatConfig;
use crate::db::models::Order;
use crate::error::{ApiError, ApiResult};
use md5::{Digest, Md5};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

const UNIFIED_ORDER_URL: &str = "https://api.mch.weixin.qq.com/pay/unifiedorder";
const ORDER_QUERY_URL: &str = "https://api.mch.weixin.qq.com/pay/orderquery";
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Client pay parameters handed back to the mini-program
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPayParams {
    pub time_stamp: String,
    pub nonce_str: String,
    pub package: String,
    pub sign_type: String,
    pub pay_sign: String,
}

/// Verified content of a payment notification
#[derive(Debug, Clone)]
pub struct PaymentNotification {
    pub order_no: String,
    pub transaction_id: String,
}

/// Outcome of parsing and verifying a notify body
#[derive(Debug, Clone)]
pub enum NotifyOutcome {
    /// Signature valid and the gateway reports success
    Paid(PaymentNotification),
    /// Signature valid but the gateway reports failure
    Failed(String),
    /// Signature mismatch; must cause no side effects
    BadSignature,
}

/// Payment gateway client
pub struct PaymentGateway {
    http: reqwest::Client,
    config: WechatConfig,
    app_name: String,
}

impl PaymentGateway {
    pub fn new(config: WechatConfig, app_name: String) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            config,
            app_name,
        })
    }

    /// Create client pay parameters for an order via the unified-order
    /// call
    pub async fn create_client_payment(
        &self,
        order: &Order,
        payer_open_id: &str,
    ) -> ApiResult<ClientPayParams> {
        let prepay_id = self.unified_order(order, payer_open_id).await?;

        let time_stamp = chrono::Utc::now().timestamp().to_string();
        let nonce_str = generate_nonce(32);
        let package = format!("prepay_id={}", prepay_id);

        // The client signature covers a fixed field set in a fixed
        // order, unlike the request signature.
        let to_sign = format!(
            "appId={}&nonceStr={}&package={}&signType=MD5&timeStamp={}&key={}",
            self.config.app_id, nonce_str, package, time_stamp, self.config.api_key
        );
        let pay_sign = md5_upper(&to_sign);

        Ok(ClientPayParams {
            time_stamp,
            nonce_str,
            package,
            sign_type: "MD5".to_string(),
            pay_sign,
        })
    }

    async fn unified_order(&self, order: &Order, payer_open_id: &str) -> ApiResult<String> {
        let mut params = BTreeMap::new();
        params.insert("appid".to_string(), self.config.app_id.clone());
        params.insert("mch_id".to_string(), self.config.mch_id.clone());
        params.insert("nonce_str".to_string(), generate_nonce(32));
        params.insert("body".to_string(), self.order_description(order));
        params.insert("out_trade_no".to_string(), order.order_no.clone());
        params.insert("total_fee".to_string(), order.amount_cents.to_string());
        params.insert("spbill_create_ip".to_string(), "127.0.0.1".to_string());
        params.insert("notify_url".to_string(), self.config.notify_url.clone());
        params.insert("trade_type".to_string(), "JSAPI".to_string());
        params.insert("openid".to_string(), payer_open_id.to_string());

        let sign = sign_params(&params, &self.config.api_key);
        params.insert("sign".to_string(), sign);

        let body = encode_xml(&params);
        let response = self
            .http
            .post(UNIFIED_ORDER_URL)
            .header("Content-Type", "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Unified order call failed: {}", e)))?
            .text()
            .await
            .map_err(|e| ApiError::Upstream(format!("Unified order response read failed: {}", e)))?;

        let fields = decode_xml(&response);

        if fields.get("return_code").map(String::as_str) != Some("SUCCESS") {
            return Err(ApiError::Upstream(format!(
                "Unified order rejected: {}",
                fields.get("return_msg").cloned().unwrap_or_default()
            )));
        }
        if fields.get("result_code").map(String::as_str) != Some("SUCCESS") {
            return Err(ApiError::Upstream(format!(
                "Unified order failed: {} - {}",
                fields.get("err_code").cloned().unwrap_or_default(),
                fields.get("err_code_des").cloned().unwrap_or_default()
            )));
        }

        let prepay_id = fields
            .get("prepay_id")
            .cloned()
            .ok_or_else(|| ApiError::Upstream("Unified order missing prepay_id".to_string()))?;

        info!(order_no = %order.order_no, "unified order created");
        Ok(prepay_id)
    }

    /// Poll the gateway for an order's trade state
    pub async fn query_order(&self, order_no: &str) -> ApiResult<Option<String>> {
        let mut params = BTreeMap::new();
        params.insert("appid".to_string(), self.config.app_id.clone());
        params.insert("mch_id".to_string(), self.config.mch_id.clone());
        params.insert("out_trade_no".to_string(), order_no.to_string());
        params.insert("nonce_str".to_string(), generate_nonce(32));

        let sign = sign_params(&params, &self.config.api_key);
        params.insert("sign".to_string(), sign);

        let response = self
            .http
            .post(ORDER_QUERY_URL)
            .header("Content-Type", "text/xml")
            .body(encode_xml(&params))
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Order query call failed: {}", e)))?
            .text()
            .await
            .map_err(|e| ApiError::Upstream(format!("Order query response read failed: {}", e)))?;

        let fields = decode_xml(&response);

        if fields.get("return_code").map(String::as_str) == Some("SUCCESS")
            && fields.get("result_code").map(String::as_str) == Some("SUCCESS")
            && fields.get("trade_state").map(String::as_str) == Some("SUCCESS")
        {
            return Ok(fields.get("transaction_id").cloned());
        }

        Ok(None)
    }

    /// Parse and verify a notify body. Signature verification happens
    /// before anything else; a mismatch short-circuits with no side
    /// effects.
    pub fn parse_notification(&self, xml: &str) -> NotifyOutcome {
        let fields = decode_xml(xml);

        if !self.verify_sign(&fields) {
            warn!(
                order_no = fields.get("out_trade_no").map(String::as_str).unwrap_or(""),
                "payment notification signature mismatch"
            );
            return NotifyOutcome::BadSignature;
        }

        if fields.get("return_code").map(String::as_str) != Some("SUCCESS")
            || fields.get("result_code").map(String::as_str) != Some("SUCCESS")
        {
            return NotifyOutcome::Failed(
                fields.get("return_msg").cloned().unwrap_or_else(|| "Payment failed".to_string()),
            );
        }

        match (fields.get("out_trade_no"), fields.get("transaction_id")) {
            (Some(order_no), Some(transaction_id)) if !order_no.is_empty() => {
                NotifyOutcome::Paid(PaymentNotification {
                    order_no: order_no.clone(),
                    transaction_id: transaction_id.clone(),
                })
            }
            _ => NotifyOutcome::Failed("Notification missing order fields".to_string()),
        }
    }

    fn verify_sign(&self, fields: &BTreeMap<String, String>) -> bool {
        let Some(received) = fields.get("sign") else {
            return false;
        };
        let calculated = sign_params(fields, &self.config.api_key);
        received.eq_ignore_ascii_case(&calculated)
    }

    fn order_description(&self, order: &Order) -> String {
        use crate::db::models::{MembershipTier, OrderType};
        match order.order_type {
            OrderType::Membership => {
                let tier = match order.membership_type {
                    Some(MembershipTier::Yearly) => "yearly membership",
                    _ => "monthly membership",
                };
                format!("{} - {}", self.app_name, tier)
            }
            OrderType::PayPerUse => {
                format!("{} - {} generation credits", self.app_name, order.quantity)
            }
        }
    }
}

/// Success reply body for the notify webhook
pub fn success_xml() -> String {
    let mut fields = BTreeMap::new();
    fields.insert("return_code".to_string(), "SUCCESS".to_string());
    fields.insert("return_msg".to_string(), "OK".to_string());
    encode_xml(&fields)
}

/// Failure reply body for the notify webhook
pub fn fail_xml(message: &str) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("return_code".to_string(), "FAIL".to_string());
    fields.insert("return_msg".to_string(), message.to_string());
    encode_xml(&fields)
}

/// MD5 signature over the sorted non-empty parameter set, excluding
/// the `sign` field itself, with the shared secret appended
pub fn sign_params(params: &BTreeMap<String, String>, api_key: &str) -> String {
    let joined: Vec<String> = params
        .iter()
        .filter(|(k, v)| k.as_str() != "sign" && !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    let to_sign = format!("{}&key={}", joined.join("&"), api_key);
    md5_upper(&to_sign)
}

fn md5_upper(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize()).to_uppercase()
}

fn generate_nonce(length: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Encode a flat key/value map as `<xml><k><![CDATA[v]]></k></xml>`
pub fn encode_xml(fields: &BTreeMap<String, String>) -> String {
    let mut xml = String::from("<xml>");
    for (key, value) in fields {
        xml.push('<');
        xml.push_str(key);
        xml.push('>');
        xml.push_str("<![CDATA[");
        xml.push_str(value);
        xml.push_str("]]>");
        xml.push_str("</");
        xml.push_str(key);
        xml.push('>');
    }
    xml.push_str("</xml>");
    xml
}

/// Decode the gateway's flat XML shape back into a key/value map.
/// Values may or may not be CDATA-wrapped.
pub fn decode_xml(xml: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let mut rest = xml;

    while let Some(open_start) = rest.find('<') {
        let after_open = &rest[open_start + 1..];
        let Some(open_end) = after_open.find('>') else {
            break;
        };
        let tag = &after_open[..open_end];

        // Skip the envelope, closing tags and declarations
        if tag.is_empty()
            || tag == "xml"
            || tag == "/xml"
            || tag.starts_with('/')
            || tag.starts_with('?')
            || tag.starts_with('!')
        {
            rest = &after_open[open_end + 1..];
            continue;
        }

        let body_start = &after_open[open_end + 1..];
        let closing = format!("</{}>", tag);
        let Some(close_at) = body_start.find(&closing) else {
            rest = body_start;
            continue;
        };

        let raw = &body_start[..close_at];
        let value = raw
            .strip_prefix("<![CDATA[")
            .and_then(|v| v.strip_suffix("]]>"))
            .unwrap_or(raw);
        fields.insert(tag.to_string(), value.to_string());

        rest = &body_start[close_at + closing.len()..];
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_round_trip() {
        let mut fields = BTreeMap::new();
        fields.insert("out_trade_no".to_string(), "20240101120000ABC123".to_string());
        fields.insert("transaction_id".to_string(), "wx-tx-42".to_string());
        fields.insert("return_code".to_string(), "SUCCESS".to_string());

        let xml = encode_xml(&fields);
        let decoded = decode_xml(&xml);
        assert_eq!(decoded, fields);
    }

    #[test]
    fn test_decode_plain_values() {
        let xml = "<xml><return_code>SUCCESS</return_code><total_fee>2990</total_fee></xml>";
        let decoded = decode_xml(xml);
        assert_eq!(decoded.get("return_code").unwrap(), "SUCCESS");
        assert_eq!(decoded.get("total_fee").unwrap(), "2990");
    }

    #[test]
    fn test_sign_skips_empty_and_sign_fields() {
        let mut params = BTreeMap::new();
        params.insert("b".to_string(), "2".to_string());
        params.insert("a".to_string(), "1".to_string());
        params.insert("empty".to_string(), String::new());
        params.insert("sign".to_string(), "IGNORED".to_string());

        // Sorted, non-empty, sign excluded: "a=1&b=2&key=secret"
        let expected = {
            let mut hasher = Md5::new();
            hasher.update(b"a=1&b=2&key=secret");
            hex::encode(hasher.finalize()).to_uppercase()
        };
        assert_eq!(sign_params(&params, "secret"), expected);
    }

    #[test]
    fn test_notification_signature_round_trip() {
        let config = crate::config::WechatConfig {
            app_id: "wx-app".to_string(),
            app_secret: "secret".to_string(),
            mch_id: "mch-1".to_string(),
            api_key: "api-key".to_string(),
            notify_url: "https://example.com/notify".to_string(),
        };
        let gateway = PaymentGateway::new(config, "copymint".to_string()).unwrap();

        let mut fields = BTreeMap::new();
        fields.insert("return_code".to_string(), "SUCCESS".to_string());
        fields.insert("result_code".to_string(), "SUCCESS".to_string());
        fields.insert("out_trade_no".to_string(), "20240101120000ABC123".to_string());
        fields.insert("transaction_id".to_string(), "wx-tx-42".to_string());
        let sign = sign_params(&fields, "api-key");
        fields.insert("sign".to_string(), sign);

        match gateway.parse_notification(&encode_xml(&fields)) {
            NotifyOutcome::Paid(n) => {
                assert_eq!(n.order_no, "20240101120000ABC123");
                assert_eq!(n.transaction_id, "wx-tx-42");
            }
            other => panic!("expected Paid, got {:?}", other),
        }
    }

    #[test]
    fn test_notification_bad_signature() {
        let config = crate::config::WechatConfig {
            app_id: "wx-app".to_string(),
            app_secret: "secret".to_string(),
            mch_id: "mch-1".to_string(),
            api_key: "api-key".to_string(),
            notify_url: "https://example.com/notify".to_string(),
        };
        let gateway = PaymentGateway::new(config, "copymint".to_string()).unwrap();

        let mut fields = BTreeMap::new();
        fields.insert("return_code".to_string(), "SUCCESS".to_string());
        fields.insert("result_code".to_string(), "SUCCESS".to_string());
        fields.insert("out_trade_no".to_string(), "20240101120000ABC123".to_string());
        fields.insert("transaction_id".to_string(), "wx-tx-42".to_string());
        fields.insert("sign".to_string(), "DEADBEEF".to_string());

        assert!(matches!(
            gateway.parse_notification(&encode_xml(&fields)),
            NotifyOutcome::BadSignature
        ));
    }
}
