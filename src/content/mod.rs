/// Content generation pipeline
///
/// The orchestrator runs: scenario lookup, input validation, input
/// safety check, quota deduction, prompt rendering, provider failover,
/// output safety check, persistence. Everything up to the deduction is
/// free to fail; any failure after it triggers exactly one
/// compensating quota refund before the error propagates.

pub mod prompt;
pub mod records;

use crate::analytics::{Analytics, GenerationEvent};
use crate::db::models::{ContentRecord, Scenario, ToneStyle};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::moderation::ModerationService;
use crate::providers::{GenerationOutcome, GenerationRequest, ProviderGroup};
use crate::quota::QuotaLedger;
use crate::scenario::ScenarioCatalog;
use records::{ContentRecordStore, NewRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const MAX_OUTPUT_TOKENS: u32 = 1024;

/// A generation request from the client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub scenario: String,
    #[serde(default)]
    pub tone_style: Option<String>,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

/// A successful generation, including the caller's remaining quota
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSuccess {
    #[serde(flatten)]
    pub record: ContentRecord,
    pub remaining_quota: i64,
}

/// Content generation orchestrator
pub struct ContentService {
    quota: Arc<QuotaLedger>,
    catalog: Arc<ScenarioCatalog>,
    moderation: Arc<ModerationService>,
    providers: Arc<ProviderGroup>,
    records: ContentRecordStore,
    analytics: Arc<Analytics>,
    temperature: f32,
}

impl ContentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        quota: Arc<QuotaLedger>,
        catalog: Arc<ScenarioCatalog>,
        moderation: Arc<ModerationService>,
        providers: Arc<ProviderGroup>,
        records: ContentRecordStore,
        analytics: Arc<Analytics>,
        temperature: f32,
    ) -> Self {
        Self {
            quota,
            catalog,
            moderation,
            providers,
            records,
            analytics,
            temperature,
        }
    }

    /// Run one generation end to end
    pub async fn generate(
        &self,
        user_id: &str,
        request: GenerateRequest,
    ) -> ApiResult<GenerationSuccess> {
        // Everything before the deduction must be side-effect free
        let scenario = self.catalog.get_scenario(&request.scenario).await?;
        let tone = self.resolve_tone(&scenario, request.tone_style.as_deref()).await?;
        validate_inputs(&scenario, &request.inputs)?;
        self.check_input_safety(&request.inputs).await?;

        self.quota.deduct_quota(user_id).await?;

        match self
            .generate_after_deduct(user_id, &scenario, &tone, &request.inputs)
            .await
        {
            Ok(success) => {
                self.analytics
                    .record(GenerationEvent {
                        user_id,
                        scenario_slug: &scenario.slug,
                        tone_style: &tone.slug,
                        duration_ms: success.record.generation_ms,
                        success: true,
                        provider: &success.record.provider,
                    })
                    .await;
                Ok(success)
            }
            Err(e) => {
                let stage = failure_stage(&e);
                self.refund(user_id, stage).await;
                self.analytics
                    .record(GenerationEvent {
                        user_id,
                        scenario_slug: &scenario.slug,
                        tone_style: &tone.slug,
                        duration_ms: 0,
                        success: false,
                        provider: "",
                    })
                    .await;
                Err(e)
            }
        }
    }

    /// Re-run a previous generation with its stored scenario, tone and
    /// inputs
    pub async fn regenerate(&self, user_id: &str, record_id: &str) -> ApiResult<GenerationSuccess> {
        let record = self.records.get(record_id, user_id).await?;
        let inputs: HashMap<String, String> =
            serde_json::from_str(&record.user_input).unwrap_or_default();

        self.generate(
            user_id,
            GenerateRequest {
                scenario: record.scenario_id,
                tone_style: Some(record.tone_style),
                inputs,
            },
        )
        .await
    }

    pub async fn detail(&self, user_id: &str, record_id: &str) -> ApiResult<ContentRecord> {
        self.records.get(record_id, user_id).await
    }

    pub async fn history(
        &self,
        user_id: &str,
        scenario_id: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> ApiResult<(Vec<ContentRecord>, i64)> {
        self.records.page(user_id, scenario_id, page, page_size).await
    }

    /// Save the user's edited version; the edit itself gets a local
    /// safety check but no quota charge
    pub async fn edit(
        &self,
        user_id: &str,
        record_id: &str,
        edited_content: &str,
    ) -> ApiResult<ContentRecord> {
        if edited_content.trim().is_empty() {
            return Err(ApiError::Validation(
                "Edited content cannot be empty".to_string(),
            ));
        }

        let check = self.moderation.check_local(edited_content);
        if !check.is_safe() {
            return Err(ApiError::ModerationRejected(
                "Edited content contains blocked words".to_string(),
            ));
        }

        self.records
            .update_edited(record_id, user_id, edited_content)
            .await
    }

    pub async fn delete(&self, user_id: &str, record_id: &str) -> ApiResult<()> {
        self.records.delete(record_id, user_id).await
    }

    async fn generate_after_deduct(
        &self,
        user_id: &str,
        scenario: &Scenario,
        tone: &ToneStyle,
        inputs: &HashMap<String, String>,
    ) -> ApiResult<GenerationSuccess> {
        let messages = prompt::build_messages(scenario, Some(tone), inputs);
        let generation = GenerationRequest {
            messages,
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: self.temperature,
        };

        let started = Instant::now();
        let outcome = self.providers.generate(&generation).await?;
        self.check_output_safety(user_id, &outcome).await?;

        let user_input = serde_json::to_string(inputs)
            .map_err(|e| ApiError::Internal(format!("Input serialization failed: {}", e)))?;

        let record = self
            .records
            .create(NewRecord {
                user_id,
                scenario_id: &scenario.id,
                tone_style: &tone.slug,
                user_input: &user_input,
                generated_content: outcome.content.trim(),
                generation_ms: started.elapsed().as_millis() as i64,
                model: &outcome.model,
                provider: &outcome.provider,
            })
            .await?;

        let remaining_quota = self
            .quota
            .quota_info(user_id)
            .await?
            .map(|info| info.remaining_quota)
            .unwrap_or(0);

        info!(
            user_id,
            scenario = %scenario.slug,
            provider = %record.provider,
            generation_ms = record.generation_ms,
            "content generated"
        );

        Ok(GenerationSuccess {
            record,
            remaining_quota,
        })
    }

    async fn resolve_tone(
        &self,
        scenario: &Scenario,
        requested: Option<&str>,
    ) -> ApiResult<ToneStyle> {
        let slug = requested.unwrap_or(&scenario.default_tone);

        match self.catalog.get_tone_style(slug).await? {
            Some(tone) => Ok(tone),
            // An unknown explicit tone is a client error; a missing
            // default degrades to a neutral no-op tone.
            None if requested.is_some() => Err(ApiError::Validation(format!(
                "Unknown tone style: {}",
                slug
            ))),
            None => Ok(ToneStyle {
                id: String::new(),
                slug: scenario.default_tone.clone(),
                name: scenario.default_tone.clone(),
                prompt_modifier: String::new(),
            }),
        }
    }

    async fn check_input_safety(&self, inputs: &HashMap<String, String>) -> ApiResult<()> {
        let combined: String = inputs.values().cloned().collect::<Vec<_>>().join("\n");
        let check = self.moderation.check(&combined, None).await?;
        if !check.is_safe() {
            warn!(
                matched = check.matched_words.len(),
                "generation input rejected by safety check"
            );
            return Err(ApiError::ModerationRejected(
                "Input contains blocked content".to_string(),
            ));
        }
        Ok(())
    }

    async fn check_output_safety(
        &self,
        user_id: &str,
        outcome: &GenerationOutcome,
    ) -> ApiResult<()> {
        let check = self.moderation.check(&outcome.content, None).await?;
        if !check.is_safe() {
            warn!(
                user_id,
                provider = %outcome.provider,
                "generated content rejected by safety check"
            );
            return Err(ApiError::ModerationRejected(
                "Generated content failed the safety check".to_string(),
            ));
        }
        Ok(())
    }

    /// Compensating refund after a post-deduction failure. Best effort:
    /// a refund failure is logged and counted, never propagated over
    /// the original error.
    async fn refund(&self, user_id: &str, stage: &'static str) {
        metrics::QUOTA_REFUNDS_TOTAL.with_label_values(&[stage]).inc();

        match self.quota.refund_quota(user_id).await {
            Ok(()) => info!(user_id, stage, "quota refunded after failed generation"),
            Err(e) => error!(user_id, stage, error = %e, "quota refund failed"),
        }
    }
}

fn failure_stage(error: &ApiError) -> &'static str {
    match error {
        ApiError::GenerationFailed(_) => "provider",
        ApiError::ModerationRejected(_) => "moderation",
        ApiError::Database(_) => "persistence",
        _ => "other",
    }
}

/// Validate inputs against the scenario's declared schema
fn validate_inputs(scenario: &Scenario, inputs: &HashMap<String, String>) -> ApiResult<()> {
    let schema = ScenarioCatalog::input_schema(scenario)?;

    for field in &schema.fields {
        let value = inputs.get(&field.name).map(String::as_str).unwrap_or("");

        if field.required && value.trim().is_empty() {
            return Err(ApiError::Validation(format!(
                "Field '{}' is required",
                field.name
            )));
        }

        if let Some(max) = field.max_length {
            if value.chars().count() > max {
                return Err(ApiError::Validation(format!(
                    "Field '{}' exceeds {} characters",
                    field.name, max
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn scenario_with_schema(schema: &str) -> Scenario {
        Scenario {
            id: "s1".to_string(),
            slug: "product-intro".to_string(),
            name: "Product intro".to_string(),
            system_prompt: "You write product copy.".to_string(),
            input_schema: schema.to_string(),
            default_tone: "neutral".to_string(),
            max_length: 300,
            created_at: Utc::now(),
        }
    }

    fn inputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_required_field_enforced() {
        let scenario = scenario_with_schema(r#"{"fields":[{"name":"product","required":true}]}"#);

        assert!(validate_inputs(&scenario, &inputs(&[("product", "tea")])).is_ok());
        assert!(validate_inputs(&scenario, &inputs(&[])).is_err());
        assert!(validate_inputs(&scenario, &inputs(&[("product", "  ")])).is_err());
    }

    #[test]
    fn test_max_length_enforced() {
        let scenario =
            scenario_with_schema(r#"{"fields":[{"name":"product","max_length":5}]}"#);

        assert!(validate_inputs(&scenario, &inputs(&[("product", "tea")])).is_ok());
        assert!(validate_inputs(&scenario, &inputs(&[("product", "toolong")])).is_err());
    }

    #[test]
    fn test_undeclared_inputs_are_allowed() {
        let scenario = scenario_with_schema(r#"{"fields":[]}"#);
        assert!(validate_inputs(&scenario, &inputs(&[("extra", "value")])).is_ok());
    }

    #[test]
    fn test_failure_stage_mapping() {
        assert_eq!(
            failure_stage(&ApiError::GenerationFailed("x".to_string())),
            "provider"
        );
        assert_eq!(
            failure_stage(&ApiError::ModerationRejected("x".to_string())),
            "moderation"
        );
        assert_eq!(failure_stage(&ApiError::RateLimitExceeded), "other");
    }
}
