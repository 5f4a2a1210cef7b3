use async_trait::async_trait;
use intake_engine::fields::Category;
use intake_engine::fields::{AssayType, FieldName, Procedure, TherapeuticArea};
use intake_engine::{AnalysisEnhancer, EngineError, EnhancerAnalysis};
use rig::{client::CompletionClient, completion::Chat, providers::openrouter};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::EnhancerConfig;

/// LLM-backed enhancer talking to OpenRouter through rig.
pub struct RigEnhancer {
    client: openrouter::Client,
    model: String,
}

impl RigEnhancer {
    pub fn new(config: &EnhancerConfig) -> Self {
        Self {
            client: openrouter::Client::new(&config.api_key),
            model: config.model.clone(),
        }
    }
}

fn preamble() -> String {
    let mandatory = FieldName::MANDATORY
        .iter()
        .map(|field| field.label())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"You extract intake details from biomedical research request text.

Mandatory fields: {mandatory}.
- PI: the person leading the research
- Pathologist: the pathologist reviewing the material
- Therapeutic Area: one of {areas}
- Procedure: one of {procedures}
- Assay Type/Staining Type: one of {assays}
- Project Title: a short descriptive title
- Request Purpose: the objective of the request

Also decide which service line should handle the request:
CALM (biological imaging and analysis research) or DPIA (slide scanning,
digital pathology and tissue section work).

Use "Unknown" for anything that cannot be found or reasonably inferred.
Respond **only** with JSON of the form
{{"fields": {{"PI": "...", ...}}, "confidences": {{"PI": 0.8, ...}},
"recommended_case_type": "CALM" | "DPIA", "case_type_confidence": 0.0-1.0,
"case_type_reasoning": "..."}}"#,
        areas = TherapeuticArea::labels().join(", "),
        procedures = Procedure::labels().join(", "),
        assays = AssayType::labels().join(", "),
    )
}

/// Loose shape of the model's answer; values that are not plain strings or
/// numbers are dropped rather than failing the whole response.
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default, alias = "detected_fields")]
    fields: BTreeMap<String, Value>,
    #[serde(default, alias = "confidence_scores")]
    confidences: BTreeMap<String, Value>,
    #[serde(default)]
    recommended_case_type: Option<String>,
    #[serde(default)]
    case_type_confidence: Option<f32>,
    #[serde(default)]
    case_type_reasoning: Option<String>,
}

/// Parses a model response, tolerating code fences and surrounding prose.
pub fn parse_enhancer_response(raw: &str) -> intake_engine::Result<EnhancerAnalysis> {
    // Clean JSON response (remove code blocks if present)
    let cleaned = raw.trim();
    let cleaned = cleaned
        .strip_prefix("```json")
        .or_else(|| cleaned.strip_prefix("```"))
        .unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();
    let json = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => {
            return Err(EngineError::Enhancer(format!(
                "No JSON object in enhancer response: {raw}"
            )));
        }
    };

    let parsed: RawAnalysis = serde_json::from_str(json).map_err(|e| {
        EngineError::Enhancer(format!(
            "Could not parse enhancer response: {e}. Raw response: {raw}"
        ))
    })?;

    Ok(EnhancerAnalysis {
        fields: parsed
            .fields
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::String(s) => Some((name, s)),
                Value::Number(n) => Some((name, n.to_string())),
                _ => None,
            })
            .collect(),
        confidences: parsed
            .confidences
            .into_iter()
            .filter_map(|(name, value)| value.as_f64().map(|c| (name, c as f32)))
            .collect(),
        recommended_case_type: parsed.recommended_case_type,
        case_type_confidence: parsed.case_type_confidence,
        case_type_reasoning: parsed.case_type_reasoning,
    })
}

#[async_trait]
impl AnalysisEnhancer for RigEnhancer {
    async fn analyze(&self, text: &str) -> intake_engine::Result<EnhancerAnalysis> {
        info!(model = %self.model, text_length = text.len(), "Requesting enhancer analysis");

        let agent = self.client.agent(&self.model).preamble(&preamble()).build();
        let prompt = format!("Analyze this research request:\n\n{text}");
        let raw = agent
            .chat(&prompt, vec![])
            .await
            .map_err(|e| EngineError::Enhancer(format!("LLM chat failed: {}", e)))?;

        debug!(response = %raw, "Enhancer response");
        parse_enhancer_response(&raw)
    }
}
