//! Service classification.
//!
//! A request is routed to CALM (cellular analysis and light microscopy) or
//! DPIA (digital pathology and image analysis). The decision runs in strict
//! priority order and the first tier that decides wins:
//!
//! 1. an enhancer recommendation naming a valid category,
//! 2. absolute trigger phrases, checked in table order,
//! 3. keyword scores, with CALM-only bonuses for biological vocabulary and
//!    first-person research intent,
//! 4. a fixed tie-break order.
//!
//! Everything the scorer matches against lives in [`ScoringTables`], so tests
//! and deployments can substitute their own vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::detect::text::count_bounded;
use crate::error::{EngineError, Result};
use crate::fields::{FieldName, FieldRecord};

pub const SCORING_INPUT_VERSION: u32 = 1;
pub const SCORING_TABLES_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    #[serde(rename = "CALM")]
    Calm,
    #[serde(rename = "DPIA")]
    Dpia,
}

impl ServiceCategory {
    pub fn label(self) -> &'static str {
        match self {
            ServiceCategory::Calm => "CALM",
            ServiceCategory::Dpia => "DPIA",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "CALM" => Some(ServiceCategory::Calm),
            "DPIA" => Some(ServiceCategory::Dpia),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Category suggested by an upstream analysis enhancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub label: String,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Everything the scorer looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringInput {
    pub version: u32,
    pub text: String,
    #[serde(default)]
    pub therapeutic_area: Option<String>,
    #[serde(default)]
    pub procedure: Option<String>,
    #[serde(default)]
    pub assay_type: Option<String>,
    #[serde(default)]
    pub project_title: Option<String>,
    #[serde(default)]
    pub request_purpose: Option<String>,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
}

impl ScoringInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            version: SCORING_INPUT_VERSION,
            text: text.into(),
            therapeutic_area: None,
            procedure: None,
            assay_type: None,
            project_title: None,
            request_purpose: None,
            recommendation: None,
        }
    }

    /// Raw text plus the resolved fields that feed the trigger scan.
    pub fn from_record(text: impl Into<String>, record: &FieldRecord) -> Self {
        let field = |name: FieldName| record.text(name).map(str::to_string);
        Self {
            therapeutic_area: field(FieldName::TherapeuticArea),
            procedure: field(FieldName::Procedure),
            assay_type: field(FieldName::AssayType),
            project_title: field(FieldName::ProjectTitle),
            request_purpose: field(FieldName::RequestPurpose),
            ..Self::new(text)
        }
    }

    pub fn with_recommendation(mut self, recommendation: Option<Recommendation>) -> Self {
        self.recommendation = recommendation;
        self
    }

    /// Lower-cased text followed by the normalized field values.
    fn haystack(&self) -> String {
        let fields = [
            &self.therapeutic_area,
            &self.procedure,
            &self.assay_type,
            &self.project_title,
            &self.request_purpose,
        ];
        let mut haystack = self.text.to_lowercase();
        for value in fields.into_iter().flatten() {
            haystack.push('\n');
            haystack.push_str(&value.trim().to_lowercase());
        }
        haystack
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub name: String,
    pub phrases: Vec<String>,
    pub category: ServiceCategory,
    pub confidence: f32,
}

/// Scoring vocabulary and weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTables {
    pub version: u32,
    pub triggers: Vec<TriggerRule>,
    pub calm_keywords: Vec<String>,
    pub dpia_keywords: Vec<String>,
    pub biological_vocabulary: Vec<String>,
    pub biological_bonus: u32,
    pub research_intent_phrases: Vec<String>,
    pub research_intent_bonus: u32,
    pub research_vocabulary: Vec<String>,
    pub calm_token: String,
    pub dpia_token: String,
    pub min_confidence: f32,
    pub max_confidence: f32,
    pub tie_confidence: f32,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ScoringTables {
    fn default() -> Self {
        Self {
            version: SCORING_TABLES_VERSION,
            triggers: vec![
                TriggerRule {
                    name: "slide_scanning".to_string(),
                    phrases: strings(&[
                        "slide scanning",
                        "scan slides",
                        "scanning",
                        "slide submission",
                        "submit slides",
                    ]),
                    category: ServiceCategory::Dpia,
                    confidence: 1.0,
                },
                TriggerRule {
                    name: "digital_pathology".to_string(),
                    phrases: strings(&[
                        "dpia lab",
                        "digital pathology",
                        "gslide viewer",
                        "whole slide scanning",
                    ]),
                    category: ServiceCategory::Dpia,
                    confidence: 1.0,
                },
                TriggerRule {
                    name: "tissue_section".to_string(),
                    phrases: strings(&[
                        "tissue section",
                        "lung section",
                        "per section",
                        "cells per lung section",
                        "section analysis",
                    ]),
                    category: ServiceCategory::Dpia,
                    confidence: 0.9,
                },
                TriggerRule {
                    name: "tissue_quantification".to_string(),
                    phrases: strings(&[
                        "normalized by total area",
                        "# of cells per",
                        "normalized by # of dapi",
                    ]),
                    category: ServiceCategory::Dpia,
                    confidence: 0.9,
                },
            ],
            calm_keywords: strings(&[
                "confocal",
                "live-cell",
                "live cell",
                "light sheet",
                "light-sheet",
                "electron microscopy",
                "super-resolution",
                "two-photon",
                "time-lapse",
                "expansion microscopy",
                "cleared samples",
                "cleared",
                "clearing",
                "3d",
                "3d imaging",
                "training",
                "calm request",
                "cell culture",
                "organoid",
                "organoids",
                "spheroid",
                "whole mount",
            ]),
            dpia_keywords: strings(&[
                "slide",
                "slides",
                "pathology",
                "histology",
                "histopathology",
                "digital",
                "scan",
                "scanner",
                "tissue",
                "section",
                "sections",
                "ffpe",
                "paraffin",
                "biopsy",
                "h&e",
                "ihc",
                "stained",
                "quantification",
                "quantify",
                "privacy",
                "dpia",
            ]),
            biological_vocabulary: strings(&[
                "cells",
                "cell",
                "mouse",
                "mice",
                "rat",
                "zebrafish",
                "embryo",
                "embryos",
                "neurons",
                "organism",
                "in vivo",
                "in vitro",
                "protein",
                "gene expression",
                "stem cells",
            ]),
            biological_bonus: 2,
            research_intent_phrases: strings(&["research on", "want to research"]),
            research_intent_bonus: 3,
            research_vocabulary: strings(&[
                "research",
                "study",
                "experiment",
                "investigate",
                "biology",
                "biological",
            ]),
            calm_token: "calm".to_string(),
            dpia_token: "dpia".to_string(),
            min_confidence: 0.55,
            max_confidence: 0.95,
            tie_confidence: 0.5,
        }
    }
}

impl ScoringTables {
    pub fn from_json(json: &str) -> Result<Self> {
        let tables: ScoringTables = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidScoringTable(e.to_string()))?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != SCORING_TABLES_VERSION {
            return Err(EngineError::InvalidScoringTable(format!(
                "unsupported version {} (expected {})",
                self.version, SCORING_TABLES_VERSION
            )));
        }
        for rule in &self.triggers {
            if rule.phrases.iter().all(|p| p.trim().is_empty()) {
                return Err(EngineError::InvalidScoringTable(format!(
                    "trigger '{}' has no phrases",
                    rule.name
                )));
            }
            if !(0.0..=1.0).contains(&rule.confidence) {
                return Err(EngineError::InvalidScoringTable(format!(
                    "trigger '{}' confidence {} is outside [0, 1]",
                    rule.name, rule.confidence
                )));
            }
        }
        if self.min_confidence > self.max_confidence {
            return Err(EngineError::InvalidScoringTable(
                "min_confidence exceeds max_confidence".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    ResearchVocabulary,
    CalmToken,
    DpiaToken,
    Default,
}

/// Which tier produced the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", content = "detail", rename_all = "snake_case")]
pub enum ClassificationRule {
    Enhancer,
    Trigger(String),
    Score,
    TieBreak(TieBreak),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub calm: u32,
    pub dpia: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: ServiceCategory,
    pub confidence: f32,
    pub reasoning: String,
    pub rule: ClassificationRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<CategoryScores>,
}

fn count_terms(haystack: &str, terms: &[String]) -> u32 {
    terms
        .iter()
        .map(|term| count_bounded(haystack, &term.to_lowercase()) as u32)
        .sum()
}

fn contains_any(haystack: &str, terms: &[String]) -> bool {
    count_terms(haystack, terms) > 0
}

pub fn classify(input: &ScoringInput, tables: &ScoringTables) -> ClassificationResult {
    let result = classify_inner(input, tables);
    debug!(
        category = %result.category,
        confidence = result.confidence,
        rule = ?result.rule,
        "Classified request"
    );
    result
}

fn classify_inner(input: &ScoringInput, tables: &ScoringTables) -> ClassificationResult {
    if let Some(recommendation) = &input.recommendation {
        if let Some(category) = ServiceCategory::parse(&recommendation.label) {
            return ClassificationResult {
                category,
                confidence: recommendation.confidence.clamp(0.0, 1.0),
                reasoning: recommendation
                    .reasoning
                    .clone()
                    .unwrap_or_else(|| "Recommended by analysis enhancer".to_string()),
                rule: ClassificationRule::Enhancer,
                scores: None,
            };
        }
    }

    let haystack = input.haystack();

    for rule in &tables.triggers {
        let matched = rule
            .phrases
            .iter()
            .map(|phrase| phrase.trim().to_lowercase())
            .find(|phrase| !phrase.is_empty() && haystack.contains(phrase.as_str()));
        if let Some(phrase) = matched {
            return ClassificationResult {
                category: rule.category,
                confidence: rule.confidence,
                reasoning: format!(
                    "Trigger phrase '{}' ({}) forces {}",
                    phrase, rule.name, rule.category
                ),
                rule: ClassificationRule::Trigger(rule.name.clone()),
                scores: None,
            };
        }
    }

    let biological = contains_any(&haystack, &tables.biological_vocabulary);
    let intent = tables
        .research_intent_phrases
        .iter()
        .any(|phrase| haystack.contains(phrase.to_lowercase().as_str()));

    let mut calm = count_terms(&haystack, &tables.calm_keywords);
    if biological {
        calm += tables.biological_bonus;
    }
    if intent {
        calm += tables.research_intent_bonus;
    }
    let dpia = count_terms(&haystack, &tables.dpia_keywords);
    let scores = CategoryScores { calm, dpia };

    if calm != dpia {
        let (category, winner) = if calm > dpia {
            (ServiceCategory::Calm, calm)
        } else {
            (ServiceCategory::Dpia, dpia)
        };
        let confidence = (winner as f32 / (calm + dpia) as f32)
            .clamp(tables.min_confidence, tables.max_confidence);
        return ClassificationResult {
            category,
            confidence,
            reasoning: format!(
                "Keyword scores CALM {calm} vs DPIA {dpia}{}{}",
                if biological { ", biological research bonus applied" } else { "" },
                if intent { ", research intent bonus applied" } else { "" },
            ),
            rule: ClassificationRule::Score,
            scores: Some(scores),
        };
    }

    let (category, tie_break) = if biological || contains_any(&haystack, &tables.research_vocabulary)
    {
        (ServiceCategory::Calm, TieBreak::ResearchVocabulary)
    } else if count_bounded(&haystack, &tables.calm_token.to_lowercase()) > 0 {
        (ServiceCategory::Calm, TieBreak::CalmToken)
    } else if count_bounded(&haystack, &tables.dpia_token.to_lowercase()) > 0 {
        (ServiceCategory::Dpia, TieBreak::DpiaToken)
    } else {
        (ServiceCategory::Dpia, TieBreak::Default)
    };
    ClassificationResult {
        category,
        confidence: tables.tie_confidence,
        reasoning: format!("Keyword scores tied at {calm}; resolved by {tie_break:?} rule"),
        rule: ClassificationRule::TieBreak(tie_break),
        scores: Some(scores),
    }
}
