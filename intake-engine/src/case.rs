//! Hand-off of a completed record to case management.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classify::ServiceCategory;
use crate::error::{EngineError, Result};
use crate::fields::{AssayType, Category, FieldName, FieldRecord, Procedure, TherapeuticArea};
use crate::format::{StructuredRecord, case_summary, to_structured};
use crate::session::Session;

pub const DEFAULT_CASE_TYPE_ID: &str = "Pathworks-Work-DPIA";
pub const START_CASE_PROCESS_ID: &str = "pyStartCase";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Scores the therapeutic area, procedure and assay of a record.
    pub fn assess(record: &FieldRecord) -> Self {
        let mut score = 0;

        match record
            .text(FieldName::TherapeuticArea)
            .and_then(TherapeuticArea::parse)
        {
            Some(TherapeuticArea::Oncology | TherapeuticArea::Neurology) => score += 3,
            Some(TherapeuticArea::Cvrm | TherapeuticArea::Immunology) => score += 2,
            _ => {}
        }
        match record.text(FieldName::Procedure).and_then(Procedure::parse) {
            Some(Procedure::Combined) => score += 2,
            Some(Procedure::Fluorescence) => score += 1,
            _ => {}
        }
        if let Some(AssayType::Ihc | AssayType::SpecialStain) =
            record.text(FieldName::AssayType).and_then(AssayType::parse)
        {
            score += 1;
        }

        match score {
            s if s >= 4 => RiskLevel::High,
            s if s >= 2 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        f.write_str(label)
    }
}

/// Payload handed to a [`CaseManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSubmission {
    pub case_type_id: String,
    pub process_id: String,
    pub session_id: String,
    pub category: ServiceCategory,
    pub label: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub fields: StructuredRecord,
}

impl CaseSubmission {
    /// Builds a submission from a session whose record is complete.
    pub fn build(session: &Session, case_type_id: &str) -> Result<Self> {
        if !session.can_finalize() {
            let missing = session
                .outstanding
                .iter()
                .map(|field| field.label())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(EngineError::CaseCreation(format!(
                "session {} is not ready for submission (missing: {missing})",
                session.id
            )));
        }

        let record = &session.record;
        let category = session.classification.category;
        let title = record.text(FieldName::ProjectTitle).unwrap_or("Research request");
        Ok(Self {
            case_type_id: case_type_id.to_string(),
            process_id: START_CASE_PROCESS_ID.to_string(),
            session_id: session.id.clone(),
            category,
            label: format!("{title} ({category})"),
            description: case_summary(
                record,
                &session.classification,
                session.source_text.len(),
                Utc::now(),
            ),
            risk_level: RiskLevel::assess(record),
            fields: to_structured(record),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReceipt {
    pub case_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// External system that turns a finalized record into a tracked case.
/// Failures are reported as [`EngineError::CaseCreation`].
#[async_trait]
pub trait CaseManager: Send + Sync {
    async fn create_case(&self, submission: &CaseSubmission) -> Result<CaseReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::classify::ScoringTables;
    use crate::fields::FieldSource;
    use crate::session::Turn;
    use std::collections::BTreeMap;

    fn record(area: &str, procedure: &str, assay: &str) -> FieldRecord {
        let mut record = FieldRecord::new();
        record.set_text(FieldName::TherapeuticArea, area, 1.0, FieldSource::User);
        record.set_text(FieldName::Procedure, procedure, 1.0, FieldSource::User);
        record.set_text(FieldName::AssayType, assay, 1.0, FieldSource::User);
        record
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(RiskLevel::assess(&record("Oncology", "BF+IF", "IHC")), RiskLevel::High);
        assert_eq!(RiskLevel::assess(&record("Oncology", "Bright-field (BF)", "H&E")), RiskLevel::Medium);
        assert_eq!(RiskLevel::assess(&record("CVRM", "Fluorescence (IF)", "IHC")), RiskLevel::High);
        assert_eq!(RiskLevel::assess(&record("Ophthalmology", "Fluorescence (IF)", "IHC")), RiskLevel::Medium);
        assert_eq!(RiskLevel::assess(&record("Ophthalmology", "Bright-field (BF)", "Other")), RiskLevel::Low);
        assert_eq!(RiskLevel::assess(&FieldRecord::new()), RiskLevel::Low);
    }

    #[test]
    fn test_build_requires_complete_record() {
        let text = "Please process this.";
        let session = Session::start("s-1", text, analyze(text, &ScoringTables::default()));
        let result = CaseSubmission::build(&session, DEFAULT_CASE_TYPE_ID);
        assert!(matches!(result, Err(EngineError::CaseCreation(message)) if message.contains("PI")));
    }

    #[test]
    fn test_build_from_ready_session() {
        let tables = ScoringTables::default();
        let text = "Please process this.";
        let mut session = Session::start("s-1", text, analyze(text, &tables));
        let answers = BTreeMap::from([
            (FieldName::PrincipalInvestigator, "Jane Doe".to_string()),
            (FieldName::Pathologist, "Dr. Lee".to_string()),
            (FieldName::TherapeuticArea, "Oncology".to_string()),
            (FieldName::Procedure, "bf".to_string()),
            (FieldName::AssayType, "ihc".to_string()),
            (FieldName::ProjectTitle, "Tumor Margin Atlas".to_string()),
            (FieldName::RequestPurpose, "Map tumor margins".to_string()),
        ]);
        session.apply(Turn::Answers(answers), &tables).unwrap();

        let submission = CaseSubmission::build(&session, "Custom-Case").unwrap();
        assert_eq!(submission.case_type_id, "Custom-Case");
        assert_eq!(submission.process_id, START_CASE_PROCESS_ID);
        assert_eq!(
            submission.label,
            format!("Tumor Margin Atlas ({})", session.classification.category)
        );
        assert_eq!(submission.risk_level, RiskLevel::High);
        assert_eq!(submission.fields.get(FieldName::PrincipalInvestigator), Some("Jane Doe"));
        assert!(submission.description.contains("- Project Title: Tumor Margin Atlas"));
    }
}
