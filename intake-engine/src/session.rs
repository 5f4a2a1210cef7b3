//! Multi-turn completion of a request record.
//!
//! ```text
//! Detecting ──► AwaitingAnswers ──► Ready ──► Finalized
//!     │               ▲   │            │
//!     └───────────────┘   └──► Failed ◄┘
//! ```
//!
//! A session owns the running record and the ordered list of mandatory
//! fields still outstanding. It assumes at most one in-flight mutation at a
//! time; callers serialize turns per session id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analysis::{Analysis, analyze};
use crate::classify::{ClassificationResult, Recommendation, ScoringInput, ScoringTables, classify};
use crate::detect::generate_request_number;
use crate::detect::text::sentence_end;
use crate::error::{EngineError, Result};
use crate::fields::{Answer, FieldEntry, FieldName, FieldRecord, FieldSource, FieldValue};
use crate::prompts::{Prompt, prompts_for};
use crate::validate::unresolved;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Detecting,
    AwaitingAnswers,
    Ready,
    Finalized,
    Failed,
}

/// One user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Turn {
    /// Explicit field → answer pairs.
    Answers(BTreeMap<FieldName, String>),
    /// A free-text reply to the outstanding questions.
    Text(String),
    /// Start over with a new description.
    Restart(String),
    /// Ask for the record to be finalized.
    Confirm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub state: SessionState,
    pub record: FieldRecord,
    pub unresolved: Vec<FieldName>,
    pub prompts: Vec<Prompt>,
    pub classification: ClassificationResult,
    pub applied: Vec<FieldName>,
    /// Fields whose answer was not one of the offered options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<FieldName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub record: FieldRecord,
    pub outstanding: Vec<FieldName>,
    pub turn_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source_text: String,
    pub classification: ClassificationResult,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
    #[serde(default)]
    pub case_id: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Words people put between a field name and its value.
const LEAD_INS: &[&str] = &["is", "are", "was", "will be", "should be", "would be", "="];

const TRAILING_FILLERS: &[&str] = &["and", "the", "with", "also", "plus"];

impl Session {
    /// Opens a session from the analysis of its first text.
    pub fn start(id: impl Into<String>, text: impl Into<String>, analysis: Analysis) -> Self {
        let now = Utc::now();
        let mut session = Self {
            id: id.into(),
            state: SessionState::Detecting,
            record: analysis.record,
            outstanding: Vec::new(),
            turn_count: 0,
            created_at: now,
            updated_at: now,
            source_text: text.into(),
            classification: analysis.classification,
            recommendation: analysis.recommendation,
            case_id: None,
            last_error: None,
        };
        session.assign_request_number(None);
        session.settle();
        session
    }

    /// Applies one turn. `Restart` re-runs the heuristic pipeline with
    /// `tables`; use [`Session::restart`] to supply an enhanced analysis.
    pub fn apply(&mut self, turn: Turn, tables: &ScoringTables) -> Result<TurnOutcome> {
        self.ensure_open()?;
        self.touch();
        let answers: Vec<(FieldName, String)> = match turn {
            Turn::Answers(answers) => answers.into_iter().collect(),
            Turn::Text(text) => extract_answers(&text, &self.outstanding),
            Turn::Restart(text) => {
                let analysis = analyze(&text, tables);
                self.reset(text, analysis);
                return Ok(self.outcome(Vec::new()));
            }
            Turn::Confirm => return Ok(self.outcome(Vec::new())),
        };

        let mut applied = Vec::new();
        let mut rejected = Vec::new();
        for (field, answer) in answers {
            match field.canonicalize(&answer) {
                Answer::Value(value) => {
                    self.set_answer(field, value);
                    applied.push(field);
                }
                Answer::Unknown => {}
                Answer::Rejected => rejected.push(field),
            }
        }
        if !applied.is_empty() {
            self.reclassify(tables);
        }
        self.settle();
        Ok(TurnOutcome {
            rejected,
            ..self.outcome(applied)
        })
    }

    /// Starts over with a new text and its (possibly enhanced) analysis.
    pub fn restart(&mut self, text: impl Into<String>, analysis: Analysis) -> Result<TurnOutcome> {
        self.ensure_open()?;
        self.touch();
        self.reset(text.into(), analysis);
        Ok(self.outcome(Vec::new()))
    }

    pub fn can_finalize(&self) -> bool {
        matches!(self.state, SessionState::Ready | SessionState::Failed) && self.outstanding.is_empty()
    }

    /// Records the case id returned by case management.
    pub fn finalize(&mut self, case_id: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.updated_at = Utc::now();
        self.case_id = Some(case_id.into());
        self.last_error = None;
        self.state = SessionState::Finalized;
        Ok(())
    }

    /// Marks case creation as failed. The record is kept for a retry.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.updated_at = Utc::now();
        self.last_error = Some(error.into());
        self.state = SessionState::Failed;
    }

    pub fn outcome(&self, applied: Vec<FieldName>) -> TurnOutcome {
        TurnOutcome {
            session_id: self.id.clone(),
            state: self.state,
            record: self.record.clone(),
            unresolved: self.outstanding.clone(),
            prompts: prompts_for(&self.outstanding, &self.record),
            classification: self.classification.clone(),
            applied,
            rejected: Vec::new(),
            case_id: self.case_id.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == SessionState::Finalized {
            return Err(EngineError::SessionFinalized(self.id.clone()));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.turn_count += 1;
        self.updated_at = Utc::now();
    }

    fn reset(&mut self, text: String, analysis: Analysis) {
        let previous = self.record.text(FieldName::RequestNumber).map(str::to_string);
        self.state = SessionState::Detecting;
        self.source_text = text;
        self.record = analysis.record;
        self.classification = analysis.classification;
        self.recommendation = analysis.recommendation;
        self.last_error = None;
        self.assign_request_number(previous);
        self.settle();
    }

    fn assign_request_number(&mut self, previous: Option<String>) {
        if self.record.is_resolved(FieldName::RequestNumber) {
            return;
        }
        let number = previous.unwrap_or_else(|| generate_request_number(self.created_at));
        self.record.set(
            FieldName::RequestNumber,
            FieldEntry::new(FieldValue::text(number), 1.0, FieldSource::Generated),
        );
    }

    fn set_answer(&mut self, field: FieldName, value: String) {
        self.record.set(
            field,
            FieldEntry::new(FieldValue::Text(value), 1.0, FieldSource::User),
        );
    }

    fn reclassify(&mut self, tables: &ScoringTables) {
        let input = ScoringInput::from_record(self.source_text.as_str(), &self.record)
            .with_recommendation(self.recommendation.clone());
        self.classification = classify(&input, tables);
    }

    /// Recomputes the outstanding list and moves to `AwaitingAnswers` or `Ready`.
    fn settle(&mut self) {
        self.outstanding = unresolved(&self.record);
        if self.state == SessionState::Failed && self.outstanding.is_empty() {
            return;
        }
        self.state = if self.outstanding.is_empty() {
            SessionState::Ready
        } else {
            SessionState::AwaitingAnswers
        };
    }
}

/// Phrases that refer to a field inside a free-text answer.
fn mentions(field: FieldName) -> &'static [&'static str] {
    match field {
        FieldName::PrincipalInvestigator => &["principal investigator", "pi"],
        FieldName::Pathologist => &["pathologist"],
        FieldName::TherapeuticArea => &["therapeutic area"],
        FieldName::Procedure => &["procedure"],
        FieldName::AssayType => &["assay type/staining type", "assay type", "staining type"],
        FieldName::ProjectTitle => &["project title", "title"],
        FieldName::RequestPurpose => &["request purpose", "purpose"],
        _ => &[],
    }
}

/// Byte range of the first word-bounded, ASCII case-insensitive occurrence
/// of `needle` in `text`.
fn find_mention(text: &str, needle: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let n = needle.len();
    (0..=bytes.len().saturating_sub(n)).find_map(|start| {
        let end = start + n;
        if end > bytes.len() || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return None;
        }
        if !text[start..end].eq_ignore_ascii_case(needle) {
            return None;
        }
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        let bounded = !before.is_some_and(char::is_alphanumeric)
            && !after.is_some_and(char::is_alphanumeric);
        bounded.then_some((start, end))
    })
}

fn first_mention(text: &str, field: FieldName) -> Option<(usize, usize)> {
    mentions(field)
        .iter()
        .filter_map(|needle| find_mention(text, needle))
        .min_by_key(|(start, _)| *start)
}

fn strip_lead_in(mut rest: &str) -> &str {
    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '–'));
        let stripped = LEAD_INS.iter().find_map(|lead| {
            find_mention(trimmed, lead)
                .filter(|(start, _)| *start == 0)
                .map(|(_, end)| &trimmed[end..])
        });
        match stripped {
            Some(next) => rest = next,
            None => return trimmed,
        }
    }
}

/// Drops trailing punctuation and connective words such as "and the".
fn trim_value(mut value: &str) -> &str {
    loop {
        value = value
            .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '.' | ':' | '-'))
            .trim_start();
        let Some((head, last)) = value.rsplit_once(char::is_whitespace) else {
            return value;
        };
        if TRAILING_FILLERS.contains(&last.to_lowercase().as_str()) {
            value = head;
        } else {
            return value;
        }
    }
}

/// Pulls answers for outstanding fields out of a free-text reply.
///
/// A field whose name appears in the text takes the words after the name up
/// to the end of the sentence, or up to the next field name. When nothing is
/// found that way and exactly one field is outstanding, the whole reply
/// becomes its value.
pub fn extract_answers(text: &str, outstanding: &[FieldName]) -> Vec<(FieldName, String)> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut answers = Vec::new();
    for &field in outstanding {
        let Some((_, end)) = first_mention(text, field) else {
            continue;
        };
        let rest = strip_lead_in(&text[end..]);
        let mut stop = sentence_end(rest);
        for other in FieldName::MANDATORY.into_iter().filter(|f| *f != field) {
            if let Some((start, _)) = first_mention(&rest[..stop], other) {
                stop = stop.min(start);
            }
        }
        let value = trim_value(&rest[..stop]);
        if !value.is_empty() {
            answers.push((field, value.to_string()));
        }
    }

    if answers.is_empty() && outstanding.len() == 1 {
        answers.push((outstanding[0], text.to_string()));
    }
    answers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use pretty_assertions::assert_eq;

    fn tables() -> ScoringTables {
        ScoringTables::default()
    }

    fn start(text: &str) -> Session {
        Session::start("s-1", text, analyze(text, &tables()))
    }

    fn sample_answer(field: FieldName) -> String {
        match field {
            FieldName::TherapeuticArea => "Oncology".to_string(),
            FieldName::Procedure => "BF".to_string(),
            FieldName::AssayType => "IHC".to_string(),
            _ => format!("answer for {}", field.label()),
        }
    }

    fn complete_except(session: &mut Session, keep: FieldName) {
        let answers = FieldName::MANDATORY
            .into_iter()
            .filter(|f| *f != keep)
            .map(|f| (f, sample_answer(f)))
            .collect();
        session.apply(Turn::Answers(answers), &tables()).unwrap();
    }

    #[test]
    fn test_empty_signal_awaits_every_mandatory_field() {
        let session = start("Please process this.");
        assert_eq!(session.state, SessionState::AwaitingAnswers);
        assert_eq!(session.outstanding, FieldName::MANDATORY.to_vec());
        let outcome = session.outcome(Vec::new());
        assert_eq!(outcome.prompts.len(), 7);
        assert_eq!(
            outcome.prompts[1].question,
            "Which pathologist will review this request?"
        );
    }

    #[test]
    fn test_start_assigns_request_number() {
        let session = start("Please process this.");
        let expected = generate_request_number(session.created_at);
        assert_eq!(session.record.text(FieldName::RequestNumber), Some(expected.as_str()));
    }

    #[test]
    fn test_sole_outstanding_field_takes_whole_reply() {
        let mut session = start("Please process this.");
        complete_except(&mut session, FieldName::Pathologist);
        assert_eq!(session.outstanding, vec![FieldName::Pathologist]);

        let outcome = session
            .apply(Turn::Text("Dr. Bhashyam".to_string()), &tables())
            .unwrap();
        assert_eq!(outcome.record.text(FieldName::Pathologist), Some("Dr. Bhashyam"));
        assert!(outcome.unresolved.is_empty());
        assert_eq!(outcome.state, SessionState::Ready);
    }

    #[test]
    fn test_named_fields_extracted_from_free_text() {
        let mut session = start("Please process this.");
        let outcome = session
            .apply(
                Turn::Text(
                    "The pathologist is Dr. Lee and the PI: Maria Lopez. Purpose - count AT2 cells per section."
                        .to_string(),
                ),
                &tables(),
            )
            .unwrap();
        assert_eq!(outcome.record.text(FieldName::Pathologist), Some("Dr. Lee"));
        assert_eq!(
            outcome.record.text(FieldName::PrincipalInvestigator),
            Some("Maria Lopez")
        );
        assert_eq!(
            outcome.record.text(FieldName::RequestPurpose),
            Some("count AT2 cells per section")
        );
        assert_eq!(outcome.state, SessionState::AwaitingAnswers);
        assert_eq!(outcome.unresolved.len(), 4);
    }

    #[test]
    fn test_unmatched_text_with_several_outstanding_changes_nothing() {
        let mut session = start("Please process this.");
        let outcome = session
            .apply(Turn::Text("not sure yet".to_string()), &tables())
            .unwrap();
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.unresolved.len(), 7);
        assert_eq!(session.turn_count, 1);
    }

    #[test]
    fn test_categorical_answers_are_canonicalized() {
        let mut session = start("Please process this.");
        let answers = BTreeMap::from([
            (FieldName::Procedure, "if".to_string()),
            (FieldName::TherapeuticArea, "3".to_string()),
        ]);
        let outcome = session.apply(Turn::Answers(answers), &tables()).unwrap();
        assert_eq!(outcome.record.text(FieldName::Procedure), Some("Fluorescence (IF)"));
        assert_eq!(outcome.record.text(FieldName::TherapeuticArea), Some("Oncology"));
    }

    #[test]
    fn test_unknown_option_leaves_categorical_fields_outstanding() {
        let mut session = start("Please process this.");
        let answers = BTreeMap::from([
            (FieldName::AssayType, "5".to_string()),
            (FieldName::TherapeuticArea, "7".to_string()),
            (FieldName::Procedure, "unknown".to_string()),
        ]);
        let outcome = session.apply(Turn::Answers(answers), &tables()).unwrap();
        assert!(outcome.applied.is_empty());
        assert!(outcome.rejected.is_empty());
        assert!(outcome.unresolved.contains(&FieldName::AssayType));
        assert!(outcome.unresolved.contains(&FieldName::TherapeuticArea));
        assert!(outcome.unresolved.contains(&FieldName::Procedure));
        assert!(!outcome.record.is_resolved(FieldName::AssayType));
    }

    #[test]
    fn test_answers_outside_the_option_set_are_rejected() {
        let mut session = start("Please process this.");
        let answers = BTreeMap::from([
            (FieldName::AssayType, "9".to_string()),
            (FieldName::TherapeuticArea, "banana".to_string()),
            (FieldName::PrincipalInvestigator, "Jane Doe".to_string()),
        ]);
        let outcome = session.apply(Turn::Answers(answers), &tables()).unwrap();
        assert_eq!(outcome.applied, vec![FieldName::PrincipalInvestigator]);
        assert_eq!(
            outcome.rejected,
            vec![FieldName::TherapeuticArea, FieldName::AssayType]
        );
        assert_eq!(outcome.record.text(FieldName::AssayType), None);
        assert!(outcome.prompts.iter().any(|p| p.field == FieldName::AssayType));
        assert!(outcome.prompts.iter().any(|p| p.field == FieldName::TherapeuticArea));
    }

    #[test]
    fn test_free_text_for_sole_categorical_field_must_name_an_option() {
        let mut session = start("Please process this.");
        complete_except(&mut session, FieldName::AssayType);
        assert_eq!(session.outstanding, vec![FieldName::AssayType]);

        let outcome = session
            .apply(Turn::Text("banana".to_string()), &tables())
            .unwrap();
        assert_eq!(outcome.rejected, vec![FieldName::AssayType]);
        assert_eq!(outcome.state, SessionState::AwaitingAnswers);

        let outcome = session
            .apply(Turn::Text("unknown".to_string()), &tables())
            .unwrap();
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.unresolved, vec![FieldName::AssayType]);

        let outcome = session
            .apply(Turn::Text("3".to_string()), &tables())
            .unwrap();
        assert_eq!(outcome.record.text(FieldName::AssayType), Some("Special Stain"));
        assert_eq!(outcome.state, SessionState::Ready);
    }

    #[test]
    fn test_lowercase_unknown_does_not_resolve_a_name() {
        let mut session = start("Please process this.");
        complete_except(&mut session, FieldName::Pathologist);
        let outcome = session
            .apply(Turn::Text("UNKNOWN".to_string()), &tables())
            .unwrap();
        assert_eq!(outcome.unresolved, vec![FieldName::Pathologist]);
    }

    #[test]
    fn test_restart_reruns_detection_and_keeps_request_number() {
        let mut session = start("Please process this.");
        let number = session.record.text(FieldName::RequestNumber).map(str::to_string);
        let outcome = session
            .apply(
                Turn::Restart("Slide scanning of lung sections, reviewed by Dr. Kim".to_string()),
                &tables(),
            )
            .unwrap();
        assert_eq!(outcome.record.text(FieldName::Pathologist), Some("Dr. Kim"));
        assert_eq!(
            outcome.record.text(FieldName::RequestNumber).map(str::to_string),
            number
        );
        assert_eq!(session.source_text, "Slide scanning of lung sections, reviewed by Dr. Kim");
    }

    #[test]
    fn test_confirm_while_incomplete_is_a_no_op() {
        let mut session = start("Please process this.");
        let outcome = session.apply(Turn::Confirm, &tables()).unwrap();
        assert_eq!(outcome.state, SessionState::AwaitingAnswers);
        assert_eq!(outcome.prompts.len(), 7);
        assert!(!session.can_finalize());
    }

    #[test]
    fn test_failed_session_keeps_record_and_can_finalize_later() {
        let mut session = start("Please process this.");
        complete_except(&mut session, FieldName::Pathologist);
        session
            .apply(Turn::Text("Dr. Bhashyam".to_string()), &tables())
            .unwrap();
        assert!(session.can_finalize());

        session.fail("case service unavailable");
        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.record.text(FieldName::Pathologist), Some("Dr. Bhashyam"));
        assert!(session.can_finalize());

        session.finalize("CASE-42").unwrap();
        assert_eq!(session.state, SessionState::Finalized);
        assert_eq!(session.case_id.as_deref(), Some("CASE-42"));
        assert!(session.last_error.is_none());
    }

    #[test]
    fn test_finalized_session_rejects_turns() {
        let mut session = start("Please process this.");
        session.state = SessionState::Ready;
        session.finalize("CASE-1").unwrap();
        let result = session.apply(Turn::Text("more".to_string()), &tables());
        assert!(matches!(result, Err(EngineError::SessionFinalized(_))));
    }

    #[test]
    fn test_extract_answers_uses_name_boundaries() {
        let answers = extract_answers(
            "Pipeline ready. Title: Retina Atlas",
            &[FieldName::PrincipalInvestigator, FieldName::ProjectTitle],
        );
        assert_eq!(answers, vec![(FieldName::ProjectTitle, "Retina Atlas".to_string())]);
    }

    #[test]
    fn test_turn_deserializes_from_tagged_json() {
        let turn: Turn =
            serde_json::from_str(r#"{"type": "answers", "value": {"pi_name": "Jane Doe"}}"#).unwrap();
        assert_eq!(
            turn,
            Turn::Answers(BTreeMap::from([(
                FieldName::PrincipalInvestigator,
                "Jane Doe".to_string()
            )]))
        );
    }
}
