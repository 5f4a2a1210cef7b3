use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use intake_engine::format::{FormatKind, Formatted};
use intake_engine::{
    CaseManager, CaseReceipt, CaseSubmission, ClassificationRule, EngineError, FieldName,
    InMemorySessionStore, Result, ServiceCategory, SessionRunner, SessionState, Turn,
    parse_table, to_table,
};

#[derive(Default)]
struct RecordingCases {
    submissions: Mutex<Vec<CaseSubmission>>,
}

#[async_trait]
impl CaseManager for RecordingCases {
    async fn create_case(&self, submission: &CaseSubmission) -> Result<CaseReceipt> {
        let mut submissions = self
            .submissions
            .lock()
            .map_err(|e| EngineError::CaseCreation(e.to_string()))?;
        submissions.push(submission.clone());
        Ok(CaseReceipt {
            case_id: format!("CASE-{}", submissions.len()),
            status: Some("New".to_string()),
        })
    }
}

fn runner() -> (SessionRunner, Arc<RecordingCases>) {
    let cases = Arc::new(RecordingCases::default());
    let runner = SessionRunner::new(Arc::new(InMemorySessionStore::default()), cases.clone());
    (runner, cases)
}

#[tokio::test]
async fn test_lung_section_request_end_to_end() {
    let (runner, cases) = runner();
    let text = "Lung stem cells (AT2-TRITC) and total cells (DAPI) are stained. # of AT2 cells per lung section";

    let started = runner.start(text).await.unwrap();
    assert_eq!(started.classification.category, ServiceCategory::Dpia);
    assert_eq!(
        started.classification.rule,
        ClassificationRule::Trigger("tissue_section".to_string())
    );
    assert_eq!(started.state, SessionState::AwaitingAnswers);
    assert!(started.unresolved.contains(&FieldName::PrincipalInvestigator));

    let id = started.session_id.clone();
    let answers: BTreeMap<FieldName, String> = started
        .unresolved
        .iter()
        .map(|&field| {
            let answer = match field {
                FieldName::PrincipalInvestigator => "Jane Doe",
                FieldName::Pathologist => "Dr. Lee",
                FieldName::TherapeuticArea => "2",
                FieldName::Procedure => "if",
                FieldName::AssayType => "IHC",
                FieldName::ProjectTitle => "AT2 Regeneration Study",
                _ => "Count AT2 cells per lung section",
            };
            (field, answer.to_string())
        })
        .collect();
    let ready = runner
        .continue_session(&id, Turn::Answers(answers))
        .await
        .unwrap();
    assert_eq!(ready.state, SessionState::Ready);
    assert!(ready.prompts.is_empty());

    let finalized = runner.continue_session(&id, Turn::Confirm).await.unwrap();
    assert_eq!(finalized.state, SessionState::Finalized);
    assert_eq!(finalized.case_id.as_deref(), Some("CASE-1"));

    let submissions = cases.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].category, ServiceCategory::Dpia);
    assert_eq!(submissions[0].session_id, id);
    assert_eq!(
        submissions[0].fields.get(FieldName::PrincipalInvestigator),
        Some("Jane Doe")
    );
}

#[tokio::test]
async fn test_free_text_turn_resolves_sole_outstanding_field() {
    let (runner, _) = runner();
    let id = runner.start("Please process this.").await.unwrap().session_id;

    let mut answers: BTreeMap<FieldName, String> = FieldName::MANDATORY
        .into_iter()
        .map(|field| {
            let answer = match field {
                FieldName::TherapeuticArea => "Oncology".to_string(),
                FieldName::Procedure => "BF".to_string(),
                FieldName::AssayType => "IHC".to_string(),
                _ => format!("value for {}", field.label()),
            };
            (field, answer)
        })
        .collect();
    answers.remove(&FieldName::Pathologist);
    let outcome = runner
        .continue_session(&id, Turn::Answers(answers))
        .await
        .unwrap();
    assert_eq!(outcome.unresolved, vec![FieldName::Pathologist]);
    assert_eq!(
        outcome.prompts[0].question,
        "Which pathologist will review the project \"value for Project Title\"?"
    );

    let outcome = runner
        .continue_session(&id, Turn::Text("Dr. Bhashyam".to_string()))
        .await
        .unwrap();
    assert_eq!(outcome.state, SessionState::Ready);
    assert_eq!(outcome.record.text(FieldName::Pathologist), Some("Dr. Bhashyam"));
}

#[tokio::test]
async fn test_session_records_render_as_a_stable_table() {
    let (runner, _) = runner();
    let first = runner
        .start("3D Image analysis of Cleared Mouse Eyes stained with SOX9 + NucSpot 750")
        .await
        .unwrap();
    let second = runner
        .start("Slide scanning of tumor sections reviewed by Dr. Kim")
        .await
        .unwrap();

    let table = to_table(&[first.record.clone(), second.record.clone()]);
    let rows = parse_table(&table).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].fields().collect::<Vec<_>>(),
        FieldName::ALL.to_vec()
    );
    assert_eq!(rows[1].get(FieldName::Pathologist), Some("Dr. Kim"));

    match runner.format(&first.record, FormatKind::Json) {
        Formatted::Structured(structured) => {
            assert_eq!(structured.get(FieldName::TherapeuticArea), Some("Ophthalmology"));
        }
        Formatted::Table(_) => panic!("expected a structured record"),
    }
}
