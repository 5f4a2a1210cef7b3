use serde::{Deserialize, Serialize};

use crate::fields::{FieldKind, FieldName, FieldRecord, UNKNOWN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    FreeText,
    SingleSelect,
}

/// A question asking the user for one unresolved field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub field: FieldName,
    pub question: String,
    pub input_kind: InputKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Prompt {
    /// Question text with numbered options, as shown in a chat transcript.
    pub fn render(&self) -> String {
        if self.options.is_empty() {
            return self.question.clone();
        }
        let options = self
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| format!("  {}. {}", i + 1, option))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n{}", self.question, options)
    }
}

fn subject(record: &FieldRecord) -> String {
    match record.text(FieldName::ProjectTitle) {
        Some(title) => format!("the project \"{title}\""),
        None => "this request".to_string(),
    }
}

fn question(field: FieldName, subject: &str) -> String {
    match field {
        FieldName::PrincipalInvestigator => {
            format!("Who is the Principal Investigator (PI) for {subject}?")
        }
        FieldName::Pathologist => format!("Which pathologist will review {subject}?"),
        FieldName::TherapeuticArea => {
            format!("Which therapeutic area does {subject} belong to?")
        }
        FieldName::Procedure => format!("Which imaging procedure does {subject} require?"),
        FieldName::AssayType => {
            format!("What assay or staining type is needed for {subject}?")
        }
        FieldName::ProjectTitle => "What is the title of this project?".to_string(),
        FieldName::RequestPurpose => format!("What is the purpose of {subject}?"),
        other => format!("Please provide the {} for {subject}.", other.label()),
    }
}

/// One prompt per unresolved field, in the order given.
pub fn prompts_for(unresolved: &[FieldName], record: &FieldRecord) -> Vec<Prompt> {
    let subject = subject(record);
    unresolved
        .iter()
        .map(|&field| {
            let (input_kind, options) = match (field.kind(), field.options()) {
                (FieldKind::Categorical, Some(labels)) => {
                    let mut options: Vec<String> =
                        labels.into_iter().map(str::to_string).collect();
                    options.push(UNKNOWN.to_string());
                    (InputKind::SingleSelect, options)
                }
                _ => (InputKind::FreeText, Vec::new()),
            };
            Prompt {
                field,
                question: question(field, &subject),
                input_kind,
                options,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldSource;
    use crate::validate::unresolved;

    #[test]
    fn test_one_prompt_per_unresolved_field() {
        let record = FieldRecord::new();
        let prompts = prompts_for(&unresolved(&record), &record);
        assert_eq!(prompts.len(), 7);
        assert_eq!(prompts[0].field, FieldName::PrincipalInvestigator);
        assert_eq!(
            prompts[0].question,
            "Who is the Principal Investigator (PI) for this request?"
        );
        assert_eq!(prompts[0].input_kind, InputKind::FreeText);
        assert!(prompts[0].options.is_empty());
    }

    #[test]
    fn test_categorical_prompt_lists_closed_set_plus_unknown() {
        let record = FieldRecord::new();
        let prompts = prompts_for(&[FieldName::Procedure], &record);
        assert_eq!(prompts[0].input_kind, InputKind::SingleSelect);
        assert_eq!(
            prompts[0].options,
            vec!["Bright-field (BF)", "Fluorescence (IF)", "BF+IF", "Unknown"]
        );
    }

    #[test]
    fn test_question_uses_known_title() {
        let mut record = FieldRecord::new();
        record.set_text(FieldName::ProjectTitle, "Retina Atlas", 0.9, FieldSource::User);
        let prompts = prompts_for(&[FieldName::Pathologist], &record);
        assert_eq!(
            prompts[0].question,
            "Which pathologist will review the project \"Retina Atlas\"?"
        );
    }

    #[test]
    fn test_render_numbers_options() {
        let record = FieldRecord::new();
        let prompts = prompts_for(&[FieldName::AssayType], &record);
        let rendered = prompts[0].render();
        assert!(rendered.contains("  1. H&E"));
        assert!(rendered.ends_with("  5. Unknown"));
    }
}
