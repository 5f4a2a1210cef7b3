use crate::fields::{FieldName, FieldRecord};

/// Mandatory fields that are absent, `Unknown` or blank, in mandatory order.
pub fn unresolved(record: &FieldRecord) -> Vec<FieldName> {
    FieldName::MANDATORY
        .into_iter()
        .filter(|field| !record.is_resolved(*field))
        .collect()
}

pub fn is_complete(record: &FieldRecord) -> bool {
    unresolved(record).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldSource, FieldValue, FieldEntry};

    #[test]
    fn test_fresh_record_is_fully_unresolved() {
        let record = FieldRecord::new();
        assert_eq!(unresolved(&record), FieldName::MANDATORY.to_vec());
    }

    #[test]
    fn test_blank_and_literal_unknown_values_count_as_unresolved() {
        let mut record = FieldRecord::new();
        record.set_text(FieldName::PrincipalInvestigator, "  ", 0.9, FieldSource::User);
        record.set_text(FieldName::Pathologist, "Unknown", 0.9, FieldSource::User);
        record.set_text(FieldName::ProjectTitle, "Retina Atlas", 0.9, FieldSource::User);
        let outstanding = unresolved(&record);
        assert!(outstanding.contains(&FieldName::PrincipalInvestigator));
        assert!(outstanding.contains(&FieldName::Pathologist));
        assert!(!outstanding.contains(&FieldName::ProjectTitle));
    }

    #[test]
    fn test_unresolved_is_idempotent() {
        let mut record = FieldRecord::new();
        record.set_text(FieldName::Procedure, "BF+IF", 0.85, FieldSource::Detected);
        let first = unresolved(&record);
        let second = unresolved(&record);
        assert_eq!(first, second);
    }

    #[test]
    fn test_complete_record() {
        let mut record = FieldRecord::new();
        for field in FieldName::MANDATORY {
            record.set(
                field,
                FieldEntry::new(FieldValue::text("value"), 1.0, FieldSource::User),
            );
        }
        assert!(is_complete(&record));
    }
}
