//! # intake-engine
//!
//! Turns free-form research request text into a structured intake record,
//! decides which service line (CALM or DPIA) should handle it, and guides
//! the requester through whatever mandatory fields are still missing.
//!
//! ```rust
//! use intake_engine::{ScoringTables, ServiceCategory, analyze};
//!
//! let analysis = analyze(
//!     "Lung stem cells (AT2-TRITC) and total cells (DAPI) are stained. # of AT2 cells per lung section",
//!     &ScoringTables::default(),
//! );
//! assert_eq!(analysis.classification.category, ServiceCategory::Dpia);
//! ```
//!
//! Stateful, multi-turn use goes through [`SessionRunner`], which stores
//! [`Session`]s in any [`SessionStore`] and hands completed records to a
//! [`CaseManager`].

pub mod analysis;
pub mod case;
pub mod classify;
pub mod detect;
pub mod enhancer;
pub mod error;
pub mod fields;
pub mod format;
pub mod prompts;
pub mod runner;
pub mod session;
pub mod store;
pub mod validate;

// Re-export commonly used types
pub use analysis::{Analysis, analyze, analyze_with};
pub use case::{CaseManager, CaseReceipt, CaseSubmission, RiskLevel};
pub use classify::{
    ClassificationResult, ClassificationRule, Recommendation, ScoringInput, ScoringTables,
    ServiceCategory, classify,
};
pub use detect::{detect_all, detect_field, looks_like_research_text};
pub use enhancer::{AnalysisEnhancer, EnhancerAnalysis, merge_enhancement};
pub use error::{EngineError, Result};
pub use fields::{Answer, FieldEntry, FieldName, FieldRecord, FieldSource, FieldValue};
pub use format::{FormatKind, Formatted, StructuredRecord, parse_table, to_structured, to_table};
pub use prompts::{InputKind, Prompt, prompts_for};
pub use runner::SessionRunner;
pub use session::{Session, SessionState, Turn, TurnOutcome};
pub use store::{InMemorySessionStore, SessionStore};
pub use validate::{is_complete, unresolved};
