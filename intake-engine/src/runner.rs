//! SessionRunner – wraps the _load → apply → save_ cycle for completion
//! sessions and owns the calls to the optional enhancer and to case
//! management.
//!
//! Create one runner at startup and share it across requests. The runner
//! does not serialize turns; callers that accept concurrent requests for the
//! same session id must hold a per-session lock around
//! [`SessionRunner::continue_session`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{Analysis, analyze_with};
use crate::case::{CaseManager, CaseSubmission, DEFAULT_CASE_TYPE_ID};
use crate::classify::ScoringTables;
use crate::enhancer::{AnalysisEnhancer, EnhancerAnalysis};
use crate::error::{EngineError, Result};
use crate::fields::FieldRecord;
use crate::format::{FormatKind, Formatted, format};
use crate::session::{Session, Turn, TurnOutcome};
use crate::store::SessionStore;

pub const DEFAULT_ENHANCER_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone)]
pub struct SessionRunner {
    store: Arc<dyn SessionStore>,
    cases: Arc<dyn CaseManager>,
    enhancer: Option<Arc<dyn AnalysisEnhancer>>,
    enhancer_timeout: Duration,
    tables: Arc<ScoringTables>,
    case_type_id: String,
}

impl SessionRunner {
    pub fn new(store: Arc<dyn SessionStore>, cases: Arc<dyn CaseManager>) -> Self {
        Self {
            store,
            cases,
            enhancer: None,
            enhancer_timeout: DEFAULT_ENHANCER_TIMEOUT,
            tables: Arc::new(ScoringTables::default()),
            case_type_id: DEFAULT_CASE_TYPE_ID.to_string(),
        }
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn AnalysisEnhancer>, timeout: Duration) -> Self {
        self.enhancer = Some(enhancer);
        self.enhancer_timeout = timeout;
        self
    }

    pub fn with_tables(mut self, tables: Arc<ScoringTables>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_case_type(mut self, case_type_id: impl Into<String>) -> Self {
        self.case_type_id = case_type_id.into();
        self
    }

    pub fn tables(&self) -> &ScoringTables {
        &self.tables
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Calls the enhancer, if any, within the configured timeout. Errors and
    /// timeouts are logged and yield `None`.
    async fn enhance(&self, text: &str) -> Option<EnhancerAnalysis> {
        let enhancer = self.enhancer.as_ref()?;
        match tokio::time::timeout(self.enhancer_timeout, enhancer.analyze(text)).await {
            Ok(Ok(enhancement)) => Some(enhancement),
            Ok(Err(e)) => {
                warn!(error = %e, "Enhancer failed, using heuristic analysis");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.enhancer_timeout.as_millis() as u64,
                    "Enhancer timed out, using heuristic analysis"
                );
                None
            }
        }
    }

    /// Stateless analysis of one text.
    pub async fn analyze(&self, text: &str) -> Analysis {
        let enhancement = self.enhance(text).await;
        analyze_with(text, &self.tables, enhancement.as_ref())
    }

    /// Opens a new session for `text`; the outcome carries its id.
    pub async fn start(&self, text: &str) -> Result<TurnOutcome> {
        let analysis = self.analyze(text).await;
        let session = Session::start(Uuid::new_v4().to_string(), text, analysis);
        let outcome = session.outcome(Vec::new());
        info!(
            session_id = %session.id,
            state = ?session.state,
            outstanding = session.outstanding.len(),
            "Session started"
        );
        self.store.put(session).await?;
        Ok(outcome)
    }

    pub async fn session(&self, session_id: &str) -> Result<Session> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// Applies one turn to a stored session and persists the result.
    ///
    /// `Confirm` on a complete record submits it to case management. A
    /// failed submission leaves the session `Failed` with its record intact
    /// and returns the case-management error unchanged.
    pub async fn continue_session(&self, session_id: &str, turn: Turn) -> Result<TurnOutcome> {
        let mut session = self.session(session_id).await?;

        let outcome = match turn {
            Turn::Restart(text) => {
                let analysis = self.analyze(&text).await;
                session.restart(text, analysis)?
            }
            Turn::Confirm => return self.confirm(session).await,
            turn => session.apply(turn, &self.tables)?,
        };

        info!(
            session_id = %session_id,
            state = ?outcome.state,
            applied = outcome.applied.len(),
            outstanding = outcome.unresolved.len(),
            "Turn applied"
        );
        self.store.put(session).await?;
        Ok(outcome)
    }

    async fn confirm(&self, mut session: Session) -> Result<TurnOutcome> {
        let outcome = session.apply(Turn::Confirm, &self.tables)?;
        if !session.can_finalize() {
            info!(
                session_id = %session.id,
                outstanding = outcome.unresolved.len(),
                "Confirmation requested with fields outstanding"
            );
            self.store.put(session).await?;
            return Ok(outcome);
        }

        let submission = CaseSubmission::build(&session, &self.case_type_id)?;
        match self.cases.create_case(&submission).await {
            Ok(receipt) => {
                info!(
                    session_id = %session.id,
                    case_id = %receipt.case_id,
                    category = %submission.category,
                    risk_level = %submission.risk_level,
                    "Case created"
                );
                session.finalize(receipt.case_id)?;
                let outcome = session.outcome(Vec::new());
                self.store.put(session).await?;
                Ok(outcome)
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Case creation failed");
                session.fail(e.to_string());
                self.store.put(session).await?;
                Err(e)
            }
        }
    }

    pub fn format(&self, record: &FieldRecord, kind: FormatKind) -> Formatted {
        format(record, kind)
    }
}
