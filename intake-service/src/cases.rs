use async_trait::async_trait;
use chrono::Utc;
use intake_engine::{CaseManager, CaseReceipt, CaseSubmission, EngineError};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::CaseApiConfig;

/// Case management over its REST API (`POST {base}/cases`).
pub struct RestCaseClient {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl RestCaseClient {
    pub fn new(base_url: impl Into<String>, username: Option<String>, password: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            username,
            password,
        }
    }
}

/// Picks the configured case manager: the REST client when a URL is set,
/// otherwise offline demo ids.
pub fn case_manager(config: &CaseApiConfig) -> Arc<dyn CaseManager> {
    match &config.base_url {
        Some(url) => {
            info!(url = %url, "Using case management API");
            Arc::new(RestCaseClient::new(
                url.clone(),
                config.username.clone(),
                config.password.clone(),
            ))
        }
        None => {
            info!("CASE_API_URL not set, issuing offline case ids");
            Arc::new(OfflineCaseManager)
        }
    }
}

pub fn case_payload(submission: &CaseSubmission) -> Value {
    json!({
        "caseTypeID": submission.case_type_id,
        "processID": submission.process_id,
        "content": {
            "pxObjClass": submission.case_type_id,
            "pyLabel": submission.label,
            "pyDescription": submission.description,
            "pyWorkPage": {
                "ServiceCategory": submission.category.label(),
                "RiskLevel": submission.risk_level.to_string(),
                "Fields": submission.fields,
            },
            "pxCreatedFromChannel": "Web"
        }
    })
}

/// Case id from a creation response; services differ on the key.
fn case_id(data: &Value) -> Option<String> {
    ["ID", "id", "case_id", "caseID"]
        .iter()
        .find_map(|key| data[*key].as_str())
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
}

#[async_trait]
impl CaseManager for RestCaseClient {
    async fn create_case(&self, submission: &CaseSubmission) -> intake_engine::Result<CaseReceipt> {
        let url = format!("{}/cases", self.base_url.trim_end_matches('/'));
        info!(
            session_id = %submission.session_id,
            case_type = %submission.case_type_id,
            "Creating case"
        );

        let mut request = self.client.post(&url).json(&case_payload(submission));
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::CaseCreation(format!("Case API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Case API rejected request");
            return Err(EngineError::CaseCreation(format!(
                "Case API returned {}: {}",
                status, body
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| EngineError::CaseCreation(format!("Failed to parse case response: {}", e)))?;
        let case_id = case_id(&data).ok_or_else(|| {
            EngineError::CaseCreation(format!("Case response carried no case id: {}", data))
        })?;

        Ok(CaseReceipt {
            case_id,
            status: data["status"].as_str().map(str::to_string),
        })
    }
}

/// Issues `DEMO-<timestamp>` ids when no case management API is configured.
pub struct OfflineCaseManager;

#[async_trait]
impl CaseManager for OfflineCaseManager {
    async fn create_case(&self, submission: &CaseSubmission) -> intake_engine::Result<CaseReceipt> {
        let case_id = format!("DEMO-{}", Utc::now().format("%Y%m%d%H%M%S"));
        info!(
            session_id = %submission.session_id,
            case_id = %case_id,
            "Issued offline case id"
        );
        Ok(CaseReceipt {
            case_id,
            status: Some("offline".to_string()),
        })
    }
}
