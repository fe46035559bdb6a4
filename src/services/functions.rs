//! Client for the hosted serverless functions (lead-source sync and
//! employee login management).

use crate::config::AppConfig;
use crate::entities::profile::Role;
use crate::errors::ServiceError;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub const INDIAMART_SYNC: &str = "indiamart-sync";
pub const TRADEINDIA_SYNC: &str = "tradeindia-sync";
pub const EMPLOYEE_MANAGEMENT: &str = "employee-management";

const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
pub struct FunctionsClient {
    client: Client,
    base_url: String,
    service_key: Option<String>,
}

impl FunctionsClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.lead_sync.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(
            client,
            &config.functions_base_url,
            Some(config.functions_service_key.clone()).filter(|k| !k.is_empty()),
        ))
    }

    pub fn with_client(client: Client, base_url: &str, service_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        }
    }

    /// `POST {base_url}/{name}` with a JSON body; non-2xx responses are external errors.
    #[instrument(skip(self, body))]
    pub async fn invoke<B, R>(&self, name: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, name);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.service_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(function = name, error = %e, "function call failed");
            ServiceError::ExternalServiceError(format!("{name} unreachable: {e}"))
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("{name} response unreadable: {e}"))
        })?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            warn!(function = name, %status, body = %snippet, "function returned an error status");
            return Err(ServiceError::ExternalServiceError(format!(
                "{name} returned {status}"
            )));
        }

        debug!(function = name, %status, "function call succeeded");
        serde_json::from_slice(&bytes).map_err(|e| {
            ServiceError::ExternalServiceError(format!("{name} returned malformed JSON: {e}"))
        })
    }
}

/// Actions understood by the `employee-management` function
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EmployeeAction {
    ProvisionUser {
        email: String,
        full_name: String,
        role: Role,
        branch_id: Uuid,
    },
    Update {
        user_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        full_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },
    ResetPassword {
        user_id: Uuid,
    },
    Deactivate {
        user_id: Uuid,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeActionResponse {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub error: Option<String>,
}

impl FunctionsClient {
    pub async fn employee_management(&self, action: &EmployeeAction) -> Result<EmployeeActionResponse, ServiceError> {
        let response: EmployeeActionResponse = self.invoke(EMPLOYEE_MANAGEMENT, action).await?;
        if let Some(error) = &response.error {
            return Err(ServiceError::ExternalServiceError(format!(
                "{EMPLOYEE_MANAGEMENT}: {error}"
            )));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> FunctionsClient {
        FunctionsClient::with_client(Client::new(), &format!("{}/functions/v1/", server.uri()), Some("svc-key".into()))
    }

    #[test]
    fn actions_serialise_with_tag() {
        let user_id = Uuid::nil();
        let value = serde_json::to_value(EmployeeAction::ResetPassword { user_id }).unwrap();
        assert_eq!(value, json!({ "action": "reset_password", "user_id": user_id }));

        let value = serde_json::to_value(EmployeeAction::Update {
            user_id,
            email: None,
            full_name: Some("A".into()),
            role: Some(Role::Hr),
        })
        .unwrap();
        assert_eq!(value["action"], "update");
        assert_eq!(value["role"], "hr");
        assert!(value.get("email").is_none());
    }

    #[tokio::test]
    async fn provision_returns_user_id() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/functions/v1/employee-management"))
            .and(header("authorization", "Bearer svc-key"))
            .and(body_json(json!({
                "action": "provision_user",
                "email": "a@b.test",
                "full_name": "A B",
                "role": "sales",
                "branch_id": Uuid::nil(),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user_id": user_id })))
            .mount(&server)
            .await;

        let response = client(&server)
            .employee_management(&EmployeeAction::ProvisionUser {
                email: "a@b.test".into(),
                full_name: "A B".into(),
                role: Role::Sales,
                branch_id: Uuid::nil(),
            })
            .await
            .unwrap();
        assert_eq!(response.user_id, Some(user_id));
    }

    #[tokio::test]
    async fn error_status_and_error_body_are_external_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/indiamart-sync"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/employee-management"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "email taken" })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_matches!(
            client.invoke::<_, serde_json::Value>(INDIAMART_SYNC, &json!({})).await,
            Err(ServiceError::ExternalServiceError(_))
        );
        assert_matches!(
            client
                .employee_management(&EmployeeAction::Deactivate { user_id: Uuid::nil() })
                .await,
            Err(ServiceError::ExternalServiceError(msg)) if msg.contains("email taken")
        );
    }
}
