//! Marketplace lead sources polled by the scheduler.

use crate::entities::lead_source::LeadSourceKind;
use crate::errors::ServiceError;
use crate::services::functions::{FunctionsClient, INDIAMART_SYNC, TRADEINDIA_SYNC};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

/// One enquiry as returned by a sync function.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExternalLead {
    #[serde(alias = "id", alias = "unique_query_id")]
    pub external_id: String,
    #[serde(alias = "sender_name")]
    pub name: String,
    #[serde(default, alias = "sender_company")]
    pub company: Option<String>,
    #[serde(default, alias = "sender_email")]
    pub email: Option<String>,
    #[serde(default, alias = "sender_mobile")]
    pub phone: Option<String>,
    #[serde(default, alias = "query_message", alias = "subject")]
    pub requirement: Option<String>,
    #[serde(default, alias = "sender_city")]
    pub city: Option<String>,
    #[serde(default, alias = "sender_state")]
    pub state: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

/// Body returned by `indiamart-sync` / `tradeindia-sync`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub new: u32,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub leads: Vec<ExternalLead>,
}

#[async_trait]
pub trait LeadSourceClient: Send + Sync {
    fn kind(&self) -> LeadSourceKind;

    /// One remote call. A response carrying `error` is returned as `Ok`; the
    /// scheduler decides whether the run failed.
    async fn fetch(&self) -> Result<SyncResponse, ServiceError>;
}

/// Source backed by a serverless function invoked with an empty body.
pub struct FunctionLeadSource {
    client: FunctionsClient,
    kind: LeadSourceKind,
    function: &'static str,
}

impl FunctionLeadSource {
    pub fn indiamart(client: FunctionsClient) -> Self {
        Self {
            client,
            kind: LeadSourceKind::Indiamart,
            function: INDIAMART_SYNC,
        }
    }

    pub fn tradeindia(client: FunctionsClient) -> Self {
        Self {
            client,
            kind: LeadSourceKind::Tradeindia,
            function: TRADEINDIA_SYNC,
        }
    }
}

#[async_trait]
impl LeadSourceClient for FunctionLeadSource {
    fn kind(&self) -> LeadSourceKind {
        self.kind
    }

    async fn fetch(&self) -> Result<SyncResponse, ServiceError> {
        self.client.invoke(self.function, &json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_marketplace_field_names() {
        let body = json!({
            "new": 1,
            "leads": [{
                "unique_query_id": "IM-881",
                "sender_name": "Sunil",
                "sender_mobile": "+91-9800000000",
                "query_message": "Need 200 cartons",
                "sender_city": "Nashik"
            }]
        });
        let response: SyncResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.new, 1);
        assert!(response.error.is_none());
        let lead = &response.leads[0];
        assert_eq!(lead.external_id, "IM-881");
        assert_eq!(lead.requirement.as_deref(), Some("Need 200 cartons"));
        assert_eq!(lead.city.as_deref(), Some("Nashik"));
    }

    #[tokio::test]
    async fn invokes_function_with_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tradeindia-sync"))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "new": 0, "error": "quota exceeded" })))
            .expect(1)
            .mount(&server)
            .await;

        let source = FunctionLeadSource::tradeindia(FunctionsClient::with_client(
            Client::new(),
            &server.uri(),
            None,
        ));
        assert_eq!(source.kind(), LeadSourceKind::Tradeindia);
        let response = source.fetch().await.unwrap();
        assert_eq!(response.error.as_deref(), Some("quota exceeded"));
        assert!(response.leads.is_empty());
    }
}
