//! Lead capture, round-robin assignment and marketplace sync.

mod common;

use axum::http::{Method, StatusCode};
use branch_erp::entities::profile::Role;
use common::{data, id_of, TestApp};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn leads_are_dealt_round_robin_by_matching_rule() {
    let app = TestApp::new().await;
    let (first, _) = app.login_as(Role::Sales).await;
    let (second, _) = app.login_as(Role::Sales).await;

    let (status, body) = app
        .post(
            "/api/v1/lead-assignment-rules",
            json!({
                "name": "Carton enquiries",
                "keyword": "carton",
                "assignee_ids": [first.id, second.id],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let mut assignees = Vec::new();
    for (name, requirement) in [
        ("Ravi", "500 cartons"),
        ("Meena", "Printed carton boxes"),
        ("Joseph", "Stretch film"),
    ] {
        let (status, body) = app
            .post(
                "/api/v1/leads",
                json!({
                    "name": name,
                    "phone": "9822000000",
                    "requirement": requirement,
                    "source_kind": "website",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(data(&body)["status"], "new");
        assignees.push(data(&body)["assigned_to"].clone());
    }

    assert_eq!(assignees[0], first.id.to_string());
    assert_eq!(assignees[1], second.id.to_string());
    assert!(assignees[2].is_null());
}

#[tokio::test]
async fn lead_without_contact_details_is_refused() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post("/api/v1/leads", json!({ "name": "Nobody" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "phone");
}

#[tokio::test]
async fn converting_a_lead_creates_a_customer_once() {
    let app = TestApp::new().await;
    let (_, body) = app
        .post(
            "/api/v1/leads",
            json!({
                "name": "Kavita Shah",
                "company": "Shah Exports",
                "email": "kavita@shah.example",
                "city": "Pune",
                "state": "Maharashtra",
            }),
        )
        .await;
    let lead_id = id_of(data(&body));

    let (status, body) = app
        .post(&format!("/api/v1/leads/{lead_id}/convert"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let conversion = data(&body);
    assert_eq!(conversion["lead"]["status"], "qualified");
    assert_eq!(conversion["customer"]["name"], "Kavita Shah");
    assert_eq!(conversion["customer"]["billing_address"], "Pune, Maharashtra");
    assert_eq!(conversion["lead"]["customer_id"], conversion["customer"]["id"]);

    let (status, _) = app
        .post(&format!("/api/v1/leads/{lead_id}/convert"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .put(&format!("/api/v1/leads/{lead_id}/status"), json!({ "status": "won" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, body) = app.get("/api/v1/leads/summary").await;
    let summary = data(&body);
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["won"], 1);
    assert_eq!(summary["conversion_rate"], 100.0);
}

#[tokio::test]
async fn forced_sync_imports_marketplace_leads_idempotently() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indiamart-sync"))
        .and(header("authorization", "Bearer service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "new": 2,
            "leads": [
                {
                    "unique_query_id": "IM-1001",
                    "sender_name": "Prakash Traders",
                    "sender_mobile": "+91-9890000001",
                    "query_message": "Need corrugated boxes",
                    "sender_city": "Nagpur"
                },
                {
                    "unique_query_id": "IM-1002",
                    "sender_name": "Latha Foods",
                    "sender_email": "buy@latha.example"
                }
            ]
        })))
        .mount(&server)
        .await;

    let app = TestApp::with_functions_url(&server.uri()).await;

    let (status, body) = app
        .post("/api/v1/leads/sync/indiamart/force", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let outcome = data(&body);
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["new_count"], 2);
    assert_eq!(outcome["status"]["total_imported"], 2);
    assert!(outcome["status"]["running_since"].is_null());

    let (_, body) = app
        .post("/api/v1/leads/sync/indiamart/force", json!({}))
        .await;
    assert_eq!(data(&body)["new_count"], 0);
    assert_eq!(data(&body)["updated_count"], 2);

    let (_, body) = app.get("/api/v1/leads?source_kind=indiamart").await;
    assert_eq!(data(&body)["total"], 2);

    let (status, body) = app.get("/api/v1/leads/sync/status").await;
    assert_eq!(status, StatusCode::OK);
    let sources = data(&body)["sources"].as_array().unwrap().clone();
    let indiamart = sources
        .iter()
        .find(|s| s["source_kind"] == "indiamart")
        .expect("indiamart status row");
    assert_eq!(indiamart["consecutive_failures"], 0);
    assert!(indiamart["last_success_at"].is_string());
}

#[tokio::test]
async fn failed_sync_is_recorded_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tradeindia-sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "new": 0,
            "error": "API quota exceeded"
        })))
        .mount(&server)
        .await;

    let app = TestApp::with_functions_url(&server.uri()).await;
    let (status, body) = app
        .post("/api/v1/leads/sync/tradeindia/force", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let outcome = data(&body);
    assert_eq!(outcome["success"], false);
    assert_eq!(outcome["error"], "API quota exceeded");
    assert_eq!(outcome["status"]["consecutive_failures"], 1);
    assert!(outcome["status"]["next_run_at"].is_string());
}

#[tokio::test]
async fn only_marketplace_sources_can_be_synced() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post("/api/v1/leads/sync/website/force", json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, dispatch) = app.login_as(Role::Dispatch).await;
    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/leads/sync/indiamart/force",
            Some(&dispatch),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, sales) = app.login_as(Role::Sales).await;
    let (status, body) = app
        .request(
            Method::PUT,
            "/api/v1/leads/sync/settings",
            Some(&sales),
            Some(json!({ "auto_sync_enabled": false, "interval_minutes": 30 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(data(&body)["interval_minutes"], 30);
    assert_eq!(data(&body)["auto_sync_enabled"], false);
}
