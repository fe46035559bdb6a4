//! Employees with login access, leave and monthly pay slips.

mod common;

use axum::http::{Method, StatusCode};
use branch_erp::entities::profile;
use common::{data, dec, id_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn hire(app: &TestApp, code: &str, basic_salary: &str) -> String {
    let (status, body) = app
        .post(
            "/api/v1/employees",
            json!({
                "employee_code": code,
                "full_name": format!("Employee {code}"),
                "email": format!("{}@branch.example", code.to_lowercase()),
                "designation": "Executive",
                "department": "Sales",
                "date_of_joining": "2025-04-01",
                "basic_salary": basic_salary,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    id_of(data(&body))
}

fn leave(employee_id: &str, leave_type: &str, start: &str, end: &str) -> Value {
    json!({
        "employee_id": employee_id,
        "leave_type": leave_type,
        "start_date": start,
        "end_date": end,
        "reason": "family function",
    })
}

#[tokio::test]
async fn login_access_is_provisioned_and_withdrawn() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/employee-management"))
        .and(body_partial_json(json!({ "action": "provision_user", "role": "sales" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user_id": user_id })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/employee-management"))
        .and(body_partial_json(json!({ "action": "reset_password", "user_id": user_id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/employee-management"))
        .and(body_partial_json(json!({ "action": "deactivate", "user_id": user_id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_functions_url(&server.uri()).await;
    let employee_id = hire(&app, "E-101", "25000").await;

    let (status, body) = app
        .post(
            &format!("/api/v1/employees/{employee_id}/access"),
            json!({ "role": "sales" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(data(&body)["employee"]["profile_id"], user_id.to_string());
    let login: profile::Model = serde_json::from_value(data(&body)["profile"].clone()).unwrap();
    assert_eq!(login.id, user_id);
    assert_eq!(login.branch_id, app.branch.id);

    let (status, _) = app
        .post(
            &format!("/api/v1/employees/{employee_id}/access"),
            json!({ "role": "sales" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let token = app.token_for(&login).await;
    let (status, _) = app.request(Method::GET, "/api/v1/leads", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            &format!("/api/v1/employees/{employee_id}/access/reset-password"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = app
        .post(
            &format!("/api/v1/employees/{employee_id}/access/deactivate"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.request(Method::GET, "/api/v1/leads", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, body) = app.get(&format!("/api/v1/profiles/{user_id}")).await;
    assert_eq!(data(&body)["is_active"], false);
}

#[tokio::test]
async fn provisioning_failure_surfaces_as_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/employee-management"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let app = TestApp::with_functions_url(&server.uri()).await;
    let employee_id = hire(&app, "E-102", "25000").await;

    let (status, _) = app
        .post(
            &format!("/api/v1/employees/{employee_id}/access"),
            json!({ "role": "dispatch" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (_, body) = app.get(&format!("/api/v1/employees/{employee_id}")).await;
    assert!(data(&body)["profile_id"].is_null());
}

#[tokio::test]
async fn leave_requests_are_reviewed_and_cancelled() {
    let app = TestApp::new().await;
    let employee_id = hire(&app, "E-201", "20000").await;

    let (status, body) = app
        .post(
            "/api/v1/leave-requests",
            leave(&employee_id, "casual", "2026-07-06", "2026-07-08"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(data(&body)["status"], "pending");
    assert_eq!(dec(&data(&body)["days"]), dec!(3));
    let first = id_of(data(&body));

    let (status, _) = app
        .post(
            "/api/v1/leave-requests",
            leave(&employee_id, "sick", "2026-07-08", "2026-07-09"),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post(
            "/api/v1/leave-requests",
            leave(&employee_id, "sick", "2026-07-10", "2026-07-09"),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "end_date");

    let (status, body) = app
        .post(
            &format!("/api/v1/leave-requests/{first}/approve"),
            json!({ "note": "enjoy" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(data(&body)["status"], "approved");
    assert_eq!(data(&body)["reviewed_by"], app.admin.id.to_string());

    let (status, _) = app
        .post(&format!("/api/v1/leave-requests/{first}/reject"), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/api/v1/leave-requests",
            json!({
                "employee_id": employee_id,
                "leave_type": "earned",
                "start_date": "2026-08-14",
                "end_date": "2026-08-14",
                "half_day": true,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(dec(&data(&body)["days"]), dec!(0.5));
    let half_day = id_of(data(&body));

    let (status, body) = app
        .post(&format!("/api/v1/leave-requests/{half_day}/cancel"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(data(&body)["status"], "cancelled");

    let (_, body) = app
        .get(&format!("/api/v1/leave-requests?employee_id={employee_id}&status=approved"))
        .await;
    assert_eq!(data(&body)["total"], 1);
}

#[tokio::test]
async fn pay_slip_reflects_unpaid_leave_and_moves_to_paid() {
    let app = TestApp::new().await;
    let employee_id = hire(&app, "E-301", "30000").await;

    let (_, body) = app
        .post(
            "/api/v1/leave-requests",
            leave(&employee_id, "unpaid", "2026-06-15", "2026-06-16"),
        )
        .await;
    let leave_id = id_of(data(&body));
    app.post(&format!("/api/v1/leave-requests/{leave_id}/approve"), json!({}))
        .await;

    let (status, body) = app
        .post(
            "/api/v1/pay-slips",
            json!({ "employee_id": employee_id, "year": 2026, "month": 6 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let slip = data(&body);
    let slip_id = id_of(slip);
    assert_eq!(slip["status"], "draft");
    assert_eq!(slip["working_days"], 30);
    assert_eq!(dec(&slip["lop_days"]), dec!(2));
    assert_eq!(dec(&slip["paid_days"]), dec!(28));
    assert_eq!(dec(&slip["earned_basic"]), dec!(28000));
    assert_eq!(dec(&slip["lop_deduction"]), dec!(2000));
    assert_eq!(
        dec(&slip["net_pay"]),
        dec(&slip["gross"]) - dec(&slip["total_deductions"])
    );

    let (status, _) = app
        .post(
            "/api/v1/pay-slips",
            json!({ "employee_id": employee_id, "year": 2026, "month": 6 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post(
            "/api/v1/pay-slips",
            json!({ "employee_id": employee_id, "year": 2026, "month": 13 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "month");

    let (status, _) = app
        .post(&format!("/api/v1/pay-slips/{slip_id}/pay"), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for (step, expected) in [("issue", "issued"), ("pay", "paid")] {
        let (status, body) = app
            .post(&format!("/api/v1/pay-slips/{slip_id}/{step}"), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(data(&body)["status"], expected);
    }
}
