//! Vendors and purchase orders on the buying side, shipments on the selling side.

mod common;

use axum::http::{Method, StatusCode};
use branch_erp::entities::profile::Role;
use common::{data, dec, id_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn vendor(app: &TestApp, name: &str, state_code: &str) -> String {
    let (status, body) = app
        .post(
            "/api/v1/vendors",
            json!({
                "name": name,
                "contact_person": "Harsh",
                "state_code": state_code,
                "payment_terms": "Net 30",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    id_of(data(&body))
}

#[tokio::test]
async fn purchase_order_is_received_in_parts() {
    let app = TestApp::new().await;
    let vendor_id = vendor(&app, "Gujarat Steel", "24").await;

    let (status, body) = app
        .post(
            "/api/v1/purchase-orders",
            json!({
                "vendor_id": vendor_id,
                "expected_date": "2026-11-02",
                "items": [{
                    "name": "HR coil",
                    "hsn_code": "7208",
                    "quantity": "100",
                    "unit": "kg",
                    "unit_price": "50",
                    "gst_rate": "18",
                }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let po = &data(&body)["purchase_order"];
    let po_id = id_of(po);
    let item_id = id_of(&data(&body)["items"][0]);
    assert_eq!(po["po_number"], "PO-00001");
    assert_eq!(po["status"], "draft");
    assert_eq!(po["place_of_supply"], "24");
    assert_eq!(dec(&po["igst_total"]), dec!(900));
    assert_eq!(dec(&po["grand_total"]), dec!(5900));

    let receive = |quantity: &str| json!({ "items": [{ "item_id": item_id, "quantity": quantity }] });

    // Drafts have not been placed with the vendor yet
    let (status, _) = app
        .post(&format!("/api/v1/purchase-orders/{po_id}/receive"), receive("10"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .put(
            &format!("/api/v1/purchase-orders/{po_id}/status"),
            json!({ "status": "sent" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app
        .post(&format!("/api/v1/purchase-orders/{po_id}/receive"), receive("40"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(data(&body)["purchase_order"]["status"], "partially_received");
    assert_eq!(dec(&data(&body)["items"][0]["received_quantity"]), dec!(40));

    let (status, body) = app
        .post(&format!("/api/v1/purchase-orders/{po_id}/receive"), receive("70"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "items[0].quantity");

    let (status, body) = app
        .post(&format!("/api/v1/purchase-orders/{po_id}/receive"), receive("60"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(data(&body)["purchase_order"]["status"], "received");

    let (status, _) = app
        .put(
            &format!("/api/v1/purchase-orders/{po_id}/status"),
            json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn purchase_order_document_path_is_reserved() {
    let app = TestApp::new().await;
    let vendor_id = vendor(&app, "Paper Mills", "27").await;
    let (_, body) = app
        .post(
            "/api/v1/purchase-orders",
            json!({
                "vendor_id": vendor_id,
                "items": [{ "name": "Kraft paper", "quantity": "5", "unit_price": "1000", "gst_rate": "12" }],
            }),
        )
        .await;
    let po = &data(&body)["purchase_order"];
    let po_id = id_of(po);
    assert_eq!(dec(&po["cgst_total"]), dec!(300));
    assert_eq!(dec(&po["sgst_total"]), dec!(300));

    let (status, body) = app
        .post(
            &format!("/api/v1/purchase-orders/{po_id}/document"),
            json!({ "file_name": "scan.png" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "file_name");

    let (status, body) = app
        .post(
            &format!("/api/v1/purchase-orders/{po_id}/document"),
            json!({ "file_name": "PO 1 (signed).pdf" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let location = &data(&body)["location"];
    assert_eq!(location["bucket"], "documents");
    let path = location["path"].as_str().unwrap();
    assert!(path.starts_with(&format!("{}/purchase-orders/", app.admin.id)));
    assert!(path.ends_with("_PO_1__signed_.pdf"));
    assert_eq!(data(&body)["purchase_order"]["document_path"], path);
}

#[tokio::test]
async fn vendors_with_orders_are_deactivated_not_deleted() {
    let app = TestApp::new().await;
    let used = vendor(&app, "Used Vendor", "27").await;
    let unused = vendor(&app, "Unused Vendor", "27").await;
    app.post(
        "/api/v1/purchase-orders",
        json!({
            "vendor_id": used,
            "items": [{ "name": "Glue", "quantity": "1", "unit_price": "10", "gst_rate": "18" }],
        }),
    )
    .await;

    let (status, body) = app.delete(&format!("/api/v1/vendors/{used}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data(&body), "deactivated");

    let (status, body) = app.delete(&format!("/api/v1/vendors/{unused}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data(&body), "deleted");
    let (status, _) = app.get(&format!("/api/v1/vendors/{unused}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post(
            "/api/v1/purchase-orders",
            json!({
                "vendor_id": used,
                "items": [{ "name": "Glue", "quantity": "1", "unit_price": "10", "gst_rate": "18" }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "vendor_id");
}

#[tokio::test]
async fn shipment_milestones_move_the_order() {
    let app = TestApp::new().await;
    let (_, body) = app
        .post(
            "/api/v1/customers",
            json!({ "name": "Nagpur Retail", "state_code": "27", "shipping_address": "Sitabuldi, Nagpur" }),
        )
        .await;
    let customer_id = id_of(data(&body));

    let (_, body) = app
        .post(
            "/api/v1/orders",
            json!({
                "customer_id": customer_id,
                "items": [{ "name": "Carton", "quantity": "20", "unit_price": "15", "gst_rate": "18" }],
            }),
        )
        .await;
    let order_id = id_of(&data(&body)["order"]);

    // Pending orders are not ready to ship
    let (status, _) = app
        .post("/api/v1/shipments", json!({ "order_id": order_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .put(
            &format!("/api/v1/orders/{order_id}/status"),
            json!({ "status": "confirmed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, dispatch) = app.login_as(Role::Dispatch).await;
    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/shipments",
            Some(&dispatch),
            Some(json!({ "order_id": order_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let shipment = data(&body);
    let shipment_id = id_of(shipment);
    assert_eq!(shipment["shipment_number"], "SHP-00001");
    assert_eq!(shipment["status"], "pending");
    assert_eq!(shipment["shipping_address"], "Sitabuldi, Nagpur");

    let status_uri = format!("/api/v1/shipments/{shipment_id}/status");
    let set_status = |body: Value| app.request(Method::PUT, &status_uri, Some(dispatch.as_str()), Some(body));

    let (status, _) = set_status(json!({ "status": "delivered" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = set_status(json!({ "status": "packed" })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = set_status(json!({ "status": "dispatched" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "tracking_number");

    let (status, body) = set_status(json!({
        "status": "dispatched",
        "carrier": "Gati",
        "tracking_number": "GT-55012",
    }))
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(data(&body)["dispatch_date"].is_string());

    let (_, body) = app.get(&format!("/api/v1/orders/{order_id}")).await;
    assert_eq!(data(&body)["order"]["status"], "dispatched");

    let (status, body) = set_status(json!({ "status": "delivered" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(data(&body)["delivered_at"].is_string());

    let (_, body) = app.get(&format!("/api/v1/orders/{order_id}")).await;
    assert_eq!(data(&body)["order"]["status"], "delivered");

    let (_, body) = app
        .get(&format!("/api/v1/shipments?order_id={order_id}"))
        .await;
    assert_eq!(data(&body)["total"], 1);
}
