use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Branch ERP API",
        description = r#"
Branch-scoped business management API.

Sign in by exchanging an auth provider access token at `POST /api/v1/auth/session`,
then send the returned session token on every request:

```
Authorization: Bearer <session-token>
```

Admins may act on another branch by sending `X-Branch-Id`.

List endpoints accept `page`, `limit` and `search` query parameters. Responses use
the `{ success, data, message, errors, meta }` envelope.
"#
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "auth", description = "Session sign-in"),
        (name = "branches", description = "Branches and user profiles"),
        (name = "customers", description = "Customer records"),
        (name = "leads", description = "Leads, assignment rules and marketplace sync"),
        (name = "quotations", description = "Quotations and revisions"),
        (name = "orders", description = "Sales orders"),
        (name = "invoices", description = "GST invoices"),
        (name = "payments", description = "Payments and receipts"),
        (name = "ledger", description = "Customer ledger and balances"),
        (name = "employees", description = "Employees and login access"),
        (name = "leave", description = "Leave requests"),
        (name = "payroll", description = "Pay slips"),
        (name = "procurement", description = "Vendors and purchase orders"),
        (name = "shipments", description = "Dispatch and delivery"),
        (name = "health", description = "Liveness")
    ),
    paths(
        crate::auth::create_session,
        crate::health::health_check,
        handlers::branches::create_branch,
        handlers::branches::create_profile,
        handlers::customers::list_customers,
        handlers::customers::create_customer,
        handlers::leads::list_leads,
        handlers::leads::create_lead,
        handlers::leads::convert_lead,
        handlers::lead_sync::sync_status,
        handlers::lead_sync::force_sync,
        handlers::quotations::list_quotations,
        handlers::quotations::create_quotation,
        handlers::quotations::convert_quotation,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::create_order,
        handlers::invoices::list_invoices,
        handlers::invoices::create_invoice,
        handlers::invoices::invoice_order,
        handlers::payments::list_payments,
        handlers::payments::record_payment,
        handlers::payments::attach_receipt,
        handlers::ledger::customer_statement,
        handlers::ledger::add_manual_entry,
        handlers::employees::list_employees,
        handlers::employees::create_employee,
        handlers::employees::provision_access,
        handlers::leave::list_requests,
        handlers::leave::apply_leave,
        handlers::payroll::list_slips,
        handlers::payroll::generate_slip,
        handlers::vendors::create_vendor,
        handlers::purchase_orders::list_purchase_orders,
        handlers::purchase_orders::create_purchase_order,
        handlers::purchase_orders::attach_document,
        handlers::shipments::list_shipments,
        handlers::shipments::create_shipment,
        handlers::shipments::change_status,
    ),
    components(schemas(crate::ListQuery, crate::errors::ErrorResponse)),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some("Session token from POST /api/v1/auth/session"))
                    .build(),
            ),
        );
    }
}

/// Serves the generated document at `/api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
