//! Row builders shared by service unit tests.

use crate::entities::{branch, customer, employee, profile, vendor};
use crate::events::EventSender;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sender whose receiver is already gone; events are logged and dropped.
pub(crate) fn event_sender() -> Arc<EventSender> {
    let (tx, _rx) = mpsc::channel(1);
    Arc::new(EventSender::new(tx))
}

pub(crate) async fn seed_branch(db: &DatabaseConnection, code: &str, state_code: &str) -> branch::Model {
    let now = Utc::now();
    branch::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(format!("{code} branch")),
        code: Set(code.to_string()),
        state_code: Set(state_code.to_string()),
        gstin: Set(None),
        address: Set(None),
        phone: Set(None),
        email: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub(crate) async fn seed_profile(
    db: &DatabaseConnection,
    branch_id: Uuid,
    role: profile::Role,
) -> profile::Model {
    let now = Utc::now();
    let id = Uuid::new_v4();
    profile::ActiveModel {
        id: Set(id),
        branch_id: Set(branch_id),
        full_name: Set(format!("{role} user")),
        email: Set(format!("{id}@example.test")),
        phone: Set(None),
        role: Set(role),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub(crate) async fn seed_customer(
    db: &DatabaseConnection,
    branch_id: Uuid,
    name: &str,
    state_code: Option<&str>,
) -> customer::Model {
    let now = Utc::now();
    customer::ActiveModel {
        id: Set(Uuid::new_v4()),
        branch_id: Set(branch_id),
        name: Set(name.to_string()),
        company: Set(None),
        email: Set(None),
        phone: Set(None),
        gstin: Set(None),
        state_code: Set(state_code.map(str::to_string)),
        billing_address: Set(None),
        shipping_address: Set(Some("Plot 4, MIDC".into())),
        opening_balance: Set(Decimal::ZERO),
        created_by: Set(Uuid::new_v4()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub(crate) async fn seed_employee(
    db: &DatabaseConnection,
    branch_id: Uuid,
    code: &str,
    basic_salary: Decimal,
) -> employee::Model {
    let now = Utc::now();
    employee::ActiveModel {
        id: Set(Uuid::new_v4()),
        branch_id: Set(branch_id),
        profile_id: Set(None),
        employee_code: Set(code.to_string()),
        full_name: Set(format!("Employee {code}")),
        email: Set(format!("{}@example.test", code.to_lowercase())),
        phone: Set(None),
        designation: Set(None),
        department: Set(None),
        date_of_joining: Set(NaiveDate::from_ymd_opt(2023, 4, 1).unwrap()),
        status: Set(employee::EmployeeStatus::Active),
        basic_salary: Set(basic_salary),
        hra: Set(dec!(0)),
        allowances: Set(dec!(0)),
        pf_applicable: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub(crate) async fn seed_vendor(
    db: &DatabaseConnection,
    branch_id: Uuid,
    name: &str,
    state_code: Option<&str>,
) -> vendor::Model {
    let now = Utc::now();
    vendor::ActiveModel {
        id: Set(Uuid::new_v4()),
        branch_id: Set(branch_id),
        name: Set(name.to_string()),
        contact_person: Set(None),
        email: Set(None),
        phone: Set(None),
        gstin: Set(None),
        state_code: Set(state_code.map(str::to_string)),
        address: Set(None),
        payment_terms: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}
