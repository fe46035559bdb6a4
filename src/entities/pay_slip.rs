use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaySlipStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "issued")]
    Issued,
    #[sea_orm(string_value = "paid")]
    Paid,
}

/// Monthly salary computation for one employee.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "pay_slips")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub branch_id: Uuid,
    pub employee_id: Uuid,
    pub period_year: i32,
    pub period_month: i32,
    pub working_days: i32,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub lop_days: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub paid_days: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub earned_basic: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub earned_hra: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub earned_allowances: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub gross: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub pf_deduction: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub professional_tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub tds: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub other_deductions: Decimal,
    /// Salary not earned because of loss-of-pay days
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub lop_deduction: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub total_deductions: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub net_pay: Decimal,
    pub status: PaySlipStatus,
    pub generated_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
