//! Monthly pay slips with loss-of-pay pro-rating and statutory deductions.

use crate::{
    config::PayrollConfig,
    db::DbPool,
    entities::{
        employee::{self, EmployeeStatus},
        pay_slip::{self, PaySlipStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        employees::load_employee, fetch_page, leave::LeaveService, pricing::bounded_amount,
        PageRequest,
    },
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Payroll parameters as exact decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct PayrollRates {
    pub pf_rate: Decimal,
    pub pf_wage_ceiling: Decimal,
    pub professional_tax: Decimal,
    pub pt_threshold: Decimal,
}

impl PayrollRates {
    pub fn from_config(config: &PayrollConfig) -> Result<Self, ServiceError> {
        let exact = |name: &str, value: f64| {
            Decimal::try_from(value)
                .map(|d| d.round_dp(2))
                .map_err(|e| ServiceError::InternalError(format!("payroll.{name} is not representable: {e}")))
        };
        Ok(Self {
            pf_rate: exact("pf_rate", config.pf_rate)?,
            pf_wage_ceiling: exact("pf_wage_ceiling", config.pf_wage_ceiling)?,
            professional_tax: exact("professional_tax", config.professional_tax)?,
            pt_threshold: exact("pt_threshold", config.pt_threshold)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GeneratePaySlipRequest {
    pub employee_id: Uuid,
    pub year: i32,
    pub month: u32,
    #[serde(default)]
    #[schema(value_type = f64)]
    pub tds: Decimal,
    #[serde(default)]
    #[schema(value_type = f64)]
    pub other_deductions: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PaySlipFilter {
    pub employee_id: Option<Uuid>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub status: Option<PaySlipStatus>,
}

/// Computed pay slip figures, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PayFigures {
    pub working_days: i32,
    pub lop_days: Decimal,
    pub paid_days: Decimal,
    pub earned_basic: Decimal,
    pub earned_hra: Decimal,
    pub earned_allowances: Decimal,
    pub gross: Decimal,
    pub pf_deduction: Decimal,
    pub professional_tax: Decimal,
    pub tds: Decimal,
    pub other_deductions: Decimal,
    pub lop_deduction: Decimal,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
}

/// Calendar days in the month, or `None` for an invalid year/month.
pub fn days_in_month(year: i32, month: u32) -> Option<i32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    i32::try_from((next - first).num_days()).ok()
}

pub fn compute_pay(
    employee: &employee::Model,
    working_days: i32,
    lop_days: Decimal,
    tds: Decimal,
    other_deductions: Decimal,
    rates: &PayrollRates,
) -> Result<PayFigures, ServiceError> {
    if tds.is_sign_negative() {
        return Err(ServiceError::invalid_field("tds", "must not be negative"));
    }
    if other_deductions.is_sign_negative() {
        return Err(ServiceError::invalid_field("other_deductions", "must not be negative"));
    }
    bounded_amount(Some(tds), "tds")?;
    bounded_amount(Some(other_deductions), "other_deductions")?;

    let working = Decimal::from(working_days);
    let lop_days = lop_days.clamp(Decimal::ZERO, working);
    let paid_days = working - lop_days;
    let prorate = |amount: Decimal, field: &str| {
        bounded_amount(
            amount.checked_mul(paid_days).and_then(|v| v.checked_div(working)),
            field,
        )
        .map(|v| v.round_dp(2))
    };

    let earned_basic = prorate(employee.basic_salary, "basic_salary")?;
    let earned_hra = prorate(employee.hra, "hra")?;
    let earned_allowances = prorate(employee.allowances, "allowances")?;
    let monthly = bounded_amount(
        employee
            .basic_salary
            .checked_add(employee.hra)
            .and_then(|v| v.checked_add(employee.allowances)),
        "basic_salary",
    )?;
    let gross = earned_basic + earned_hra + earned_allowances;
    let lop_deduction = monthly - gross;

    let pf_deduction = if employee.pf_applicable {
        (earned_basic.min(rates.pf_wage_ceiling) * rates.pf_rate / Decimal::ONE_HUNDRED).round_dp(2)
    } else {
        Decimal::ZERO
    };
    let professional_tax = if gross >= rates.pt_threshold {
        rates.professional_tax
    } else {
        Decimal::ZERO
    };

    let total_deductions = pf_deduction + professional_tax + tds + other_deductions;
    let net_pay = gross - total_deductions;
    if net_pay.is_sign_negative() && !net_pay.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "deductions of {} exceed gross pay of {}",
            total_deductions.round_dp(2),
            gross.round_dp(2)
        )));
    }

    Ok(PayFigures {
        working_days,
        lop_days,
        paid_days,
        earned_basic,
        earned_hra,
        earned_allowances,
        gross,
        pf_deduction,
        professional_tax,
        tds,
        other_deductions,
        lop_deduction,
        total_deductions,
        net_pay,
    })
}

async fn load_slip<C>(conn: &C, branch_id: Uuid, slip_id: Uuid) -> Result<pay_slip::Model, ServiceError>
where
    C: ConnectionTrait,
{
    pay_slip::Entity::find_by_id(slip_id)
        .filter(pay_slip::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Pay slip", slip_id))
}

#[derive(Clone)]
pub struct PayrollService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    rates: PayrollRates,
}

impl PayrollService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, rates: PayrollRates) -> Self {
        Self {
            db_pool,
            event_sender,
            rates,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_slips(
        &self,
        branch_id: Uuid,
        filter: PaySlipFilter,
        page: PageRequest,
    ) -> Result<(Vec<pay_slip::Model>, u64), ServiceError> {
        let mut select = pay_slip::Entity::find()
            .filter(pay_slip::Column::BranchId.eq(branch_id))
            .order_by_desc(pay_slip::Column::PeriodYear)
            .order_by_desc(pay_slip::Column::PeriodMonth)
            .order_by_asc(pay_slip::Column::CreatedAt);
        if let Some(employee_id) = filter.employee_id {
            select = select.filter(pay_slip::Column::EmployeeId.eq(employee_id));
        }
        if let Some(year) = filter.year {
            select = select.filter(pay_slip::Column::PeriodYear.eq(year));
        }
        if let Some(month) = filter.month {
            select = select.filter(pay_slip::Column::PeriodMonth.eq(month as i32));
        }
        if let Some(status) = filter.status {
            select = select.filter(pay_slip::Column::Status.eq(status));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_slip(&self, branch_id: Uuid, slip_id: Uuid) -> Result<pay_slip::Model, ServiceError> {
        load_slip(&*self.db_pool, branch_id, slip_id).await
    }

    #[instrument(skip(self, request), fields(employee_id = %request.employee_id, year = request.year, month = request.month))]
    pub async fn generate(
        &self,
        branch_id: Uuid,
        generated_by: Uuid,
        request: GeneratePaySlipRequest,
    ) -> Result<pay_slip::Model, ServiceError> {
        let working_days = days_in_month(request.year, request.month)
            .ok_or_else(|| ServiceError::invalid_field("month", "month must be between 1 and 12"))?;
        let db = &*self.db_pool;
        let employee = load_employee(db, branch_id, request.employee_id).await?;
        if employee.status == EmployeeStatus::Terminated {
            return Err(ServiceError::InvalidStatus(format!(
                "employee {} is terminated",
                employee.employee_code
            )));
        }

        let period_month = request.month as i32;
        let existing = pay_slip::Entity::find()
            .filter(pay_slip::Column::EmployeeId.eq(employee.id))
            .filter(pay_slip::Column::PeriodYear.eq(request.year))
            .filter(pay_slip::Column::PeriodMonth.eq(period_month))
            .count(db)
            .await?;
        if existing > 0 {
            return Err(ServiceError::Conflict(format!(
                "a pay slip for {}-{:02} already exists",
                request.year, request.month
            )));
        }

        let first = NaiveDate::from_ymd_opt(request.year, request.month, 1)
            .ok_or_else(|| ServiceError::invalid_field("month", "invalid period"))?;
        let last = first + chrono::Duration::days(i64::from(working_days) - 1);
        let lop_days = LeaveService::unpaid_days(db, employee.id, first, last).await?;
        let figures = compute_pay(
            &employee,
            working_days,
            lop_days,
            request.tds,
            request.other_deductions,
            &self.rates,
        )?;

        let created = pay_slip::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch_id: Set(branch_id),
            employee_id: Set(employee.id),
            period_year: Set(first.year()),
            period_month: Set(period_month),
            working_days: Set(figures.working_days),
            lop_days: Set(figures.lop_days),
            paid_days: Set(figures.paid_days),
            earned_basic: Set(figures.earned_basic),
            earned_hra: Set(figures.earned_hra),
            earned_allowances: Set(figures.earned_allowances),
            gross: Set(figures.gross),
            pf_deduction: Set(figures.pf_deduction),
            professional_tax: Set(figures.professional_tax),
            tds: Set(figures.tds),
            other_deductions: Set(figures.other_deductions),
            lop_deduction: Set(figures.lop_deduction),
            total_deductions: Set(figures.total_deductions),
            net_pay: Set(figures.net_pay),
            status: Set(PaySlipStatus::Draft),
            generated_by: Set(generated_by),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;

        info!(slip_id = %created.id, net_pay = %created.net_pay, "pay slip generated");
        self.event_sender
            .send_or_log(Event::created(branch_id, "pay_slips", created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn issue(&self, branch_id: Uuid, slip_id: Uuid) -> Result<pay_slip::Model, ServiceError> {
        self.advance(branch_id, slip_id, PaySlipStatus::Draft, PaySlipStatus::Issued)
            .await
    }

    #[instrument(skip(self))]
    pub async fn mark_paid(&self, branch_id: Uuid, slip_id: Uuid) -> Result<pay_slip::Model, ServiceError> {
        self.advance(branch_id, slip_id, PaySlipStatus::Issued, PaySlipStatus::Paid)
            .await
    }

    async fn advance(
        &self,
        branch_id: Uuid,
        slip_id: Uuid,
        from: PaySlipStatus,
        to: PaySlipStatus,
    ) -> Result<pay_slip::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_slip(db, branch_id, slip_id).await?;
        if existing.status != from {
            return Err(ServiceError::InvalidStatus(format!(
                "pay slip is {}, expected {}",
                existing.status, from
            )));
        }
        let mut active = existing.into_active_model();
        active.status = Set(to);
        let updated = active.update(db).await?;
        info!(%slip_id, status = %to, "pay slip status changed");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "pay_slips", slip_id))
            .await;
        Ok(updated)
    }
}
