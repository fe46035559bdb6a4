use crate::{
    db::DbPool,
    entities::{
        employee::EmployeeStatus,
        leave_request::{self, LeaveStatus, LeaveType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{employees::load_employee, fetch_page, optional_text, PageRequest},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ApplyLeaveRequest {
    pub employee_id: Uuid,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub half_day: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReviewLeaveRequest {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LeaveFilter {
    pub employee_id: Option<Uuid>,
    pub status: Option<LeaveStatus>,
    pub leave_type: Option<LeaveType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Days counted for a request: inclusive calendar days, or 0.5 for a half day.
pub fn leave_days(start: NaiveDate, end: NaiveDate, half_day: bool) -> Result<Decimal, ServiceError> {
    if end < start {
        return Err(ServiceError::invalid_field("end_date", "end date cannot precede start date"));
    }
    if half_day {
        if start != end {
            return Err(ServiceError::invalid_field(
                "half_day",
                "half-day leave must start and end on the same day",
            ));
        }
        return Ok(dec!(0.5));
    }
    Ok(Decimal::from((end - start).num_days() + 1))
}

/// Days of `leave` falling inside `[from, to]`, with half days counted as 0.5.
pub fn days_within(leave: &leave_request::Model, from: NaiveDate, to: NaiveDate) -> Decimal {
    let start = leave.start_date.max(from);
    let end = leave.end_date.min(to);
    if end < start {
        return Decimal::ZERO;
    }
    if leave.half_day {
        return dec!(0.5);
    }
    Decimal::from((end - start).num_days() + 1)
}

async fn load_request<C>(conn: &C, branch_id: Uuid, request_id: Uuid) -> Result<leave_request::Model, ServiceError>
where
    C: ConnectionTrait,
{
    leave_request::Entity::find_by_id(request_id)
        .filter(leave_request::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Leave request", request_id))
}

#[derive(Clone)]
pub struct LeaveService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl LeaveService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_requests(
        &self,
        branch_id: Uuid,
        filter: LeaveFilter,
        page: PageRequest,
    ) -> Result<(Vec<leave_request::Model>, u64), ServiceError> {
        let mut select = leave_request::Entity::find()
            .filter(leave_request::Column::BranchId.eq(branch_id))
            .order_by_desc(leave_request::Column::StartDate)
            .order_by_desc(leave_request::Column::CreatedAt);
        if let Some(employee_id) = filter.employee_id {
            select = select.filter(leave_request::Column::EmployeeId.eq(employee_id));
        }
        if let Some(status) = filter.status {
            select = select.filter(leave_request::Column::Status.eq(status));
        }
        if let Some(leave_type) = filter.leave_type {
            select = select.filter(leave_request::Column::LeaveType.eq(leave_type));
        }
        if let Some(from) = filter.from {
            select = select.filter(leave_request::Column::EndDate.gte(from));
        }
        if let Some(to) = filter.to {
            select = select.filter(leave_request::Column::StartDate.lte(to));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_request(&self, branch_id: Uuid, request_id: Uuid) -> Result<leave_request::Model, ServiceError> {
        load_request(&*self.db_pool, branch_id, request_id).await
    }

    #[instrument(skip(self, request), fields(employee_id = %request.employee_id))]
    pub async fn apply(&self, branch_id: Uuid, request: ApplyLeaveRequest) -> Result<leave_request::Model, ServiceError> {
        let days = leave_days(request.start_date, request.end_date, request.half_day)?;
        let db = &*self.db_pool;
        let employee = load_employee(db, branch_id, request.employee_id).await?;
        if employee.status == EmployeeStatus::Terminated {
            return Err(ServiceError::InvalidStatus("terminated employees cannot apply for leave".into()));
        }

        let overlapping = leave_request::Entity::find()
            .filter(leave_request::Column::EmployeeId.eq(employee.id))
            .filter(leave_request::Column::Status.is_in([LeaveStatus::Pending, LeaveStatus::Approved]))
            .filter(leave_request::Column::StartDate.lte(request.end_date))
            .filter(leave_request::Column::EndDate.gte(request.start_date))
            .count(db)
            .await?;
        if overlapping > 0 {
            return Err(ServiceError::Conflict(
                "leave overlaps an existing pending or approved request".into(),
            ));
        }

        let created = leave_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch_id: Set(branch_id),
            employee_id: Set(employee.id),
            leave_type: Set(request.leave_type),
            start_date: Set(request.start_date),
            end_date: Set(request.end_date),
            half_day: Set(request.half_day),
            days: Set(days),
            reason: Set(optional_text(request.reason)),
            status: Set(LeaveStatus::Pending),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            review_note: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;

        info!(leave_id = %created.id, %days, "leave applied");
        self.event_sender
            .send_or_log(Event::created(branch_id, "leave_requests", created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, review))]
    pub async fn approve(
        &self,
        branch_id: Uuid,
        request_id: Uuid,
        reviewer: Uuid,
        review: ReviewLeaveRequest,
    ) -> Result<leave_request::Model, ServiceError> {
        self.review(branch_id, request_id, reviewer, review, LeaveStatus::Approved)
            .await
    }

    #[instrument(skip(self, review))]
    pub async fn reject(
        &self,
        branch_id: Uuid,
        request_id: Uuid,
        reviewer: Uuid,
        review: ReviewLeaveRequest,
    ) -> Result<leave_request::Model, ServiceError> {
        self.review(branch_id, request_id, reviewer, review, LeaveStatus::Rejected)
            .await
    }

    async fn review(
        &self,
        branch_id: Uuid,
        request_id: Uuid,
        reviewer: Uuid,
        review: ReviewLeaveRequest,
        outcome: LeaveStatus,
    ) -> Result<leave_request::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_request(db, branch_id, request_id).await?;
        if existing.status != LeaveStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "only pending requests can be reviewed; this one is {}",
                existing.status
            )));
        }
        let mut active = existing.into_active_model();
        active.status = Set(outcome);
        active.reviewed_by = Set(Some(reviewer));
        active.reviewed_at = Set(Some(Utc::now()));
        active.review_note = Set(optional_text(review.note));
        let reviewed = active.update(db).await?;

        info!(leave_id = %request_id, status = %outcome, "leave reviewed");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "leave_requests", request_id))
            .await;
        Ok(reviewed)
    }

    /// Pending requests, or approved ones that have not started by `today`.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        branch_id: Uuid,
        request_id: Uuid,
        today: NaiveDate,
    ) -> Result<leave_request::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_request(db, branch_id, request_id).await?;
        let cancellable = match existing.status {
            LeaveStatus::Pending => true,
            LeaveStatus::Approved => existing.start_date > today,
            LeaveStatus::Rejected | LeaveStatus::Cancelled => false,
        };
        if !cancellable {
            return Err(ServiceError::InvalidStatus(
                "only pending or future approved leave can be cancelled".into(),
            ));
        }
        let mut active = existing.into_active_model();
        active.status = Set(LeaveStatus::Cancelled);
        let cancelled = active.update(db).await?;
        self.event_sender
            .send_or_log(Event::updated(branch_id, "leave_requests", request_id))
            .await;
        Ok(cancelled)
    }

    /// Approved unpaid days inside `[from, to]`, used for loss of pay.
    pub async fn unpaid_days<C>(
        conn: &C,
        employee_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Decimal, ServiceError>
    where
        C: ConnectionTrait,
    {
        let requests = leave_request::Entity::find()
            .filter(leave_request::Column::EmployeeId.eq(employee_id))
            .filter(leave_request::Column::LeaveType.eq(LeaveType::Unpaid))
            .filter(leave_request::Column::Status.eq(LeaveStatus::Approved))
            .filter(leave_request::Column::StartDate.lte(to))
            .filter(leave_request::Column::EndDate.gte(from))
            .all(conn)
            .await?;
        Ok(requests.iter().map(|r| days_within(r, from, to)).sum())
    }
}
