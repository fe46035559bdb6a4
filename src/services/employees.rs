use crate::{
    db::DbPool,
    entities::{
        employee::{self, EmployeeStatus},
        profile::{self, Role},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        fetch_page,
        functions::{EmployeeAction, FunctionsClient},
        optional_text,
        pricing::MAX_AMOUNT,
        profiles::ProfileService,
        search_condition, PageRequest,
    },
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_salary(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("negative_amount"));
    }
    if *value > MAX_AMOUNT {
        return Err(ValidationError::new("amount_too_large"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateEmployeeRequest {
    #[validate(length(min = 1, max = 30))]
    pub employee_code: String,
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    pub designation: Option<String>,
    pub department: Option<String>,
    pub date_of_joining: NaiveDate,
    #[validate(custom = "validate_salary")]
    #[schema(value_type = f64)]
    pub basic_salary: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_salary")]
    #[schema(value_type = f64)]
    pub hra: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_salary")]
    #[schema(value_type = f64)]
    pub allowances: Decimal,
    #[serde(default = "default_true")]
    pub pf_applicable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateEmployeeRequest {
    #[validate(length(min = 1, max = 30))]
    pub employee_code: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub designation: Option<String>,
    pub department: Option<String>,
    pub status: Option<EmployeeStatus>,
    #[validate(custom = "validate_salary")]
    #[schema(value_type = Option<f64>)]
    pub basic_salary: Option<Decimal>,
    #[validate(custom = "validate_salary")]
    #[schema(value_type = Option<f64>)]
    pub hra: Option<Decimal>,
    #[validate(custom = "validate_salary")]
    #[schema(value_type = Option<f64>)]
    pub allowances: Option<Decimal>,
    pub pf_applicable: Option<bool>,
    /// Login role; only applies to provisioned employees
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct EmployeeFilter {
    pub status: Option<EmployeeStatus>,
    pub department: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProvisionAccessRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccessGranted {
    pub employee: employee::Model,
    pub profile: profile::Model,
}

pub async fn load_employee<C>(conn: &C, branch_id: Uuid, employee_id: Uuid) -> Result<employee::Model, ServiceError>
where
    C: ConnectionTrait,
{
    employee::Entity::find_by_id(employee_id)
        .filter(employee::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Employee", employee_id))
}

async fn ensure_code_free<C>(conn: &C, branch_id: Uuid, code: &str, except: Option<Uuid>) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let mut query = employee::Entity::find()
        .filter(employee::Column::BranchId.eq(branch_id))
        .filter(employee::Column::EmployeeCode.eq(code));
    if let Some(id) = except {
        query = query.filter(employee::Column::Id.ne(id));
    }
    if query.count(conn).await? > 0 {
        return Err(ServiceError::Conflict(format!("employee code {code} is already in use")));
    }
    Ok(())
}

/// Employee records and their optional logins
#[derive(Clone)]
pub struct EmployeeService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    functions: FunctionsClient,
    profiles: ProfileService,
}

impl EmployeeService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        functions: FunctionsClient,
        profiles: ProfileService,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            functions,
            profiles,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_employees(
        &self,
        branch_id: Uuid,
        filter: EmployeeFilter,
        page: PageRequest,
    ) -> Result<(Vec<employee::Model>, u64), ServiceError> {
        let mut select = employee::Entity::find()
            .filter(employee::Column::BranchId.eq(branch_id))
            .order_by_asc(employee::Column::EmployeeCode);
        if let Some(status) = filter.status {
            select = select.filter(employee::Column::Status.eq(status));
        }
        if let Some(department) = filter.department.as_deref().filter(|d| !d.trim().is_empty()) {
            select = select.filter(employee::Column::Department.eq(department.trim()));
        }
        if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(search_condition(
                &[
                    employee::Column::FullName,
                    employee::Column::EmployeeCode,
                    employee::Column::Email,
                ],
                term,
            ));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_employee(&self, branch_id: Uuid, employee_id: Uuid) -> Result<employee::Model, ServiceError> {
        load_employee(&*self.db_pool, branch_id, employee_id).await
    }

    #[instrument(skip(self, request), fields(code = %request.employee_code))]
    pub async fn create_employee(
        &self,
        branch_id: Uuid,
        request: CreateEmployeeRequest,
    ) -> Result<employee::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let code = request.employee_code.trim().to_uppercase();
        ensure_code_free(db, branch_id, &code, None).await?;

        let now = Utc::now();
        let created = employee::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch_id: Set(branch_id),
            profile_id: Set(None),
            employee_code: Set(code),
            full_name: Set(request.full_name.trim().to_string()),
            email: Set(request.email.trim().to_lowercase()),
            phone: Set(optional_text(request.phone)),
            designation: Set(optional_text(request.designation)),
            department: Set(optional_text(request.department)),
            date_of_joining: Set(request.date_of_joining),
            status: Set(EmployeeStatus::Active),
            basic_salary: Set(request.basic_salary),
            hra: Set(request.hra),
            allowances: Set(request.allowances),
            pf_applicable: Set(request.pf_applicable),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(employee_id = %created.id, "employee created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "employees", created.id))
            .await;
        Ok(created)
    }

    /// Updates the record. Name, email or role changes are pushed to the
    /// login of a provisioned employee; termination withdraws that login.
    #[instrument(skip(self, request))]
    pub async fn update_employee(
        &self,
        branch_id: Uuid,
        employee_id: Uuid,
        request: UpdateEmployeeRequest,
    ) -> Result<employee::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = load_employee(db, branch_id, employee_id).await?;

        if let Some(code) = request.employee_code.as_deref() {
            ensure_code_free(db, branch_id, &code.trim().to_uppercase(), Some(employee_id)).await?;
        }

        let full_name = request.full_name.as_deref().map(|n| n.trim().to_string());
        let email = request.email.as_deref().map(|e| e.trim().to_lowercase());
        let terminating =
            request.status == Some(EmployeeStatus::Terminated) && existing.status != EmployeeStatus::Terminated;

        if let Some(user_id) = existing.profile_id {
            if terminating {
                self.withdraw_login(user_id).await?;
            } else if full_name.is_some() || email.is_some() || request.role.is_some() {
                self.functions
                    .employee_management(&EmployeeAction::Update {
                        user_id,
                        email: email.clone(),
                        full_name: full_name.clone(),
                        role: request.role,
                    })
                    .await?;
                self.sync_profile(user_id, full_name.clone(), email.clone(), request.role)
                    .await?;
            }
        }

        let mut active = existing.into_active_model();
        if let Some(code) = request.employee_code {
            active.employee_code = Set(code.trim().to_uppercase());
        }
        if let Some(name) = full_name {
            active.full_name = Set(name);
        }
        if let Some(email) = email {
            active.email = Set(email);
        }
        if request.phone.is_some() {
            active.phone = Set(optional_text(request.phone));
        }
        if request.designation.is_some() {
            active.designation = Set(optional_text(request.designation));
        }
        if request.department.is_some() {
            active.department = Set(optional_text(request.department));
        }
        if let Some(status) = request.status {
            active.status = Set(status);
        }
        if let Some(basic) = request.basic_salary {
            active.basic_salary = Set(basic);
        }
        if let Some(hra) = request.hra {
            active.hra = Set(hra);
        }
        if let Some(allowances) = request.allowances {
            active.allowances = Set(allowances);
        }
        if let Some(pf) = request.pf_applicable {
            active.pf_applicable = Set(pf);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        if terminating {
            info!(%employee_id, "employee terminated");
        }
        self.event_sender
            .send_or_log(Event::updated(branch_id, "employees", employee_id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_employee(&self, branch_id: Uuid, employee_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = load_employee(db, branch_id, employee_id).await?;
        if let Some(user_id) = existing.profile_id {
            self.withdraw_login(user_id).await?;
        }
        existing.delete(db).await?;
        self.event_sender
            .send_or_log(Event::deleted(branch_id, "employees", employee_id))
            .await;
        Ok(())
    }

    /// Creates a login through `employee-management` and links it.
    #[instrument(skip(self, request), fields(role = %request.role))]
    pub async fn provision_access(
        &self,
        branch_id: Uuid,
        employee_id: Uuid,
        request: ProvisionAccessRequest,
    ) -> Result<AccessGranted, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_employee(db, branch_id, employee_id).await?;
        if existing.profile_id.is_some() {
            return Err(ServiceError::Conflict(format!(
                "employee {} already has a login",
                existing.employee_code
            )));
        }
        if existing.status == EmployeeStatus::Terminated {
            return Err(ServiceError::InvalidStatus(
                "terminated employees cannot be given a login".into(),
            ));
        }

        let response = self
            .functions
            .employee_management(&EmployeeAction::ProvisionUser {
                email: existing.email.clone(),
                full_name: existing.full_name.clone(),
                role: request.role,
                branch_id,
            })
            .await?;
        let user_id = response.user_id.ok_or_else(|| {
            ServiceError::ExternalServiceError("employee-management returned no user_id".into())
        })?;

        let now = Utc::now();
        let profile = match profile::Entity::find_by_id(user_id).one(db).await? {
            Some(found) => found,
            None => {
                profile::ActiveModel {
                    id: Set(user_id),
                    branch_id: Set(branch_id),
                    full_name: Set(existing.full_name.clone()),
                    email: Set(existing.email.clone()),
                    phone: Set(existing.phone.clone()),
                    role: Set(request.role),
                    is_active: Set(true),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(db)
                .await?
            }
        };

        let mut active = existing.into_active_model();
        active.profile_id = Set(Some(user_id));
        active.updated_at = Set(now);
        let employee = active.update(db).await?;

        info!(%employee_id, %user_id, "employee login provisioned");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "employees", employee_id))
            .await;
        Ok(AccessGranted { employee, profile })
    }

    #[instrument(skip(self))]
    pub async fn reset_password(&self, branch_id: Uuid, employee_id: Uuid) -> Result<(), ServiceError> {
        let existing = load_employee(&*self.db_pool, branch_id, employee_id).await?;
        let user_id = Self::login_of(&existing)?;
        self.functions
            .employee_management(&EmployeeAction::ResetPassword { user_id })
            .await?;
        info!(%employee_id, "password reset requested");
        Ok(())
    }

    /// Withdraws the employee's login; the employee record stays.
    #[instrument(skip(self))]
    pub async fn deactivate_access(&self, branch_id: Uuid, employee_id: Uuid) -> Result<(), ServiceError> {
        let existing = load_employee(&*self.db_pool, branch_id, employee_id).await?;
        let user_id = Self::login_of(&existing)?;
        self.withdraw_login(user_id).await?;
        self.event_sender
            .send_or_log(Event::updated(branch_id, "employees", employee_id))
            .await;
        Ok(())
    }

    fn login_of(employee: &employee::Model) -> Result<Uuid, ServiceError> {
        employee.profile_id.ok_or_else(|| {
            ServiceError::InvalidOperation(format!("employee {} has no login", employee.employee_code))
        })
    }

    async fn withdraw_login(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.functions
            .employee_management(&EmployeeAction::Deactivate { user_id })
            .await?;
        self.profiles.deactivate(user_id).await
    }

    async fn sync_profile(
        &self,
        user_id: Uuid,
        full_name: Option<String>,
        email: Option<String>,
        role: Option<Role>,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let Some(existing) = profile::Entity::find_by_id(user_id).one(db).await? else {
            warn!(%user_id, "provisioned login has no profile row");
            return Ok(());
        };
        let mut active = existing.into_active_model();
        if let Some(name) = full_name {
            active.full_name = Set(name);
        }
        if let Some(email) = email {
            active.email = Set(email);
        }
        if let Some(role) = role {
            active.role = Set(role);
        }
        active.updated_at = Set(Utc::now());
        active.update(db).await?;
        Ok(())
    }
}
