//! Durable scheduler that polls marketplace lead sources per branch.
//!
//! Each (branch, source) pair has a `sync_status` row holding its schedule.
//! A run is guarded by an in-process lock and by the persisted
//! `running_since` marker; markers left behind by a crash are cleared at
//! start-up. Successful runs are rescheduled after `max(interval, cooldown)`,
//! failures back off exponentially from the source cooldown with jitter.

pub mod sources;

pub use sources::{ExternalLead, FunctionLeadSource, LeadSourceClient, SyncResponse};

use crate::{
    config::LeadSyncConfig,
    db::DbPool,
    entities::{
        lead::{self, LeadPriority, LeadStatus},
        lead_source::LeadSourceKind,
        sync_setting, sync_status,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::lead_assignment::{auto_assign, LeadFacts},
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use metrics::counter;
use rand::Rng;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// `cooldown · 2^(failures-1)`, capped at `max_backoff`. Zero failures means no backoff.
pub fn failure_delay_secs(cooldown_secs: u64, failures: u32, max_backoff_secs: u64) -> u64 {
    if failures == 0 {
        return 0;
    }
    let factor = 1u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
    cooldown_secs.saturating_mul(factor).min(max_backoff_secs)
}

/// Adds up to `ratio · delay` seconds of random jitter.
pub fn with_jitter<R: Rng>(delay_secs: u64, ratio: f64, rng: &mut R) -> u64 {
    let spread = (delay_secs as f64 * ratio.clamp(0.0, 1.0)).floor() as u64;
    if spread == 0 {
        delay_secs
    } else {
        delay_secs + rng.gen_range(0..=spread)
    }
}

pub fn success_delay_secs(interval_minutes: i32, cooldown_secs: u64) -> u64 {
    let interval = u64::try_from(interval_minutes.max(0)).unwrap_or(0) * 60;
    interval.max(cooldown_secs)
}

/// Pushes `candidate` past any other source's slot closer than `stagger`.
pub fn apply_stagger(
    mut candidate: DateTime<Utc>,
    others: &[DateTime<Utc>],
    stagger: Duration,
) -> DateTime<Utc> {
    if stagger <= Duration::zero() {
        return candidate;
    }
    let mut sorted = others.to_vec();
    sorted.sort();
    for other in sorted {
        if (candidate - other).abs() < stagger {
            candidate = other + stagger;
        }
    }
    candidate
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSyncSettingsRequest {
    pub auto_sync_enabled: Option<bool>,
    #[validate(range(min = 1, max = 30))]
    pub interval_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncOverview {
    pub settings: sync_setting::Model,
    pub sources: Vec<sync_status::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncRunOutcome {
    pub source: LeadSourceKind,
    pub success: bool,
    pub new_count: u32,
    pub updated_count: u32,
    pub error: Option<String>,
    pub status: sync_status::Model,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub inserted: u32,
    pub updated: u32,
}

/// Idempotent upsert keyed by `(branch_id, source_kind, external_id)`.
/// Existing leads get their contact details refreshed and keep status and
/// assignee; new leads start as `new` and go through the assignment rules.
pub async fn import_leads<C>(
    conn: &C,
    branch_id: Uuid,
    source_kind: LeadSourceKind,
    leads: &[ExternalLead],
) -> Result<ImportCounts, ServiceError>
where
    C: ConnectionTrait,
{
    let mut counts = ImportCounts::default();
    let now = Utc::now();

    for incoming in leads {
        let external_id = incoming.external_id.trim();
        if external_id.is_empty() || incoming.name.trim().is_empty() {
            warn!(%branch_id, %source_kind, "skipping external lead without id or name");
            continue;
        }

        let existing = lead::Entity::find()
            .filter(lead::Column::BranchId.eq(branch_id))
            .filter(lead::Column::SourceKind.eq(source_kind))
            .filter(lead::Column::ExternalId.eq(external_id))
            .one(conn)
            .await?;

        if let Some(existing) = existing {
            let mut active = existing.into_active_model();
            active.name = Set(incoming.name.trim().to_string());
            if incoming.company.is_some() {
                active.company = Set(incoming.company.clone());
            }
            if incoming.email.is_some() {
                active.email = Set(incoming.email.clone());
            }
            if incoming.phone.is_some() {
                active.phone = Set(incoming.phone.clone());
            }
            if incoming.requirement.is_some() {
                active.requirement = Set(incoming.requirement.clone());
            }
            if incoming.city.is_some() {
                active.city = Set(incoming.city.clone());
            }
            if incoming.state.is_some() {
                active.state = Set(incoming.state.clone());
            }
            active.updated_at = Set(now);
            active.update(conn).await?;
            counts.updated += 1;
            continue;
        }

        let facts = LeadFacts {
            source_kind,
            name: &incoming.name,
            company: incoming.company.as_deref(),
            requirement: incoming.requirement.as_deref(),
        };
        let assigned_to = auto_assign(conn, branch_id, &facts).await?;

        let row = lead::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch_id: Set(branch_id),
            source_kind: Set(source_kind),
            source_id: Set(None),
            external_id: Set(Some(external_id.to_string())),
            name: Set(incoming.name.trim().to_string()),
            company: Set(incoming.company.clone()),
            email: Set(incoming.email.clone()),
            phone: Set(incoming.phone.clone()),
            requirement: Set(incoming.requirement.clone()),
            city: Set(incoming.city.clone()),
            state: Set(incoming.state.clone()),
            status: Set(LeadStatus::New),
            priority: Set(LeadPriority::Medium),
            assigned_to: Set(assigned_to),
            customer_id: Set(None),
            estimated_value: Set(None),
            follow_up_date: Set(None),
            notes: Set(None),
            received_at: Set(incoming.received_at.unwrap_or(now)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = lead::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    lead::Column::BranchId,
                    lead::Column::SourceKind,
                    lead::Column::ExternalId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        if inserted > 0 {
            counts.inserted += 1;
        } else {
            counts.updated += 1;
        }
    }

    Ok(counts)
}

/// Returns the status row for `(branch, source)`, creating it if needed.
pub async fn ensure_status<C>(
    conn: &C,
    branch_id: Uuid,
    source_kind: LeadSourceKind,
) -> Result<sync_status::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    sync_status::Entity::insert(sync_status::ActiveModel {
        id: Set(Uuid::new_v4()),
        branch_id: Set(branch_id),
        source_kind: Set(source_kind),
        last_run_at: Set(None),
        last_success_at: Set(None),
        last_error: Set(None),
        consecutive_failures: Set(0),
        next_run_at: Set(None),
        last_new_count: Set(0),
        total_imported: Set(0),
        running_since: Set(None),
        updated_at: Set(now),
    })
    .on_conflict(
        OnConflict::columns([sync_status::Column::BranchId, sync_status::Column::SourceKind])
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;

    sync_status::Entity::find()
        .filter(sync_status::Column::BranchId.eq(branch_id))
        .filter(sync_status::Column::SourceKind.eq(source_kind))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::InternalError(format!("sync status for {source_kind} missing")))
}

type LockKey = (Uuid, LeadSourceKind);

pub struct LeadSyncService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    config: LeadSyncConfig,
    sources: Vec<Arc<dyn LeadSourceClient>>,
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl LeadSyncService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: LeadSyncConfig,
        sources: Vec<Arc<dyn LeadSourceClient>>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            config,
            sources,
            locks: DashMap::new(),
        }
    }

    pub fn cooldown_secs(&self, kind: LeadSourceKind) -> u64 {
        match kind {
            LeadSourceKind::Indiamart => self.config.indiamart_cooldown_secs,
            LeadSourceKind::Tradeindia => self.config.tradeindia_cooldown_secs,
            _ => 0,
        }
    }

    /// A persisted marker older than this belongs to a run that no longer exists.
    fn stale_after(&self) -> Duration {
        let secs = self.config.request_timeout_secs * 2 + self.config.tick_secs;
        Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
    }

    fn source(&self, kind: LeadSourceKind) -> Result<Arc<dyn LeadSourceClient>, ServiceError> {
        self.sources
            .iter()
            .find(|s| s.kind() == kind)
            .cloned()
            .ok_or_else(|| ServiceError::BadRequest(format!("{kind} is not a syncable lead source")))
    }

    fn try_lock(&self, branch_id: Uuid, kind: LeadSourceKind) -> Option<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .entry((branch_id, kind))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.try_lock_owned().ok()
    }

    /// Clears `running_since` on every status row. Called once at start-up.
    #[instrument(skip(self))]
    pub async fn clear_stale_markers(&self) -> Result<u64, ServiceError> {
        let result = sync_status::Entity::update_many()
            .col_expr(sync_status::Column::RunningSince, Expr::value(Option::<DateTime<Utc>>::None))
            .filter(sync_status::Column::RunningSince.is_not_null())
            .exec(&*self.db_pool)
            .await?;
        if result.rows_affected > 0 {
            warn!(count = result.rows_affected, "cleared stale sync markers");
        }
        Ok(result.rows_affected)
    }

    #[instrument(skip(self))]
    pub async fn settings(&self, branch_id: Uuid) -> Result<sync_setting::Model, ServiceError> {
        Ok(sync_setting::Entity::find_by_id(branch_id)
            .one(&*self.db_pool)
            .await?
            .unwrap_or_else(|| sync_setting::Model::defaults(branch_id)))
    }

    #[instrument(skip(self, request))]
    pub async fn update_settings(
        &self,
        branch_id: Uuid,
        request: UpdateSyncSettingsRequest,
    ) -> Result<sync_setting::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = sync_setting::Entity::find_by_id(branch_id).one(db).await?;
        let now = Utc::now();

        let saved = match existing {
            Some(existing) => {
                let mut active = existing.into_active_model();
                if let Some(enabled) = request.auto_sync_enabled {
                    active.auto_sync_enabled = Set(enabled);
                }
                if let Some(interval) = request.interval_minutes {
                    active.interval_minutes = Set(interval);
                }
                active.updated_at = Set(now);
                active.update(db).await?
            }
            None => {
                let defaults = sync_setting::Model::defaults(branch_id);
                sync_setting::ActiveModel {
                    branch_id: Set(branch_id),
                    auto_sync_enabled: Set(request.auto_sync_enabled.unwrap_or(defaults.auto_sync_enabled)),
                    interval_minutes: Set(request.interval_minutes.unwrap_or(defaults.interval_minutes)),
                    updated_at: Set(now),
                }
                .insert(db)
                .await?
            }
        };

        info!(
            %branch_id,
            enabled = saved.auto_sync_enabled,
            interval_minutes = saved.interval_minutes,
            "sync settings updated"
        );
        self.event_sender
            .send_or_log(Event::updated(branch_id, "sync_settings", branch_id))
            .await;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn overview(&self, branch_id: Uuid) -> Result<SyncOverview, ServiceError> {
        let settings = self.settings(branch_id).await?;
        let mut sources = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            sources.push(ensure_status(&*self.db_pool, branch_id, source.kind()).await?);
        }
        Ok(SyncOverview { settings, sources })
    }

    /// Runs a source now, ignoring cooldown and backoff.
    #[instrument(skip(self))]
    pub async fn force_sync(&self, branch_id: Uuid, kind: LeadSourceKind) -> Result<SyncRunOutcome, ServiceError> {
        let source = self.source(kind)?;
        let guard = self
            .try_lock(branch_id, kind)
            .ok_or_else(|| ServiceError::Conflict(format!("{kind} sync is already running")))?;

        let status = ensure_status(&*self.db_pool, branch_id, kind).await?;
        if let Some(since) = status.running_since {
            if Utc::now() - since < self.stale_after() {
                return Err(ServiceError::Conflict(format!("{kind} sync is already running")));
            }
        }

        info!(%branch_id, source = %kind, "forced lead sync");
        self.run_source(branch_id, source, guard).await
    }

    /// One scheduler tick. Due sources of every enabled branch run one after
    /// the other, never concurrently. Returns the number of runs.
    #[instrument(skip(self))]
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let enabled = sync_setting::Entity::find()
            .filter(sync_setting::Column::AutoSyncEnabled.eq(true))
            .all(&*self.db_pool)
            .await?;

        let mut runs = 0;
        for settings in enabled {
            let branch_id = settings.branch_id;
            let mut candidates = Vec::new();
            for source in &self.sources {
                let status = ensure_status(&*self.db_pool, branch_id, source.kind()).await?;
                let due = status.next_run_at.map_or(true, |at| at <= now);
                let stuck = status
                    .running_since
                    .is_some_and(|since| now - since < self.stale_after());
                if due && !stuck {
                    candidates.push((status.next_run_at, source.clone()));
                }
            }
            // Never-run sources first, then the most overdue.
            candidates.sort_by_key(|(next, _)| *next);

            for (_, source) in candidates {
                let Some(guard) = self.try_lock(branch_id, source.kind()) else {
                    debug!(%branch_id, source = %source.kind(), "sync already running, skipping");
                    continue;
                };
                match self.run_source(branch_id, source.clone(), guard).await {
                    Ok(outcome) => debug!(%branch_id, source = %outcome.source, success = outcome.success, "scheduled sync finished"),
                    Err(e) => error!(%branch_id, source = %source.kind(), error = %e, "scheduled sync could not run"),
                }
                runs += 1;
            }
        }
        Ok(runs)
    }

    async fn run_source(
        &self,
        branch_id: Uuid,
        source: Arc<dyn LeadSourceClient>,
        _guard: OwnedMutexGuard<()>,
    ) -> Result<SyncRunOutcome, ServiceError> {
        let db = &*self.db_pool;
        let kind = source.kind();
        // Read everything scheduling needs before the run is marked, so a
        // failed read cannot leave the marker behind.
        let settings = self.settings(branch_id).await?;
        let others = self.other_slots(branch_id, kind).await?;
        let cooldown = self.cooldown_secs(kind);
        let started = Utc::now();

        let status = ensure_status(db, branch_id, kind).await?;
        let mut marking = status.into_active_model();
        marking.running_since = Set(Some(started));
        marking.last_run_at = Set(Some(started));
        marking.updated_at = Set(started);
        let status = marking.update(db).await?;
        self.event_sender
            .send_or_log(Event::SyncStatusChanged {
                branch_id,
                status: status.clone(),
            })
            .await;

        let result = match source.fetch().await {
            Ok(response) => match response.error {
                Some(error) => Err(error),
                None => self
                    .store_leads(branch_id, kind, &response)
                    .await
                    .map_err(|e| e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        let finished = Utc::now();

        let mut active = status.clone().into_active_model();
        active.running_since = Set(None);
        active.updated_at = Set(finished);

        let (success, counts, error) = match result {
            Ok(counts) => {
                let delay = success_delay_secs(settings.interval_minutes, cooldown);
                let next = apply_stagger(
                    finished + secs(delay),
                    &others,
                    secs(self.config.stagger_secs),
                );
                active.last_success_at = Set(Some(finished));
                active.last_error = Set(None);
                active.consecutive_failures = Set(0);
                active.next_run_at = Set(Some(next));
                active.last_new_count = Set(i32::try_from(counts.inserted).unwrap_or(i32::MAX));
                active.total_imported = Set(status.total_imported + i64::from(counts.inserted));
                counter!("lead_sync_runs_total", 1, "source" => kind.to_string(), "outcome" => "success");
                counter!("lead_sync_imported_total", u64::from(counts.inserted), "source" => kind.to_string());
                info!(%branch_id, source = %kind, new = counts.inserted, updated = counts.updated, %next, "lead sync succeeded");
                (true, counts, None)
            }
            Err(message) => {
                let failures = status.consecutive_failures.saturating_add(1);
                let base = failure_delay_secs(
                    cooldown,
                    u32::try_from(failures).unwrap_or(u32::MAX),
                    self.config.max_backoff_secs,
                );
                let delay = with_jitter(base, self.config.jitter_ratio, &mut rand::thread_rng());
                let next = finished + secs(delay);
                active.last_error = Set(Some(message.clone()));
                active.consecutive_failures = Set(failures);
                active.next_run_at = Set(Some(next));
                active.last_new_count = Set(0);
                counter!("lead_sync_runs_total", 1, "source" => kind.to_string(), "outcome" => "failure");
                warn!(%branch_id, source = %kind, failures, error = %message, %next, "lead sync failed");
                (false, ImportCounts::default(), Some(message))
            }
        };

        let status = match active.update(db).await {
            Ok(status) => status,
            Err(e) => {
                error!(%branch_id, source = %kind, error = %e, "failed to record sync result");
                self.release_marker(branch_id, kind).await;
                return Err(e.into());
            }
        };
        self.event_sender
            .send_or_log(Event::SyncStatusChanged {
                branch_id,
                status: status.clone(),
            })
            .await;
        if counts.inserted > 0 || counts.updated > 0 {
            self.event_sender
                .send_or_log(Event::LeadsImported {
                    branch_id,
                    source: kind,
                    new_count: counts.inserted,
                    updated_count: counts.updated,
                })
                .await;
        }

        Ok(SyncRunOutcome {
            source: kind,
            success,
            new_count: counts.inserted,
            updated_count: counts.updated,
            error,
            status,
        })
    }

    /// Upserts the returned leads in one transaction. When the function
    /// imported on its own and returned no rows, its `new` count is reported.
    async fn store_leads(
        &self,
        branch_id: Uuid,
        kind: LeadSourceKind,
        response: &SyncResponse,
    ) -> Result<ImportCounts, ServiceError> {
        if response.leads.is_empty() {
            return Ok(ImportCounts {
                inserted: response.new,
                updated: 0,
            });
        }

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for lead import");
            ServiceError::DatabaseError(e)
        })?;
        let counts = import_leads(&txn, branch_id, kind, &response.leads).await?;
        txn.commit().await.map_err(|e| {
            error!(error = %e, %branch_id, source = %kind, "Failed to commit lead import");
            ServiceError::DatabaseError(e)
        })?;
        Ok(counts)
    }

    async fn release_marker(&self, branch_id: Uuid, kind: LeadSourceKind) {
        let cleared = sync_status::Entity::update_many()
            .col_expr(sync_status::Column::RunningSince, Expr::value(Option::<DateTime<Utc>>::None))
            .filter(sync_status::Column::BranchId.eq(branch_id))
            .filter(sync_status::Column::SourceKind.eq(kind))
            .exec(&*self.db_pool)
            .await;
        if let Err(e) = cleared {
            error!(%branch_id, source = %kind, error = %e, "failed to clear sync marker");
        }
    }

    async fn other_slots(&self, branch_id: Uuid, kind: LeadSourceKind) -> Result<Vec<DateTime<Utc>>, ServiceError> {
        Ok(sync_status::Entity::find()
            .filter(sync_status::Column::BranchId.eq(branch_id))
            .filter(sync_status::Column::SourceKind.ne(kind))
            .order_by_asc(sync_status::Column::NextRunAt)
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .filter_map(|s| s.next_run_at)
            .collect())
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}

/// Drives [`LeadSyncService::run_due`] every `tick_secs`.
pub fn spawn_scheduler(service: Arc<LeadSyncService>, tick: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(tick_secs = tick.as_secs(), "lead sync scheduler started");
        loop {
            interval.tick().await;
            if let Err(e) = service.run_due(Utc::now()).await {
                error!(error = %e, "lead sync tick failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::entities::profile::Role;
    use crate::services::testing::{event_sender, seed_branch, seed_profile};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct FakeSource {
        kind: LeadSourceKind,
        response: SyncResponse,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        /// Statement run against this pool while the fetch is in flight
        during_fetch: Option<(Arc<DbPool>, &'static str)>,
    }

    impl FakeSource {
        fn new(kind: LeadSourceKind, response: SyncResponse) -> Arc<Self> {
            Arc::new(Self {
                kind,
                response,
                calls: AtomicUsize::new(0),
                gate: None,
                during_fetch: None,
            })
        }
    }

    #[async_trait]
    impl LeadSourceClient for FakeSource {
        fn kind(&self) -> LeadSourceKind {
            self.kind
        }

        async fn fetch(&self) -> Result<SyncResponse, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some((db, sql)) = &self.during_fetch {
                db.execute_unprepared(sql).await?;
            }
            Ok(self.response.clone())
        }
    }

    fn external(id: &str, requirement: &str) -> ExternalLead {
        ExternalLead {
            external_id: id.into(),
            name: format!("Buyer {id}"),
            company: None,
            email: None,
            phone: Some("9800000000".into()),
            requirement: Some(requirement.into()),
            city: None,
            state: None,
            received_at: None,
        }
    }

    fn config() -> LeadSyncConfig {
        LeadSyncConfig {
            jitter_ratio: 0.0,
            ..LeadSyncConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(failure_delay_secs(300, 0, 3600), 0);
        assert_eq!(failure_delay_secs(300, 1, 3600), 300);
        assert_eq!(failure_delay_secs(300, 2, 3600), 600);
        assert_eq!(failure_delay_secs(300, 4, 3600), 2400);
        assert_eq!(failure_delay_secs(300, 5, 3600), 3600);
        assert_eq!(failure_delay_secs(300, 200, 3600), 3600);
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let delay = with_jitter(600, 0.2, &mut rng);
            assert!((600..=720).contains(&delay));
        }
        assert_eq!(with_jitter(600, 0.0, &mut rng), 600);
    }

    #[test]
    fn success_waits_for_interval_or_cooldown() {
        assert_eq!(success_delay_secs(1, 300), 300);
        assert_eq!(success_delay_secs(15, 300), 900);
    }

    #[test]
    fn stagger_separates_slots() {
        let base = Utc::now();
        let stagger = Duration::seconds(20);
        assert_eq!(apply_stagger(base, &[base], stagger), base + stagger);
        assert_eq!(
            apply_stagger(base, &[base - Duration::seconds(5)], stagger),
            base + Duration::seconds(15)
        );
        let far = base + Duration::seconds(100);
        assert_eq!(apply_stagger(far, &[base], stagger), far);
    }

    #[tokio::test]
    async fn import_is_idempotent_and_keeps_workflow_fields() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "SYA", "27").await;

        let first = import_leads(
            &*db,
            branch.id,
            LeadSourceKind::Indiamart,
            &[external("IM-1", "cartons"), external("IM-2", "pallets")],
        )
        .await
        .unwrap();
        assert_eq!(first, ImportCounts { inserted: 2, updated: 0 });

        let stored = lead::Entity::find()
            .filter(lead::Column::ExternalId.eq("IM-1"))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        let mut active = stored.into_active_model();
        active.status = Set(LeadStatus::Contacted);
        active.update(&*db).await.unwrap();

        let second = import_leads(
            &*db,
            branch.id,
            LeadSourceKind::Indiamart,
            &[external("IM-1", "500 cartons")],
        )
        .await
        .unwrap();
        assert_eq!(second, ImportCounts { inserted: 0, updated: 1 });

        let refreshed = lead::Entity::find()
            .filter(lead::Column::ExternalId.eq("IM-1"))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.status, LeadStatus::Contacted);
        assert_eq!(refreshed.requirement.as_deref(), Some("500 cartons"));

        // Same external id from another source is a different lead.
        let other = import_leads(&*db, branch.id, LeadSourceKind::Tradeindia, &[external("IM-1", "x")])
            .await
            .unwrap();
        assert_eq!(other.inserted, 1);
    }

    #[tokio::test]
    async fn settings_validate_interval() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "SYB", "27").await;
        let service = LeadSyncService::new(db.clone(), event_sender(), config(), vec![]);

        let defaults = service.settings(branch.id).await.unwrap();
        assert!(!defaults.auto_sync_enabled);
        assert_eq!(defaults.interval_minutes, 5);

        assert_matches!(
            service
                .update_settings(
                    branch.id,
                    UpdateSyncSettingsRequest {
                        auto_sync_enabled: Some(true),
                        interval_minutes: Some(45),
                    },
                )
                .await,
            Err(ServiceError::InvalidField { field, .. }) if field == "interval_minutes"
        );

        let saved = service
            .update_settings(
                branch.id,
                UpdateSyncSettingsRequest {
                    auto_sync_enabled: Some(true),
                    interval_minutes: Some(10),
                },
            )
            .await
            .unwrap();
        assert!(saved.auto_sync_enabled);
        assert_eq!(saved.interval_minutes, 10);
    }

    #[tokio::test]
    async fn successful_run_schedules_and_assigns() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "SYC", "27").await;
        let rep = seed_profile(&db, branch.id, Role::Sales).await;
        crate::services::lead_assignment::LeadAssignmentService::new(db.clone(), event_sender())
            .create_rule(
                branch.id,
                crate::services::lead_assignment::CreateRuleRequest {
                    name: "all".into(),
                    source_kind: None,
                    keyword: None,
                    assignee_ids: vec![rep.id],
                    priority: 1,
                    is_active: true,
                },
            )
            .await
            .unwrap();

        let source = FakeSource::new(
            LeadSourceKind::Indiamart,
            SyncResponse {
                new: 1,
                error: None,
                leads: vec![external("IM-9", "racks")],
            },
        );
        let service = LeadSyncService::new(db.clone(), event_sender(), config(), vec![source.clone()]);

        let before = Utc::now();
        let outcome = service.force_sync(branch.id, LeadSourceKind::Indiamart).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.new_count, 1);
        assert_eq!(outcome.status.consecutive_failures, 0);
        assert!(outcome.status.running_since.is_none());
        assert_eq!(outcome.status.total_imported, 1);
        // interval 5 min == cooldown 300s
        let next = outcome.status.next_run_at.unwrap();
        assert!(next >= before + Duration::seconds(300));

        let lead = lead::Entity::find()
            .filter(lead::Column::ExternalId.eq("IM-9"))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lead.assigned_to, Some(rep.id));
    }

    #[tokio::test]
    async fn failures_back_off() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "SYD", "27").await;
        let source = FakeSource::new(
            LeadSourceKind::Tradeindia,
            SyncResponse {
                new: 0,
                error: Some("invalid api key".into()),
                leads: vec![],
            },
        );
        let service = LeadSyncService::new(db.clone(), event_sender(), config(), vec![source.clone()]);

        let first = service.force_sync(branch.id, LeadSourceKind::Tradeindia).await.unwrap();
        assert!(!first.success);
        assert_eq!(first.error.as_deref(), Some("invalid api key"));
        assert_eq!(first.status.consecutive_failures, 1);

        let second = service.force_sync(branch.id, LeadSourceKind::Tradeindia).await.unwrap();
        assert_eq!(second.status.consecutive_failures, 2);
        let gap = second.status.next_run_at.unwrap() - second.status.last_run_at.unwrap();
        // 600s cooldown doubled, no jitter
        assert!(gap >= Duration::seconds(1200));
        assert!(gap < Duration::seconds(1260));
    }

    #[tokio::test]
    async fn tick_runs_every_due_source_in_turn() {
        let db = Arc::new(memory_pool().await);
        let enabled = seed_branch(&db, "SYE", "27").await;
        // never enabled, so never polled
        seed_branch(&db, "SYF", "27").await;
        let indiamart = FakeSource::new(LeadSourceKind::Indiamart, SyncResponse::default());
        let tradeindia = FakeSource::new(LeadSourceKind::Tradeindia, SyncResponse::default());
        let service = LeadSyncService::new(
            db.clone(),
            event_sender(),
            config(),
            vec![indiamart.clone(), tradeindia.clone()],
        );
        service
            .update_settings(
                enabled.id,
                UpdateSyncSettingsRequest {
                    auto_sync_enabled: Some(true),
                    interval_minutes: Some(1),
                },
            )
            .await
            .unwrap();

        assert_eq!(service.run_due(Utc::now()).await.unwrap(), 2);
        // both ran once; neither is due again yet
        assert_eq!(service.run_due(Utc::now()).await.unwrap(), 0);
        assert_eq!(indiamart.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tradeindia.calls.load(Ordering::SeqCst), 1);

        let overview = service.overview(enabled.id).await.unwrap();
        let slots: Vec<_> = overview.sources.iter().filter_map(|s| s.next_run_at).collect();
        assert_eq!(slots.len(), 2);
        assert!((slots[0] - slots[1]).abs() >= Duration::seconds(20));
    }

    #[tokio::test]
    async fn force_sync_conflicts_while_running() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "SYG", "27").await;
        let gate = Arc::new(Notify::new());
        let source = Arc::new(FakeSource {
            kind: LeadSourceKind::Indiamart,
            response: SyncResponse::default(),
            calls: AtomicUsize::new(0),
            gate: Some(gate.clone()),
            during_fetch: None,
        });
        let service = Arc::new(LeadSyncService::new(db.clone(), event_sender(), config(), vec![source.clone()]));

        let running = {
            let service = service.clone();
            let branch_id = branch.id;
            tokio::spawn(async move { service.force_sync(branch_id, LeadSourceKind::Indiamart).await })
        };
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert_matches!(
            service.force_sync(branch.id, LeadSourceKind::Indiamart).await,
            Err(ServiceError::Conflict(_))
        );
        assert_matches!(
            service.force_sync(branch.id, LeadSourceKind::Website).await,
            Err(ServiceError::BadRequest(_))
        );

        gate.notify_one();
        assert!(running.await.unwrap().unwrap().success);
    }

    #[tokio::test]
    async fn settings_lost_mid_run_still_records_the_result() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "SYI", "27").await;
        let source = Arc::new(FakeSource {
            kind: LeadSourceKind::Indiamart,
            response: SyncResponse {
                new: 1,
                error: None,
                leads: vec![external("IM-77", "crates")],
            },
            calls: AtomicUsize::new(0),
            gate: None,
            during_fetch: Some((db.clone(), "DROP TABLE sync_settings")),
        });
        let service = LeadSyncService::new(db.clone(), event_sender(), config(), vec![source.clone()]);

        let outcome = service.force_sync(branch.id, LeadSourceKind::Indiamart).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.new_count, 1);
        assert!(outcome.status.running_since.is_none());
        assert!(outcome.status.next_run_at.is_some());

        // With settings unreadable the next run is refused before it is marked
        assert_matches!(
            service.force_sync(branch.id, LeadSourceKind::Indiamart).await,
            Err(ServiceError::DatabaseError(_))
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let status = ensure_status(&*db, branch.id, LeadSourceKind::Indiamart).await.unwrap();
        assert!(!status.is_running());
    }

    #[tokio::test]
    async fn start_up_clears_markers() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "SYH", "27").await;
        let status = ensure_status(&*db, branch.id, LeadSourceKind::Indiamart).await.unwrap();
        let mut active = status.into_active_model();
        active.running_since = Set(Some(Utc::now()));
        active.update(&*db).await.unwrap();

        let service = LeadSyncService::new(db.clone(), event_sender(), config(), vec![]);
        assert_eq!(service.clear_stale_markers().await.unwrap(), 1);
        let status = ensure_status(&*db, branch.id, LeadSourceKind::Indiamart).await.unwrap();
        assert!(!status.is_running());
    }
}
