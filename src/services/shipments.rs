use crate::{
    db::DbPool,
    entities::{
        document_sequence::DocumentKind,
        order::{self, OrderStatus},
        shipment::{self, ShipmentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        customers::load_customer,
        fetch_page,
        numbering::next_number,
        optional_text,
        orders::load_order,
        search_condition, PageRequest,
    },
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateShipmentRequest {
    pub order_id: Uuid,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub expected_delivery: Option<NaiveDate>,
    /// Defaults to the customer's shipping address
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateShipmentRequest {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub expected_delivery: Option<NaiveDate>,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ShipmentStatusRequest {
    pub status: ShipmentStatus,
    /// Set together with a move to `dispatched`
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ShipmentFilter {
    pub status: Option<ShipmentStatus>,
    pub order_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub search: Option<String>,
}

async fn load_shipment<C>(conn: &C, branch_id: Uuid, shipment_id: Uuid) -> Result<shipment::Model, ServiceError>
where
    C: ConnectionTrait,
{
    shipment::Entity::find_by_id(shipment_id)
        .filter(shipment::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Shipment", shipment_id))
}

/// Follows a shipment milestone on its order. Orders already at or past the
/// target are left alone.
async fn follow_on_order<C>(
    conn: &C,
    order: order::Model,
    target: OrderStatus,
) -> Result<Option<(OrderStatus, order::Model)>, ServiceError>
where
    C: ConnectionTrait,
{
    let from = order.status;
    let applies = match target {
        OrderStatus::Dispatched => from.is_shippable(),
        OrderStatus::Delivered => from == OrderStatus::Dispatched,
        _ => false,
    };
    if !applies {
        debug!(order_id = %order.id, %from, %target, "order not moved by shipment");
        return Ok(None);
    }
    let mut active = order.into_active_model();
    active.status = Set(target);
    active.updated_at = Set(Utc::now());
    Ok(Some((from, active.update(conn).await?)))
}

/// Dispatch tracking for sales orders
#[derive(Clone)]
pub struct ShipmentService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ShipmentService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_shipments(
        &self,
        branch_id: Uuid,
        filter: ShipmentFilter,
        page: PageRequest,
    ) -> Result<(Vec<shipment::Model>, u64), ServiceError> {
        let mut select = shipment::Entity::find()
            .filter(shipment::Column::BranchId.eq(branch_id))
            .order_by_desc(shipment::Column::CreatedAt);
        if let Some(status) = filter.status {
            select = select.filter(shipment::Column::Status.eq(status));
        }
        if let Some(order_id) = filter.order_id {
            select = select.filter(shipment::Column::OrderId.eq(order_id));
        }
        if let Some(customer_id) = filter.customer_id {
            select = select.filter(shipment::Column::CustomerId.eq(customer_id));
        }
        if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(search_condition(
                &[
                    shipment::Column::ShipmentNumber,
                    shipment::Column::TrackingNumber,
                    shipment::Column::Carrier,
                ],
                term,
            ));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_shipment(&self, branch_id: Uuid, shipment_id: Uuid) -> Result<shipment::Model, ServiceError> {
        load_shipment(&*self.db_pool, branch_id, shipment_id).await
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_shipment(
        &self,
        branch_id: Uuid,
        created_by: Uuid,
        request: CreateShipmentRequest,
    ) -> Result<shipment::Model, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for shipment");
            ServiceError::DatabaseError(e)
        })?;

        let order = load_order(&txn, branch_id, request.order_id).await?;
        if !order.status.is_shippable() {
            return Err(ServiceError::InvalidStatus(format!(
                "order {} is {} and cannot be shipped",
                order.order_number, order.status
            )));
        }
        let customer = load_customer(&txn, branch_id, order.customer_id).await?;
        let shipment_number = next_number(&txn, branch_id, DocumentKind::Shipment).await?;
        let now = Utc::now();

        let created = shipment::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch_id: Set(branch_id),
            shipment_number: Set(shipment_number),
            order_id: Set(order.id),
            customer_id: Set(customer.id),
            carrier: Set(optional_text(request.carrier)),
            tracking_number: Set(optional_text(request.tracking_number)),
            status: Set(ShipmentStatus::Pending),
            dispatch_date: Set(None),
            expected_delivery: Set(request.expected_delivery.or(order.expected_delivery)),
            delivered_at: Set(None),
            shipping_address: Set(optional_text(request.shipping_address).or(customer.shipping_address)),
            notes: Set(optional_text(request.notes)),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert shipment");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit shipment");
            ServiceError::DatabaseError(e)
        })?;

        info!(shipment_id = %created.id, number = %created.shipment_number, "shipment created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "shipments", created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_shipment(
        &self,
        branch_id: Uuid,
        shipment_id: Uuid,
        request: UpdateShipmentRequest,
    ) -> Result<shipment::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_shipment(db, branch_id, shipment_id).await?;
        if matches!(
            existing.status,
            ShipmentStatus::Delivered | ShipmentStatus::Returned | ShipmentStatus::Cancelled
        ) {
            return Err(ServiceError::InvalidStatus(format!(
                "{} shipments cannot be edited",
                existing.status
            )));
        }
        let mut active = existing.into_active_model();
        if request.carrier.is_some() {
            active.carrier = Set(optional_text(request.carrier));
        }
        if request.tracking_number.is_some() {
            active.tracking_number = Set(optional_text(request.tracking_number));
        }
        if request.expected_delivery.is_some() {
            active.expected_delivery = Set(request.expected_delivery);
        }
        if request.shipping_address.is_some() {
            active.shipping_address = Set(optional_text(request.shipping_address));
        }
        if request.notes.is_some() {
            active.notes = Set(optional_text(request.notes));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;
        self.event_sender
            .send_or_log(Event::updated(branch_id, "shipments", shipment_id))
            .await;
        Ok(updated)
    }

    /// Moves a shipment along its lifecycle. Dispatch and delivery carry the
    /// order with them and are refused once the order is cancelled.
    #[instrument(skip(self, request), fields(status = %request.status))]
    pub async fn change_status(
        &self,
        branch_id: Uuid,
        shipment_id: Uuid,
        request: ShipmentStatusRequest,
    ) -> Result<shipment::Model, ServiceError> {
        let next = request.status;
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for shipment status");
            ServiceError::DatabaseError(e)
        })?;

        let existing = load_shipment(&txn, branch_id, shipment_id).await?;
        if !existing.status.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "shipment {} cannot move from {} to {}",
                existing.shipment_number, existing.status, next
            )));
        }

        let order_id = existing.order_id;
        let carrier = optional_text(request.carrier).or_else(|| existing.carrier.clone());
        let tracking = optional_text(request.tracking_number).or_else(|| existing.tracking_number.clone());
        let now = Utc::now();

        let mut active = existing.into_active_model();
        active.status = Set(next);
        active.updated_at = Set(now);
        let order_target = match next {
            ShipmentStatus::Dispatched => {
                if carrier.is_none() && tracking.is_none() {
                    return Err(ServiceError::invalid_field(
                        "tracking_number",
                        "a carrier or tracking number is required to dispatch",
                    ));
                }
                active.carrier = Set(carrier);
                active.tracking_number = Set(tracking);
                active.dispatch_date = Set(Some(now.date_naive()));
                Some(OrderStatus::Dispatched)
            }
            ShipmentStatus::Delivered => {
                active.delivered_at = Set(Some(now));
                Some(OrderStatus::Delivered)
            }
            _ => None,
        };
        let order = match order_target {
            Some(_) => {
                let order = load_order(&txn, branch_id, order_id).await?;
                if order.status == OrderStatus::Cancelled {
                    return Err(ServiceError::InvalidStatus(format!(
                        "order {} is cancelled and cannot be {}",
                        order.order_number, next
                    )));
                }
                Some(order)
            }
            None => None,
        };
        let updated = active.update(&txn).await?;

        let mut order_change = None;
        if let (Some(target), Some(order)) = (order_target, order) {
            order_change = follow_on_order(&txn, order, target).await?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, %shipment_id, "Failed to commit shipment status");
            ServiceError::DatabaseError(e)
        })?;

        info!(%shipment_id, status = %next, "shipment status changed");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "shipments", shipment_id))
            .await;
        if let Some((old_status, order)) = order_change {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    branch_id,
                    order_id: order.id,
                    old_status: old_status.to_string(),
                    new_status: order.status.to_string(),
                })
                .await;
        }
        Ok(updated)
    }
}
