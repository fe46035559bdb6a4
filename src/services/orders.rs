use crate::{
    db::DbPool,
    entities::{
        document_sequence::DocumentKind,
        invoice,
        order::{self, OrderStatus},
        order_item, shipment,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        branches::load_branch,
        customers::load_customer,
        fetch_page,
        numbering::next_number,
        optional_text,
        pricing::{apply_totals, price_document, resolve_place_of_supply, LineItemInput},
        search_condition,
        validators::validate_state_code,
        PageRequest,
    },
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub order_date: Option<NaiveDate>,
    pub expected_delivery: Option<NaiveDate>,
    #[validate(custom = "validate_state_code")]
    pub place_of_supply: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<LineItemInput>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    pub expected_delivery: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Everything needed to write an order header and its lines.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub branch_id: Uuid,
    pub customer_id: Uuid,
    pub quotation_id: Option<Uuid>,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub place_of_supply: String,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub items: Vec<LineItemInput>,
}

pub async fn load_order<C>(conn: &C, branch_id: Uuid, order_id: Uuid) -> Result<order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    order::Entity::find_by_id(order_id)
        .filter(order::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))
}

pub async fn order_items<C>(conn: &C, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::LineNo)
        .all(conn)
        .await?)
}

/// Prices and writes an order with its lines. Callers own the transaction.
pub async fn insert_order<C>(conn: &C, branch_state: &str, new: NewOrder) -> Result<OrderDetail, ServiceError>
where
    C: ConnectionTrait,
{
    let priced = price_document(&new.items, &new.place_of_supply, branch_state)?;
    let order_number = next_number(conn, new.branch_id, DocumentKind::Order).await?;
    let order_id = Uuid::new_v4();
    let now = Utc::now();

    let mut header = order::ActiveModel {
        id: Set(order_id),
        branch_id: Set(new.branch_id),
        order_number: Set(order_number),
        customer_id: Set(new.customer_id),
        quotation_id: Set(new.quotation_id),
        status: Set(OrderStatus::Pending),
        order_date: Set(new.order_date),
        expected_delivery: Set(new.expected_delivery),
        place_of_supply: Set(new.place_of_supply),
        notes: Set(optional_text(new.notes)),
        created_by: Set(new.created_by),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    apply_totals!(header, priced.totals);
    let order = header.insert(conn).await.map_err(|e| {
        error!(error = %e, %order_id, "Failed to insert order");
        ServiceError::DatabaseError(e)
    })?;

    order_item::Entity::insert_many(priced.lines.iter().map(|line| line.order_item(order_id)))
        .exec_without_returning(conn)
        .await
        .map_err(|e| {
            error!(error = %e, %order_id, "Failed to insert order items");
            ServiceError::DatabaseError(e)
        })?;

    let items = order_items(conn, order_id).await?;
    Ok(OrderDetail { order, items })
}

/// Moves an order along its lifecycle after checking the transition.
pub async fn transition_order<C>(
    conn: &C,
    order: order::Model,
    next: OrderStatus,
) -> Result<order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if !order.status.can_transition_to(next) {
        return Err(ServiceError::InvalidStatus(format!(
            "order {} cannot move from {} to {}",
            order.order_number, order.status, next
        )));
    }
    let mut active = order.into_active_model();
    active.status = Set(next);
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

/// Service for managing sales orders
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        branch_id: Uuid,
        filter: OrderFilter,
        page: PageRequest,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut select = order::Entity::find()
            .filter(order::Column::BranchId.eq(branch_id))
            .order_by_desc(order::Column::OrderDate)
            .order_by_desc(order::Column::CreatedAt);
        if let Some(status) = filter.status {
            select = select.filter(order::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            select = select.filter(order::Column::CustomerId.eq(customer_id));
        }
        if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(search_condition(&[order::Column::OrderNumber], term));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, branch_id: Uuid, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let order = load_order(db, branch_id, order_id).await?;
        let items = order_items(db, order_id).await?;
        Ok(OrderDetail { order, items })
    }

    /// Creates an order with its items in one transaction.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create_order(
        &self,
        branch_id: Uuid,
        created_by: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let branch = load_branch(&txn, branch_id).await?;
        let customer = load_customer(&txn, branch_id, request.customer_id).await?;
        let order_date = request.order_date.unwrap_or_else(|| Utc::now().date_naive());
        if request.expected_delivery.is_some_and(|d| d < order_date) {
            return Err(ServiceError::invalid_field(
                "expected_delivery",
                "expected delivery cannot precede the order date",
            ));
        }

        let detail = insert_order(
            &txn,
            &branch.state_code,
            NewOrder {
                branch_id,
                customer_id: customer.id,
                quotation_id: None,
                order_date,
                expected_delivery: request.expected_delivery,
                place_of_supply: resolve_place_of_supply(
                    request.place_of_supply.as_deref(),
                    customer.state_code.as_deref(),
                    &branch.state_code,
                ),
                notes: request.notes,
                created_by,
                items: request.items,
            },
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %detail.order.id, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %detail.order.id, number = %detail.order.order_number, "order created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "orders", detail.order.id))
            .await;
        Ok(detail)
    }

    #[instrument(skip(self, request))]
    pub async fn update_order(
        &self,
        branch_id: Uuid,
        order_id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_order(db, branch_id, order_id).await?;
        if matches!(existing.status, OrderStatus::Delivered | OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidStatus(format!(
                "{} orders cannot be edited",
                existing.status
            )));
        }
        if request.expected_delivery.is_some_and(|d| d < existing.order_date) {
            return Err(ServiceError::invalid_field(
                "expected_delivery",
                "expected delivery cannot precede the order date",
            ));
        }

        let mut active = existing.into_active_model();
        if request.expected_delivery.is_some() {
            active.expected_delivery = Set(request.expected_delivery);
        }
        if request.notes.is_some() {
            active.notes = Set(optional_text(request.notes));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        self.event_sender
            .send_or_log(Event::updated(branch_id, "orders", order_id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        branch_id: Uuid,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_order(db, branch_id, order_id).await?;
        let old_status = existing.status;
        let updated = transition_order(db, existing, status).await?;

        info!(%order_id, %old_status, new_status = %status, "order status changed");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                branch_id,
                order_id,
                old_status: old_status.to_string(),
                new_status: status.to_string(),
            })
            .await;
        Ok(updated)
    }

    /// Pending orders without invoices or shipments may be deleted.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, branch_id: Uuid, order_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = load_order(db, branch_id, order_id).await?;
        if existing.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "only pending orders can be deleted; {} is {}",
                existing.order_number, existing.status
            )));
        }
        let invoices = invoice::Entity::find()
            .filter(invoice::Column::OrderId.eq(order_id))
            .count(db)
            .await?;
        let shipments = shipment::Entity::find()
            .filter(shipment::Column::OrderId.eq(order_id))
            .count(db)
            .await?;
        if invoices + shipments > 0 {
            return Err(ServiceError::Conflict(format!(
                "order {} has invoices or shipments",
                existing.order_number
            )));
        }

        order::Entity::delete_by_id(order_id).exec(db).await?;
        info!(%order_id, "order deleted");
        self.event_sender
            .send_or_log(Event::deleted(branch_id, "orders", order_id))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::services::testing::{event_sender, seed_branch, seed_customer};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn item(name: &str) -> LineItemInput {
        LineItemInput {
            name: name.into(),
            description: None,
            hsn_code: Some("7308".into()),
            quantity: dec!(2),
            unit: Some("nos".into()),
            unit_price: dec!(1000),
            discount_percent: dec!(0),
            gst_rate: dec!(18),
        }
    }

    fn request(customer_id: Uuid, items: Vec<LineItemInput>) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id,
            order_date: NaiveDate::from_ymd_opt(2024, 5, 2),
            expected_delivery: None,
            place_of_supply: None,
            notes: None,
            items,
        }
    }

    #[tokio::test]
    async fn unnamed_item_rejects_whole_order() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "ORA", "27").await;
        let customer = seed_customer(&db, branch.id, "Acme", Some("27")).await;
        let service = OrderService::new(db.clone(), event_sender());

        assert_matches!(
            service
                .create_order(branch.id, Uuid::new_v4(), request(customer.id, vec![item("Rack"), item("  ")]))
                .await,
            Err(ServiceError::InvalidField { field, .. }) if field == "items[1].name"
        );
        let (orders, total) = service
            .list_orders(branch.id, OrderFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert!(orders.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn create_numbers_and_prices() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "ORB", "27").await;
        let local = seed_customer(&db, branch.id, "Local", Some("27")).await;
        let remote = seed_customer(&db, branch.id, "Remote", Some("29")).await;
        let service = OrderService::new(db.clone(), event_sender());

        let first = service
            .create_order(branch.id, Uuid::new_v4(), request(local.id, vec![item("Rack")]))
            .await
            .unwrap();
        assert_eq!(first.order.order_number, "SO-00001");
        assert_eq!(first.order.cgst_total.round_dp(2), dec!(180.00));
        assert_eq!(first.order.sgst_total.round_dp(2), dec!(180.00));
        assert_eq!(first.order.grand_total.round_dp(2), dec!(2360.00));
        assert_eq!(first.items.len(), 1);

        let second = service
            .create_order(branch.id, Uuid::new_v4(), request(remote.id, vec![item("Rack")]))
            .await
            .unwrap();
        assert_eq!(second.order.order_number, "SO-00002");
        assert_eq!(second.order.place_of_supply, "29");
        assert_eq!(second.order.igst_total.round_dp(2), dec!(360.00));
    }

    #[tokio::test]
    async fn lifecycle_and_delete_rules() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "ORC", "27").await;
        let customer = seed_customer(&db, branch.id, "Acme", None).await;
        let service = OrderService::new(db.clone(), event_sender());
        let order = service
            .create_order(branch.id, Uuid::new_v4(), request(customer.id, vec![item("Rack")]))
            .await
            .unwrap()
            .order;

        assert_matches!(
            service.change_status(branch.id, order.id, OrderStatus::Dispatched).await,
            Err(ServiceError::InvalidStatus(_))
        );
        service
            .change_status(branch.id, order.id, OrderStatus::Confirmed)
            .await
            .unwrap();
        assert_matches!(
            service.delete_order(branch.id, order.id).await,
            Err(ServiceError::InvalidStatus(_))
        );

        let pending = service
            .create_order(branch.id, Uuid::new_v4(), request(customer.id, vec![item("Shelf")]))
            .await
            .unwrap()
            .order;
        service.delete_order(branch.id, pending.id).await.unwrap();
        assert_matches!(
            service.get_order(branch.id, pending.id).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
