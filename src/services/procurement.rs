use crate::{
    db::DbPool,
    entities::{
        document_sequence::DocumentKind,
        purchase_order::{self, PurchaseOrderStatus},
        purchase_order_item,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        branches::load_branch,
        fetch_page,
        numbering::next_number,
        optional_text,
        pricing::{apply_totals, price_document, resolve_place_of_supply, LineItemInput, PricedLine},
        search_condition,
        storage::{StorageCategory, StorageLocation, StorageService},
        vendors::load_vendor,
        PageRequest,
    },
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePurchaseOrderRequest {
    pub vendor_id: Uuid,
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Vec<LineItemInput>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdatePurchaseOrderRequest {
    pub expected_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Replaces every line when present
    pub items: Option<Vec<LineItemInput>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PurchaseOrderFilter {
    pub status: Option<PurchaseOrderStatus>,
    pub vendor_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReceiveLine {
    pub item_id: Uuid,
    /// Quantity arriving now, added to what was already received
    #[schema(value_type = f64)]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReceiveItemsRequest {
    pub items: Vec<ReceiveLine>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AttachDocumentRequest {
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PurchaseOrderDetail {
    pub purchase_order: purchase_order::Model,
    pub items: Vec<purchase_order_item::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DocumentUpload {
    pub purchase_order: purchase_order::Model,
    pub location: StorageLocation,
}

impl From<&purchase_order_item::Model> for LineItemInput {
    fn from(item: &purchase_order_item::Model) -> Self {
        LineItemInput {
            name: item.name.clone(),
            description: item.description.clone(),
            hsn_code: item.hsn_code.clone(),
            quantity: item.quantity,
            unit: item.unit.clone(),
            unit_price: item.unit_price,
            discount_percent: item.discount_percent,
            gst_rate: item.gst_rate,
        }
    }
}

impl PricedLine {
    pub fn purchase_order_item(&self, purchase_order_id: Uuid) -> purchase_order_item::ActiveModel {
        purchase_order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_order_id: Set(purchase_order_id),
            line_no: Set(self.line_no),
            name: Set(self.input.name.clone()),
            description: Set(self.input.description.clone()),
            hsn_code: Set(self.input.hsn_code.clone()),
            quantity: Set(self.input.quantity),
            unit: Set(self.input.unit.clone()),
            unit_price: Set(self.input.unit_price),
            discount_percent: Set(self.input.discount_percent),
            gst_rate: Set(self.input.gst_rate),
            gross_amount: Set(self.gross_amount),
            discount_amount: Set(self.discount_amount),
            taxable_amount: Set(self.taxable_amount),
            tax_amount: Set(self.tax_amount),
            line_total: Set(self.line_total),
            received_quantity: Set(Decimal::ZERO),
        }
    }
}

/// Receipt status implied by the lines' received quantities.
pub fn receipt_status(items: &[purchase_order_item::Model]) -> Option<PurchaseOrderStatus> {
    if items.iter().all(|i| i.received_quantity <= Decimal::ZERO) {
        None
    } else if items.iter().all(|i| i.received_quantity >= i.quantity) {
        Some(PurchaseOrderStatus::Received)
    } else {
        Some(PurchaseOrderStatus::PartiallyReceived)
    }
}

pub async fn load_purchase_order<C>(
    conn: &C,
    branch_id: Uuid,
    purchase_order_id: Uuid,
) -> Result<purchase_order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    purchase_order::Entity::find_by_id(purchase_order_id)
        .filter(purchase_order::Column::BranchId.eq(branch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Purchase order", purchase_order_id))
}

async fn po_items<C>(conn: &C, purchase_order_id: Uuid) -> Result<Vec<purchase_order_item::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(purchase_order_item::Entity::find()
        .filter(purchase_order_item::Column::PurchaseOrderId.eq(purchase_order_id))
        .order_by_asc(purchase_order_item::Column::LineNo)
        .all(conn)
        .await?)
}

async fn write_items<C>(conn: &C, purchase_order_id: Uuid, lines: &[PricedLine]) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    purchase_order_item::Entity::insert_many(lines.iter().map(|line| line.purchase_order_item(purchase_order_id)))
        .exec_without_returning(conn)
        .await
        .map_err(|e| {
            error!(error = %e, %purchase_order_id, "Failed to insert purchase order items");
            ServiceError::DatabaseError(e)
        })?;
    Ok(())
}

/// Purchase orders raised against vendors
#[derive(Clone)]
pub struct PurchaseOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    storage: StorageService,
}

impl PurchaseOrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, storage: StorageService) -> Self {
        Self {
            db_pool,
            event_sender,
            storage,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_purchase_orders(
        &self,
        branch_id: Uuid,
        filter: PurchaseOrderFilter,
        page: PageRequest,
    ) -> Result<(Vec<purchase_order::Model>, u64), ServiceError> {
        let mut select = purchase_order::Entity::find()
            .filter(purchase_order::Column::BranchId.eq(branch_id))
            .order_by_desc(purchase_order::Column::OrderDate)
            .order_by_desc(purchase_order::Column::CreatedAt);
        if let Some(status) = filter.status {
            select = select.filter(purchase_order::Column::Status.eq(status));
        }
        if let Some(vendor_id) = filter.vendor_id {
            select = select.filter(purchase_order::Column::VendorId.eq(vendor_id));
        }
        if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(search_condition(&[purchase_order::Column::PoNumber], term));
        }
        fetch_page(&self.db_pool, select, page).await
    }

    #[instrument(skip(self))]
    pub async fn get_purchase_order(
        &self,
        branch_id: Uuid,
        purchase_order_id: Uuid,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let purchase_order = load_purchase_order(db, branch_id, purchase_order_id).await?;
        let items = po_items(db, purchase_order_id).await?;
        Ok(PurchaseOrderDetail { purchase_order, items })
    }

    /// Creates a draft PO. Place of supply is the vendor's state, else the branch's.
    #[instrument(skip(self, request), fields(vendor_id = %request.vendor_id))]
    pub async fn create_purchase_order(
        &self,
        branch_id: Uuid,
        created_by: Uuid,
        request: CreatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for purchase order");
            ServiceError::DatabaseError(e)
        })?;

        let branch = load_branch(&txn, branch_id).await?;
        let vendor = load_vendor(&txn, branch_id, request.vendor_id).await?;
        if !vendor.is_active {
            return Err(ServiceError::invalid_field("vendor_id", "vendor is inactive"));
        }
        let place_of_supply = resolve_place_of_supply(None, vendor.state_code.as_deref(), &branch.state_code);
        let priced = price_document(&request.items, &place_of_supply, &branch.state_code)?;
        let po_number = next_number(&txn, branch_id, DocumentKind::PurchaseOrder).await?;
        let purchase_order_id = Uuid::new_v4();
        let now = Utc::now();

        let mut header = purchase_order::ActiveModel {
            id: Set(purchase_order_id),
            branch_id: Set(branch_id),
            po_number: Set(po_number),
            vendor_id: Set(vendor.id),
            status: Set(PurchaseOrderStatus::Draft),
            order_date: Set(request.order_date.unwrap_or_else(|| now.date_naive())),
            expected_date: Set(request.expected_date),
            place_of_supply: Set(place_of_supply),
            document_path: Set(None),
            notes: Set(optional_text(request.notes)),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        apply_totals!(header, priced.totals);
        let purchase_order = header.insert(&txn).await.map_err(|e| {
            error!(error = %e, %purchase_order_id, "Failed to insert purchase order");
            ServiceError::DatabaseError(e)
        })?;
        write_items(&txn, purchase_order_id, &priced.lines).await?;
        let items = po_items(&txn, purchase_order_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %purchase_order_id, "Failed to commit purchase order");
            ServiceError::DatabaseError(e)
        })?;

        info!(%purchase_order_id, number = %purchase_order.po_number, "purchase order created");
        self.event_sender
            .send_or_log(Event::created(branch_id, "purchase_orders", purchase_order_id))
            .await;
        Ok(PurchaseOrderDetail { purchase_order, items })
    }

    /// Draft POs only. New items reprice the whole order.
    #[instrument(skip(self, request))]
    pub async fn update_purchase_order(
        &self,
        branch_id: Uuid,
        purchase_order_id: Uuid,
        request: UpdatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for purchase order update");
            ServiceError::DatabaseError(e)
        })?;

        let existing = load_purchase_order(&txn, branch_id, purchase_order_id).await?;
        if existing.status != PurchaseOrderStatus::Draft {
            return Err(ServiceError::InvalidStatus(format!(
                "purchase order {} is {}; only drafts can be edited",
                existing.po_number, existing.status
            )));
        }

        let place_of_supply = existing.place_of_supply.clone();
        let mut active = existing.into_active_model();
        if request.expected_date.is_some() {
            active.expected_date = Set(request.expected_date);
        }
        if request.notes.is_some() {
            active.notes = Set(optional_text(request.notes));
        }
        if let Some(items) = request.items {
            let branch = load_branch(&txn, branch_id).await?;
            let priced = price_document(&items, &place_of_supply, &branch.state_code)?;
            purchase_order_item::Entity::delete_many()
                .filter(purchase_order_item::Column::PurchaseOrderId.eq(purchase_order_id))
                .exec(&txn)
                .await?;
            write_items(&txn, purchase_order_id, &priced.lines).await?;
            apply_totals!(active, priced.totals);
        }
        active.updated_at = Set(Utc::now());
        let purchase_order = active.update(&txn).await?;
        let items = po_items(&txn, purchase_order_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %purchase_order_id, "Failed to commit purchase order update");
            ServiceError::DatabaseError(e)
        })?;

        self.event_sender
            .send_or_log(Event::updated(branch_id, "purchase_orders", purchase_order_id))
            .await;
        Ok(PurchaseOrderDetail { purchase_order, items })
    }

    /// Manual lifecycle moves; receipt statuses come from [`receive_items`](Self::receive_items).
    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        branch_id: Uuid,
        purchase_order_id: Uuid,
        status: PurchaseOrderStatus,
    ) -> Result<purchase_order::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_purchase_order(db, branch_id, purchase_order_id).await?;
        if !existing.status.can_transition_to(status) {
            return Err(ServiceError::InvalidStatus(format!(
                "purchase order {} cannot move from {} to {}",
                existing.po_number, existing.status, status
            )));
        }
        let mut active = existing.into_active_model();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        info!(%purchase_order_id, %status, "purchase order status changed");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "purchase_orders", purchase_order_id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self, request))]
    pub async fn receive_items(
        &self,
        branch_id: Uuid,
        purchase_order_id: Uuid,
        request: ReceiveItemsRequest,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::invalid_field("items", "at least one line is required"));
        }
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for goods receipt");
            ServiceError::DatabaseError(e)
        })?;

        let existing = load_purchase_order(&txn, branch_id, purchase_order_id).await?;
        if !existing.status.accepts_receipts() {
            return Err(ServiceError::InvalidStatus(format!(
                "purchase order {} is {} and cannot receive goods",
                existing.po_number, existing.status
            )));
        }

        let mut lines: HashMap<Uuid, purchase_order_item::Model> = po_items(&txn, purchase_order_id)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();
        for (index, receipt) in request.items.iter().enumerate() {
            let field = |name: &str| format!("items[{index}].{name}");
            if receipt.quantity <= Decimal::ZERO {
                return Err(ServiceError::invalid_field(field("quantity"), "must be greater than zero"));
            }
            let line = lines
                .get_mut(&receipt.item_id)
                .ok_or_else(|| ServiceError::invalid_field(field("item_id"), "not a line of this purchase order"))?;
            let received = line
                .received_quantity
                .checked_add(receipt.quantity)
                .filter(|received| *received <= line.quantity)
                .ok_or_else(|| {
                    ServiceError::invalid_field(
                        field("quantity"),
                        format!("only {} of {} left to receive", line.quantity - line.received_quantity, line.name),
                    )
                })?;
            line.received_quantity = received;
        }

        for line in lines.values() {
            purchase_order_item::ActiveModel {
                id: Set(line.id),
                received_quantity: Set(line.received_quantity),
                ..Default::default()
            }
            .update(&txn)
            .await?;
        }

        let items = po_items(&txn, purchase_order_id).await?;
        let mut active = existing.into_active_model();
        if let Some(status) = receipt_status(&items) {
            active.status = Set(status);
        }
        active.updated_at = Set(Utc::now());
        let purchase_order = active.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %purchase_order_id, "Failed to commit goods receipt");
            ServiceError::DatabaseError(e)
        })?;

        info!(%purchase_order_id, status = %purchase_order.status, "goods received");
        self.event_sender
            .send_or_log(Event::updated(branch_id, "purchase_orders", purchase_order_id))
            .await;
        Ok(PurchaseOrderDetail { purchase_order, items })
    }

    /// Reserves the storage path for the PO's PDF and records it.
    #[instrument(skip(self, request))]
    pub async fn attach_document(
        &self,
        branch_id: Uuid,
        purchase_order_id: Uuid,
        user_id: Uuid,
        request: AttachDocumentRequest,
    ) -> Result<DocumentUpload, ServiceError> {
        let db = &*self.db_pool;
        let existing = load_purchase_order(db, branch_id, purchase_order_id).await?;
        let location = self
            .storage
            .reserve_pdf(user_id, StorageCategory::PurchaseOrders, &request.file_name)?;

        let mut active = existing.into_active_model();
        active.document_path = Set(Some(location.path.clone()));
        active.updated_at = Set(Utc::now());
        let purchase_order = active.update(db).await?;

        self.event_sender
            .send_or_log(Event::updated(branch_id, "purchase_orders", purchase_order_id))
            .await;
        Ok(DocumentUpload { purchase_order, location })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::services::testing::{event_sender, seed_branch, seed_vendor};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn line(name: &str, quantity: Decimal) -> LineItemInput {
        LineItemInput {
            name: name.into(),
            description: None,
            hsn_code: Some("7208".into()),
            quantity,
            unit: Some("kg".into()),
            unit_price: dec!(50),
            discount_percent: dec!(0),
            gst_rate: dec!(18),
        }
    }

    fn service(db: Arc<DbPool>) -> PurchaseOrderService {
        PurchaseOrderService::new(db, event_sender(), StorageService::new("documents"))
    }

    #[tokio::test]
    async fn vendor_state_drives_tax_split() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "PUR", "27").await;
        let gujarat = seed_vendor(&db, branch.id, "Gujarat Steel", Some("24")).await;
        let local = seed_vendor(&db, branch.id, "Pune Steel", None).await;
        let service = service(db.clone());
        let user = Uuid::new_v4();

        let inter = service
            .create_purchase_order(
                branch.id,
                user,
                CreatePurchaseOrderRequest {
                    vendor_id: gujarat.id,
                    order_date: None,
                    expected_date: None,
                    notes: None,
                    items: vec![line("HR coil", dec!(100))],
                },
            )
            .await
            .unwrap();
        assert_eq!(inter.purchase_order.po_number, "PO-00001");
        assert_eq!(inter.purchase_order.place_of_supply, "24");
        assert_eq!(inter.purchase_order.igst_total.round_dp(2), dec!(900.00));

        let intra = service
            .create_purchase_order(
                branch.id,
                user,
                CreatePurchaseOrderRequest {
                    vendor_id: local.id,
                    order_date: None,
                    expected_date: None,
                    notes: None,
                    items: vec![line("HR coil", dec!(100))],
                },
            )
            .await
            .unwrap();
        assert_eq!(intra.purchase_order.po_number, "PO-00002");
        assert_eq!(intra.purchase_order.place_of_supply, "27");
        assert_eq!(intra.purchase_order.cgst_total.round_dp(2), dec!(450.00));
    }

    #[tokio::test]
    async fn receiving_derives_status() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "RCV", "27").await;
        let vendor = seed_vendor(&db, branch.id, "Gujarat Steel", Some("24")).await;
        let service = service(db.clone());
        let po = service
            .create_purchase_order(
                branch.id,
                Uuid::new_v4(),
                CreatePurchaseOrderRequest {
                    vendor_id: vendor.id,
                    order_date: None,
                    expected_date: None,
                    notes: None,
                    items: vec![line("HR coil", dec!(10)), line("CR sheet", dec!(5))],
                },
            )
            .await
            .unwrap();
        let id = po.purchase_order.id;
        let (coil, sheet) = (po.items[0].id, po.items[1].id);
        let receive = |item_id, quantity| ReceiveItemsRequest {
            items: vec![ReceiveLine { item_id, quantity }],
        };

        assert_matches!(
            service.receive_items(branch.id, id, receive(coil, dec!(1))).await,
            Err(ServiceError::InvalidStatus(_))
        );
        service.change_status(branch.id, id, PurchaseOrderStatus::Sent).await.unwrap();

        let partial = service.receive_items(branch.id, id, receive(coil, dec!(10))).await.unwrap();
        assert_eq!(partial.purchase_order.status, PurchaseOrderStatus::PartiallyReceived);

        assert_matches!(
            service.receive_items(branch.id, id, receive(coil, Decimal::MAX)).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "items[0].quantity"
        );
        assert_matches!(
            service.receive_items(branch.id, id, receive(sheet, dec!(6))).await,
            Err(ServiceError::InvalidField { field, .. }) if field == "items[0].quantity"
        );

        let done = service.receive_items(branch.id, id, receive(sheet, dec!(5))).await.unwrap();
        assert_eq!(done.purchase_order.status, PurchaseOrderStatus::Received);

        assert_matches!(
            service
                .update_purchase_order(branch.id, id, UpdatePurchaseOrderRequest::default())
                .await,
            Err(ServiceError::InvalidStatus(_))
        );
    }

    #[tokio::test]
    async fn document_must_be_pdf() {
        let db = Arc::new(memory_pool().await);
        let branch = seed_branch(&db, "DOC", "27").await;
        let vendor = seed_vendor(&db, branch.id, "Gujarat Steel", Some("24")).await;
        let service = service(db.clone());
        let user = Uuid::new_v4();
        let po = service
            .create_purchase_order(
                branch.id,
                user,
                CreatePurchaseOrderRequest {
                    vendor_id: vendor.id,
                    order_date: None,
                    expected_date: None,
                    notes: None,
                    items: vec![line("HR coil", dec!(1))],
                },
            )
            .await
            .unwrap();

        assert_matches!(
            service
                .attach_document(branch.id, po.purchase_order.id, user, AttachDocumentRequest { file_name: "po.docx".into() })
                .await,
            Err(ServiceError::InvalidField { field, .. }) if field == "file_name"
        );
        let upload = service
            .attach_document(branch.id, po.purchase_order.id, user, AttachDocumentRequest { file_name: "PO 1.pdf".into() })
            .await
            .unwrap();
        assert!(upload.location.path.starts_with(&format!("{user}/purchase-orders/")));
        assert_eq!(upload.purchase_order.document_path, Some(upload.location.path));
    }
}
