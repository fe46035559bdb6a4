pub mod branches;
pub mod common;
pub mod customers;
pub mod employees;
pub mod events;
pub mod invoices;
pub mod lead_sync;
pub mod leads;
pub mod ledger;
pub mod leave;
pub mod orders;
pub mod payments;
pub mod payroll;
pub mod purchase_orders;
pub mod quotations;
pub mod shipments;
pub mod vendors;

use crate::auth::SessionStore;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    branches::BranchService,
    customers::CustomerService,
    employees::EmployeeService,
    functions::FunctionsClient,
    invoices::InvoiceService,
    lead_assignment::LeadAssignmentService,
    lead_sync::{
        sources::{FunctionLeadSource, LeadSourceClient},
        LeadSyncService,
    },
    leads::LeadService,
    ledger::LedgerService,
    leave::LeaveService,
    orders::OrderService,
    payments::PaymentService,
    payroll::{PayrollRates, PayrollService},
    procurement::PurchaseOrderService,
    profiles::ProfileService,
    quotations::QuotationService,
    shipments::ShipmentService,
    storage::StorageService,
    vendors::VendorService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub branches: Arc<BranchService>,
    pub profiles: Arc<ProfileService>,
    pub customers: Arc<CustomerService>,
    pub leads: Arc<LeadService>,
    pub lead_assignment: Arc<LeadAssignmentService>,
    pub lead_sync: Arc<LeadSyncService>,
    pub quotations: Arc<QuotationService>,
    pub orders: Arc<OrderService>,
    pub invoices: Arc<InvoiceService>,
    pub payments: Arc<PaymentService>,
    pub ledger: Arc<LedgerService>,
    pub employees: Arc<EmployeeService>,
    pub leave: Arc<LeaveService>,
    pub payroll: Arc<PayrollService>,
    pub vendors: Arc<VendorService>,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub shipments: Arc<ShipmentService>,
}

impl AppServices {
    /// Wires every service against one pool, one event channel and the
    /// configured external collaborators.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, ServiceError> {
        let functions = FunctionsClient::new(config)?;
        let storage = StorageService::new(config.storage_bucket.clone());
        let rates = PayrollRates::from_config(&config.payroll)?;

        let profiles = ProfileService::new(db_pool.clone(), sessions, event_sender.clone());
        let sources: Vec<Arc<dyn LeadSourceClient>> = vec![
            Arc::new(FunctionLeadSource::indiamart(functions.clone())),
            Arc::new(FunctionLeadSource::tradeindia(functions.clone())),
        ];

        Ok(Self {
            branches: Arc::new(BranchService::new(db_pool.clone())),
            customers: Arc::new(CustomerService::new(db_pool.clone(), event_sender.clone())),
            leads: Arc::new(LeadService::new(db_pool.clone(), event_sender.clone())),
            lead_assignment: Arc::new(LeadAssignmentService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            lead_sync: Arc::new(LeadSyncService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.lead_sync.clone(),
                sources,
            )),
            quotations: Arc::new(QuotationService::new(db_pool.clone(), event_sender.clone())),
            orders: Arc::new(OrderService::new(db_pool.clone(), event_sender.clone())),
            invoices: Arc::new(InvoiceService::new(db_pool.clone(), event_sender.clone())),
            payments: Arc::new(PaymentService::new(
                db_pool.clone(),
                event_sender.clone(),
                storage.clone(),
            )),
            ledger: Arc::new(LedgerService::new(db_pool.clone(), event_sender.clone())),
            employees: Arc::new(EmployeeService::new(
                db_pool.clone(),
                event_sender.clone(),
                functions,
                profiles.clone(),
            )),
            leave: Arc::new(LeaveService::new(db_pool.clone(), event_sender.clone())),
            payroll: Arc::new(PayrollService::new(db_pool.clone(), event_sender.clone(), rates)),
            vendors: Arc::new(VendorService::new(db_pool.clone(), event_sender.clone())),
            purchase_orders: Arc::new(PurchaseOrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                storage,
            )),
            shipments: Arc::new(ShipmentService::new(db_pool, event_sender)),
            profiles: Arc::new(profiles),
        })
    }
}
