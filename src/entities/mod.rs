pub mod branch;
pub mod customer;
pub mod document_sequence;
pub mod employee;
pub mod invoice;
pub mod invoice_item;
pub mod lead;
pub mod lead_assignment_rule;
pub mod lead_source;
pub mod ledger_entry;
pub mod leave_request;
pub mod order;
pub mod order_item;
pub mod pay_slip;
pub mod payment;
pub mod profile;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod quotation;
pub mod quotation_item;
pub mod quotation_revision;
pub mod shipment;
pub mod sync_setting;
pub mod sync_status;
pub mod vendor;
