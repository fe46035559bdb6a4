/*!
 * # Permissions Module
 *
 * Permission strings are `resource:action`. Roles map to fixed permission
 * sets; `resource:*` in a set grants every action on that resource.
 */

use crate::entities::profile::Role;
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

/// Permission actions
pub struct Actions;

impl Actions {
    pub const READ: &'static str = "read";
    pub const WRITE: &'static str = "write";
    pub const DELETE: &'static str = "delete";
    pub const MANAGE: &'static str = "manage";
    pub const ALL: &'static str = "*";
}

/// Resource types
pub struct Resources;

impl Resources {
    pub const BRANCHES: &'static str = "branches";
    pub const CUSTOMERS: &'static str = "customers";
    pub const LEADS: &'static str = "leads";
    pub const QUOTATIONS: &'static str = "quotations";
    pub const ORDERS: &'static str = "orders";
    pub const INVOICES: &'static str = "invoices";
    pub const PAYMENTS: &'static str = "payments";
    pub const LEDGER: &'static str = "ledger";
    pub const EMPLOYEES: &'static str = "employees";
    pub const LEAVE: &'static str = "leave";
    pub const PAYROLL: &'static str = "payroll";
    pub const VENDORS: &'static str = "vendors";
    pub const PURCHASE_ORDERS: &'static str = "purchase_orders";
    pub const SHIPMENTS: &'static str = "shipments";
}

/// Permission string constants used to gate routes
pub mod consts {
    pub const BRANCHES_MANAGE: &str = "branches:manage";

    pub const CUSTOMERS_READ: &str = "customers:read";
    pub const CUSTOMERS_WRITE: &str = "customers:write";
    pub const CUSTOMERS_DELETE: &str = "customers:delete";

    pub const LEADS_READ: &str = "leads:read";
    pub const LEADS_WRITE: &str = "leads:write";
    pub const LEADS_DELETE: &str = "leads:delete";
    pub const LEADS_SYNC: &str = "leads:sync";

    pub const QUOTATIONS_READ: &str = "quotations:read";
    pub const QUOTATIONS_WRITE: &str = "quotations:write";
    pub const QUOTATIONS_DELETE: &str = "quotations:delete";

    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_WRITE: &str = "orders:write";
    pub const ORDERS_DELETE: &str = "orders:delete";

    pub const INVOICES_READ: &str = "invoices:read";
    pub const INVOICES_WRITE: &str = "invoices:write";

    pub const PAYMENTS_READ: &str = "payments:read";
    pub const PAYMENTS_WRITE: &str = "payments:write";
    pub const PAYMENTS_DELETE: &str = "payments:delete";

    pub const LEDGER_READ: &str = "ledger:read";
    pub const LEDGER_WRITE: &str = "ledger:write";

    pub const EMPLOYEES_READ: &str = "employees:read";
    pub const EMPLOYEES_WRITE: &str = "employees:write";
    pub const EMPLOYEES_MANAGE_ACCESS: &str = "employees:manage_access";

    pub const LEAVE_READ: &str = "leave:read";
    pub const LEAVE_WRITE: &str = "leave:write";
    pub const LEAVE_APPROVE: &str = "leave:approve";

    pub const PAYROLL_READ: &str = "payroll:read";
    pub const PAYROLL_WRITE: &str = "payroll:write";

    pub const VENDORS_READ: &str = "vendors:read";
    pub const VENDORS_WRITE: &str = "vendors:write";

    pub const PURCHASE_ORDERS_READ: &str = "purchase_orders:read";
    pub const PURCHASE_ORDERS_WRITE: &str = "purchase_orders:write";

    pub const SHIPMENTS_READ: &str = "shipments:read";
    pub const SHIPMENTS_WRITE: &str = "shipments:write";

    /// Every concrete permission the API checks.
    pub const ALL: &[&str] = &[
        BRANCHES_MANAGE,
        CUSTOMERS_READ,
        CUSTOMERS_WRITE,
        CUSTOMERS_DELETE,
        LEADS_READ,
        LEADS_WRITE,
        LEADS_DELETE,
        LEADS_SYNC,
        QUOTATIONS_READ,
        QUOTATIONS_WRITE,
        QUOTATIONS_DELETE,
        ORDERS_READ,
        ORDERS_WRITE,
        ORDERS_DELETE,
        INVOICES_READ,
        INVOICES_WRITE,
        PAYMENTS_READ,
        PAYMENTS_WRITE,
        PAYMENTS_DELETE,
        LEDGER_READ,
        LEDGER_WRITE,
        EMPLOYEES_READ,
        EMPLOYEES_WRITE,
        EMPLOYEES_MANAGE_ACCESS,
        LEAVE_READ,
        LEAVE_WRITE,
        LEAVE_APPROVE,
        PAYROLL_READ,
        PAYROLL_WRITE,
        VENDORS_READ,
        VENDORS_WRITE,
        PURCHASE_ORDERS_READ,
        PURCHASE_ORDERS_WRITE,
        SHIPMENTS_READ,
        SHIPMENTS_WRITE,
    ];
}

/// Format a permission string
pub fn format_permission(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}

fn wildcard(resource: &str) -> String {
    format_permission(resource, Actions::ALL)
}

lazy_static! {
    static ref ROLE_PERMISSIONS: HashMap<Role, HashSet<String>> = {
        use consts::*;

        let mut map = HashMap::new();

        let manager: HashSet<String> = ALL
            .iter()
            .filter(|p| **p != BRANCHES_MANAGE)
            .map(|p| p.to_string())
            .collect();
        map.insert(Role::BranchManager, manager);

        map.insert(
            Role::Sales,
            [
                wildcard(Resources::LEADS),
                CUSTOMERS_READ.into(),
                CUSTOMERS_WRITE.into(),
                QUOTATIONS_READ.into(),
                QUOTATIONS_WRITE.into(),
                ORDERS_READ.into(),
                ORDERS_WRITE.into(),
                INVOICES_READ.into(),
                SHIPMENTS_READ.into(),
            ]
            .into_iter()
            .collect(),
        );

        map.insert(
            Role::Accounts,
            [
                CUSTOMERS_READ.into(),
                CUSTOMERS_WRITE.into(),
                QUOTATIONS_READ.into(),
                ORDERS_READ.into(),
                wildcard(Resources::INVOICES),
                wildcard(Resources::PAYMENTS),
                wildcard(Resources::LEDGER),
                VENDORS_READ.into(),
                PURCHASE_ORDERS_READ.into(),
                PAYROLL_READ.into(),
            ]
            .into_iter()
            .collect(),
        );

        map.insert(
            Role::Hr,
            [
                wildcard(Resources::EMPLOYEES),
                wildcard(Resources::LEAVE),
                wildcard(Resources::PAYROLL),
            ]
            .into_iter()
            .collect(),
        );

        map.insert(
            Role::Procurement,
            [
                wildcard(Resources::VENDORS),
                wildcard(Resources::PURCHASE_ORDERS),
            ]
            .into_iter()
            .collect(),
        );

        map.insert(
            Role::Dispatch,
            [ORDERS_READ.into(), wildcard(Resources::SHIPMENTS)]
                .into_iter()
                .collect(),
        );

        map.insert(
            Role::Employee,
            [LEAVE_READ.into(), LEAVE_WRITE.into()].into_iter().collect(),
        );

        map
    };
}

/// Permission strings granted to a role. Admins bypass checks entirely and get `*`.
pub fn permissions_for(role: Role) -> Vec<String> {
    if role == Role::Admin {
        return vec![Actions::ALL.to_string()];
    }
    let mut perms: Vec<String> = ROLE_PERMISSIONS
        .get(&role)
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default();
    perms.sort();
    perms
}

/// Whether `user_perm` grants `required_perm` (exact match or `resource:*`).
pub fn is_permission_implied(user_perm: &str, required_perm: &str) -> bool {
    if user_perm == required_perm || user_perm == Actions::ALL {
        return true;
    }
    match (user_perm.split_once(':'), required_perm.split_once(':')) {
        (Some((resource, Actions::ALL)), Some((required_resource, _))) => {
            resource == required_resource
        }
        _ => false,
    }
}

pub fn role_has_permission(role: Role, required: &str) -> bool {
    role == Role::Admin
        || permissions_for(role)
            .iter()
            .any(|p| is_permission_implied(p, required))
}

#[cfg(test)]
mod tests {
    use super::consts::*;
    use super::*;

    #[test]
    fn wildcard_grants_every_action_on_resource() {
        assert!(is_permission_implied("leads:*", LEADS_SYNC));
        assert!(!is_permission_implied("leads:*", CUSTOMERS_READ));
        assert!(is_permission_implied("*", BRANCHES_MANAGE));
    }

    #[test]
    fn branch_manager_cannot_manage_branches() {
        assert!(!role_has_permission(Role::BranchManager, BRANCHES_MANAGE));
        assert!(role_has_permission(Role::BranchManager, PAYROLL_WRITE));
        assert!(role_has_permission(Role::Admin, BRANCHES_MANAGE));
    }

    #[test]
    fn sales_sees_invoices_but_cannot_write_them() {
        assert!(role_has_permission(Role::Sales, INVOICES_READ));
        assert!(!role_has_permission(Role::Sales, INVOICES_WRITE));
        assert!(role_has_permission(Role::Sales, LEADS_DELETE));
    }

    #[test]
    fn accounts_owns_money_but_only_reads_payroll() {
        assert!(role_has_permission(Role::Accounts, LEDGER_WRITE));
        assert!(role_has_permission(Role::Accounts, PAYMENTS_DELETE));
        assert!(role_has_permission(Role::Accounts, PAYROLL_READ));
        assert!(!role_has_permission(Role::Accounts, PAYROLL_WRITE));
        assert!(!role_has_permission(Role::Accounts, LEADS_READ));
    }

    #[test]
    fn employee_only_touches_leave() {
        assert!(role_has_permission(Role::Employee, LEAVE_WRITE));
        assert!(!role_has_permission(Role::Employee, LEAVE_APPROVE));
        assert!(!role_has_permission(Role::Employee, CUSTOMERS_READ));
    }

    #[test]
    fn dispatch_and_procurement_scopes() {
        assert!(role_has_permission(Role::Dispatch, SHIPMENTS_WRITE));
        assert!(role_has_permission(Role::Dispatch, ORDERS_READ));
        assert!(!role_has_permission(Role::Dispatch, ORDERS_WRITE));
        assert!(role_has_permission(Role::Procurement, PURCHASE_ORDERS_WRITE));
        assert!(!role_has_permission(Role::Procurement, SHIPMENTS_READ));
    }
}
