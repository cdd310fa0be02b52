/*!
 * # Permissions Module
 *
 * Permission strings are `resource:action`. Each role is granted a fixed set
 * of them; route groups are gated on a single permission and a `resource:*`
 * grant matches every action on that resource.
 */

use lazy_static::lazy_static;
use std::collections::HashMap;

use super::rbac::Role;

/// Permission actions
pub struct Actions;

impl Actions {
    pub const READ: &'static str = "read";
    pub const CREATE: &'static str = "create";
    pub const UPDATE: &'static str = "update";
    pub const DELETE: &'static str = "delete";
    pub const APPROVE: &'static str = "approve";
    pub const FULFILL: &'static str = "fulfill";
    pub const MANAGE: &'static str = "manage";
    pub const ALL: &'static str = "*";
}

/// Resource types
pub struct Resources;

impl Resources {
    pub const ORDERS: &'static str = "orders";
    pub const CUSTOMERS: &'static str = "customers";
    pub const PRODUCTS: &'static str = "products";
    pub const USERS: &'static str = "users";
    pub const NOTIFICATIONS: &'static str = "notifications";
}

/// Common permission string constants for compile-time safety
pub mod consts {
    // Orders
    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_CREATE: &str = "orders:create";
    pub const ORDERS_UPDATE: &str = "orders:update";
    pub const ORDERS_APPROVE: &str = "orders:approve";
    pub const ORDERS_FULFILL: &str = "orders:fulfill";

    // Customers
    pub const CUSTOMERS_READ: &str = "customers:read";
    pub const CUSTOMERS_WRITE: &str = "customers:write";
    pub const CUSTOMERS_DELETE: &str = "customers:delete";

    // Products
    pub const PRODUCTS_READ: &str = "products:read";
    pub const PRODUCTS_MANAGE: &str = "products:manage";
    pub const PRODUCTS_STOCK: &str = "products:stock";

    // Users
    pub const USERS_MANAGE: &str = "users:manage";

    // Notifications
    pub const NOTIFICATIONS_READ: &str = "notifications:read";
}

lazy_static! {
    static ref ROLE_PERMISSIONS: HashMap<Role, Vec<&'static str>> = {
        use consts::*;

        let mut table = HashMap::new();

        table.insert(
            Role::Salesperson,
            vec![
                ORDERS_READ,
                ORDERS_CREATE,
                ORDERS_UPDATE,
                CUSTOMERS_READ,
                CUSTOMERS_WRITE,
                PRODUCTS_READ,
                NOTIFICATIONS_READ,
            ],
        );

        table.insert(
            Role::Manager,
            vec![
                "orders:*",
                "customers:*",
                "products:*",
                "users:*",
                NOTIFICATIONS_READ,
            ],
        );

        table.insert(
            Role::Warehouse,
            vec![
                ORDERS_READ,
                ORDERS_FULFILL,
                CUSTOMERS_READ,
                PRODUCTS_READ,
                PRODUCTS_STOCK,
                NOTIFICATIONS_READ,
            ],
        );

        table
    };
}

/// Permissions granted to `role`, wildcards included.
pub fn permissions_for_role(role: Role) -> Vec<String> {
    ROLE_PERMISSIONS
        .get(&role)
        .map(|perms| perms.iter().map(|p| p.to_string()).collect())
        .unwrap_or_default()
}

/// Check if a granted permission covers a required one
pub fn permission_matches(granted: &str, required: &str) -> bool {
    if granted == required || granted == Actions::ALL {
        return true;
    }

    match granted.strip_suffix(":*") {
        Some(resource) => required
            .split_once(':')
            .map(|(required_resource, _)| required_resource == resource)
            .unwrap_or(false),
        None => false,
    }
}

pub fn permission_string(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}
