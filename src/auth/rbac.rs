/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Order access rules for the three roles. Every function here is pure;
 * the order service is the only caller that turns a `false` into an error.
 */

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::workflow::{OrderAction, OrderStatus};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    #[sea_orm(string_value = "salesperson")]
    Salesperson,
    #[sea_orm(string_value = "manager")]
    Manager,
    #[sea_orm(string_value = "warehouse")]
    Warehouse,
}

/// The parts of an order the policy looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderRef {
    pub salesperson_id: Uuid,
    pub status: OrderStatus,
}

impl OrderRef {
    pub fn new(salesperson_id: Uuid, status: OrderStatus) -> Self {
        Self {
            salesperson_id,
            status,
        }
    }

    fn owned_by(&self, user_id: Uuid) -> bool {
        self.salesperson_id == user_id
    }
}

pub fn can_access_order(role: Role, user_id: Uuid, order: &OrderRef) -> bool {
    match role {
        Role::Manager => true,
        Role::Salesperson => order.owned_by(user_id),
        Role::Warehouse => matches!(
            order.status,
            OrderStatus::Approved | OrderStatus::Fulfilled
        ),
    }
}

pub fn can_edit_order(role: Role, user_id: Uuid, order: &OrderRef) -> bool {
    match role {
        Role::Salesperson => {
            order.owned_by(user_id)
                && matches!(order.status, OrderStatus::Draft | OrderStatus::Rejected)
        }
        Role::Manager => order.status.is_mutable(),
        Role::Warehouse => false,
    }
}

/// Whether the role may attempt `action`. The status machine still decides
/// whether the transition is legal from the current status.
pub fn can_perform(role: Role, user_id: Uuid, order: &OrderRef, action: OrderAction) -> bool {
    match action {
        OrderAction::Submit => match role {
            Role::Manager => true,
            Role::Salesperson => order.owned_by(user_id),
            Role::Warehouse => false,
        },
        OrderAction::Approve | OrderAction::Reject => role == Role::Manager,
        OrderAction::Fulfill => matches!(role, Role::Warehouse | Role::Manager),
    }
}

pub fn can_delete_order(role: Role, user_id: Uuid, order: &OrderRef) -> bool {
    if order.status != OrderStatus::Draft {
        return false;
    }
    match role {
        Role::Manager => true,
        Role::Salesperson => order.owned_by(user_id),
        Role::Warehouse => false,
    }
}

pub fn can_create_order(role: Role) -> bool {
    matches!(role, Role::Salesperson | Role::Manager)
}

pub fn can_manage_customers(role: Role) -> bool {
    matches!(role, Role::Salesperson | Role::Manager)
}

pub fn can_delete_customers(role: Role) -> bool {
    role == Role::Manager
}

pub fn can_manage_products(role: Role) -> bool {
    role == Role::Manager
}

pub fn can_adjust_stock(role: Role) -> bool {
    matches!(role, Role::Manager | Role::Warehouse)
}

pub fn can_manage_users(role: Role) -> bool {
    role == Role::Manager
}
