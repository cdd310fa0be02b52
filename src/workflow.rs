//! Sale order status machine.
//!
//! Every status change in the service goes through [`OrderStatus::next`];
//! handlers and services never assign a status directly.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

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
pub enum OrderStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "submitted")]
    Submitted,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "fulfilled")]
    Fulfilled,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LineStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "fulfilled")]
    Fulfilled,
}

/// Actions that move an order between statuses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderAction {
    Submit,
    Approve,
    Reject,
    Fulfill,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} an order in status '{from}'")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub action: OrderAction,
}

impl OrderStatus {
    /// Returns the status reached by applying `action`, or an error when the
    /// transition is not part of the workflow.
    pub fn next(self, action: OrderAction) -> Result<OrderStatus, TransitionError> {
        use OrderAction::*;
        use OrderStatus::*;

        match (self, action) {
            (Draft | Rejected, Submit) => Ok(Submitted),
            (Submitted, Approve) => Ok(Approved),
            (Submitted, Reject) => Ok(Rejected),
            (Approved, Fulfill) => Ok(Fulfilled),
            (from, action) => Err(TransitionError { from, action }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Fulfilled)
    }

    /// Header and items can only change before approval.
    pub fn is_mutable(self) -> bool {
        matches!(
            self,
            OrderStatus::Draft | OrderStatus::Submitted | OrderStatus::Rejected
        )
    }

    pub fn allowed_actions(self) -> Vec<OrderAction> {
        [
            OrderAction::Submit,
            OrderAction::Approve,
            OrderAction::Reject,
            OrderAction::Fulfill,
        ]
        .into_iter()
        .filter(|action| self.next(*action).is_ok())
        .collect()
    }
}
