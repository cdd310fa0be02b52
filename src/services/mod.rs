//! ORM-backed services. Handlers stay thin; every rule about who may do
//! what to which row lives here.

pub mod customers;
pub mod orders;
pub mod products;
pub mod users;

use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ColumnTrait, Condition,
};
use std::sync::Arc;
use tracing::warn;

use crate::db::DbPool;
use crate::events::{Event, EventSender};

/// Service container shared through `AppState`
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<users::UserService>,
    pub customers: Arc<customers::CustomerService>,
    pub products: Arc<products::ProductService>,
    pub orders: Arc<orders::OrderService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        settings: orders::OrderSettings,
    ) -> Self {
        Self {
            users: Arc::new(users::UserService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            customers: Arc::new(customers::CustomerService::new(db_pool.clone())),
            products: Arc::new(products::ProductService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            orders: Arc::new(orders::OrderService::new(db_pool, event_sender, settings)),
        }
    }
}

/// Publishes `event` after a committed write. Delivery failures are logged
/// and never fail the request.
pub(crate) async fn publish(event_sender: &Option<Arc<EventSender>>, event: Event) {
    if let Some(sender) = event_sender {
        if let Err(e) = sender.send(event).await {
            warn!(error = %e, "Failed to publish domain event");
        }
    }
}

/// `(page, limit)` normalised so `page >= 1` and `limit >= 1`.
pub(crate) fn normalize_page(page: u64, limit: u64) -> (u64, u64) {
    (page.max(1), limit.max(1))
}

const LIKE_ESCAPE: char = '\\';

/// Lowercased `%term%` for a LIKE filter with the term's own wildcards
/// escaped, or `None` when the term is blank.
pub(crate) fn like_pattern(term: Option<&str>) -> Option<String> {
    let term = term.map(str::trim).filter(|t| !t.is_empty())?;
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

/// Case-insensitive substring match of `term` against any of `columns`.
pub(crate) fn search_condition<C>(term: Option<&str>, columns: &[C]) -> Option<Condition>
where
    C: ColumnTrait,
{
    let pattern = like_pattern(term)?;
    Some(columns.iter().fold(Condition::any(), |condition, column| {
        condition.add(
            Expr::expr(Func::lower(Expr::col(*column)))
                .like(LikeExpr::new(pattern.clone()).escape(LIKE_ESCAPE)),
        )
    }))
}
