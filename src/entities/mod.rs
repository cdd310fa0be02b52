pub mod customer;
pub mod order_item;
pub mod order_status_history;
pub mod product;
pub mod sale_order;
pub mod user;

pub use customer::Entity as Customer;
pub use order_item::Entity as OrderItem;
pub use order_status_history::Entity as OrderStatusHistory;
pub use product::Entity as Product;
pub use sale_order::Entity as SaleOrder;
pub use user::Entity as User;
