//! Persistence gateway for the order-management backend.
//!
//! Every request runs inside one [`UnitOfWork`] obtained from a [`Store`].
//! Two implementations are provided: [`InMemoryStore`] for tests and local
//! runs, and [`PostgresStore`] backed by sqlx.

pub mod entity;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::{
    CustomerId, Lifecycle, Money, OrderId, OrderItemId, OrderStatus, ProductId,
};
pub use entity::{Customer, Order, OrderItem, Product, Version};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{CustomerQuery, OrderQuery, Page, ProductOrder, ProductQuery};
pub use store::{Store, UnitOfWork};
