//! Domain layer for the order-management backend.
//!
//! This crate provides the business services that sit on top of the
//! persistence gateway:
//! - [`CatalogService`] for products, visibility and low-stock reporting
//! - [`DirectoryService`] for customers and their email uniqueness rules
//! - [`OrderService`] for the order workflow and stock reconciliation
//!
//! Every service operation runs inside a single store unit of work.

pub mod catalog;
pub mod directory;
pub mod error;
pub mod orders;
pub mod pricing;
mod validation;

pub use catalog::{CatalogService, LOW_STOCK_THRESHOLD, NewProduct, ProductReplacement};
pub use directory::{
    CustomerReplacement, CustomerWithOrders, DeleteOutcome, DirectoryService, NewCustomer,
};
pub use error::{DomainError, ErrorKind};
pub use orders::{
    CreateOrder, OrderDetails, OrderLine, OrderLineDetails, OrderReplacement, OrderService,
};
pub use pricing::{OrderTotals, TAX_RATE_PERCENT};

pub use store::{
    Customer, CustomerId, Lifecycle, Money, Order, OrderId, OrderItem, OrderItemId, OrderStatus,
    Page, Product, ProductId, Version,
};
