//! Order workflow.
//!
//! Orders are the only place where several entities change together: placing
//! an order decrements product stock and deleting a pending order puts it
//! back. Both run in one unit of work with the affected product rows locked,
//! so concurrent orders against the same product serialize on the stock check.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use store::{
    Customer, CustomerId, CustomerQuery, Order, OrderId, OrderItem, OrderItemId, OrderQuery,
    OrderStatus, Page, Product, ProductId, ProductQuery, Store, UnitOfWork, Version,
};

use crate::error::DomainError;
use crate::pricing::OrderTotals;
use crate::validation;

/// One requested line of a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub customer_id: CustomerId,
    pub shipping_address: String,
    pub notes: String,
    /// Lines in request order. The same product may appear more than once.
    pub items: Vec<OrderLine>,
}

impl CreateOrder {
    /// Creates an order command with empty address and notes.
    pub fn new(customer_id: CustomerId, items: Vec<OrderLine>) -> Self {
        Self {
            customer_id,
            shipping_address: String::new(),
            notes: String::new(),
            items,
        }
    }

    pub fn shipping_address(mut self, address: impl Into<String>) -> Self {
        self.shipping_address = address.into();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::ValidationFailed(
                "an order needs at least one item".to_string(),
            ));
        }
        if let Some(line) = self.items.iter().find(|line| line.quantity <= 0) {
            return Err(DomainError::ValidationFailed(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        validation::max_len("shipping_address", &self.shipping_address, 200)?;
        validation::max_len("notes", &self.notes, 500)
    }
}

/// Replacement of an order's header fields.
///
/// Items and totals are fixed at creation and cannot be replaced.
#[derive(Debug, Clone)]
pub struct OrderReplacement {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub notes: String,
    pub shipped_date: Option<DateTime<Utc>>,
    pub delivered_date: Option<DateTime<Utc>>,
    pub version: Version,
}

/// An order line with the product it refers to, if that product still exists.
#[derive(Debug, Clone)]
pub struct OrderLineDetails {
    pub item: OrderItem,
    pub product: Option<Product>,
}

/// An order with its customer and product details resolved.
#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub order: Order,
    pub customer: Option<Customer>,
    pub lines: Vec<OrderLineDetails>,
}

/// Service for placing and managing orders.
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order.
    ///
    /// The customer must be active, every product must exist and be active,
    /// and stock must cover every line, counting earlier lines for the same
    /// product. On success each product's stock is reduced by the ordered
    /// quantity in the same unit of work that inserts the order. Any failure
    /// leaves the store unchanged.
    #[tracing::instrument(skip(self), fields(customer_id = %cmd.customer_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, DomainError> {
        let start = Instant::now();
        let result = self.place_order(cmd).await;
        metrics::histogram!("order_create_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    items = order.items.len(),
                    total = %order.total,
                    "order created"
                );
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(error = %e, "order rejected");
            }
        }
        result
    }

    async fn place_order(&self, cmd: CreateOrder) -> Result<Order, DomainError> {
        cmd.validate()?;

        let mut tx = self.store.begin().await?;

        tx.find_customer(cmd.customer_id)
            .await?
            .filter(Customer::is_active)
            .ok_or(DomainError::InvalidCustomer(cmd.customer_id))?;

        let requested = distinct_products(&cmd.items);
        let mut products: HashMap<ProductId, Product> = tx
            .lock_products(&requested)
            .await?
            .into_iter()
            .filter(Product::is_active)
            .map(|p| (p.id, p))
            .collect();
        if products.len() != requested.len() {
            let missing = requested
                .into_iter()
                .filter(|id| !products.contains_key(id))
                .collect();
            return Err(DomainError::InvalidProduct { missing });
        }

        let now = Utc::now();
        let mut items = Vec::with_capacity(cmd.items.len());
        for line in &cmd.items {
            let Some(product) = products.get_mut(&line.product_id) else {
                return Err(DomainError::InvalidProduct {
                    missing: vec![line.product_id],
                });
            };
            if product.stock < line.quantity {
                return Err(DomainError::InsufficientStock {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    available: product.stock,
                    requested: line.quantity,
                });
            }
            product.stock -= line.quantity;
            items.push(OrderItem {
                id: OrderItemId::new(),
                product_id: product.id,
                quantity: line.quantity,
                unit_price: product.price,
                created_at: now,
            });
        }

        let totals = OrderTotals::for_items(&items).ok_or_else(|| {
            DomainError::ValidationFailed("order total exceeds the supported amount".to_string())
        })?;

        for id in &requested {
            if let Some(product) = products.get_mut(id) {
                product.updated_at = Some(now);
                tx.replace_product(product).await?;
            }
        }

        let order = Order {
            id: OrderId::new(),
            customer_id: cmd.customer_id,
            order_date: now,
            shipped_date: None,
            delivered_date: None,
            status: OrderStatus::Pending,
            sub_total: totals.sub_total,
            tax: totals.tax,
            total: totals.total,
            shipping_address: cmd.shipping_address,
            notes: cmd.notes,
            created_at: now,
            updated_at: None,
            version: Version::first(),
            items,
        };
        tx.insert_order(&order).await?;
        tx.commit().await?;

        Ok(order)
    }

    /// Sets an order's status.
    ///
    /// Any status may follow any other. The first move to `Shipped` or
    /// `Delivered` stamps the matching date; later moves never overwrite it.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .find_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;

        let now = Utc::now();
        order.status = status;
        match status {
            OrderStatus::Shipped if order.shipped_date.is_none() => {
                order.shipped_date = Some(now);
            }
            OrderStatus::Delivered if order.delivered_date.is_none() => {
                order.delivered_date = Some(now);
            }
            _ => {}
        }
        order.updated_at = Some(now);
        order.version = tx.replace_order(&order).await?;
        tx.commit().await?;

        metrics::counter!("order_status_changes_total", "status" => status.as_str())
            .increment(1);
        tracing::info!(order_id = %id, %status, "order status changed");
        Ok(order)
    }

    /// Deletes a pending order and returns its items to stock.
    ///
    /// Products that no longer exist are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, id: OrderId) -> Result<(), DomainError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .find_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;

        if !order.status.can_delete() {
            return Err(DomainError::InvalidState(
                "only pending orders can be deleted".to_string(),
            ));
        }
        // Fails if the status changed after the read above.
        tx.delete_order(id, order.version).await?;

        let product_ids = order.product_ids();
        let mut products: HashMap<ProductId, Product> = tx
            .lock_products(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        for item in &order.items {
            if let Some(product) = products.get_mut(&item.product_id) {
                product.stock = product.stock.checked_add(item.quantity).ok_or_else(|| {
                    DomainError::ValidationFailed(format!(
                        "restoring {} units would overflow the stock of product {}",
                        item.quantity, product.id
                    ))
                })?;
            }
        }

        let now = Utc::now();
        for product_id in &product_ids {
            if let Some(product) = products.get_mut(product_id) {
                product.updated_at = Some(now);
                tx.replace_product(product).await?;
            }
        }
        tx.commit().await?;

        metrics::counter!("orders_deleted_total").increment(1);
        tracing::info!(order_id = %id, "order deleted");
        Ok(())
    }

    /// Replaces an order's header fields.
    #[tracing::instrument(skip(self))]
    pub async fn replace_order(
        &self,
        id: OrderId,
        replacement: OrderReplacement,
    ) -> Result<Order, DomainError> {
        if replacement.id != id {
            return Err(DomainError::ValidationFailed(format!(
                "body id {} does not match path id {id}",
                replacement.id
            )));
        }
        validation::max_len("shipping_address", &replacement.shipping_address, 200)?;
        validation::max_len("notes", &replacement.notes, 500)?;

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .find_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;

        if replacement.customer_id != order.customer_id {
            tx.find_customer(replacement.customer_id)
                .await?
                .filter(Customer::is_active)
                .ok_or(DomainError::InvalidCustomer(replacement.customer_id))?;
        }

        order.customer_id = replacement.customer_id;
        order.status = replacement.status;
        order.shipping_address = replacement.shipping_address;
        order.notes = replacement.notes;
        order.shipped_date = replacement.shipped_date;
        order.delivered_date = replacement.delivered_date;
        order.updated_at = Some(Utc::now());
        order.version = replacement.version;

        order.version = tx.replace_order(&order).await?;
        tx.commit().await?;

        Ok(order)
    }

    /// Returns an order with its customer and products.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<OrderDetails, DomainError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .find_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;

        let mut details = with_details(&mut tx, vec![order]).await?;
        details
            .pop()
            .ok_or_else(|| DomainError::not_found("Order", id))
    }

    /// Lists orders newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, page: Page) -> Result<Vec<OrderDetails>, DomainError> {
        let mut tx = self.store.begin().await?;
        let orders = tx.find_orders(&OrderQuery::new().page(page)).await?;
        with_details(&mut tx, orders).await
    }

    /// Lists a customer's orders newest first. Unknown customers simply have
    /// no orders.
    #[tracing::instrument(skip(self))]
    pub async fn customer_orders(
        &self,
        customer_id: CustomerId,
        page: Page,
    ) -> Result<Vec<OrderDetails>, DomainError> {
        let mut tx = self.store.begin().await?;
        let query = OrderQuery::for_customer(customer_id).page(page);
        let orders = tx.find_orders(&query).await?;
        with_details(&mut tx, orders).await
    }
}

/// Distinct product ids in first-seen order.
fn distinct_products(lines: &[OrderLine]) -> Vec<ProductId> {
    let mut seen = HashSet::new();
    lines
        .iter()
        .map(|line| line.product_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

async fn with_details<T: UnitOfWork>(
    tx: &mut T,
    orders: Vec<Order>,
) -> Result<Vec<OrderDetails>, DomainError> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let customer_ids: Vec<CustomerId> = orders
        .iter()
        .map(|o| o.customer_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let product_ids: Vec<ProductId> = orders
        .iter()
        .flat_map(Order::product_ids)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let customers: HashMap<CustomerId, Customer> = tx
        .find_customers(&CustomerQuery::new().ids(customer_ids))
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
    let products: HashMap<ProductId, Product> = tx
        .find_products(&ProductQuery::new().ids(product_ids))
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    Ok(orders
        .into_iter()
        .map(|order| {
            let lines = order
                .items
                .iter()
                .map(|item| OrderLineDetails {
                    item: item.clone(),
                    product: products.get(&item.product_id).cloned(),
                })
                .collect();
            OrderDetails {
                customer: customers.get(&order.customer_id).cloned(),
                lines,
                order,
            }
        })
        .collect())
}
