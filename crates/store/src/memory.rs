use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::ACTIVE_EMAIL_CONSTRAINT;
use crate::{
    Customer, CustomerId, CustomerQuery, Order, OrderId, OrderQuery, Product, ProductId,
    ProductOrder, ProductQuery, Result, StoreError, Version,
    store::{Store, UnitOfWork},
};

const ORDERS_CUSTOMER_FK: &str = "orders_customer_id_fkey";
const ORDER_ITEMS_PRODUCT_FK: &str = "order_items_product_id_fkey";

#[derive(Debug, Clone, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    orders: HashMap<OrderId, Order>,
}

/// In-memory store implementation for testing and local runs.
///
/// Units of work are serialized: [`Store::begin`] waits until the previous
/// unit of work has been committed or dropped. Each unit of work mutates a
/// private copy of the tables that replaces the shared copy on commit.
/// The same constraints as the PostgreSQL schema are enforced.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of products stored.
    pub async fn product_count(&self) -> usize {
        self.tables.lock().await.products.len()
    }

    /// Returns the total number of customers stored.
    pub async fn customer_count(&self) -> usize {
        self.tables.lock().await.customers.len()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<InMemoryUnitOfWork> {
        let committed = self.tables.clone().lock_owned().await;
        let working = committed.clone();
        Ok(InMemoryUnitOfWork { committed, working })
    }
}

/// Unit of work over an [`InMemoryStore`].
pub struct InMemoryUnitOfWork {
    committed: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn check_version(
    entity: &'static str,
    id: String,
    stored: Option<Version>,
    expected: Version,
) -> Result<()> {
    match stored {
        None => Err(StoreError::NotFound { entity, id }),
        Some(actual) if actual != expected => {
            tracing::debug!(entity, %id, %expected, %actual, "stale version rejected");
            Err(StoreError::ConcurrencyConflict {
                entity,
                id,
                expected,
            })
        }
        Some(_) => Ok(()),
    }
}

impl InMemoryUnitOfWork {
    fn email_taken(&self, email: &str, excluding: Option<CustomerId>) -> bool {
        self.working
            .customers
            .values()
            .any(|c| c.is_active() && c.email == email && Some(c.id) != excluding)
    }

    fn check_order_references(&self, order: &Order) -> Result<()> {
        if !self.working.customers.contains_key(&order.customer_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: ORDERS_CUSTOMER_FK.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn find_products(&mut self, query: &ProductQuery) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self
            .working
            .products
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();

        match query.order {
            ProductOrder::Name => {
                products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)))
            }
            ProductOrder::StockAscending => products.sort_by(|a, b| {
                a.stock
                    .cmp(&b.stock)
                    .then(a.name.cmp(&b.name))
                    .then(a.id.cmp(&b.id))
            }),
        }

        Ok(query.page.apply(products))
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        // The whole unit of work already holds the store lock.
        let mut products: Vec<Product> = ids
            .iter()
            .filter_map(|id| self.working.products.get(id).cloned())
            .collect();
        products.sort_by_key(|p| p.id);
        products.dedup_by_key(|p| p.id);
        Ok(products)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        if self.working.products.contains_key(&product.id) {
            return Err(StoreError::UniqueViolation {
                constraint: "products_pkey".to_string(),
            });
        }
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn replace_product(&mut self, product: &Product) -> Result<Version> {
        let stored = self.working.products.get(&product.id).map(|p| p.version);
        check_version("Product", product.id.to_string(), stored, product.version)?;

        let mut updated = product.clone();
        updated.version = product.version.next();
        let version = updated.version;
        self.working.products.insert(product.id, updated);
        Ok(version)
    }

    async fn find_customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.working.customers.get(&id).cloned())
    }

    async fn find_customers(&mut self, query: &CustomerQuery) -> Result<Vec<Customer>> {
        let mut customers: Vec<Customer> = self
            .working
            .customers
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        customers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(query.page.apply(customers))
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<()> {
        if self.working.customers.contains_key(&customer.id) {
            return Err(StoreError::UniqueViolation {
                constraint: "customers_pkey".to_string(),
            });
        }
        if customer.is_active() && self.email_taken(&customer.email, None) {
            return Err(StoreError::UniqueViolation {
                constraint: ACTIVE_EMAIL_CONSTRAINT.to_string(),
            });
        }
        self.working.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn replace_customer(&mut self, customer: &Customer) -> Result<Version> {
        let stored = self.working.customers.get(&customer.id).map(|c| c.version);
        check_version("Customer", customer.id.to_string(), stored, customer.version)?;

        if customer.is_active() && self.email_taken(&customer.email, Some(customer.id)) {
            return Err(StoreError::UniqueViolation {
                constraint: ACTIVE_EMAIL_CONSTRAINT.to_string(),
            });
        }

        let mut updated = customer.clone();
        updated.version = customer.version.next();
        let version = updated.version;
        self.working.customers.insert(customer.id, updated);
        Ok(version)
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<()> {
        if !self.working.customers.contains_key(&id) {
            return Err(StoreError::NotFound {
                entity: "Customer",
                id: id.to_string(),
            });
        }
        if self.working.orders.values().any(|o| o.customer_id == id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: ORDERS_CUSTOMER_FK.to_string(),
            });
        }
        self.working.customers.remove(&id);
        Ok(())
    }

    async fn active_email_exists(
        &mut self,
        email: &str,
        excluding: Option<CustomerId>,
    ) -> Result<bool> {
        Ok(self.email_taken(email, excluding))
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn find_orders(&mut self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date).then(a.id.cmp(&b.id)));
        Ok(query.page.apply(orders))
    }

    async fn customer_has_orders(&mut self, id: CustomerId) -> Result<bool> {
        Ok(self.working.orders.values().any(|o| o.customer_id == id))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::UniqueViolation {
                constraint: "orders_pkey".to_string(),
            });
        }
        self.check_order_references(order)?;
        if order
            .items
            .iter()
            .any(|item| !self.working.products.contains_key(&item.product_id))
        {
            return Err(StoreError::ForeignKeyViolation {
                constraint: ORDER_ITEMS_PRODUCT_FK.to_string(),
            });
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn replace_order(&mut self, order: &Order) -> Result<Version> {
        let stored = self.working.orders.get(&order.id).map(|o| o.version);
        check_version("Order", order.id.to_string(), stored, order.version)?;
        self.check_order_references(order)?;

        let items = self
            .working
            .orders
            .get(&order.id)
            .map(|o| o.items.clone())
            .unwrap_or_default();
        let mut updated = order.clone();
        updated.items = items;
        updated.version = order.version.next();
        let version = updated.version;
        self.working.orders.insert(order.id, updated);
        Ok(version)
    }

    async fn delete_order(&mut self, id: OrderId, expected: Version) -> Result<()> {
        let stored = self.working.orders.get(&id).map(|o| o.version);
        check_version("Order", id.to_string(), stored, expected)?;
        self.working.orders.remove(&id);
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        *self.committed = self.working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{Lifecycle, Money, OrderItem, OrderItemId, OrderStatus, Page};

    fn product(name: &str, stock: i32, category: &str) -> Product {
        Product {
            id: ProductId::new(),
            name: name.to_string(),
            description: String::new(),
            price: Money::from_cents(250),
            stock,
            category: category.to_string(),
            brand: "Don Pepe".to_string(),
            lifecycle: Lifecycle::Active,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        }
    }

    fn customer(name: &str, email: &str) -> Customer {
        Customer {
            id: CustomerId::new(),
            name: name.to_string(),
            email: email.to_string(),
            phone: String::new(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            postal_code: String::new(),
            lifecycle: Lifecycle::Active,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        }
    }

    fn order(customer_id: CustomerId, product_id: ProductId) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            customer_id,
            order_date: now,
            shipped_date: None,
            delivered_date: None,
            status: OrderStatus::Pending,
            sub_total: Money::from_cents(250),
            tax: Money::from_cents(33),
            total: Money::from_cents(283),
            shipping_address: String::new(),
            notes: String::new(),
            created_at: now,
            updated_at: None,
            version: Version::first(),
            items: vec![OrderItem {
                id: OrderItemId::new(),
                product_id,
                quantity: 1,
                unit_price: Money::from_cents(250),
                created_at: now,
            }],
        }
    }

    #[tokio::test]
    async fn committed_changes_are_visible() {
        let store = InMemoryStore::new();
        let p = product("Arroz", 10, "Granos");

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.find_product(p.id).await.unwrap(), Some(p));
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = InMemoryStore::new();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_product(&product("Arroz", 10, "Granos"))
                .await
                .unwrap();
        }

        assert_eq!(store.product_count().await, 0);
    }

    #[tokio::test]
    async fn replace_bumps_version() {
        let store = InMemoryStore::new();
        let mut p = product("Arroz", 10, "Granos");

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        p.stock = 5;
        let version = tx.replace_product(&p).await.unwrap();
        assert_eq!(version, Version::new(2));

        let stored = tx.find_product(p.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 5);
        assert_eq!(stored.version, Version::new(2));
    }

    #[tokio::test]
    async fn stale_replace_is_a_conflict() {
        let store = InMemoryStore::new();
        let p = product("Arroz", 10, "Granos");

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.replace_product(&p).await.unwrap();

        let result = tx.replace_product(&p).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn replace_of_missing_record_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let result = tx.replace_product(&product("Ghost", 1, "")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn product_filters_and_ordering() {
        let store = InMemoryStore::new();
        let mut inactive = product("Azucar", 1, "Granos");
        inactive.lifecycle = Lifecycle::Deactivated;

        let mut tx = store.begin().await.unwrap();
        for p in [
            product("Frijoles", 15, "granos"),
            product("Aceite", 75, "Aceites"),
            product("Arroz", 5, "Granos"),
            inactive,
        ] {
            tx.insert_product(&p).await.unwrap();
        }

        let by_name = tx.find_products(&ProductQuery::active()).await.unwrap();
        let names: Vec<_> = by_name.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Aceite", "Arroz", "Frijoles"]);

        let granos = tx
            .find_products(&ProductQuery::active().category("GRANOS"))
            .await
            .unwrap();
        assert_eq!(granos.len(), 2);

        let low = tx
            .find_products(
                &ProductQuery::active()
                    .stock_below(20)
                    .order_by(ProductOrder::StockAscending),
            )
            .await
            .unwrap();
        let stocks: Vec<_> = low.iter().map(|p| p.stock).collect();
        assert_eq!(stocks, vec![5, 15]);

        let paged = tx
            .find_products(&ProductQuery::active().page(Page::new(Some(1), Some(1))))
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].name, "Arroz");
    }

    #[tokio::test]
    async fn lock_products_skips_missing_and_duplicates() {
        let store = InMemoryStore::new();
        let p = product("Arroz", 10, "Granos");

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();

        let locked = tx
            .lock_products(&[p.id, ProductId::new(), p.id])
            .await
            .unwrap();
        assert_eq!(locked.len(), 1);
    }

    #[tokio::test]
    async fn active_email_is_unique() {
        let store = InMemoryStore::new();
        let mut first = customer("Maria", "maria@example.com");

        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&first).await.unwrap();

        let duplicate = customer("Other Maria", "maria@example.com");
        let err = tx.insert_customer(&duplicate).await.unwrap_err();
        assert!(err.is_duplicate_email());

        first.lifecycle = Lifecycle::Deactivated;
        tx.replace_customer(&first).await.unwrap();
        tx.insert_customer(&duplicate).await.unwrap();
        assert!(
            tx.active_email_exists("maria@example.com", None)
                .await
                .unwrap()
        );
        assert!(
            !tx.active_email_exists("maria@example.com", Some(duplicate.id))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn order_requires_existing_customer() {
        let store = InMemoryStore::new();
        let p = product("Arroz", 10, "Granos");

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();

        let result = tx.insert_order(&order(CustomerId::new(), p.id)).await;
        assert!(matches!(
            result,
            Err(StoreError::ForeignKeyViolation { .. })
        ));
    }

    #[tokio::test]
    async fn customer_with_orders_cannot_be_deleted() {
        let store = InMemoryStore::new();
        let p = product("Arroz", 10, "Granos");
        let c = customer("Maria", "maria@example.com");
        let o = order(c.id, p.id);

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.insert_customer(&c).await.unwrap();
        tx.insert_order(&o).await.unwrap();

        assert!(tx.customer_has_orders(c.id).await.unwrap());
        assert!(matches!(
            tx.delete_customer(c.id).await,
            Err(StoreError::ForeignKeyViolation { .. })
        ));

        tx.delete_order(o.id, o.version).await.unwrap();
        tx.delete_customer(c.id).await.unwrap();
        assert!(tx.find_customer(c.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_order_checks_version() {
        let store = InMemoryStore::new();
        let p = product("Arroz", 10, "Granos");
        let c = customer("Maria", "maria@example.com");
        let o = order(c.id, p.id);

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.insert_customer(&c).await.unwrap();
        tx.insert_order(&o).await.unwrap();

        let mut confirmed = o.clone();
        confirmed.status = OrderStatus::Confirmed;
        let current = tx.replace_order(&confirmed).await.unwrap();

        assert!(matches!(
            tx.delete_order(o.id, o.version).await,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
        assert!(tx.find_order(o.id).await.unwrap().is_some());

        tx.delete_order(o.id, current).await.unwrap();
        assert!(matches!(
            tx.delete_order(o.id, current).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn replace_order_keeps_items() {
        let store = InMemoryStore::new();
        let p = product("Arroz", 10, "Granos");
        let c = customer("Maria", "maria@example.com");
        let o = order(c.id, p.id);

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.insert_customer(&c).await.unwrap();
        tx.insert_order(&o).await.unwrap();

        let mut header = o.clone();
        header.items.clear();
        header.notes = "leave at the door".to_string();
        tx.replace_order(&header).await.unwrap();

        let stored = tx.find_order(o.id).await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.notes, "leave at the door");
    }

    #[tokio::test]
    async fn orders_are_listed_newest_first() {
        let store = InMemoryStore::new();
        let p = product("Arroz", 10, "Granos");
        let c = customer("Maria", "maria@example.com");
        let older = order(c.id, p.id);
        let mut newer = order(c.id, p.id);
        newer.order_date = older.order_date + chrono::Duration::seconds(5);

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.insert_customer(&c).await.unwrap();
        tx.insert_order(&older).await.unwrap();
        tx.insert_order(&newer).await.unwrap();

        let orders = tx
            .find_orders(&OrderQuery::for_customer(c.id))
            .await
            .unwrap();
        let ids: Vec<_> = orders.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        let none = tx
            .find_orders(&OrderQuery::for_customer(CustomerId::new()))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
